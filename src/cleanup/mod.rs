//! Deferred cleanup handlers.
//!
//! Each unit of work (one process invocation, or one batch submission)
//! carries a [`HandlerList`] of deferred actions. Handlers run in
//! registration order, at most once: draining moves them out of the list,
//! and merging a list into another transfers ownership, so no handler can
//! fire twice.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::Result;

/// One deferred, fallible action.
pub type Handler = Box<dyn FnOnce() -> Result<()> + Send>;

/// Ordered, append-only list of deferred actions.
#[derive(Default)]
pub struct HandlerList {
    handlers: Vec<Handler>,
}

impl HandlerList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    pub fn push<F>(&mut self, handler: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Appends a handler deleting the file at `path`.
    pub fn push_remove_file(&mut self, path: PathBuf) {
        self.push(move || {
            fs::remove_file(&path)?;
            Ok(())
        });
    }

    /// Moves all handlers of `other` to the end of this list.
    pub fn merge(&mut self, other: Self) {
        self.handlers.extend(other.handlers);
    }

    /// Runs all handlers in order, draining the list.
    ///
    /// Every handler runs even if an earlier one fails; failures past the
    /// first are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    pub fn run(&mut self) -> Result<()> {
        let mut first_err = None;
        for handler in self.handlers.drain(..) {
            if let Err(e) = handler() {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    warn!("further cleanup handler failed: {e}");
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerList")
            .field("len", &self.handlers.len())
            .finish()
    }
}
