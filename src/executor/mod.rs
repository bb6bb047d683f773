//! Execution backends for sweeprun.
//!
//! This module defines the [`Processor`] contract shared by the local
//! worker-pool backend and the batch-scheduler backend, plus the stream
//! types both sides of the contract exchange.

pub mod local;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::{Result, SweepRunError};
use crate::params::ParamSet;
use crate::process::ProcessTemplate;
use crate::result::RunResult;

/// Type alias for boxed async futures.
///
/// Used to enable dynamic dispatch for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The parameter stream consumed by a backend: any ordered source of
/// parameter sets, pulled lazily and exactly once.
pub type ParamStream = Box<dyn Iterator<Item = ParamSet> + Send>;

/// Stream of per-invocation outcomes yielded by a backend.
///
/// Elements may arrive out of submission order (pool scheduling); each
/// pair is internally consistent. A failed invocation surfaces as an
/// `Err` element carrying the parameter set identity.
pub struct RunStream {
    rx: mpsc::Receiver<Result<(ParamSet, RunResult)>>,
}

impl RunStream {
    pub(crate) fn new(rx: mpsc::Receiver<Result<(ParamSet, RunResult)>>) -> Self {
        Self { rx }
    }

    /// Next outcome, or `None` once the sweep is exhausted.
    pub async fn next(&mut self) -> Option<Result<(ParamSet, RunResult)>> {
        self.rx.recv().await
    }

    /// Collects all outcomes, stopping at the first failed invocation.
    ///
    /// # Errors
    ///
    /// Propagates the first `Err` element of the stream.
    pub async fn try_collect(mut self) -> Result<Vec<(ParamSet, RunResult)>> {
        let mut results = Vec::new();
        while let Some(outcome) = self.next().await {
            results.push(outcome?);
        }
        Ok(results)
    }
}

impl std::fmt::Debug for RunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStream").finish_non_exhaustive()
    }
}

/// Contract shared by all execution backends.
///
/// A backend executes one [`ProcessTemplate`] once per member of the
/// parameter stream and yields `(parameters, result)` pairs.
///
/// Implementations must ensure that:
/// - invocations are isolated (no cross-invocation state leakage)
/// - every temporary resource is cleaned up, on success and on failure
/// - failures are reported through the stream or the returned error,
///   never panicked
pub trait Processor: Send + Sync {
    /// Executes `template` once per parameter set.
    ///
    /// # Errors
    ///
    /// Returns an error when the sweep as a whole cannot run (for
    /// example, a rejected batch submission). Per-invocation failures
    /// surface as `Err` elements of the stream instead.
    fn process(
        &self,
        template: ProcessTemplate,
        params: ParamStream,
    ) -> BoxFuture<'_, Result<RunStream>>;

    /// Human-readable backend name.
    fn name(&self) -> &'static str;
}

/// Resolves a command to an absolute executable path.
///
/// An absolute or relative path containing a separator is validated in
/// place; a bare name is searched on `PATH`.
pub(crate) fn lookup_command(command: &str) -> Result<PathBuf> {
    let as_path = Path::new(command);

    if command.contains('/') {
        if is_executable(as_path) {
            return Ok(std::path::absolute(as_path)?);
        }
        return Err(SweepRunError::CommandNotFound {
            command: command.to_string(),
        });
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(command);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(SweepRunError::CommandNotFound {
        command: command.to_string(),
    })
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}
