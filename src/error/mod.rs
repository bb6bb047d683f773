//! Error types for sweeprun.
//!
//! All failure modes surface through [`SweepRunError`]; the library never
//! panics on the non-test path.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::params::ParamSet;

/// Result type alias for sweeprun operations.
pub type Result<T> = std::result::Result<T, SweepRunError>;

/// Error type covering every sweeprun failure mode.
#[derive(Error, Debug)]
pub enum SweepRunError {
    /// A process template failed validation before any execution.
    #[error("invalid process template: {reason}")]
    TemplateInvalid {
        /// Why the template was rejected.
        reason: String,
    },

    /// A managed file could not be realized without violating its
    /// lifecycle policy.
    #[error("resource conflict for file {name} at {path}: {reason}")]
    ResourceConflict {
        /// Logical name of the file.
        name: String,
        /// Path at which the conflict occurred.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A process execution was classified as failed, terminated on a
    /// signal, or did not produce an expected output.
    #[error("process failed: {reason}")]
    ProcessFailed {
        /// Human-readable failure description.
        reason: String,
        /// Exit code, when the process exited normally.
        exit_code: Option<i32>,
        /// Signal number, when the process was signal-terminated.
        signal: Option<i32>,
    },

    /// Wraps any per-invocation error with the parameter set it belongs
    /// to, so callers can correlate which invocation failed.
    #[error("invocation for parameter set {params:?} failed: {source}")]
    Invocation {
        /// Parameter set of the failing invocation.
        params: ParamSet,
        /// The underlying error.
        #[source]
        source: Box<SweepRunError>,
    },

    /// The remote scheduler rejected a submission or returned an
    /// inconsistent answer.
    #[error("batch submission error: {reason}")]
    SubmissionError {
        /// Scheduler-side detail.
        reason: String,
    },

    /// A command could not be resolved to an executable path.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command as given in the template.
        command: String,
    },

    /// A resolvable value referenced a parameter missing from the set.
    #[error("parameter not available: {name}")]
    ParamUnavailable {
        /// Name of the missing parameter.
        name: String,
    },

    /// A result accessor was requested for a stream or file that was not
    /// configured, or for a file without a persistent path.
    #[error("accessor unavailable for {name}: {reason}")]
    AccessorUnavailable {
        /// Logical name of the stream or file.
        name: String,
        /// Why no accessor exists.
        reason: String,
    },

    /// An executor was configured with invalid settings.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// I/O error while preparing files or spawning processes.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SweepRunError {
    /// Wraps this error with the parameter set of the failing invocation.
    #[must_use]
    pub fn for_params(self, params: ParamSet) -> Self {
        Self::Invocation {
            params,
            source: Box::new(self),
        }
    }

    /// Walks [`SweepRunError::Invocation`] wrappers down to the
    /// underlying error.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Invocation { source, .. } => source.root(),
            other => other,
        }
    }
}
