//! Per-invocation results and lazily openable file handles.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, SweepRunError};

/// A file belonging to a finished invocation, openable for reading.
///
/// Accessors stay valid until the owning cleanup registry runs; cleanup is
/// deferred until the consumer has released the result, so opening never
/// races a deletion.
#[derive(Debug, Clone)]
pub struct FileAccessor {
    name: String,
    open_path: PathBuf,
    path: Option<PathBuf>,
}

impl FileAccessor {
    pub(crate) fn new(name: impl Into<String>, open_path: PathBuf, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            open_path,
            path,
        }
    }

    /// Logical name of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path this accessor reads from. May be a temporary location.
    #[must_use]
    pub fn open_path(&self) -> &Path {
        &self.open_path
    }

    /// Persistent path of the file, when one was pinned.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] for files that only
    /// exist at a temporary location.
    pub fn path(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| SweepRunError::AccessorUnavailable {
                name: self.name.clone(),
                reason: "file has no persistent path".to_string(),
            })
    }

    /// Opens the file for reading.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    pub fn open(&self) -> Result<File> {
        Ok(File::open(&self.open_path)?)
    }

    /// Reads the whole file.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Reads the whole file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Propagates the underlying I/O error, including invalid UTF-8.
    pub fn read_to_string(&self) -> Result<String> {
        let mut buf = String::new();
        self.open()?.read_to_string(&mut buf)?;
        Ok(buf)
    }
}

/// Result of one process invocation.
///
/// Immutable once constructed. File accessors are present only for the
/// streams and files the template configured.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub(crate) exit_code: i32,
    pub(crate) stdin: Option<FileAccessor>,
    pub(crate) stdout: Option<FileAccessor>,
    pub(crate) stderr: Option<FileAccessor>,
    pub(crate) log: Option<FileAccessor>,
    pub(crate) input_files: BTreeMap<String, FileAccessor>,
    pub(crate) output_files: BTreeMap<String, FileAccessor>,
}

impl RunResult {
    /// Exit code of the process.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Accessor for the file connected to stdin.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] if no file was
    /// connected to stdin.
    pub fn stdin(&self) -> Result<&FileAccessor> {
        Self::stream(self.stdin.as_ref(), "stdin", "no file was connected to stdin")
    }

    /// Accessor for the captured stdout.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] if stdout was not
    /// captured.
    pub fn stdout(&self) -> Result<&FileAccessor> {
        Self::stream(self.stdout.as_ref(), "stdout", "stdout was not captured")
    }

    /// Accessor for the captured stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] if stderr was not
    /// captured.
    pub fn stderr(&self) -> Result<&FileAccessor> {
        Self::stream(self.stderr.as_ref(), "stderr", "stderr was not captured")
    }

    /// Accessor for the captured job log.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] if the log was not
    /// captured.
    pub fn log(&self) -> Result<&FileAccessor> {
        Self::stream(self.log.as_ref(), "log", "log was not captured")
    }

    /// Accessor for the named input file.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] if no input file with
    /// this name was configured.
    pub fn input_file(&self, name: &str) -> Result<&FileAccessor> {
        self.input_files
            .get(name)
            .ok_or_else(|| SweepRunError::AccessorUnavailable {
                name: name.to_string(),
                reason: "no input file with this name".to_string(),
            })
    }

    /// Accessor for the named output file.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::AccessorUnavailable`] if no output file
    /// with this name was configured.
    pub fn output_file(&self, name: &str) -> Result<&FileAccessor> {
        self.output_files
            .get(name)
            .ok_or_else(|| SweepRunError::AccessorUnavailable {
                name: name.to_string(),
                reason: "no output file with this name".to_string(),
            })
    }

    fn stream<'a>(
        accessor: Option<&'a FileAccessor>,
        name: &str,
        reason: &str,
    ) -> Result<&'a FileAccessor> {
        accessor.ok_or_else(|| SweepRunError::AccessorUnavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    }
}
