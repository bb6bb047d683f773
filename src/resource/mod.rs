//! Resource descriptors: declarative specifications of managed files.
//!
//! An [`InputSpec`] or [`OutputSpec`] describes one file a process needs
//! (content source, optional pinned destination, lifecycle policy) without
//! committing to a concrete path. Resolving a descriptor against a
//! parameter set produces a plain [`ResolvedInput`] / [`ResolvedOutput`]
//! value with no remaining parameter dependency; the preparation protocol
//! in [`crate::prepare`] turns those into real files.

use std::path::PathBuf;

use crate::error::Result;
use crate::params::{ParamSet, Resolvable};

/// Default mode bits for created files, before the umask applies.
pub const DEFAULT_MODE: u32 = 0o666;

/// Names reserved for the standard streams and the job log.
pub const RESERVED_NAMES: [&str; 4] = ["stdin", "stdout", "stderr", "log"];

/// Content source for an input file.
#[derive(Debug, Clone)]
pub enum Source {
    /// Literal bytes written into the realized file.
    Bytes(Vec<u8>),
    /// Literal (possibly parameter-dependent) text.
    Text(Resolvable<String>),
    /// Reference to an existing file on disk.
    Path(Resolvable<PathBuf>),
}

impl Source {
    /// Literal byte content.
    #[must_use]
    pub fn bytes(content: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(content.into())
    }

    /// Literal text content.
    pub fn text(content: impl Into<Resolvable<String>>) -> Self {
        Self::Text(content.into())
    }

    /// Reference to an existing file.
    pub fn path(path: impl Into<Resolvable<PathBuf>>) -> Self {
        Self::Path(path.into())
    }

    fn resolve(&self, params: &ParamSet) -> Result<ResolvedSource> {
        match self {
            Self::Bytes(content) => Ok(ResolvedSource::Bytes(content.clone())),
            Self::Text(content) => Ok(ResolvedSource::Text(content.resolve(params)?)),
            Self::Path(path) => Ok(ResolvedSource::Path(path.resolve(params)?)),
        }
    }
}

/// A [`Source`] with all parameter references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    /// Literal bytes.
    Bytes(Vec<u8>),
    /// Literal text.
    Text(String),
    /// Existing on-disk file.
    Path(PathBuf),
}

/// Descriptor of one input file or the stdin stream.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub(crate) name: String,
    pub(crate) source: Source,
    pub(crate) path: Option<Resolvable<PathBuf>>,
    pub(crate) must_not_exist: bool,
    pub(crate) create_parents: bool,
    pub(crate) mode: u32,
    pub(crate) cleanup_after_finish: bool,
}

impl InputSpec {
    /// Descriptor of a named input file. The realized path is exposed to
    /// the process as the synthetic parameter `__file_<name>`.
    pub fn named(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            path: None,
            must_not_exist: true,
            create_parents: false,
            mode: DEFAULT_MODE,
            cleanup_after_finish: false,
        }
    }

    /// Descriptor of an anonymous stream input (stdin). The owning
    /// template stamps the stream name.
    #[must_use]
    pub fn stream(source: Source) -> Self {
        Self::named("", source)
    }

    /// Pins the realized file to `path` instead of a temporary location.
    #[must_use]
    pub fn pinned(mut self, path: impl Into<Resolvable<PathBuf>>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether a pre-existing file at the pinned path is a hard failure
    /// (the default) or is accepted with its permission bits reset.
    #[must_use]
    pub const fn must_not_exist(mut self, value: bool) -> Self {
        self.must_not_exist = value;
        self
    }

    /// Create missing parent directories of the pinned path.
    #[must_use]
    pub const fn create_parents(mut self, value: bool) -> Self {
        self.create_parents = value;
        self
    }

    /// Mode bits applied to the realized file (masked by the umask).
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Delete the realized file when the unit of work finishes.
    #[must_use]
    pub const fn cleanup_after_finish(mut self, value: bool) -> Self {
        self.cleanup_after_finish = value;
        self
    }

    /// Logical name of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves all parameter references in this descriptor.
    ///
    /// # Errors
    ///
    /// Propagates resolution failures from the source or the pinned path.
    pub fn resolve(&self, params: &ParamSet) -> Result<ResolvedInput> {
        Ok(ResolvedInput {
            name: self.name.clone(),
            source: self.source.resolve(params)?,
            path: self
                .path
                .as_ref()
                .map(|path| path.resolve(params))
                .transpose()?,
            must_not_exist: self.must_not_exist,
            create_parents: self.create_parents,
            mode: self.mode,
            cleanup_after_finish: self.cleanup_after_finish,
        })
    }
}

/// Descriptor of one output file, a captured stream, or the job log.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub(crate) name: String,
    pub(crate) path: Option<Resolvable<PathBuf>>,
    pub(crate) must_not_exist: bool,
    pub(crate) create: bool,
    pub(crate) create_parents: bool,
    pub(crate) mode: u32,
    pub(crate) cleanup_after_finish: bool,
}

impl OutputSpec {
    /// Descriptor of a named output file. The realized path is exposed to
    /// the process as the synthetic parameter `__file_<name>`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            must_not_exist: true,
            create: true,
            create_parents: false,
            mode: DEFAULT_MODE,
            cleanup_after_finish: false,
        }
    }

    /// Descriptor of an anonymous stream capture (stdout, stderr, log).
    /// The owning template stamps the stream name.
    #[must_use]
    pub fn capture() -> Self {
        Self::named("")
    }

    /// Pins the realized file to `path` instead of a temporary location.
    #[must_use]
    pub fn pinned(mut self, path: impl Into<Resolvable<PathBuf>>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether a pre-existing file at the pinned path is a hard failure
    /// (the default) or is accepted.
    #[must_use]
    pub const fn must_not_exist(mut self, value: bool) -> Self {
        self.must_not_exist = value;
        self
    }

    /// Whether the file must exist before the process starts (the
    /// default). With `false`, any file at the realized path is removed so
    /// the process starts with it absent.
    #[must_use]
    pub const fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    /// Create missing parent directories of the pinned path.
    #[must_use]
    pub const fn create_parents(mut self, value: bool) -> Self {
        self.create_parents = value;
        self
    }

    /// Mode bits applied to the realized file (masked by the umask).
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Delete the realized file when the unit of work finishes.
    #[must_use]
    pub const fn cleanup_after_finish(mut self, value: bool) -> Self {
        self.cleanup_after_finish = value;
        self
    }

    /// Logical name of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves all parameter references in this descriptor.
    ///
    /// # Errors
    ///
    /// Propagates resolution failures from the pinned path.
    pub fn resolve(&self, params: &ParamSet) -> Result<ResolvedOutput> {
        Ok(ResolvedOutput {
            name: self.name.clone(),
            path: self
                .path
                .as_ref()
                .map(|path| path.resolve(params))
                .transpose()?,
            must_not_exist: self.must_not_exist,
            create: self.create,
            create_parents: self.create_parents,
            mode: self.mode,
            cleanup_after_finish: self.cleanup_after_finish,
        })
    }
}

/// An [`InputSpec`] evaluated against a concrete parameter set.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// Logical name.
    pub name: String,
    /// Resolved content source.
    pub source: ResolvedSource,
    /// Resolved pinned destination, if any.
    pub path: Option<PathBuf>,
    /// Reject a pre-existing file at the pinned path.
    pub must_not_exist: bool,
    /// Create missing parent directories of the pinned path.
    pub create_parents: bool,
    /// Mode bits.
    pub mode: u32,
    /// Delete the realized file at finish.
    pub cleanup_after_finish: bool,
}

/// An [`OutputSpec`] evaluated against a concrete parameter set.
#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    /// Logical name.
    pub name: String,
    /// Resolved pinned destination, if any.
    pub path: Option<PathBuf>,
    /// Reject a pre-existing file at the pinned path.
    pub must_not_exist: bool,
    /// Ensure the file exists before the process starts; with `false` the
    /// realized path is removed instead.
    pub create: bool,
    /// Create missing parent directories of the pinned path.
    pub create_parents: bool,
    /// Mode bits.
    pub mode: u32,
    /// Delete the realized file at finish.
    pub cleanup_after_finish: bool,
}
