//! The file preparation protocol.
//!
//! Pure functions turning a resolved resource descriptor into a concrete
//! file on disk before execution, and finalizing it afterwards. Both the
//! local and the batch backend drive these against their respective
//! staging directories.
//!
//! Every filesystem object created here with `cleanup = true` registers
//! exactly one deletion handler with the invocation's cleanup registry, so
//! nothing leaks even when setup fails halfway through.

use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, symlink};
use std::path::{Path, PathBuf};

use nix::sys::stat::{Mode, umask};
use uuid::Uuid;

use crate::cleanup::HandlerList;
use crate::error::{Result, SweepRunError};
use crate::resource::{ResolvedInput, ResolvedOutput, ResolvedSource};
use crate::result::FileAccessor;

/// A realized file, produced by the preparation protocol immediately
/// before use.
///
/// `open_path` is what the executor opens for I/O; `process_path` is what
/// the spawned process sees (under the batch transfer strategy only a
/// basename travels, so the two may differ).
#[derive(Debug, Clone)]
pub struct PreparedFile {
    /// Logical name.
    pub name: String,
    /// Path the executor opens for reading or writing.
    pub open_path: PathBuf,
    /// Path string exposed to the spawned process.
    pub process_path: PathBuf,
    /// Whether a throwaway path was invented for this file.
    pub temporary: bool,
    /// Whether a deletion handler was registered for this file.
    pub cleanup: bool,
    /// Persistent path exposed through the result, if any.
    pub path: Option<PathBuf>,
}

impl PreparedFile {
    /// Read accessor for this file, handed out through the result.
    #[must_use]
    pub fn accessor(&self) -> FileAccessor {
        FileAccessor::new(&self.name, self.open_path.clone(), self.path.clone())
    }

    /// Same file with a different process-visible path.
    #[must_use]
    pub fn with_process_path(mut self, process_path: PathBuf) -> Self {
        self.process_path = process_path;
        self
    }
}

/// Realizes an input descriptor into a readable file.
///
/// When the source is an existing on-disk file and no destination is
/// pinned, no copy is made: the returned descriptor points straight at the
/// source. This path must stay copy-free; it is what makes replaying large
/// existing artifacts cheap.
///
/// # Errors
///
/// Returns [`SweepRunError::ResourceConflict`] when the pinned destination
/// resolves to the same underlying file as the source, or when it already
/// exists and `must_not_exist` is set. I/O failures propagate as
/// [`SweepRunError::Io`].
pub fn prepare_input(
    spec: &ResolvedInput,
    cleanup_handlers: &mut HandlerList,
    temp_dir: &Path,
) -> Result<PreparedFile> {
    if let (ResolvedSource::Path(source), Some(dest)) = (&spec.source, &spec.path)
        && is_same_file(dest, source)
    {
        return Err(SweepRunError::ResourceConflict {
            name: spec.name.clone(),
            path: dest.clone(),
            reason: "input file would be sourced from its own path (circular dependency)"
                .to_string(),
        });
    }

    let mut write_content = true;

    let descriptor = if let Some(path) = &spec.path {
        if spec.create_parents
            && let Some(parent) = path.parent()
        {
            fs::create_dir_all(parent)?;
        }

        match exclusive_create(path, spec.mode) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if spec.must_not_exist {
                    return Err(SweepRunError::ResourceConflict {
                        name: spec.name.clone(),
                        path: path.clone(),
                        reason: "input file already exists".to_string(),
                    });
                }
                apply_mode(path, spec.mode)?;
            }
            Err(e) => return Err(e.into()),
        }

        PreparedFile {
            name: spec.name.clone(),
            open_path: path.clone(),
            process_path: path.clone(),
            temporary: false,
            cleanup: spec.cleanup_after_finish,
            path: Some(path.clone()),
        }
    } else if let ResolvedSource::Path(source) = &spec.source {
        write_content = false;
        PreparedFile {
            name: spec.name.clone(),
            open_path: source.clone(),
            process_path: source.clone(),
            temporary: false,
            cleanup: false,
            path: None,
        }
    } else {
        let temp_path = make_temp_file(temp_dir)?;
        PreparedFile {
            name: spec.name.clone(),
            open_path: temp_path.clone(),
            process_path: temp_path,
            temporary: true,
            cleanup: true,
            path: None,
        }
    };

    if write_content {
        write_source(&spec.source, &descriptor.open_path)?;
    }

    if descriptor.cleanup {
        cleanup_handlers.push_remove_file(descriptor.open_path.clone());
    }

    Ok(descriptor)
}

/// Realizes an output descriptor.
///
/// For a pinned path, a deferred permission fix-up is registered with
/// `exit_handlers`; it doubles as the missing-output check, raising
/// [`SweepRunError::ProcessFailed`] at scope exit when the process never
/// produced the file. With `create = false` the realized path is deleted
/// again so the process starts with it absent.
///
/// # Errors
///
/// Returns [`SweepRunError::ResourceConflict`] when the pinned path
/// already exists and `must_not_exist` is set; I/O failures propagate as
/// [`SweepRunError::Io`].
pub fn prepare_output(
    spec: &ResolvedOutput,
    exit_handlers: &mut HandlerList,
    cleanup_handlers: &mut HandlerList,
    temp_dir: &Path,
) -> Result<PreparedFile> {
    let descriptor = if let Some(path) = &spec.path {
        if spec.create_parents
            && let Some(parent) = path.parent()
        {
            fs::create_dir_all(parent)?;
        }

        match exclusive_create(path, spec.mode) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if spec.must_not_exist {
                    return Err(SweepRunError::ResourceConflict {
                        name: spec.name.clone(),
                        path: path.clone(),
                        reason: "output file already exists".to_string(),
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }

        let fixup_path = path.clone();
        let fixup_name = spec.name.clone();
        let mode = spec.mode;
        exit_handlers.push(move || match apply_mode(&fixup_path, mode) {
            Err(SweepRunError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(SweepRunError::ProcessFailed {
                    reason: format!("output file {fixup_name} was not created by process"),
                    exit_code: None,
                    signal: None,
                })
            }
            other => other,
        });

        PreparedFile {
            name: spec.name.clone(),
            open_path: path.clone(),
            process_path: path.clone(),
            temporary: false,
            cleanup: spec.cleanup_after_finish,
            path: Some(path.clone()),
        }
    } else {
        let temp_path = make_temp_file(temp_dir)?;
        PreparedFile {
            name: spec.name.clone(),
            open_path: temp_path.clone(),
            process_path: temp_path,
            temporary: true,
            cleanup: true,
            path: None,
        }
    };

    if !spec.create {
        match fs::remove_file(&descriptor.open_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    if descriptor.cleanup {
        cleanup_handlers.push_remove_file(descriptor.open_path.clone());
    }

    Ok(descriptor)
}

/// Allocates a private temporary file and keeps it on disk.
///
/// The temp-file facility itself guarantees a unique name.
///
/// # Errors
///
/// Propagates the underlying I/O error.
pub fn make_temp_file(dir: &Path) -> Result<PathBuf> {
    let file = tempfile::NamedTempFile::new_in(dir)?;
    let path = file
        .into_temp_path()
        .keep()
        .map_err(|e| SweepRunError::Io(e.error))?;
    Ok(path)
}

/// Creates a symlink to `target` under a unique name in `dir`.
///
/// The symlink syscall atomically creates or fails, so this is safe under
/// concurrency; a fresh random name is tried on collision.
///
/// # Errors
///
/// Propagates the underlying I/O error, or reports exhaustion when no
/// usable name is found.
pub fn make_temp_link(target: &Path, dir: &Path) -> Result<PathBuf> {
    const ATTEMPTS: usize = 16;

    for _ in 0..ATTEMPTS {
        let link = dir.join(format!("lnk-{}", Uuid::new_v4().simple()));
        match symlink(target, &link) {
            Ok(()) => return Ok(std::path::absolute(&link)?),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        "no usable temporary link name found",
    )
    .into())
}

fn write_source(source: &ResolvedSource, dest: &Path) -> Result<()> {
    match source {
        ResolvedSource::Bytes(content) => fs::write(dest, content)?,
        ResolvedSource::Text(content) => fs::write(dest, content)?,
        ResolvedSource::Path(source_path) => {
            // io::copy instead of fs::copy: the destination keeps the mode
            // the descriptor asked for, not the source file's.
            let mut src = fs::File::open(source_path)?;
            let mut dst = fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(dest)?;
            io::copy(&mut src, &mut dst)?;
        }
    }
    Ok(())
}

fn exclusive_create(path: &Path, mode: u32) -> io::Result<()> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
        .map(|_| ())
}

fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let effective = mode & !current_umask();
    fs::set_permissions(path, fs::Permissions::from_mode(effective))?;
    Ok(())
}

fn current_umask() -> u32 {
    let current = umask(Mode::from_bits_truncate(0o022));
    umask(current);
    u32::from(current.bits())
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(meta_a), Ok(meta_b)) => {
            meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino()
        }
        _ => false,
    }
}
