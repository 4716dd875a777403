//! Writing compressed bytes into the output directory.
//!
//! Every write lands in a temporary file inside the output root first and is
//! then linked into place with no-clobber semantics. That gives two
//! guarantees at once:
//!
//! - a failed or interrupted item never leaves a partial file under its
//!   final name, and
//! - two workers that both want `photo.png` cannot overwrite each other: the
//!   loser sees `AlreadyExists` and moves on to `photo-1.png`.
//!
//! Existing files in the output directory are never replaced.

use crate::imaging::ImageFormat;
use crate::naming::{candidate_name, output_name};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, PersistError};
use thiserror::Error;

/// Upper bound on numbered candidates tried for one name.
const MAX_CANDIDATES: u32 = 10_000;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("output path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("output directory is not writable: {path}: {source}")]
    NotWritable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no free file name for {0} in the output directory")]
    Exhausted(String),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A file that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Writes into one validated, canonical output root.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    /// Create the directory if needed and check that files can be created in
    /// it.
    pub fn prepare(dir: &Path) -> Result<Self, WriteError> {
        std::fs::create_dir_all(dir).map_err(|source| WriteError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let metadata = std::fs::metadata(dir).map_err(|source| WriteError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(WriteError::NotADirectory(dir.to_path_buf()));
        }
        NamedTempFile::new_in(dir).map_err(|source| WriteError::NotWritable {
            path: dir.to_path_buf(),
            source,
        })?;
        let root = dir.canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a name derived from `desired_name`.
    ///
    /// The name is reduced to a bare file name, given an extension matching
    /// `format` (see [`output_name`]), and suffixed `-1`, `-2`, … until it
    /// does not collide.
    pub fn write(
        &self,
        bytes: &[u8],
        desired_name: &str,
        format: ImageFormat,
    ) -> Result<WrittenFile, WriteError> {
        let name = output_name(desired_name, format);

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        set_output_permissions(tmp.path())?;

        for n in 0..MAX_CANDIDATES {
            let candidate = self.root.join(candidate_name(&name, n));
            match tmp.persist_noclobber(&candidate) {
                Ok(_) => {
                    return Ok(WrittenFile {
                        path: candidate,
                        size: bytes.len() as u64,
                    });
                }
                Err(PersistError { error, file })
                    if error.kind() == std::io::ErrorKind::AlreadyExists =>
                {
                    tmp = file;
                }
                Err(PersistError { error, .. }) => return Err(WriteError::Io(error)),
            }
        }
        Err(WriteError::Exhausted(candidate_name(&name, 0)))
    }
}

/// Temp files are created private; outputs should be ordinary files.
#[cfg(unix)]
fn set_output_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_output_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
