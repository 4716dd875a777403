//! The engine's boundary operations.
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`load_images`] | Expand paths, describe every supported image |
//! | [`load_image`] | Describe one file, returning the error |
//! | [`compress_images`] | Run one batch with a default-sized pool |
//! | [`get_default_output_dir`] | `<Pictures>/PicSlim` |
//! | [`get_image_preview`] | 800px JPEG preview as a data URI |
//! | [`open_output_folder`] | Open a directory in the OS file browser |
//!
//! Loading is best-effort: files that cannot be read or are not JPEG, PNG or
//! GIF are skipped with a warning. A file that is recognised but cannot be
//! decoded is still loaded (without a thumbnail); compressing it later
//! fails for that item only.

use crate::config::ProcessingConfig;
use crate::events::EventSink;
use crate::imaging::format::with_extension_hint;
use crate::imaging::{
    FormatError, PREVIEW_EDGE, THUMBNAIL_EDGE, ThumbnailError, detect, has_supported_extension,
    thumbnail_data_uri,
};
use crate::output::format_file_size;
use crate::process::{BatchError, Runner};
use crate::types::{CompressionResult, CompressionSettings, ImageDescriptor};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Folder name created under the user's pictures directory.
const OUTPUT_FOLDER: &str = "PicSlim";
/// Relative fallback when no home directory is known.
const FALLBACK_OUTPUT_DIR: &str = "PicSlim_Output";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("cannot render preview: {0}")]
    Thumbnail(#[from] ThumbnailError),
    #[error("folder not found: {0}")]
    FolderNotFound(PathBuf),
    #[error("cannot open folder: {0}")]
    Open(#[source] std::io::Error),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Describe every supported image under `paths`.
///
/// Directories are walked recursively and filtered by extension, in sorted
/// order. Plain file paths are taken as given and identified by content.
/// The result keeps input order; skipped files are logged at `warn`.
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> Vec<ImageDescriptor> {
    let files: Vec<PathBuf> = paths
        .iter()
        .flat_map(|p| expand_path(p.as_ref()))
        .collect();

    files
        .par_iter()
        .filter_map(|path| match load_image(path) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                None
            }
        })
        .collect()
}

/// Files a path stands for: itself, or the supported images inside it.
fn expand_path(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| has_supported_extension(p))
        .collect()
}

/// Describe one file.
///
/// Fails if the path is not a readable file or its content is not JPEG, PNG
/// or GIF. A thumbnail that cannot be rendered leaves `thumbnail` empty.
pub fn load_image(path: &Path) -> Result<ImageDescriptor, EngineError> {
    let io_err = |source: std::io::Error| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(io_err)?;
    if !metadata.is_file() {
        return Err(EngineError::NotAFile(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(io_err)?;
    let format = detect(&bytes).map_err(|e| with_extension_hint(e, path))?;

    let thumbnail = match thumbnail_data_uri(&bytes, THUMBNAIL_EDGE) {
        Ok(uri) => Some(uri),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no thumbnail");
            None
        }
    };

    let size = bytes.len() as u64;
    Ok(ImageDescriptor {
        id: uuid::Uuid::new_v4().to_string(),
        path: path.to_path_buf(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size,
        size_display: format_file_size(size),
        format,
        thumbnail,
    })
}

/// Compress a batch on a pool sized from the default processing config.
///
/// Descriptor ids must be unique. Repeating one breaks the caller's side of
/// the contract but is not rejected: each descriptor is still processed
/// independently and gets its own result, in submission order.
///
/// For repeated batches or a specific worker count, build a
/// [`Runner`] once and call [`Runner::run`].
pub fn compress_images(
    images: &[ImageDescriptor],
    settings: &CompressionSettings,
    sink: &dyn EventSink,
) -> Result<Vec<CompressionResult>, BatchError> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    Runner::from_config(&ProcessingConfig::default())?.run(images, settings, sink)
}

/// `<Pictures>/PicSlim`, then `<home>/Pictures/PicSlim`, then
/// `PicSlim_Output` relative to the working directory.
///
/// Nothing is created.
pub fn get_default_output_dir() -> PathBuf {
    if let Some(pictures) = dirs::picture_dir() {
        return pictures.join(OUTPUT_FOLDER);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join("Pictures").join(OUTPUT_FOLDER);
    }
    PathBuf::from(FALLBACK_OUTPUT_DIR)
}

/// An 800px (longest edge) JPEG preview as a data URI.
pub fn get_image_preview(path: &Path) -> Result<String, EngineError> {
    let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(thumbnail_data_uri(&bytes, PREVIEW_EDGE)?)
}

/// Open `path` with the platform's file browser.
pub fn open_output_folder(path: &Path) -> Result<(), EngineError> {
    if !path.is_dir() {
        return Err(EngineError::FolderNotFound(path.to_path_buf()));
    }
    open::that(path).map_err(EngineError::Open)
}
