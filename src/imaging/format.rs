//! Content-based format detection.
//!
//! The pipeline never trusts a file extension: a `.jpg` that is really a PNG
//! must go through the PNG codec, and a renamed `.webp` must be rejected
//! before any decoder sees it. Detection looks at the leading magic bytes
//! only.
//!
//! | Format | Signature |
//! |---|---|
//! | JPEG | `FF D8 FF` |
//! | PNG | `89 50 4E 47 0D 0A 1A 0A` |
//! | GIF | `GIF87a` or `GIF89a` |
//!
//! Extensions are still used in two places: filtering directory walks
//! ([`has_supported_extension`]) and making the unsupported-format error
//! message more helpful.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";

/// Longest signature we check, in bytes.
const SNIFF_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("unsupported image format: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three formats the engine can transcode.
///
/// Serialized as `"Jpeg"`, `"Png"`, `"Gif"`, which is what the UI boundary
/// expects in `ImageDescriptor.format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif];

    /// Canonical extension used when an output name has none.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            ImageFormat::Png => &["png"],
            ImageFormat::Gif => &["gif"],
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// Case-insensitive extension lookup. Only a hint; see [`detect`].
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
        };
        f.write_str(name)
    }
}

/// Classify image bytes by their signature.
pub fn detect(bytes: &[u8]) -> Result<ImageFormat, FormatError> {
    if bytes.is_empty() {
        return Err(FormatError::Unsupported("empty file".into()));
    }
    if bytes.starts_with(JPEG_MAGIC) {
        Ok(ImageFormat::Jpeg)
    } else if bytes.starts_with(PNG_MAGIC) {
        Ok(ImageFormat::Png)
    } else if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
        Ok(ImageFormat::Gif)
    } else {
        Err(FormatError::Unsupported(
            "unrecognized file signature".into(),
        ))
    }
}

/// Classify a file by reading only its first few bytes.
pub fn detect_path(path: &Path) -> Result<ImageFormat, FormatError> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    std::fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    detect(&head).map_err(|err| with_extension_hint(err, path))
}

/// Append the file's extension to an `Unsupported` message so users can
/// tell a renamed file from a genuinely unknown one.
pub fn with_extension_hint(err: FormatError, path: &Path) -> FormatError {
    match (err, path.extension().and_then(|e| e.to_str())) {
        (FormatError::Unsupported(reason), Some(ext)) => {
            FormatError::Unsupported(format!("{reason} (extension .{ext})"))
        }
        (err, _) => err,
    }
}

/// Whether the path carries one of the supported extensions.
///
/// Used to filter directory walks; individual files named explicitly by the
/// caller are always content-sniffed regardless of extension.
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFormat::from_extension)
        .is_some()
}
