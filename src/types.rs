//! Types shared across the load, compress and output stages.
//!
//! These are the records that cross the UI boundary, so their serialized
//! field names are part of the contract: `snake_case`, matching what the
//! front end reads and writes.

use crate::imaging::{ImageFormat, Quality};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A source file the user has added, as produced by
/// [`load_images`](crate::engine::load_images).
///
/// Immutable once created: the engine reads it, never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Opaque id, unique within a batch. Generated as UUID v4.
    pub id: String,
    pub path: PathBuf,
    /// File name, used as the desired output name.
    pub name: String,
    /// Size in bytes when loaded.
    pub size: u64,
    /// Human-readable size, e.g. `1.2 MB`.
    pub size_display: String,
    /// Content-detected format.
    pub format: ImageFormat,
    /// `data:image/jpeg;base64,...` preview, absent when it could not be made.
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// What to do when the re-encoded file is not smaller than the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Write the encoded bytes and report the true (possibly positive) ratio.
    #[default]
    WriteEncoded,
    /// Write the original bytes instead and report zero change.
    KeepOriginal,
}

/// Parameters for one batch. Fixed for the duration of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Target quality, 0-100.
    pub quality: u32,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub oversize_policy: OversizePolicy,
}

impl CompressionSettings {
    pub fn new(quality: u32, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            quality,
            output_dir: output_dir.into(),
            oversize_policy: OversizePolicy::default(),
        }
    }

    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize_policy = policy;
        self
    }

    /// The quality as a [`Quality`], rejecting values above 100.
    pub fn validated_quality(&self) -> Result<Quality, String> {
        if self.quality > 100 {
            return Err(format!("quality must be 0-100, got {}", self.quality));
        }
        Ok(Quality::new(self.quality))
    }
}

/// Outcome for one descriptor. Exactly one per submitted descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionResult {
    pub id: String,
    pub success: bool,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percentage change, rounded. Negative means smaller.
    pub ratio: i32,
    /// Where the output was written; empty on failure.
    pub output_path: String,
    pub error: Option<String>,
}

impl CompressionResult {
    pub fn success(
        id: impl Into<String>,
        original_size: u64,
        compressed_size: u64,
        output_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            success: true,
            original_size,
            compressed_size,
            ratio: crate::imaging::compression_ratio(original_size, compressed_size),
            output_path: output_path.into(),
            error: None,
        }
    }

    /// A failed item reports no savings and no output.
    pub fn failure(id: impl Into<String>, original_size: u64, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            original_size,
            compressed_size: original_size,
            ratio: 0,
            output_path: String::new(),
            error: Some(error.into()),
        }
    }

    /// Bytes saved; zero when the output grew or the item failed.
    pub fn saved_bytes(&self) -> u64 {
        if self.success {
            self.original_size.saturating_sub(self.compressed_size)
        } else {
            0
        }
    }
}
