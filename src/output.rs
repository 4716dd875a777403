//! CLI output formatting for loading and compression.
//!
//! # Display
//!
//! Every image is identified by its file name first, with paths and ids as
//! indented context lines. Sizes are human-readable; ratios are phrased as
//! "smaller"/"larger" instead of signed percentages.
//!
//! ## Load
//!
//! ```text
//! Loaded 2 images
//! 001 dawn.jpg (JPEG, 1.2 MB)
//!     Source: /photos/dawn.jpg
//!     Id: 6f1c…
//! 002 logo.png (PNG, 14.0 KB)
//!     Source: /photos/logo.png
//!     Id: 0b7e…
//! ```
//!
//! ## Compress
//!
//! Progress lines arrive in completion order:
//!
//! ```text
//! dawn.jpg: compressing
//! logo.png: compressing
//! logo.png: 14.0 KB → 9.1 KB (35% smaller)
//!     Output: /out/logo.png
//! dawn.jpg: failed: decode failed: …
//!
//! Compressed 1 of 2 images (1 failed)
//! Saved 4.9 KB (14.0 KB → 9.1 KB, 35% smaller)
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure —
//! no I/O, no side effects.

use crate::events::{EventKind, LifecycleEvent};
use crate::imaging::compression_ratio;
use crate::types::{CompressionResult, ImageDescriptor};
use std::collections::HashMap;

// ============================================================================
// Shared helpers
// ============================================================================

/// Human-readable size with binary units: `512 B`, `14.0 KB`, `1.2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}

/// Phrase a signed ratio: `-40` → `40% smaller`, `12` → `12% larger`.
pub fn format_ratio(ratio: i32) -> String {
    match ratio {
        0 => "no change".to_string(),
        r if r < 0 => format!("{}% smaller", r.unsigned_abs()),
        r => format!("{r}% larger"),
    }
}

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "image" } else { "images" }
}

// ============================================================================
// Load output
// ============================================================================

/// Format loaded descriptors as an inventory.
pub fn format_load_output(images: &[ImageDescriptor]) -> Vec<String> {
    let mut lines = vec![format!("Loaded {} {}", images.len(), plural(images.len()))];
    for (i, image) in images.iter().enumerate() {
        lines.push(format!(
            "{} {} ({}, {})",
            format_index(i + 1),
            image.name,
            image.format,
            image.size_display
        ));
        lines.push(format!("    Source: {}", image.path.display()));
        lines.push(format!("    Id: {}", image.id));
    }
    lines
}

pub fn print_load_output(images: &[ImageDescriptor]) {
    for line in format_load_output(images) {
        println!("{}", line);
    }
}

// ============================================================================
// Compress output
// ============================================================================

/// Id → display name lookup for progress lines.
pub fn label_map(images: &[ImageDescriptor]) -> HashMap<String, String> {
    images
        .iter()
        .map(|image| (image.id.clone(), image.name.clone()))
        .collect()
}

/// Format one lifecycle event. `label` is the image's display name; the id
/// is used when the caller has none.
pub fn format_event(event: &LifecycleEvent, label: Option<&str>) -> Vec<String> {
    let name = label.unwrap_or(&event.id);
    match (event.kind, &event.result) {
        (EventKind::Start, _) => vec![format!("{name}: compressing")],
        (EventKind::Complete, Some(result)) => vec![
            format!(
                "{name}: {} \u{2192} {} ({})",
                format_file_size(result.original_size),
                format_file_size(result.compressed_size),
                format_ratio(result.ratio)
            ),
            format!("    Output: {}", result.output_path),
        ],
        (EventKind::Error, Some(result)) => vec![format!(
            "{name}: failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        )],
        (_, None) => vec![format!("{name}: finished")],
    }
}

/// Format one lifecycle event as a single JSON line.
pub fn format_event_json(event: &LifecycleEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Totals over a finished batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Original bytes of successful items only.
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[CompressionResult]) -> Self {
        results.iter().fold(
            Self {
                total: results.len(),
                ..Self::default()
            },
            |mut summary, r| {
                if r.success {
                    summary.succeeded += 1;
                    summary.original_bytes += r.original_size;
                    summary.compressed_bytes += r.compressed_size;
                } else {
                    summary.failed += 1;
                }
                summary
            },
        )
    }

    /// Ratio over all successful items, same convention as per-item ratios.
    pub fn ratio(&self) -> i32 {
        compression_ratio(self.original_bytes, self.compressed_bytes)
    }

    pub fn saved_bytes(&self) -> u64 {
        self.original_bytes.saturating_sub(self.compressed_bytes)
    }
}

pub fn format_batch_summary(summary: &BatchSummary) -> Vec<String> {
    if summary.total == 0 {
        return vec!["No images to compress".to_string()];
    }
    let mut head = format!(
        "Compressed {} of {} {}",
        summary.succeeded,
        summary.total,
        plural(summary.total)
    );
    if summary.failed > 0 {
        head.push_str(&format!(" ({} failed)", summary.failed));
    }
    let mut lines = vec![head];
    if summary.succeeded > 0 {
        lines.push(format!(
            "Saved {} ({} \u{2192} {}, {})",
            format_file_size(summary.saved_bytes()),
            format_file_size(summary.original_bytes),
            format_file_size(summary.compressed_bytes),
            format_ratio(summary.ratio())
        ));
    }
    lines
}

pub fn print_batch_summary(results: &[CompressionResult]) {
    for line in format_batch_summary(&BatchSummary::from_results(results)) {
        println!("{}", line);
    }
}
