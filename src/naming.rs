//! Output file naming.
//!
//! Output files keep the source file name wherever possible. This module
//! holds the pure string side of that: reducing a caller-supplied name to a
//! bare, safe file name, making its extension agree with the encoded
//! content, and producing the numbered candidates used when the name is
//! already taken.
//!
//! ## Collision Suffixes
//!
//! Candidates are tried in a fixed order, so the same set of inputs always
//! produces the same set of names:
//! - `photo.png` → `photo.png`, `photo-1.png`, `photo-2.png`, …
//! - `photo.jpg` (PNG content) → `photo.png`, `photo-1.png`, …
//! - `holiday.2024` (PNG content) → `holiday.2024.png`, `holiday.2024-1.png`, …
//! - `README` (no extension, PNG content) → `README.png`, `README-1.png`, …

use crate::imaging::ImageFormat;

/// Name used when sanitizing leaves nothing behind.
const FALLBACK_STEM: &str = "image";

/// Characters that are invalid in file names on at least one major platform.
const RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// A file name split at its last dot.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFileName {
    pub stem: String,
    /// Extension without the dot; `None` if the name has none.
    pub extension: Option<String>,
}

/// Reduce an arbitrary name to a single path component.
///
/// Directory parts (either separator) are dropped, reserved and control
/// characters removed, and surrounding dots/whitespace trimmed, so the
/// result can never point outside the directory it is joined onto.
///
/// - `"../../etc/passwd"` → `"passwd"`
/// - `"C:\\Users\\me\\cat.jpg"` → `"cat.jpg"`
/// - `"what?.png"` → `"what.png"`
/// - `".."` → `"image"`
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && !RESERVED.contains(c))
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Split a bare file name at its last dot.
///
/// A leading dot does not start an extension (`.hidden` has none).
pub fn split_name(name: &str) -> ParsedFileName {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ParsedFileName {
            stem: stem.to_string(),
            extension: Some(ext.to_string()),
        },
        _ => ParsedFileName {
            stem: name.to_string(),
            extension: None,
        },
    }
}

/// The sanitized output name for `desired`, with an extension that matches
/// `format`.
///
/// Any spelling of the format's own extension is kept (`shot.JPEG`). An
/// extension belonging to another image format is replaced (`photo.jpg`
/// holding PNG data becomes `photo.png`); any other extension stays part of
/// the stem and the format's extension is appended.
pub fn output_name(desired: &str, format: ImageFormat) -> ParsedFileName {
    let parsed = split_name(&sanitize_file_name(desired));
    match parsed.extension {
        Some(ext) if ImageFormat::from_extension(&ext) == Some(format) => ParsedFileName {
            stem: parsed.stem,
            extension: Some(ext),
        },
        Some(ext) if ImageFormat::from_extension(&ext).is_some() => ParsedFileName {
            stem: parsed.stem,
            extension: Some(format.extension().to_string()),
        },
        Some(ext) => ParsedFileName {
            stem: format!("{}.{ext}", parsed.stem),
            extension: Some(format.extension().to_string()),
        },
        None => ParsedFileName {
            stem: parsed.stem,
            extension: Some(format.extension().to_string()),
        },
    }
}

/// The `n`th candidate name: `n = 0` is the name itself, later candidates
/// carry a `-n` suffix before the extension.
pub fn candidate_name(name: &ParsedFileName, n: u32) -> String {
    let stem = if n == 0 {
        name.stem.clone()
    } else {
        format!("{}-{n}", name.stem)
    };
    match &name.extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
