//! Parameter types for codec operations.
//!
//! These describe *what* an encoder should aim for, derived from the single
//! user-facing quality number. Codecs turn them into library calls; keeping
//! the mapping here makes the tiers testable without touching pixels.
//!
//! ## Types
//!
//! - [`Quality`]: target quality (0-100, default 90). Clamped on construction.
//! - [`PngStrategy`]: lossless re-compression or palette quantization with a
//!   tier-driven palette size and dithering level.
//! - [`GifParams`]: per-frame dithering and lossy pixel-alignment tolerance.

use serde::{Deserialize, Serialize};

/// Target quality for encoding (0-100).
///
/// 100 is the lossless tier for PNG. JPEG maps 0 to 1 since the encoder has
/// no quality-zero setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u8);

impl Quality {
    pub const LOSSLESS: Quality = Quality(100);

    pub fn new(value: u32) -> Self {
        Self(value.min(100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_lossless(self) -> bool {
        self == Self::LOSSLESS
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// How far below the target the PNG quantizer may land before giving up.
pub const PNG_QUALITY_SLACK: u8 = 40;

/// PNG encoding strategy for a given quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PngStrategy {
    /// Keep every pixel; only re-compress.
    Lossless,
    /// Reduce to a palette, then re-compress.
    Quantize {
        min_quality: u8,
        target_quality: u8,
        max_colors: u32,
        dithering: f32,
    },
}

impl PngStrategy {
    pub fn for_quality(quality: Quality) -> Self {
        let q = quality.value();
        if quality.is_lossless() {
            return PngStrategy::Lossless;
        }
        let (max_colors, dithering) = match q {
            90.. => (256, 1.0),
            75..=89 => (256, 0.75),
            60..=74 => (128, 0.5),
            _ => (64, 0.25),
        };
        PngStrategy::Quantize {
            min_quality: q.saturating_sub(PNG_QUALITY_SLACK),
            target_quality: q,
            max_colors,
            dithering,
        }
    }
}

/// GIF frame parameters for a given quality.
///
/// `lossy_tolerance` merges horizontally adjacent opaque pixels whose channels
/// all differ by at most this much, which lengthens LZW runs. Zero disables
/// it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GifParams {
    pub quality: u8,
    pub dithering: f32,
    pub lossy_tolerance: u8,
}

impl GifParams {
    /// One palette slot stays free for transparency.
    pub const MAX_COLORS: u32 = 255;

    pub fn for_quality(quality: Quality) -> Self {
        let q = quality.value();
        let (dithering, lossy_tolerance) = match q {
            90.. => (0.65, 0),
            75..=89 => (0.45, 2),
            _ => (0.25, 4),
        };
        Self {
            quality: q,
            dithering,
            lossy_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 0);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn only_100_is_lossless() {
        assert!(Quality::new(100).is_lossless());
        assert!(!Quality::new(99).is_lossless());
    }

    #[test]
    fn png_lossless_tier() {
        assert_eq!(PngStrategy::for_quality(Quality::LOSSLESS), PngStrategy::Lossless);
    }

    #[test]
    fn png_tiers_shrink_palette_and_dithering() {
        let tier = |q| match PngStrategy::for_quality(Quality::new(q)) {
            PngStrategy::Quantize {
                max_colors,
                dithering,
                ..
            } => (max_colors, dithering),
            PngStrategy::Lossless => panic!("unexpected lossless tier for {q}"),
        };
        assert_eq!(tier(95), (256, 1.0));
        assert_eq!(tier(90), (256, 1.0));
        assert_eq!(tier(80), (256, 0.75));
        assert_eq!(tier(60), (128, 0.5));
        assert_eq!(tier(30), (64, 0.25));
    }

    #[test]
    fn png_min_quality_saturates() {
        match PngStrategy::for_quality(Quality::new(20)) {
            PngStrategy::Quantize {
                min_quality,
                target_quality,
                ..
            } => {
                assert_eq!(min_quality, 0);
                assert_eq!(target_quality, 20);
            }
            PngStrategy::Lossless => panic!("20 is not lossless"),
        }
        match PngStrategy::for_quality(Quality::new(85)) {
            PngStrategy::Quantize { min_quality, .. } => assert_eq!(min_quality, 45),
            PngStrategy::Lossless => panic!("85 is not lossless"),
        }
    }

    #[test]
    fn gif_tiers() {
        let high = GifParams::for_quality(Quality::new(95));
        assert_eq!((high.dithering, high.lossy_tolerance), (0.65, 0));
        let mid = GifParams::for_quality(Quality::new(80));
        assert_eq!((mid.dithering, mid.lossy_tolerance), (0.45, 2));
        let low = GifParams::for_quality(Quality::new(60));
        assert_eq!((low.dithering, low.lossy_tolerance), (0.25, 4));
    }

    #[test]
    fn quality_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&Quality::new(75)).unwrap(), "75");
    }
}
