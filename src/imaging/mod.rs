//! Image processing: detection, codecs, thumbnails.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Detect** | magic bytes ([`detect`]) |
//! | **JPEG** | `image` decode + orientation, `mozjpeg` progressive encode |
//! | **PNG** | `image` decode, `imagequant` palette + `oxipng` re-compression |
//! | **GIF** | `gif` full-canvas decode, delta frames, LZW pre-encode |
//! | **Thumbnail** | codec decode + `resize_exact` + baseline JPEG |
//!
//! The module is split into:
//! - **Format**: content sniffing, never trusting extensions
//! - **Calculations**: pure functions for ratios and dimensions (unit testable)
//! - **Parameters**: quality tiers mapped to per-format encoder settings
//! - **Backend**: [`Codec`] trait, [`DecodedImage`] model, [`CodecSet`]
//! - **Codecs**: one adapter per format

pub mod backend;
mod calculations;
pub mod format;
pub mod gif;
pub mod jpeg;
mod params;
pub mod png;
pub mod thumbnail;

pub use backend::{
    Animation, AnimationFrame, Codec, CodecError, CodecSet, DecodedImage, Disposal, PixelLayout,
    RasterImage, Repeat,
};
pub use calculations::{compression_ratio, fit_within};
pub use format::{FormatError, ImageFormat, detect, detect_path, has_supported_extension};
pub use params::{GifParams, PngStrategy, Quality};
pub use thumbnail::{PREVIEW_EDGE, THUMBNAIL_EDGE, ThumbnailError, thumbnail, thumbnail_data_uri};
