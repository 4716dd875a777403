//! Preview images for the UI.
//!
//! Decoding goes through the same codec adapters as compression, so a
//! thumbnail shows exactly what will be compressed: JPEG orientation is
//! applied and GIFs show their first frame (later frames are not decoded
//! at all). The image is shrunk to fit
//! `max_edge` (never enlarged), alpha is flattened onto white, and the result
//! is a baseline JPEG at quality 80.

use super::backend::{CodecError, CodecSet, PixelLayout, RasterImage};
use super::calculations::fit_within;
use super::format::{self, FormatError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};
use thiserror::Error;

/// Longest edge of the thumbnails attached to loaded images.
pub const THUMBNAIL_EDGE: u32 = 128;
/// Longest edge of the on-demand preview.
pub const PREVIEW_EDGE: u32 = 800;

const THUMBNAIL_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("thumbnail encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Render `bytes` as a JPEG no larger than `max_edge` on either side.
pub fn thumbnail(bytes: &[u8], max_edge: u32) -> Result<Vec<u8>, ThumbnailError> {
    let detected = format::detect(bytes)?;
    let raster = CodecSet::builtin().get(detected).decode_first_frame(bytes)?;

    let rgb = flatten_on_white(&raster)?;
    let (width, height) = fit_within((rgb.width(), rgb.height()), max_edge);
    let rgb = if (width, height) == rgb.dimensions() {
        rgb
    } else {
        DynamicImage::ImageRgb8(rgb)
            .resize_exact(width, height, FilterType::Triangle)
            .into_rgb8()
    };

    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// [`thumbnail`] as a `data:image/jpeg;base64,...` URI.
pub fn thumbnail_data_uri(bytes: &[u8], max_edge: u32) -> Result<String, ThumbnailError> {
    let jpeg = thumbnail(bytes, max_edge)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}

fn flatten_on_white(raster: &RasterImage) -> Result<RgbImage, CodecError> {
    let invalid = || CodecError::Decode("pixel buffer does not match dimensions".into());
    match raster.layout {
        PixelLayout::Rgb8 => RgbImage::from_raw(raster.width, raster.height, raster.pixels.clone())
            .ok_or_else(invalid),
        PixelLayout::Rgba8 | PixelLayout::Rgba16 => {
            let rgba = RgbaImage::from_raw(raster.width, raster.height, raster.to_rgba8())
                .ok_or_else(invalid)?;
            Ok(RgbImage::from_fn(raster.width, raster.height, |x, y| {
                let [r, g, b, a] = rgba.get_pixel(x, y).0;
                let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
                image::Rgb([blend(r), blend(g), blend(b)])
            }))
        }
    }
}
