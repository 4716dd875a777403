//! PNG codec: two-stage lossy + lossless pipeline.
//!
//! | Stage | Crate | Notes |
//! |---|---|---|
//! | Decode | `image` | expanded to RGBA8, or RGBA16 for 16-bit sources |
//! | Quantize | `imagequant` | skipped at quality 100 |
//! | Re-compress | `oxipng` | max preset, safe chunk stripping |
//!
//! Quantization gets a quality window of `[q - 40, q]`. If the quantizer
//! cannot reach the floor (photographic content with a small palette), the
//! item silently takes the lossless tier instead of producing a visibly
//! degraded image.

use super::backend::{Codec, CodecError, DecodedImage, PixelLayout, RasterImage};
use super::format::ImageFormat;
use super::params::{PngStrategy, Quality};
use image::DynamicImage;
use tracing::debug;

/// oxipng's slowest, strongest preset.
const OXIPNG_PRESET: u8 = 6;

/// imagequant speed (1 = slowest). 4 is its own default trade-off.
const QUANTIZE_SPEED: i32 = 4;

pub struct PngCodec;

impl Codec for PngCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let raster = match img {
            DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_) => {
                let rgba = img.into_rgba16();
                let (width, height) = rgba.dimensions();
                let pixels = rgba.into_raw().iter().flat_map(|v| v.to_be_bytes()).collect();
                RasterImage::new(width, height, PixelLayout::Rgba16, pixels)?
            }
            _ => {
                let rgba = img.into_rgba8();
                let (width, height) = rgba.dimensions();
                RasterImage::new(width, height, PixelLayout::Rgba8, rgba.into_raw())?
            }
        };
        Ok(DecodedImage::Raster(raster))
    }

    fn encode(&self, image: &DecodedImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
        let raster = image
            .first_frame()
            .ok_or_else(|| CodecError::Encode("animation has no frames".into()))?;
        encode_with_strategy(&raster, PngStrategy::for_quality(quality))
    }
}

pub(crate) fn encode_with_strategy(
    raster: &RasterImage,
    strategy: PngStrategy,
) -> Result<Vec<u8>, CodecError> {
    match strategy {
        PngStrategy::Lossless => encode_lossless(raster),
        PngStrategy::Quantize {
            min_quality,
            target_quality,
            max_colors,
            dithering,
        } => {
            let rgba = to_rgba(raster);
            match quantize(
                &rgba,
                raster.width as usize,
                raster.height as usize,
                (min_quality, target_quality),
                max_colors,
                dithering,
            ) {
                Ok((palette, indices)) => {
                    let raw = oxipng::RawImage::new(
                        raster.width,
                        raster.height,
                        oxipng::ColorType::Indexed { palette },
                        oxipng::BitDepth::Eight,
                        indices,
                    )
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
                    optimize(raw)
                }
                Err(e) => {
                    debug!(error = %e, "quantization below quality floor; using lossless tier");
                    encode_lossless(raster)
                }
            }
        }
    }
}

/// Sixteen-bit rasters are handed over as-is; oxipng only drops to eight
/// bits when that loses nothing.
fn encode_lossless(raster: &RasterImage) -> Result<Vec<u8>, CodecError> {
    let (color_type, depth) = match raster.layout {
        PixelLayout::Rgba8 => (oxipng::ColorType::RGBA, oxipng::BitDepth::Eight),
        PixelLayout::Rgba16 => (oxipng::ColorType::RGBA, oxipng::BitDepth::Sixteen),
        PixelLayout::Rgb8 => (
            oxipng::ColorType::RGB {
                transparent_color: None,
            },
            oxipng::BitDepth::Eight,
        ),
    };
    let raw = oxipng::RawImage::new(
        raster.width,
        raster.height,
        color_type,
        depth,
        raster.pixels.clone(),
    )
    .map_err(|e| CodecError::Encode(e.to_string()))?;
    optimize(raw)
}

fn optimize(raw: oxipng::RawImage) -> Result<Vec<u8>, CodecError> {
    let mut opts = oxipng::Options::from_preset(OXIPNG_PRESET);
    opts.strip = oxipng::StripChunks::Safe;
    raw.create_optimized_png(&opts)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

fn to_rgba(raster: &RasterImage) -> Vec<imagequant::RGBA> {
    raster
        .to_rgba8()
        .chunks_exact(4)
        .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
        .collect()
}

/// Palette-quantize RGBA pixels. Errors when the result would fall below
/// the minimum quality.
pub(crate) fn quantize(
    pixels: &[imagequant::RGBA],
    width: usize,
    height: usize,
    (min_quality, target_quality): (u8, u8),
    max_colors: u32,
    dithering: f32,
) -> Result<(Vec<imagequant::RGBA>, Vec<u8>), imagequant::Error> {
    let mut liq = imagequant::new();
    liq.set_speed(QUANTIZE_SPEED)?;
    liq.set_max_colors(max_colors)?;
    liq.set_quality(min_quality, target_quality)?;

    let mut img = liq.new_image_borrowed(pixels, width, height, 0.0)?;
    let mut res = liq.quantize(&mut img)?;
    res.set_dithering_level(dithering)?;
    res.remapped(&mut img)
}
