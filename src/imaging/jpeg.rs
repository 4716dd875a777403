//! JPEG codec: `image` for decoding, mozjpeg for encoding.
//!
//! Decoding reads the EXIF orientation tag and rotates/flips the pixels so
//! the raster is upright. The encoder writes no metadata at all, so the
//! orientation tag cannot double-apply in viewers.
//!
//! Encoding uses progressive scans with optimized Huffman tables and scan
//! optimization, which is where most of the savings over a baseline encoder
//! come from at the same visual quality.

use super::backend::{Codec, CodecError, DecodedImage, PixelLayout, RasterImage};
use super::format::ImageFormat;
use super::params::Quality;
use image::codecs::jpeg::JpegDecoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder};
use std::io::Cursor;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub struct JpegCodec;

impl Codec for JpegCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        let mut decoder = JpegDecoder::new(Cursor::new(bytes))
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);
        let mut img =
            DynamicImage::from_decoder(decoder).map_err(|e| CodecError::Decode(e.to_string()))?;
        img.apply_orientation(orientation);

        let rgb = img.into_rgb8();
        let (width, height) = rgb.dimensions();
        RasterImage::new(width, height, PixelLayout::Rgb8, rgb.into_raw())
            .map(DecodedImage::Raster)
    }

    fn encode(&self, image: &DecodedImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
        let raster = image
            .first_frame()
            .ok_or_else(|| CodecError::Encode("animation has no frames".into()))?;
        let rgb = to_rgb(&raster);
        encode_rgb(&rgb, raster.width, raster.height, quality)
    }
}

/// Drop alpha if present. JPEG has no transparency.
fn to_rgb(raster: &RasterImage) -> Vec<u8> {
    match raster.layout {
        PixelLayout::Rgb8 => raster.pixels.clone(),
        PixelLayout::Rgba8 | PixelLayout::Rgba16 => raster
            .to_rgba8()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
    }
}

/// Progressive, Huffman-optimized mozjpeg encode.
///
/// mozjpeg reports fatal libjpeg errors by unwinding, so the whole call runs
/// under `catch_unwind` and a panic becomes an encode error.
fn encode_rgb(rgb: &[u8], width: u32, height: u32, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let q = quality.value().max(1) as f32;
    let result = catch_unwind(AssertUnwindSafe(|| -> std::io::Result<Vec<u8>> {
        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(q);
        comp.set_progressive_mode();
        comp.set_scan_optimization_mode(mozjpeg::ScanMode::AllComponentsTogether);
        comp.set_optimize_scans(true);
        comp.set_optimize_coding(true);

        let mut started = comp.start_compress(Vec::new())?;
        started.write_scanlines(rgb)?;
        started.finish()
    }));

    match result {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(CodecError::Encode(e.to_string())),
        Err(_) => Err(CodecError::Encode("mozjpeg aborted".into())),
    }
}
