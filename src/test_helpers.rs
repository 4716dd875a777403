//! Shared test utilities for the picslim test suite.
//!
//! Generates small, valid JPEG/PNG/GIF files in memory so tests never depend
//! on binary fixtures checked into the repo, plus a few helpers for writing
//! them into a temp directory.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = write_file(tmp.path(), "photo.jpg", &jpeg_bytes(64, 48));
//! let descriptor = descriptor_for(&path);
//! ```

use image::{ImageBuffer, ImageEncoder, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};

use crate::imaging::ImageFormat;
use crate::types::ImageDescriptor;

// =========================================================================
// Synthetic images
// =========================================================================

/// A gradient JPEG with the given dimensions.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 95)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// A JPEG carrying an EXIF orientation tag.
///
/// Inserts a minimal big-endian APP1/TIFF segment with a single IFD0 entry
/// (tag 0x0112) right after the SOI marker.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let plain = jpeg_bytes(width, height);

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\0\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes()); // SHORT
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let payload_len = 2 + 6 + tiff.len();
    let mut out = Vec::with_capacity(plain.len() + payload_len + 2);
    out.extend_from_slice(&plain[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&plain[2..]);
    out
}

/// An RGBA PNG with a colour gradient and a soft alpha ramp.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
            if x < width / 4 { 128 } else { 255 },
        ])
    });
    encode_png(&img)
}

/// A PNG filled with one colour.
pub fn flat_png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
}

/// A 16-bit RGBA PNG. Samples have differing high and low bytes, so no
/// lossless reduction to 8 bits exists.
pub fn png16_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        image::Rgba([
            (x * 1031 + 7) as u16,
            (y * 977 + 3) as u16,
            (x * y * 13 + 1) as u16,
            65_535 - (x % 16) as u16 * 3,
        ])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba16(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
    out
}

/// A GIF built from full-canvas RGBA frames.
///
/// `repeat: None` writes no loop extension (plays once).
pub fn gif_bytes(
    width: u16,
    height: u16,
    frames: &[(Vec<u8>, u16)],
    repeat: Option<gif::Repeat>,
) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &[]).unwrap();
        if let Some(repeat) = repeat {
            encoder.set_repeat(repeat).unwrap();
        }
        for (rgba, delay) in frames {
            let mut pixels = rgba.clone();
            let mut frame = gif::Frame::from_rgba_speed(width, height, &mut pixels, 10);
            frame.delay = *delay;
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// A 4x4 GIF whose frames are sub-rectangles using every disposal method:
///
/// | Frame | Pixels | Disposal |
/// |---|---|---|
/// | 0 | red, whole canvas | keep |
/// | 1 | blue 2x2 at (1,1) | previous |
/// | 2 | green 1x1 at (0,0) | background |
/// | 3 | white 1x1 at (3,3) | keep |
pub fn disposal_gif_bytes() -> Vec<u8> {
    let frames: [(u16, u16, u16, [u8; 4], gif::DisposalMethod); 4] = [
        (0, 0, 4, RED, gif::DisposalMethod::Keep),
        (1, 1, 2, BLUE, gif::DisposalMethod::Previous),
        (0, 0, 1, GREEN, gif::DisposalMethod::Background),
        (3, 3, 1, WHITE, gif::DisposalMethod::Keep),
    ];
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, 4, 4, &[]).unwrap();
        encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        for (i, (left, top, size, colour, dispose)) in frames.into_iter().enumerate() {
            let mut pixels = colour.repeat(size as usize * size as usize);
            let mut frame = gif::Frame::from_rgba_speed(size, size, &mut pixels, 10);
            frame.left = left;
            frame.top = top;
            frame.dispose = dispose;
            frame.delay = 10 + i as u16;
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

/// The composited 4x4 canvases [`disposal_gif_bytes`] must decode to.
pub fn disposal_gif_canvases() -> Vec<Vec<u8>> {
    let set = |canvas: &mut Vec<u8>, x: usize, y: usize, px: [u8; 4]| {
        let idx = (y * 4 + x) * 4;
        canvas[idx..idx + 4].copy_from_slice(&px);
    };
    let red = RED.repeat(16);

    let mut blue_square = red.clone();
    for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
        set(&mut blue_square, x, y, BLUE);
    }

    // the blue square is gone again: frame 1 restored what was under it
    let mut green_corner = red.clone();
    set(&mut green_corner, 0, 0, GREEN);

    // frame 2 cleared its corner to transparent
    let mut last = red.clone();
    set(&mut last, 0, 0, [0, 0, 0, 0]);
    set(&mut last, 3, 3, WHITE);

    vec![red, blue_square, green_corner, last]
}

/// `n` frames of a 4x4 red square moving across a white canvas, looping
/// forever, with distinct delays so ordering is observable.
pub fn animated_gif_bytes(width: u16, height: u16, n: usize) -> Vec<u8> {
    let frames: Vec<(Vec<u8>, u16)> = (0..n)
        .map(|i| (moving_square_canvas(width, height, i), 5 + i as u16))
        .collect();
    gif_bytes(width, height, &frames, Some(gif::Repeat::Infinite))
}

/// Full-canvas RGBA for frame `i` of [`animated_gif_bytes`].
pub fn moving_square_canvas(width: u16, height: u16, i: usize) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut canvas = vec![255u8; w * h * 4];
    let x0 = (i * 2) % w.saturating_sub(3).max(1);
    for y in 0..4.min(h) {
        for x in x0..(x0 + 4).min(w) {
            let idx = (y * w + x) * 4;
            canvas[idx..idx + 4].copy_from_slice(&[255, 0, 0, 255]);
        }
    }
    canvas
}

// =========================================================================
// Files and descriptors
// =========================================================================

/// Write `bytes` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A descriptor for an existing file without going through thumbnailing.
pub fn descriptor_for(path: &Path) -> ImageDescriptor {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    ImageDescriptor {
        id: uuid::Uuid::new_v4().to_string(),
        path: path.to_path_buf(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size,
        size_display: crate::output::format_file_size(size),
        format: crate::imaging::detect_path(path).unwrap_or(ImageFormat::Png),
        thumbnail: None,
    }
}

/// Mean absolute per-channel difference between two equal-length buffers.
pub fn mean_channel_error(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len(), "buffers differ in length");
    let total: u64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (*x as i32 - *y as i32).unsigned_abs() as u64)
        .sum();
    total as f64 / a.len().max(1) as f64
}
