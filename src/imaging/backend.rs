//! Codec trait and the decoded-image model shared by all codecs.
//!
//! The [`Codec`] trait defines the two operations every format adapter must
//! support: decode to pixels and encode pixels at a target quality. The job
//! runner never names a concrete codec; it looks one up in a [`CodecSet`]
//! keyed by the detected [`ImageFormat`], so tests can swap in the
//! `MockCodec` test double without changing pipeline logic.
//!
//! | Format | Codec | Decoded as |
//! |---|---|---|
//! | JPEG | [`JpegCodec`](super::jpeg::JpegCodec) | RGB8 raster, orientation applied |
//! | PNG | [`PngCodec`](super::png::PngCodec) | RGBA8 raster, RGBA16 for 16-bit sources |
//! | GIF | [`GifCodec`](super::gif::GifCodec) | full-canvas RGBA animation |

use super::format::ImageFormat;
use super::gif::GifCodec;
use super::jpeg::JpegCodec;
use super::params::Quality;
use super::png::PngCodec;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Channel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb8,
    Rgba8,
    /// 16 bits per channel, big-endian (PNG sample order).
    Rgba16,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb8 => 3,
            PixelLayout::Rgba8 => 4,
            PixelLayout::Rgba16 => 8,
        }
    }
}

/// A single still image, tightly packed, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Build a raster, rejecting empty dimensions and mismatched buffers.
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
    ) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::Decode(format!(
                "image has no pixels ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(CodecError::Decode(format!(
                "pixel buffer is {} bytes, expected {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            pixels,
        })
    }

    /// The pixels as 8-bit RGBA, adding opaque alpha or rounding 16-bit
    /// samples down to 8 bits as needed.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.layout {
            PixelLayout::Rgba8 => self.pixels.clone(),
            PixelLayout::Rgb8 => self
                .pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            PixelLayout::Rgba16 => self
                .pixels
                .chunks_exact(2)
                .map(|s| scale_sample(u16::from_be_bytes([s[0], s[1]])))
                .collect(),
        }
    }
}

fn scale_sample(v: u16) -> u8 {
    ((v as u32 * 255 + 32_767) / 65_535) as u8
}

/// How often an animation plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Number of extra loops after the first play. `Finite(0)` plays once.
    Finite(u16),
    Infinite,
}

/// How the source file asked a frame to be disposed.
///
/// Informational once decoded: every frame is already a full canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    Keep,
    Background,
    Previous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    /// Full-canvas RGBA, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
    /// Delay in hundredths of a second.
    pub delay: u16,
    pub disposal: Disposal,
}

/// A frame sequence composited onto a fixed canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub width: u16,
    pub height: u16,
    pub repeat: Repeat,
    pub frames: Vec<AnimationFrame>,
}

/// Output of [`Codec::decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedImage {
    Raster(RasterImage),
    Animation(Animation),
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DecodedImage::Raster(r) => (r.width, r.height),
            DecodedImage::Animation(a) => (a.width as u32, a.height as u32),
        }
    }

    /// The still image to show for this decode: the raster itself, or the
    /// first frame of an animation.
    pub fn first_frame(&self) -> Option<RasterImage> {
        match self {
            DecodedImage::Raster(r) => Some(r.clone()),
            DecodedImage::Animation(a) => a.frames.first().map(|f| RasterImage {
                width: a.width as u32,
                height: a.height as u32,
                layout: PixelLayout::Rgba8,
                pixels: f.rgba.clone(),
            }),
        }
    }
}

/// A format adapter.
///
/// Implementations must be stateless across calls (or internally
/// synchronized) because one instance serves every worker in the pool.
pub trait Codec: Send + Sync {
    /// The format this codec handles.
    fn format(&self) -> ImageFormat;

    /// Decode source bytes to pixels.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError>;

    /// Encode pixels at the given quality.
    fn encode(&self, image: &DecodedImage, quality: Quality) -> Result<Vec<u8>, CodecError>;

    /// Decode only the still image a preview shows. The default decodes
    /// everything and keeps the first frame.
    fn decode_first_frame(&self, bytes: &[u8]) -> Result<RasterImage, CodecError> {
        self.decode(bytes)?
            .first_frame()
            .ok_or_else(|| CodecError::Decode("image has no frames".into()))
    }
}

/// One codec per supported format.
#[derive(Clone)]
pub struct CodecSet {
    jpeg: Arc<dyn Codec>,
    png: Arc<dyn Codec>,
    gif: Arc<dyn Codec>,
}

impl CodecSet {
    /// The production codecs.
    pub fn builtin() -> Self {
        Self {
            jpeg: Arc::new(JpegCodec),
            png: Arc::new(PngCodec),
            gif: Arc::new(GifCodec),
        }
    }

    /// Replace the codec for `codec.format()`.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        match codec.format() {
            ImageFormat::Jpeg => self.jpeg = codec,
            ImageFormat::Png => self.png = codec,
            ImageFormat::Gif => self.gif = codec,
        }
        self
    }

    pub fn get(&self, format: ImageFormat) -> &Arc<dyn Codec> {
        match format {
            ImageFormat::Jpeg => &self.jpeg,
            ImageFormat::Png => &self.png,
            ImageFormat::Gif => &self.gif,
        }
    }
}

impl Default for CodecSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSet").finish_non_exhaustive()
    }
}
