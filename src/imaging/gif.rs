//! GIF codec: frame-preserving animation re-encoder.
//!
//! ## Decode
//!
//! Every frame is composited onto a full RGBA canvas, honouring the source
//! disposal methods (`Background` clears the frame rectangle to transparent,
//! `Previous` restores the pre-frame canvas). The result is one full-canvas
//! snapshot per source frame, so the encoder never has to reason about the
//! source file's own frame rectangles.
//!
//! ## Encode
//!
//! 1. **Plan** (sequential): each frame becomes the bounding rectangle of
//!    pixels that differ from what is on screen, with unchanged pixels made
//!    transparent. A frame with no changes becomes a 1x1 transparent frame so
//!    its delay survives. GIF cannot draw "transparent over opaque", so when a
//!    frame needs pixels cleared the previous frame is widened to the full
//!    canvas and disposed to background.
//! 2. **Quantize + LZW** (parallel when memory allows): each planned frame is
//!    palette-reduced with imagequant (255 colours plus a transparent slot),
//!    optionally pixel-aligned for longer LZW runs, and pre-compressed.
//! 3. **Write** (sequential): frames go out in order with the source loop
//!    count.
//!
//! Frame count, order, delays and loop count are preserved exactly.

use super::backend::{
    Animation, AnimationFrame, Codec, CodecError, DecodedImage, Disposal, RasterImage, Repeat,
};
use super::format::ImageFormat;
use super::params::{GifParams, Quality};
use rayon::prelude::*;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Decoded frame memory above which frame encoding stays sequential.
const PARALLEL_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// NeuQuant speed for the fallback quantizer (1 best, 30 fastest).
const FALLBACK_QUANT_SPEED: i32 = 10;

pub struct GifCodec;

impl Codec for GifCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        decode_animation(bytes, usize::MAX).map(DecodedImage::Animation)
    }

    /// Stops reading after the first frame; later frames are never
    /// decompressed.
    fn decode_first_frame(&self, bytes: &[u8]) -> Result<RasterImage, CodecError> {
        DecodedImage::Animation(decode_animation(bytes, 1)?)
            .first_frame()
            .ok_or_else(|| CodecError::Decode("GIF has no frames".into()))
    }

    fn encode(&self, image: &DecodedImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
        let params = GifParams::for_quality(quality);
        match image {
            DecodedImage::Animation(anim) => encode_animation(anim, &params),
            DecodedImage::Raster(raster) => {
                let width = u16::try_from(raster.width)
                    .map_err(|_| CodecError::Encode("image too wide for GIF".into()))?;
                let height = u16::try_from(raster.height)
                    .map_err(|_| CodecError::Encode("image too tall for GIF".into()))?;
                let rgba = raster.to_rgba8();
                let anim = Animation {
                    width,
                    height,
                    repeat: Repeat::Finite(0),
                    frames: vec![AnimationFrame {
                        rgba,
                        delay: 0,
                        disposal: Disposal::Keep,
                    }],
                };
                encode_animation(&anim, &params)
            }
        }
    }
}

// ============================================================================
// Decode
// ============================================================================

fn decode_err(e: impl std::fmt::Display) -> CodecError {
    CodecError::Decode(e.to_string())
}

/// Composite up to `max_frames` frames onto full canvases.
fn decode_animation(bytes: &[u8], max_frames: usize) -> Result<Animation, CodecError> {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::RGBA);
    let mut reader = opts.read_info(Cursor::new(bytes)).map_err(decode_err)?;

    let (width, height) = (reader.width(), reader.height());
    if width == 0 || height == 0 {
        return Err(CodecError::Decode(format!(
            "image has no pixels ({width}x{height})"
        )));
    }
    let (w, h) = (width as usize, height as usize);
    let mut canvas = vec![0u8; w * h * 4];
    let mut frames = Vec::new();

    while frames.len() < max_frames {
        let Some(frame) = reader.read_next_frame().map_err(decode_err)? else {
            break;
        };
        let rect = Rect {
            left: frame.left as usize,
            top: frame.top as usize,
            width: frame.width as usize,
            height: frame.height as usize,
        };
        let disposal = match frame.dispose {
            gif::DisposalMethod::Background => Disposal::Background,
            gif::DisposalMethod::Previous => Disposal::Previous,
            _ => Disposal::Keep,
        };
        let before = (disposal == Disposal::Previous).then(|| canvas.clone());

        composite(&mut canvas, w, h, &rect, &frame.buffer);
        frames.push(AnimationFrame {
            rgba: canvas.clone(),
            delay: frame.delay,
            disposal,
        });

        match (disposal, before) {
            (Disposal::Background, _) => clear_rect(&mut canvas, w, h, &rect),
            (Disposal::Previous, Some(before)) => canvas = before,
            _ => {}
        }
    }

    if frames.is_empty() {
        return Err(CodecError::Decode("GIF has no frames".into()));
    }

    let repeat = match reader.repeat() {
        gif::Repeat::Finite(n) => Repeat::Finite(n),
        gif::Repeat::Infinite => Repeat::Infinite,
    };

    Ok(Animation {
        width,
        height,
        repeat,
        frames,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

/// Draw opaque frame pixels onto the canvas, clipped to the canvas bounds.
fn composite(canvas: &mut [u8], w: usize, h: usize, rect: &Rect, rgba: &[u8]) {
    for row in 0..rect.height {
        let cy = rect.top + row;
        if cy >= h {
            break;
        }
        for col in 0..rect.width {
            let cx = rect.left + col;
            if cx >= w {
                break;
            }
            let src = (row * rect.width + col) * 4;
            let Some(px) = rgba.get(src..src + 4) else {
                return;
            };
            if px[3] > 0 {
                let dst = (cy * w + cx) * 4;
                canvas[dst..dst + 4].copy_from_slice(px);
            }
        }
    }
}

fn clear_rect(canvas: &mut [u8], w: usize, h: usize, rect: &Rect) {
    for cy in rect.top..(rect.top + rect.height).min(h) {
        for cx in rect.left..(rect.left + rect.width).min(w) {
            let idx = (cy * w + cx) * 4;
            canvas[idx..idx + 4].fill(0);
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// A frame ready for quantization: a sub-rectangle of RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
struct PlannedFrame {
    rgba: Vec<u8>,
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    delay: u16,
    dispose: gif::DisposalMethod,
}

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Two pixels look the same on screen. Any two fully transparent pixels are
/// equal regardless of their colour channels.
fn same_pixel(a: &[u8], b: &[u8]) -> bool {
    (a[3] == 0 && b[3] == 0) || a == b
}

fn base_pixel(base: Option<&[u8]>, idx: usize) -> &[u8] {
    match base {
        Some(b) => &b[idx..idx + 4],
        None => &TRANSPARENT,
    }
}

/// Whether `curr` makes any pixel of `prev` transparent again.
fn needs_clear(prev: &[u8], curr: &[u8]) -> bool {
    prev.chunks_exact(4)
        .zip(curr.chunks_exact(4))
        .any(|(p, c)| p[3] > 0 && c[3] == 0)
}

/// Bounding box of pixels where `curr` differs from `base`.
fn changed_rect(base: Option<&[u8]>, curr: &[u8], w: usize, h: usize) -> Option<Rect> {
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 4;
            if !same_pixel(base_pixel(base, idx), &curr[idx..idx + 4]) {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    (min_x <= max_x && min_y <= max_y).then(|| Rect {
        left: min_x,
        top: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Cut `rect` out of `curr`, making pixels already shown by `base`
/// transparent.
fn frame_in_rect(
    base: Option<&[u8]>,
    curr: &[u8],
    w: usize,
    rect: Rect,
    delay: u16,
) -> PlannedFrame {
    let mut rgba = Vec::with_capacity(rect.width * rect.height * 4);
    for y in rect.top..rect.top + rect.height {
        for x in rect.left..rect.left + rect.width {
            let idx = (y * w + x) * 4;
            let px = &curr[idx..idx + 4];
            if same_pixel(base_pixel(base, idx), px) {
                rgba.extend_from_slice(&TRANSPARENT);
            } else {
                rgba.extend_from_slice(px);
            }
        }
    }
    PlannedFrame {
        rgba,
        left: rect.left as u16,
        top: rect.top as u16,
        width: rect.width as u16,
        height: rect.height as u16,
        delay,
        dispose: gif::DisposalMethod::Keep,
    }
}

fn full_frame(base: Option<&[u8]>, curr: &[u8], w: usize, h: usize, delay: u16) -> PlannedFrame {
    let rect = Rect {
        left: 0,
        top: 0,
        width: w,
        height: h,
    };
    frame_in_rect(base, curr, w, rect, delay)
}

fn delta_frame(base: Option<&[u8]>, curr: &[u8], w: usize, h: usize, delay: u16) -> PlannedFrame {
    match changed_rect(base, curr, w, h) {
        Some(rect) => frame_in_rect(base, curr, w, rect, delay),
        None => PlannedFrame {
            rgba: TRANSPARENT.to_vec(),
            left: 0,
            top: 0,
            width: 1,
            height: 1,
            delay,
            dispose: gif::DisposalMethod::Keep,
        },
    }
}

fn plan_frames(anim: &Animation) -> Vec<PlannedFrame> {
    let (w, h) = (anim.width as usize, anim.height as usize);
    let canvas = |i: usize| anim.frames[i].rgba.as_slice();

    let mut planned: Vec<PlannedFrame> = Vec::with_capacity(anim.frames.len());
    // bases[i]: the frame whose canvas is on screen right before frame i,
    // or None for an empty (transparent) screen.
    let mut bases: Vec<Option<usize>> = Vec::with_capacity(anim.frames.len());

    for (i, frame) in anim.frames.iter().enumerate() {
        if i == 0 {
            planned.push(full_frame(None, &frame.rgba, w, h, frame.delay));
            bases.push(None);
            continue;
        }

        let base = if needs_clear(canvas(i - 1), &frame.rgba) {
            let prev_base = bases[i - 1].map(canvas);
            let mut widened = full_frame(prev_base, canvas(i - 1), w, h, anim.frames[i - 1].delay);
            widened.dispose = gif::DisposalMethod::Background;
            planned[i - 1] = widened;
            None
        } else {
            Some(i - 1)
        };

        planned.push(delta_frame(base.map(canvas), &frame.rgba, w, h, frame.delay));
        bases.push(base);
    }
    planned
}

// ============================================================================
// Quantize + LZW
// ============================================================================

/// Merge horizontally adjacent opaque pixels whose channels all differ by at
/// most `tolerance`.
fn lossy_pixel_align(rgba: &[u8], width: usize, height: usize, tolerance: u8) -> Vec<u8> {
    let mut out = rgba.to_vec();
    let tol = tolerance as i16;
    for y in 0..height {
        for x in 1..width {
            let curr = (y * width + x) * 4;
            let prev = curr - 4;
            if out[curr + 3] == 0 || out[prev + 3] == 0 {
                continue;
            }
            let close = (0..3).all(|c| (out[curr + c] as i16 - out[prev + c] as i16).abs() <= tol);
            if close {
                let (left, right) = out.split_at_mut(curr);
                right[..3].copy_from_slice(&left[prev..prev + 3]);
            }
        }
    }
    out
}

fn encode_frame(planned: &PlannedFrame, params: &GifParams) -> gif::Frame<'static> {
    let (fw, fh) = (planned.width as usize, planned.height as usize);
    let mut rgba = if params.lossy_tolerance > 0 {
        lossy_pixel_align(&planned.rgba, fw, fh, params.lossy_tolerance)
    } else {
        planned.rgba.clone()
    };

    let pixels: Vec<imagequant::RGBA> = rgba
        .chunks_exact(4)
        .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();

    let mut frame = match super::png::quantize(
        &pixels,
        fw,
        fh,
        (0, params.quality),
        GifParams::MAX_COLORS,
        params.dithering,
    ) {
        Ok((palette, indices)) => gif::Frame {
            width: planned.width,
            height: planned.height,
            palette: Some(palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect()),
            transparent: palette.iter().position(|c| c.a == 0).map(|i| i as u8),
            buffer: Cow::Owned(indices),
            ..gif::Frame::default()
        },
        Err(e) => {
            debug!(error = %e, "imagequant failed on GIF frame; using NeuQuant");
            gif::Frame::from_rgba_speed(planned.width, planned.height, &mut rgba, FALLBACK_QUANT_SPEED)
        }
    };
    frame.left = planned.left;
    frame.top = planned.top;
    frame.delay = planned.delay;
    frame.dispose = planned.dispose;
    frame.make_lzw_pre_encoded();
    frame
}

fn encode_animation(anim: &Animation, params: &GifParams) -> Result<Vec<u8>, CodecError> {
    let planned = plan_frames(anim);
    let estimated = anim.width as usize * anim.height as usize * 4 * anim.frames.len();

    let frames: Vec<gif::Frame<'static>> =
        if planned.len() > 1 && estimated <= PARALLEL_MEMORY_LIMIT {
            planned.par_iter().map(|f| encode_frame(f, params)).collect()
        } else {
            planned.iter().map(|f| encode_frame(f, params)).collect()
        };

    let encode_err = |e: gif::EncodingError| CodecError::Encode(e.to_string());
    let mut out = Vec::new();
    {
        let mut encoder =
            gif::Encoder::new(&mut out, anim.width, anim.height, &[]).map_err(encode_err)?;
        match anim.repeat {
            Repeat::Finite(0) => {}
            Repeat::Finite(n) => encoder
                .set_repeat(gif::Repeat::Finite(n))
                .map_err(encode_err)?,
            Repeat::Infinite => encoder
                .set_repeat(gif::Repeat::Infinite)
                .map_err(encode_err)?,
        }
        for frame in &frames {
            encoder
                .write_lzw_pre_encoded_frame(frame)
                .map_err(encode_err)?;
        }
    }
    Ok(out)
}
