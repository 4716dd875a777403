//! # PicSlim
//!
//! A batch image compression engine for JPEG, PNG and GIF. Give it a list of
//! files and a quality; it re-encodes every file in parallel, writes the
//! results into one output directory, and streams a `start` and a terminal
//! event per file while it works.
//!
//! # Architecture: One Pipeline per Item
//!
//! ```text
//! load_images(paths)      →  [ImageDescriptor]          (detect, size, thumbnail)
//! compress_images(...)    →  [CompressionResult]        (one per descriptor)
//!     per item:  read → detect → decode → encode → oversize policy → write
//!                └─ emits: start … complete | error
//! ```
//!
//! Items are independent. A corrupt or unsupported file fails on its own;
//! the rest of the batch carries on. Only problems that would fail every
//! item (bad quality, unusable output directory) abort the batch up front.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Boundary operations: load, compress, preview, default output dir, open folder |
//! | [`process`] | The job runner: sized worker pool, per-item lifecycle, cancellation |
//! | [`imaging`] | Format detection, codec adapters (mozjpeg, imagequant + oxipng, gif), thumbnails |
//! | [`writer`] | Atomic, collision-free output writes |
//! | [`naming`] | Output file name sanitizing and numbered collision candidates |
//! | [`events`] | Lifecycle events and the [`events::EventSink`] trait |
//! | [`config`] | Persisted user settings and worker pool sizing |
//! | [`types`] | Shared data types crossing the boundary |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Decides the Codec
//!
//! Formats are identified from magic bytes, never from the extension. A PNG
//! saved as `photo.jpg` is compressed as a PNG and written as `photo.png`,
//! so the output extension always names what the file holds. The source
//! extension only matters when a directory is expanded (to pick candidate
//! files).
//!
//! ## Codecs Behind a Trait
//!
//! Every format is a [`imaging::Codec`] in a [`imaging::CodecSet`]. The runner
//! dispatches through the set, so tests swap in a recording mock and the
//! pipeline never needs to know which library does the work.
//!
//! ## Quality Means Different Things per Format
//!
//! - **JPEG**: mozjpeg quality, progressive, optimized scans, no metadata.
//! - **PNG**: 100 is lossless (oxipng only); lower tiers quantize to a
//!   palette with imagequant and fall back to lossless when the quantizer
//!   cannot meet its minimum quality.
//! - **GIF**: frames are re-quantized with a quality-dependent dithering
//!   level and lossy pixel merging; unchanged regions between frames are
//!   stored as transparent deltas.
//!
//! ## Sized Pool, Not the Global One
//!
//! Each [`process::Runner`] owns a rayon pool with an explicit thread count,
//! so a host application's own rayon work and a compression batch never
//! compete for the same threads. Items are handed out by the same number of
//! item threads, so codec-internal parallelism never starts extra items.
//!
//! ## Never Overwrite
//!
//! Outputs are written to a temp file and linked into place with no-clobber
//! semantics. Name clashes (two `photo.png` sources, or a file already in the
//! output directory) resolve to `photo-1.png`, `photo-2.png`, … and no
//! existing file is ever replaced.

pub mod config;
pub mod engine;
pub mod events;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod types;
pub mod writer;

pub use engine::{
    EngineError, compress_images, get_default_output_dir, get_image_preview, load_image,
    load_images, open_output_folder,
};

#[cfg(test)]
pub(crate) mod test_helpers;
