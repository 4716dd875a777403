//! End-to-end batch behavior through the public API: load files from disk,
//! compress them on a real pool with the real codecs, inspect results,
//! events and the output directory.

use image::{ImageEncoder, RgbImage, RgbaImage};
use picslim::events::{EventKind, EventLog};
use picslim::process::{BatchError, Runner};
use picslim::types::{CompressionSettings, OversizePolicy};
use picslim::{compress_images, load_images};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// Fixtures
// =========================================================================

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 98)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 200, 255])
    });
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    out
}

fn gif(width: u16, height: u16, frames: usize) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &[]).unwrap();
        encoder.set_repeat(gif::Repeat::Infinite).unwrap();
        for i in 0..frames {
            let mut rgba: Vec<u8> = (0..width as usize * height as usize)
                .flat_map(|p| {
                    let shade = ((p + i * 17) % 200) as u8;
                    [shade, 255 - shade, 60, 255]
                })
                .collect();
            let mut frame = gif::Frame::from_rgba_speed(width, height, &mut rgba, 10);
            frame.delay = 10;
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

/// PNG signature followed by junk: detected as PNG, fails to decode.
fn corrupt_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0xAB; 64]);
    bytes
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn file_names(dir: &Path) -> HashSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

// =========================================================================
// Fault isolation and cardinality
// =========================================================================

#[test]
fn one_corrupt_file_does_not_affect_the_rest() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let paths = vec![
        write(&src, "a.jpg", &jpeg(120, 80)),
        write(&src, "b.jpg", &jpeg(64, 64)),
        write(&src, "c.png", &png(48, 48)),
        write(&src, "broken.png", &corrupt_png()),
        write(&src, "d.png", &png(32, 20)),
        write(&src, "e.gif", &gif(16, 16, 3)),
    ];
    let images = load_images(&paths);
    assert_eq!(images.len(), 6);

    let out = tmp.path().join("out");
    let log = EventLog::new();
    let results = compress_images(&images, &CompressionSettings::new(80, &out), &log).unwrap();

    assert_eq!(results.len(), 6);
    let failures: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, images[3].id);
    assert!(failures[0].error.is_some());
    assert!(failures[0].output_path.is_empty());
    assert_eq!(results.iter().filter(|r| r.success).count(), 5);

    let written = file_names(&out);
    assert_eq!(
        written,
        ["a.jpg", "b.jpg", "c.png", "d.png", "e.gif"]
            .iter()
            .map(|s| s.to_string())
            .collect::<HashSet<String>>()
    );
}

#[test]
fn results_follow_submission_order() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let paths: Vec<PathBuf> = (0..8)
        .map(|i| write(&src, &format!("img{i}.png"), &png(16 + i * 4, 16)))
        .collect();
    let images = load_images(&paths);
    let results = compress_images(
        &images,
        &CompressionSettings::new(70, tmp.path().join("out")),
        &EventLog::new(),
    )
    .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    let expected: Vec<&str> = images.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, expected);
}

// =========================================================================
// Events
// =========================================================================

#[test]
fn every_item_gets_one_start_and_one_terminal_event() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let paths = vec![
        write(&src, "a.jpg", &jpeg(40, 30)),
        write(&src, "bad.png", &corrupt_png()),
        write(&src, "c.gif", &gif(8, 8, 2)),
    ];
    let images = load_images(&paths);
    let log = EventLog::new();
    let results = compress_images(
        &images,
        &CompressionSettings::new(60, tmp.path().join("out")),
        &log,
    )
    .unwrap();

    assert_eq!(log.events().len(), images.len() * 2);
    for (image, result) in images.iter().zip(&results) {
        let events = log.for_id(&image.id);
        assert_eq!(events.len(), 2, "events for {}", image.name);
        assert_eq!(events[0].kind, EventKind::Start);
        assert!(events[0].result.is_none());
        let terminal = &events[1];
        assert!(terminal.kind.is_terminal());
        assert_eq!(terminal.result.as_ref(), Some(result));
        let expected = if result.success {
            EventKind::Complete
        } else {
            EventKind::Error
        };
        assert_eq!(terminal.kind, expected);
    }
}

#[test]
fn empty_batch_returns_nothing_and_emits_nothing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("never-created");
    let log = EventLog::new();
    let results = compress_images(&[], &CompressionSettings::new(80, &out), &log).unwrap();
    assert!(results.is_empty());
    assert!(log.events().is_empty());
    assert!(!out.exists());
}

// =========================================================================
// Output naming
// =========================================================================

#[test]
fn same_name_from_different_folders_gets_distinct_files() {
    let tmp = TempDir::new().unwrap();
    let first = write(&tmp.path().join("one"), "photo.png", &png(20, 20));
    let second = write(&tmp.path().join("two"), "photo.png", &png(30, 30));
    let images = load_images(&[first, second]);
    let out = tmp.path().join("out");

    let results = compress_images(&images, &CompressionSettings::new(90, &out), &EventLog::new())
        .unwrap();
    assert!(results.iter().all(|r| r.success));
    let outputs: HashSet<&str> = results.iter().map(|r| r.output_path.as_str()).collect();
    assert_eq!(outputs.len(), 2);
    assert_eq!(
        file_names(&out),
        ["photo.png", "photo-1.png"]
            .iter()
            .map(|s| s.to_string())
            .collect::<HashSet<String>>()
    );
}

#[test]
fn existing_outputs_are_not_replaced() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    write(&out, "keep.jpg", b"previous run");
    let src = write(&tmp.path().join("src"), "keep.jpg", &jpeg(32, 32));

    let images = load_images(&[src]);
    let results = compress_images(&images, &CompressionSettings::new(75, &out), &EventLog::new())
        .unwrap();
    assert!(results[0].output_path.ends_with("keep-1.jpg"));
    assert_eq!(std::fs::read(out.join("keep.jpg")).unwrap(), b"previous run");
}

#[test]
fn output_extension_follows_detected_format() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let src = write(&tmp.path().join("src"), "mislabelled.jpg", &png(24, 24));

    let images = load_images(&[src]);
    let results = compress_images(&images, &CompressionSettings::new(100, &out), &EventLog::new())
        .unwrap();
    assert!(results[0].success);
    assert!(results[0].output_path.ends_with("mislabelled.png"));
    let written = std::fs::read(&results[0].output_path).unwrap();
    assert!(written.starts_with(&[0x89, b'P', b'N', b'G']));
}

// =========================================================================
// Sizes and ratios
// =========================================================================

#[test]
fn reported_sizes_match_files() {
    let tmp = TempDir::new().unwrap();
    let src = write(&tmp.path().join("src"), "big.jpg", &jpeg(256, 256));
    let images = load_images(&[&src]);
    let results = compress_images(
        &images,
        &CompressionSettings::new(50, tmp.path().join("out")),
        &EventLog::new(),
    )
    .unwrap();
    let r = &results[0];
    assert!(r.success);
    assert_eq!(r.original_size, std::fs::metadata(&src).unwrap().len());
    assert_eq!(
        r.compressed_size,
        std::fs::metadata(&r.output_path).unwrap().len()
    );
    assert!(r.compressed_size < r.original_size);
    assert!(r.ratio < 0);
}

#[test]
fn keep_original_policy_never_grows_a_file() {
    let tmp = TempDir::new().unwrap();
    let paths = vec![
        write(&tmp.path().join("src"), "a.png", &png(64, 64)),
        write(&tmp.path().join("src"), "b.gif", &gif(12, 12, 2)),
    ];
    let images = load_images(&paths);
    let settings = CompressionSettings::new(100, tmp.path().join("out"))
        .with_oversize_policy(OversizePolicy::KeepOriginal);
    let results = compress_images(&images, &settings, &EventLog::new()).unwrap();
    for r in &results {
        assert!(r.success, "{:?}", r.error);
        assert!(r.compressed_size <= r.original_size);
        assert!(r.ratio <= 0);
    }
}

// =========================================================================
// Determinism
// =========================================================================

#[test]
fn identical_inputs_give_identical_outputs() {
    let tmp = TempDir::new().unwrap();
    let bytes = jpeg(100, 70);
    let a = write(&tmp.path().join("a"), "same.jpg", &bytes);
    let b = write(&tmp.path().join("b"), "same.jpg", &bytes);

    let run = |src: &Path, out: PathBuf| {
        let images = load_images(&[src]);
        let results = compress_images(&images, &CompressionSettings::new(72, out), &EventLog::new())
            .unwrap();
        std::fs::read(&results[0].output_path).unwrap()
    };
    let first = run(&a, tmp.path().join("out-a"));
    let second = run(&b, tmp.path().join("out-b"));
    assert_eq!(first, second);
}

// =========================================================================
// Batch-fatal errors
// =========================================================================

#[test]
fn quality_over_100_fails_the_batch() {
    let tmp = TempDir::new().unwrap();
    let src = write(&tmp.path().join("src"), "a.jpg", &jpeg(8, 8));
    let images = load_images(&[src]);
    let log = EventLog::new();
    let result = compress_images(&images, &CompressionSettings::new(101, tmp.path()), &log);
    assert!(matches!(result, Err(BatchError::InvalidSettings(_))));
    assert!(log.events().is_empty());
}

#[test]
fn output_dir_that_is_a_file_fails_the_batch() {
    let tmp = TempDir::new().unwrap();
    let src = write(&tmp.path().join("src"), "a.jpg", &jpeg(8, 8));
    let blocker = write(tmp.path(), "blocker", b"not a dir");
    let images = load_images(&[src]);
    let log = EventLog::new();
    let result = compress_images(&images, &CompressionSettings::new(80, &blocker), &log);
    assert!(matches!(result, Err(BatchError::OutputDir(_))));
    assert!(log.events().is_empty());
}

// =========================================================================
// Runner reuse
// =========================================================================

#[test]
fn one_runner_serves_several_batches() {
    let tmp = TempDir::new().unwrap();
    let runner = Runner::new(2).unwrap();
    assert_eq!(runner.workers(), 2);
    let src = write(&tmp.path().join("src"), "x.png", &png(10, 10));
    let images = load_images(&[src]);
    let settings = CompressionSettings::new(85, tmp.path().join("out"));

    let first = runner.run(&images, &settings, &EventLog::new()).unwrap();
    let second = runner.run(&images, &settings, &EventLog::new()).unwrap();
    assert!(first[0].success && second[0].success);
    assert_ne!(first[0].output_path, second[0].output_path);
}
