//! Batch compression: the job runner.
//!
//! Takes a list of [`ImageDescriptor`]s plus one [`CompressionSettings`] and
//! pushes every item through the same pipeline:
//!
//! ```text
//! read → detect → decode → encode → oversize policy → write → emit
//! ```
//!
//! ## Workers
//!
//! A [`Runner`] with `N` workers starts at most `N` item threads per batch.
//! Each one takes the next unclaimed descriptor, runs it to completion, then
//! takes another, so no more than `N` items ever hold decoded pixels at
//! once. The codec work of every item runs inside the runner's own rayon
//! pool of `N` threads; a codec that splits its work with rayon (GIF frames)
//! shares those threads and can never pull a further item into memory.
//!
//! ## Item Lifecycle
//!
//! ```text
//! Queued ──▶ Running ──▶ Succeeded
//!    │          │
//!    └──────────┴──────▶ Failed
//! ```
//!
//! `Queued → Failed` happens only for items that were still waiting when the
//! batch was cancelled; they emit no events. Every item that runs emits
//! `start` and then exactly one of `complete` / `error`.
//!
//! ## Failure Isolation
//!
//! Each item runs under `catch_unwind`, so a codec panic becomes a failed
//! result for that item only. Nothing is retried.
//!
//! ## Batch-Fatal Errors
//!
//! Invalid quality, an unusable output directory, or workers that cannot be
//! started fail the whole call before any worker starts ([`BatchError`]). An
//! empty batch returns immediately with no events.
//!
//! ## Ordering
//!
//! Events stream in completion order. The returned list is in submission
//! order with exactly one entry per descriptor.
//!
//! Descriptor ids are expected to be unique. Duplicates are not detected:
//! each descriptor is still processed on its own and gets its own result,
//! but their events carry the same id and cannot be told apart.

use crate::config::{ProcessingConfig, effective_workers};
use crate::events::{EventSink, LifecycleEvent};
use crate::imaging::{CodecError, CodecSet, FormatError, Quality, detect};
use crate::imaging::format::with_extension_hint;
use crate::types::{CompressionResult, CompressionSettings, ImageDescriptor, OversizePolicy};
use crate::writer::{OutputWriter, WriteError, WrittenFile};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error message for items skipped by cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled before start";

/// Per-item failure. Converted to a failed [`CompressionResult`] at the
/// worker boundary; never propagated out of a batch.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Output(#[from] WriteError),
    #[error("codec panicked: {0}")]
    Panicked(String),
}

/// Failure of the batch as a whole.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    OutputDir(#[from] WriteError),
    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("cannot start item threads: {0}")]
    Spawn(std::io::Error),
}

/// Where an item is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Queued, Phase::Running)
                | (Phase::Queued, Phase::Failed)
                | (Phase::Running, Phase::Succeeded)
                | (Phase::Running, Phase::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

/// Runner-owned record for one item.
#[derive(Debug)]
pub struct JobState<'a> {
    pub descriptor: &'a ImageDescriptor,
    pub phase: Phase,
    pub result: Option<CompressionResult>,
}

impl<'a> JobState<'a> {
    pub fn new(descriptor: &'a ImageDescriptor) -> Self {
        Self {
            descriptor,
            phase: Phase::Queued,
            result: None,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        self.phase = next;
    }

    /// Record the terminal result and hand it back.
    fn finish(mut self, result: CompressionResult) -> CompressionResult {
        self.advance(if result.success {
            Phase::Succeeded
        } else {
            Phase::Failed
        });
        self.result = Some(result.clone());
        result
    }
}

/// Cooperative cancellation flag shared between the caller and the runner.
///
/// Items that have not started when the flag is observed are skipped;
/// in-flight items run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a worker needs for one batch.
struct BatchContext<'a> {
    quality: Quality,
    policy: OversizePolicy,
    writer: OutputWriter,
    sink: &'a dyn EventSink,
    cancel: &'a CancelToken,
    dropped_events: AtomicUsize,
}

impl BatchContext<'_> {
    fn emit(&self, event: LifecycleEvent) {
        if let Err(e) = self.sink.emit(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "lifecycle event dropped");
        }
    }
}

/// A fixed number of workers plus the codecs they dispatch to.
///
/// Building the codec pool is the expensive part; keep a `Runner` around to
/// run several batches.
pub struct Runner {
    pool: rayon::ThreadPool,
    workers: usize,
    codecs: CodecSet,
}

impl Runner {
    /// A runner that keeps at most `workers` items (at least one) in flight,
    /// with a codec pool of the same size.
    pub fn new(workers: usize) -> Result<Self, BatchError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("picslim-codec-{i}"))
            .build()?;
        Ok(Self {
            pool,
            workers,
            codecs: CodecSet::builtin(),
        })
    }

    /// A runner sized from the processing config.
    pub fn from_config(processing: &ProcessingConfig) -> Result<Self, BatchError> {
        Self::new(effective_workers(processing))
    }

    /// Replace the codec set (tests use this to inject mocks).
    pub fn with_codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Compress every descriptor. See the [module docs](self).
    ///
    /// Ids must be unique within `images`. A repeated id is a caller error
    /// that is not rejected: every descriptor is still processed on its own
    /// and gets its own result in submission order.
    pub fn run(
        &self,
        images: &[ImageDescriptor],
        settings: &CompressionSettings,
        sink: &dyn EventSink,
    ) -> Result<Vec<CompressionResult>, BatchError> {
        self.run_with_cancel(images, settings, sink, &CancelToken::new())
    }

    /// [`run`](Self::run) with a cancellation token.
    pub fn run_with_cancel(
        &self,
        images: &[ImageDescriptor],
        settings: &CompressionSettings,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<Vec<CompressionResult>, BatchError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let quality = settings
            .validated_quality()
            .map_err(BatchError::InvalidSettings)?;
        let writer = OutputWriter::prepare(&settings.output_dir)?;
        info!(
            items = images.len(),
            workers = self.workers,
            quality = quality.value(),
            output = %writer.root().display(),
            "starting batch"
        );

        let ctx = BatchContext {
            quality,
            policy: settings.oversize_policy,
            writer,
            sink,
            cancel,
            dropped_events: AtomicUsize::new(0),
        };

        let started = Instant::now();
        let next = AtomicUsize::new(0);
        let mut slots: Vec<Option<CompressionResult>> = vec![None; images.len()];
        std::thread::scope(|scope| -> Result<(), BatchError> {
            let mut handles = Vec::with_capacity(self.workers);
            for i in 0..self.workers.min(images.len()) {
                let spawned = std::thread::Builder::new()
                    .name(format!("picslim-item-{i}"))
                    .spawn_scoped(scope, || self.drain(images, &next, &ctx));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) if handles.is_empty() => return Err(BatchError::Spawn(e)),
                    Err(e) => {
                        warn!(error = %e, started = handles.len(), "continuing with fewer item threads");
                        break;
                    }
                }
            }
            for handle in handles {
                match handle.join() {
                    Ok(done) => {
                        for (index, result) in done {
                            slots[index] = Some(result);
                        }
                    }
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
            Ok(())
        })?;
        let results: Vec<CompressionResult> = slots
            .into_iter()
            .zip(images)
            .map(|(slot, d)| {
                slot.unwrap_or_else(|| {
                    CompressionResult::failure(&d.id, d.size, "item was never claimed by a worker")
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        let dropped = ctx.dropped_events.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "some lifecycle events could not be delivered");
        }
        Ok(results)
    }

    /// Claim descriptors off the shared cursor until none are left.
    fn drain(
        &self,
        images: &[ImageDescriptor],
        next: &AtomicUsize,
        ctx: &BatchContext<'_>,
    ) -> Vec<(usize, CompressionResult)> {
        let mut done = Vec::new();
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(descriptor) = images.get(index) else {
                return done;
            };
            done.push((index, self.run_item(descriptor, ctx)));
        }
    }

    fn run_item(&self, descriptor: &ImageDescriptor, ctx: &BatchContext<'_>) -> CompressionResult {
        let job = JobState::new(descriptor);
        if ctx.cancel.is_cancelled() {
            debug!(id = %descriptor.id, "skipped by cancellation");
            return job.finish(CompressionResult::failure(
                &descriptor.id,
                descriptor.size,
                CANCELLED_MESSAGE,
            ));
        }

        let mut job = job;
        job.advance(Phase::Running);
        ctx.emit(LifecycleEvent::start(&descriptor.id));

        let result = match std::fs::read(&descriptor.path) {
            Err(source) => {
                let err = ItemError::Read {
                    path: descriptor.path.clone(),
                    source,
                };
                CompressionResult::failure(&descriptor.id, descriptor.size, err.to_string())
            }
            Ok(bytes) => {
                let original = bytes.len() as u64;
                let outcome = self
                    .pool
                    .install(|| catch_unwind(AssertUnwindSafe(|| self.compress(descriptor, &bytes, ctx))))
                    .unwrap_or_else(|payload| Err(ItemError::Panicked(panic_message(&*payload))));
                match outcome {
                    Ok(written) => CompressionResult::success(
                        &descriptor.id,
                        original,
                        written.size,
                        written.path.to_string_lossy(),
                    ),
                    Err(err) => {
                        debug!(id = %descriptor.id, error = %err, "item failed");
                        CompressionResult::failure(&descriptor.id, original, err.to_string())
                    }
                }
            }
        };

        let result = job.finish(result);
        ctx.emit(LifecycleEvent::finished(result.clone()));
        result
    }

    fn compress(
        &self,
        descriptor: &ImageDescriptor,
        bytes: &[u8],
        ctx: &BatchContext<'_>,
    ) -> Result<WrittenFile, ItemError> {
        if bytes.is_empty() {
            return Err(CodecError::Decode("source file is empty".into()).into());
        }
        let format = detect(bytes).map_err(|e| with_extension_hint(e, &descriptor.path))?;
        if format != descriptor.format {
            debug!(id = %descriptor.id, declared = %descriptor.format, detected = %format, "format changed since load");
        }

        let codec = self.codecs.get(format);
        let decoded = codec.decode(bytes)?;
        let (width, height) = decoded.dimensions();
        debug!(id = %descriptor.id, %format, width, height, "decoded");
        let encoded = codec.encode(&decoded, ctx.quality)?;

        let payload = match ctx.policy {
            OversizePolicy::KeepOriginal if encoded.len() >= bytes.len() => {
                debug!(id = %descriptor.id, encoded = encoded.len(), original = bytes.len(), "keeping original bytes");
                bytes
            }
            _ => &encoded[..],
        };
        Ok(ctx.writer.write(payload, &descriptor.name, format)?)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
