//! Batch runs: drive every runnable item through upscale and density writing.
//!
//! ## Algorithm
//!
//! 1. Collect the items that are `Idle` or `Error` and enabled, in submission order.
//! 2. For each, one at a time:
//!    - transition to `Processing` and take a frozen settings snapshot
//!    - decode, resample and encode through the [`ImageBackend`]
//!    - set the density field on the encoded bytes
//!    - write the result to the output directory, if one is configured
//!    - transition to `Completed` with the output attached, or to `Error`
//! 3. Between items, stop if the [`CancelFlag`] has been raised, either by
//!    another thread or by a failure when `stop_on_failure` is set.
//!
//! A failure is caught at the item boundary: the item goes to `Error` with a
//! generic message, the detailed cause goes to the event channel and the log,
//! and the run moves on. There is no aggregate failure status; callers derive
//! counts from [`Batch::summary`] or the returned [`RunSummary`].
//!
//! ## Memory
//!
//! At most one item is in `Processing` at any time, so peak memory is about
//! one decoded source plus one output raster. An 8x upscale of a modest
//! source is already tens of megapixels, and [`RunOptions::max_output_pixels`]
//! fails anything larger than the budget before it is allocated. Parallelism
//! lives inside the resampler's per-pixel passes, not across items.
//!
//! ## Progress
//!
//! Pass a `Sender<BatchEvent>` to receive one event per state change; the CLI
//! renders them with [`output::format_batch_event`](crate::output::format_batch_event).

use crate::batch::{Batch, Job, Output, OutputData, ProbeRequest};
use crate::config::BatchConfig;
use crate::imaging::{
    BackendError, Dimensions, ImageBackend, RustBackend, UpscaleParams, write_density,
};
use crate::naming::{self, UniqueNames};
use crate::settings::{Density, Settings};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Message stored on an item that failed. The cause is reported separately.
pub const FAILURE_MESSAGE: &str = "Upscaling failed";

#[derive(Error, Debug)]
pub enum RunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-item failure cause. Never escapes a run.
#[derive(Error, Debug)]
enum ItemError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("could not write output: {0}")]
    Write(#[from] std::io::Error),
}

/// Options for one batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Write each output here as it completes. `None` keeps outputs in memory.
    pub output_dir: Option<PathBuf>,
    /// Reject items whose output would exceed this many pixels. Defaults to
    /// the stock `[batch] max_output_megapixels`.
    pub max_output_pixels: Option<u64>,
    /// Marker appended to output file stems.
    pub file_suffix: String,
    /// Raise the run's [`CancelFlag`] on the first failure.
    pub stop_on_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            max_output_pixels: BatchConfig::default().max_output_pixels(),
            file_suffix: naming::DEFAULT_SUFFIX.to_string(),
            stop_on_failure: false,
        }
    }
}

/// Stops a run before its next item. In-flight items always finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
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

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    RunStarted {
        total: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
        name: String,
        settings: Settings,
    },
    ItemCompleted {
        index: usize,
        total: usize,
        name: String,
        dimensions: Dimensions,
        density: Density,
        density_written: bool,
        path: Option<PathBuf>,
    },
    ItemFailed {
        index: usize,
        total: usize,
        name: String,
        error: String,
    },
    Cancelled {
        remaining: usize,
    },
}

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    /// Runnable items left untouched because the run was cancelled.
    pub skipped: usize,
}

pub fn run_batch(
    batch: &mut Batch,
    options: &RunOptions,
    events: Option<Sender<BatchEvent>>,
    cancel: &CancelFlag,
) -> Result<RunSummary, RunError> {
    let backend = RustBackend::new();
    run_batch_with_backend(&backend, batch, options, events, cancel)
}

/// Run a batch using a specific backend (allows testing with mock).
pub fn run_batch_with_backend(
    backend: &impl ImageBackend,
    batch: &mut Batch,
    options: &RunOptions,
    events: Option<Sender<BatchEvent>>,
    cancel: &CancelFlag,
) -> Result<RunSummary, RunError> {
    let emit = |event: BatchEvent| {
        if let Some(tx) = &events {
            tx.send(event).ok();
        }
    };

    if let Some(dir) = &options.output_dir {
        std::fs::create_dir_all(dir)?;
    }
    // Files from earlier runs keep their names.
    let mut names = UniqueNames::new();
    for item in batch.items() {
        if let Some(path) = item.output().and_then(|o| o.data.path()) {
            if let Some(file) = path.file_name().and_then(|f| f.to_str()) {
                names.claim(file.to_string());
            }
        }
    }

    let queue = batch.runnable();
    let total = queue.len();
    let mut summary = RunSummary::default();
    emit(BatchEvent::RunStarted { total });

    for (pos, id) in queue.into_iter().enumerate() {
        if cancel.is_cancelled() {
            summary.skipped = total - pos;
            emit(BatchEvent::Cancelled {
                remaining: summary.skipped,
            });
            break;
        }
        let index = pos + 1;
        let job = match batch.begin(id) {
            Ok(job) => job,
            Err(e) => {
                tracing::debug!(item = %id, error = %e, "skipping item");
                continue;
            }
        };
        emit(BatchEvent::ItemStarted {
            index,
            total,
            name: job.name.clone(),
            settings: job.settings,
        });

        match process_job(backend, &job, options, &mut names) {
            Ok(output) => {
                if job.settings.upscale_factor.is_passthrough() {
                    batch.apply_dimensions(id, output.dimensions);
                }
                let event = BatchEvent::ItemCompleted {
                    index,
                    total,
                    name: job.name.clone(),
                    dimensions: output.dimensions,
                    density: output.density,
                    density_written: output.density_written,
                    path: output.data.path().cloned(),
                };
                if batch.complete(id, output).is_ok() {
                    summary.completed += 1;
                }
                emit(event);
            }
            Err(e) => {
                tracing::warn!(item = %job.name, error = %e, "upscale failed");
                if batch.fail(id, FAILURE_MESSAGE).is_ok() {
                    summary.failed += 1;
                }
                emit(BatchEvent::ItemFailed {
                    index,
                    total,
                    name: job.name.clone(),
                    error: e.to_string(),
                });
                if options.stop_on_failure {
                    cancel.cancel();
                }
            }
        }
    }

    Ok(summary)
}

fn process_job(
    backend: &impl ImageBackend,
    job: &Job,
    options: &RunOptions,
    names: &mut UniqueNames,
) -> Result<Output, ItemError> {
    let params = UpscaleParams::from_settings(&job.source, &job.settings, options.max_output_pixels);
    let encoded = backend.upscale(&params)?;

    let density = job.settings.target_density;
    let written = write_density(encoded.bytes, density);
    let density_written = written.is_written();
    if !density_written {
        tracing::warn!(item = %job.name, "output container has no density field; left unchanged");
    }
    let bytes = written.into_bytes();

    let data = match &options.output_dir {
        Some(dir) => OutputData::OnDisk(write_output(dir, job, &options.file_suffix, names, &bytes)?),
        None => OutputData::InMemory(bytes),
    };
    Ok(Output {
        data,
        dimensions: encoded.dimensions,
        density,
        density_written,
    })
}

fn write_output(
    dir: &Path,
    job: &Job,
    suffix: &str,
    names: &mut UniqueNames,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    let name = names.claim(naming::output_filename(&job.name, suffix));
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

// =============================================================================
// Dimension probes
// =============================================================================

/// Outcome of reading one item's header.
#[derive(Debug)]
pub struct ProbeResult {
    pub request: ProbeRequest,
    pub dimensions: Result<Dimensions, BackendError>,
}

/// Read source dimensions for a set of requests in parallel.
///
/// Takes owned requests so it can run while the batch is being changed
/// elsewhere; results are applied later with [`apply_probes`].
pub fn probe_dimensions(backend: &impl ImageBackend, requests: Vec<ProbeRequest>) -> Vec<ProbeResult> {
    requests
        .into_par_iter()
        .map(|request| {
            let dimensions = backend.identify(&request.source);
            ProbeResult {
                request,
                dimensions,
            }
        })
        .collect()
}

/// Apply probe results by id. Results for removed items are dropped.
///
/// Returns how many items received dimensions.
pub fn apply_probes(batch: &mut Batch, results: Vec<ProbeResult>) -> usize {
    let mut applied = 0;
    for result in results {
        match result.dimensions {
            Ok(dims) => {
                if batch.apply_dimensions(result.request.id, dims) {
                    applied += 1;
                } else {
                    tracing::debug!(item = %result.request.id, "probe result discarded");
                }
            }
            Err(e) => {
                tracing::debug!(item = %result.request.id, error = %e, "probe failed");
            }
        }
    }
    applied
}
