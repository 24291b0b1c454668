//! Batch model: items, their lifecycle, and every mutation the batch allows.
//!
//! A [`Batch`] is the single ordered collection of submitted [`Item`]s. All
//! changes go through `&mut Batch` methods keyed by [`ItemId`], so a reader
//! never sees an item halfway through a status change.
//!
//! ## Lifecycle
//!
//! ```text
//!            begin            complete
//!   Idle ──────────▶ Processing ──────────▶ Completed
//!                       │  ▲
//!                  fail │  │ begin (retry)
//!                       ▼  │
//!                      Error
//! ```
//!
//! [`Status::Completed`] carries the [`Output`]; no other state can hold one.
//!
//! ## Settings propagation
//!
//! [`Batch::apply_batch_settings`] is a one-shot merge over the items that are
//! `Idle` at the moment of the call. Items that have started, finished or
//! failed keep the settings they ran with. There is no live link between the
//! batch defaults and an item's copy.

use crate::analysis::Analysis;
use crate::imaging::{Dimensions, detect_source_format};
use crate::settings::{Density, Settings, SettingsPatch};
use image::ImageFormat;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Default capacity of one batch.
pub const DEFAULT_MAX_ITEMS: usize = 20;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    #[error(
        "batch holds {present} of {max} items; {incoming} more would exceed capacity (nothing was added)"
    )]
    CapacityExceeded {
        present: usize,
        incoming: usize,
        max: usize,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("no item with id {0}")]
    UnknownItem(ItemId),
    #[error("item {0} is not idle; its settings are frozen")]
    NotIdle(ItemId),
    #[error("item {0} is being processed")]
    ItemBusy(ItemId),
    #[error("item {0} cannot start from its current state")]
    NotRunnable(ItemId),
}

/// Stable identifier, unique for the lifetime of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One file offered for submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Where a completed output's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputData {
    InMemory(Vec<u8>),
    /// Already written to disk; the path is a reference, not owned data.
    OnDisk(PathBuf),
}

impl OutputData {
    /// Get the encoded bytes, reading from disk if needed.
    pub fn fetch(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            Self::InMemory(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::OnDisk(path) => std::fs::read(path).map(Cow::Owned),
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::OnDisk(path) => Some(path),
            Self::InMemory(_) => None,
        }
    }
}

/// Result of a successful upscale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub data: OutputData,
    pub dimensions: Dimensions,
    pub density: Density,
    /// False when the container had no density field to set.
    pub density_written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Processing,
    Completed(Output),
    /// Last attempt failed. Retryable.
    Error(String),
}

impl Status {
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Idle => StatusKind::Idle,
            Self::Processing => StatusKind::Processing,
            Self::Completed(_) => StatusKind::Completed,
            Self::Error(_) => StatusKind::Error,
        }
    }

    pub fn output(&self) -> Option<&Output> {
        match self {
            Self::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// One submitted image under batch management.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    /// Original filename as submitted.
    pub name: String,
    pub source: Arc<[u8]>,
    pub format: ImageFormat,
    /// Source dimensions; `None` until a probe resolves.
    pub dimensions: Option<Dimensions>,
    pub settings: Settings,
    pub status: Status,
    pub analysis: Option<Analysis>,
}

impl Item {
    pub fn output(&self) -> Option<&Output> {
        self.status.output()
    }

    /// Eligible for the next batch run.
    pub fn is_runnable(&self) -> bool {
        self.settings.enabled && matches!(self.status, Status::Idle | Status::Error(_))
    }
}

/// Outcome of a submission that was within capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub accepted: Vec<ItemId>,
    /// Files that are not PNG, JPEG or WebP.
    pub rejected: Vec<String>,
}

/// Snapshot handed to the orchestrator when an item starts.
///
/// `settings` is a copy: later setting changes cannot reach a running item.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: ItemId,
    pub name: String,
    pub source: Arc<[u8]>,
    pub settings: Settings,
}

/// A pending dimension probe.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub id: ItemId,
    pub source: Arc<[u8]>,
}

/// Status counts, derived on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub idle: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.idle + self.processing + self.completed + self.error
    }
}

#[derive(Debug)]
pub struct Batch {
    items: Vec<Item>,
    defaults: Settings,
    max_items: usize,
    next_id: u64,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new(Settings::default(), DEFAULT_MAX_ITEMS)
    }
}

impl Batch {
    pub fn new(defaults: Settings, max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            defaults,
            max_items,
            next_id: 1,
        }
    }

    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn get_mut(&mut self, id: ItemId) -> Result<&mut Item, BatchError> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(BatchError::UnknownItem(id))
    }

    /// Admit a set of files.
    ///
    /// Files that are not an accepted raster are skipped and listed in the
    /// report. If the accepted remainder does not fit, nothing is admitted
    /// and the batch is left exactly as it was.
    pub fn submit(&mut self, files: Vec<Submission>) -> Result<SubmitReport, SubmitError> {
        let mut report = SubmitReport::default();
        let mut accepted = Vec::with_capacity(files.len());
        for file in files {
            match detect_source_format(&file.name, &file.bytes) {
                Some(format) => accepted.push((file, format)),
                None => report.rejected.push(file.name),
            }
        }

        if self.items.len() + accepted.len() > self.max_items {
            return Err(SubmitError::CapacityExceeded {
                present: self.items.len(),
                incoming: accepted.len(),
                max: self.max_items,
            });
        }

        for (file, format) in accepted {
            let id = ItemId(self.next_id);
            self.next_id += 1;
            self.items.push(Item {
                id,
                name: file.name,
                source: file.bytes.into(),
                format,
                dimensions: None,
                settings: self.defaults,
                status: Status::Idle,
                analysis: None,
            });
            report.accepted.push(id);
        }
        Ok(report)
    }

    /// Update the batch defaults and every currently idle item.
    ///
    /// Returns how many items picked up the change.
    pub fn apply_batch_settings(&mut self, patch: &SettingsPatch) -> usize {
        self.defaults.apply(patch);
        let mut updated = 0;
        for item in &mut self.items {
            if item.status == Status::Idle {
                item.settings.apply(patch);
                updated += 1;
            }
        }
        updated
    }

    /// Update one idle item's settings, independent of the defaults.
    pub fn apply_item_settings(
        &mut self,
        id: ItemId,
        patch: &SettingsPatch,
    ) -> Result<(), BatchError> {
        let item = self.get_mut(id)?;
        if item.status != Status::Idle {
            return Err(BatchError::NotIdle(id));
        }
        item.settings.apply(patch);
        Ok(())
    }

    /// Remove an item and hand back everything it owned.
    ///
    /// Dropping the returned item releases its source and in-memory output.
    pub fn remove(&mut self, id: ItemId) -> Result<Item, BatchError> {
        let pos = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(BatchError::UnknownItem(id))?;
        if self.items[pos].status == Status::Processing {
            return Err(BatchError::ItemBusy(id));
        }
        Ok(self.items.remove(pos))
    }

    /// Items still waiting for their dimensions.
    pub fn probe_requests(&self) -> Vec<ProbeRequest> {
        self.items
            .iter()
            .filter(|item| item.dimensions.is_none())
            .map(|item| ProbeRequest {
                id: item.id,
                source: Arc::clone(&item.source),
            })
            .collect()
    }

    /// Record probed dimensions.
    ///
    /// Returns false, without error, when the item is gone or already has
    /// dimensions: a late probe never recreates or overwrites anything.
    pub fn apply_dimensions(&mut self, id: ItemId, dimensions: Dimensions) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) if item.dimensions.is_none() => {
                item.dimensions = Some(dimensions);
                true
            }
            _ => false,
        }
    }

    /// Attach analysis text. Returns false if the item is gone.
    pub fn set_analysis(&mut self, id: ItemId, analysis: Analysis) -> bool {
        match self.get_mut(id) {
            Ok(item) => {
                item.analysis = Some(analysis);
                true
            }
            Err(_) => false,
        }
    }

    /// Ids of items the next run will process, in submission order.
    pub fn runnable(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.is_runnable())
            .map(|item| item.id)
            .collect()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for item in &self.items {
            match item.status.kind() {
                StatusKind::Idle => summary.idle += 1,
                StatusKind::Processing => summary.processing += 1,
                StatusKind::Completed => summary.completed += 1,
                StatusKind::Error => summary.error += 1,
            }
        }
        summary
    }

    // =========================================================================
    // Transitions driven by the orchestrator
    // =========================================================================

    /// `Idle | Error → Processing`. Returns the frozen job snapshot.
    pub fn begin(&mut self, id: ItemId) -> Result<Job, BatchError> {
        let item = self.get_mut(id)?;
        if !matches!(item.status, Status::Idle | Status::Error(_)) {
            return Err(BatchError::NotRunnable(id));
        }
        item.status = Status::Processing;
        Ok(Job {
            id,
            name: item.name.clone(),
            source: Arc::clone(&item.source),
            settings: item.settings,
        })
    }

    /// `Processing → Completed`, attaching the output.
    pub fn complete(&mut self, id: ItemId, output: Output) -> Result<(), BatchError> {
        let item = self.get_mut(id)?;
        if item.status != Status::Processing {
            return Err(BatchError::NotRunnable(id));
        }
        item.status = Status::Completed(output);
        Ok(())
    }

    /// `Processing → Error`.
    pub fn fail(&mut self, id: ItemId, message: impl Into<String>) -> Result<(), BatchError> {
        let item = self.get_mut(id)?;
        if item.status != Status::Processing {
            return Err(BatchError::NotRunnable(id));
        }
        item.status = Status::Error(message.into());
        Ok(())
    }
}
