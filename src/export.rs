//! Bundle every completed output into one downloadable archive.
//!
//! The archive format sits behind [`BundleSink`] (ordered `(name, bytes)`
//! pairs in, one blob out) so export logic is testable without a real
//! archiver. [`ZipSink`] is the shipped sink.
//!
//! ## Rules
//!
//! - Only `Completed` items with an output are exported, in batch order.
//! - Entry names follow [`naming::output_filename`]; collisions get `-2`, `-3`, ...
//! - Zero eligible items is a no-op: `Ok(None)`, nothing is built.
//! - If any output cannot be fetched the export fails as a whole. No partial
//!   bundle is produced and no item is modified.
//! - One export at a time per exporter; a second concurrent call gets
//!   [`ExportError::Busy`].

use crate::batch::Item;
use crate::naming::{self, UniqueNames};
use chrono::NaiveDate;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
#[error("bundle failed: {0}")]
pub struct BundleError(pub String);

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("could not read output of {item}: {source}")]
    Fetch {
        item: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("an export is already running")]
    Busy,
}

/// Ordered `(name, bytes)` entries → one archive blob.
pub trait BundleSink {
    fn bundle(&self, entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, BundleError>;
}

/// Zip archive with stored (uncompressed) entries. PNG payloads are already
/// deflated; compressing them again gains nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipSink;

impl BundleSink for ZipSink {
    fn bundle(&self, entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, BundleError> {
        let zip_err = |e: zip::result::ZipError| BundleError(e.to_string());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in entries {
            zip.start_file(name.as_str(), options).map_err(zip_err)?;
            zip.write_all(bytes)
                .map_err(|e| BundleError(e.to_string()))?;
        }
        Ok(zip.finish().map_err(zip_err)?.into_inner())
    }
}

/// A finished bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// `<prefix>_<YYYY-MM-DD>.zip`
    pub name: String,
    pub bytes: Vec<u8>,
    /// Entry names, in archive order.
    pub entries: Vec<String>,
}

pub struct ArchiveExporter<S: BundleSink> {
    sink: S,
    file_suffix: String,
    bundle_prefix: String,
    busy: AtomicBool,
}

/// Clears the busy flag when an export ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ArchiveExporter<ZipSink> {
    pub fn zip(file_suffix: impl Into<String>, bundle_prefix: impl Into<String>) -> Self {
        Self::new(ZipSink, file_suffix, bundle_prefix)
    }
}

impl<S: BundleSink> ArchiveExporter<S> {
    pub fn new(sink: S, file_suffix: impl Into<String>, bundle_prefix: impl Into<String>) -> Self {
        Self {
            sink,
            file_suffix: file_suffix.into(),
            bundle_prefix: bundle_prefix.into(),
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Export the completed items. `date` stamps the bundle name.
    pub fn export(&self, items: &[Item], date: NaiveDate) -> Result<Option<Bundle>, ExportError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ExportError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let mut names = UniqueNames::new();
        let mut entries = Vec::new();
        for item in items {
            let Some(output) = item.output() else {
                continue;
            };
            let bytes = output.data.fetch().map_err(|source| ExportError::Fetch {
                item: item.name.clone(),
                source,
            })?;
            let name = names.claim(naming::output_filename(&item.name, &self.file_suffix));
            entries.push((name, bytes.into_owned()));
        }
        if entries.is_empty() {
            return Ok(None);
        }

        let bytes = self.sink.bundle(&entries)?;
        Ok(Some(Bundle {
            name: naming::bundle_filename(&self.bundle_prefix, date),
            bytes,
            entries: entries.into_iter().map(|(name, _)| name).collect(),
        }))
    }
}
