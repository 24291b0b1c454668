//! Input-directory intake.
//!
//! Turns every file in the input directory into a [`Submission`] and collects
//! per-image settings sidecars. Only files whose header looks like an
//! accepted image are read in full; anything else is submitted with just its
//! first [`SNIFF_LEN`] bytes, so [`Batch::submit`] still reports it as
//! rejected without a large non-image file ever being loaded.
//!
//! ## Directory Layout
//!
//! ```text
//! input/
//! ├── config.toml              # Batch configuration (optional, not submitted)
//! ├── logo.png
//! ├── logo.upscale.toml        # Per-image overrides for logo.png
//! ├── hero.webp
//! └── scans/                   # Only read with --recursive
//!     └── page-1.jpg
//! ```
//!
//! ## Sidecars
//!
//! `<stem>.upscale.toml` holds a sparse [`SettingsPatch`]:
//!
//! ```toml
//! upscale_factor = 8
//! preserve_style = false
//! ```
//!
//! It applies to the image with the same stem in the same directory, while
//! that item is still idle. Hidden files are skipped.

use crate::batch::{Batch, ItemId, Submission};
use crate::imaging::detect_source_format;
use crate::settings::SettingsPatch;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const SIDECAR_SUFFIX: &str = ".upscale.toml";
const CONFIG_FILE: &str = "config.toml";
/// Covers every signature `image::guess_format` recognizes.
pub const SNIFF_LEN: u64 = 32;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not walk input directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid sidecar {path}: {source}")]
    Sidecar {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything read from an input directory.
#[derive(Debug, Default)]
pub struct Intake {
    /// Files in path order. Names are relative to the input root.
    pub submissions: Vec<Submission>,
    /// Sidecar patches keyed by relative path without extension.
    pub sidecars: BTreeMap<String, SettingsPatch>,
}

impl Intake {
    pub fn sidecar_for(&self, name: &str) -> Option<&SettingsPatch> {
        self.sidecars.get(strip_extension(name))
    }

    /// Apply sidecar overrides to freshly submitted items.
    ///
    /// Returns how many items received an override.
    pub fn apply_sidecars(&self, batch: &mut Batch, ids: &[ItemId]) -> usize {
        let mut applied = 0;
        for &id in ids {
            let Some(patch) = batch.get(id).and_then(|item| self.sidecar_for(&item.name)) else {
                continue;
            };
            match batch.apply_item_settings(id, patch) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!(item = %id, error = %e, "sidecar not applied"),
            }
        }
        applied
    }
}

/// Read the input directory. With `recursive`, subdirectories are included.
pub fn scan(root: &Path, recursive: bool) -> Result<Intake, ScanError> {
    let mut intake = Intake::default();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref()));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = relative_name(root, entry.path());
        if name == CONFIG_FILE {
            continue;
        }
        if let Some(key) = name.strip_suffix(SIDECAR_SUFFIX) {
            let content = fs::read_to_string(entry.path())?;
            let patch: SettingsPatch =
                toml::from_str(&content).map_err(|source| ScanError::Sidecar {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
            intake.sidecars.insert(key.to_string(), patch);
            continue;
        }
        intake.submissions.push(Submission {
            bytes: read_candidate(entry.path(), &name)?,
            name,
        });
    }

    for key in intake.sidecars.keys() {
        if !intake
            .submissions
            .iter()
            .any(|s| strip_extension(&s.name) == key)
        {
            tracing::warn!(sidecar = %key, "sidecar has no matching image");
        }
    }
    Ok(intake)
}

/// Whole file for accepted images, header only for everything else.
fn read_candidate(path: &Path, name: &str) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    (&mut file).take(SNIFF_LEN).read_to_end(&mut bytes)?;
    if detect_source_format(name, &bytes).is_none() {
        tracing::debug!(file = %name, "not an accepted image, read header only");
        return Ok(bytes);
    }
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Path relative to the input root, `/`-separated.
fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop the last extension of the final path component.
fn strip_extension(name: &str) -> &str {
    let base_start = name.rfind('/').map(|p| p + 1).unwrap_or(0);
    match name[base_start..].rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..base_start + pos],
    }
}
