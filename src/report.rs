//! Machine-readable run report.
//!
//! After an `upscale` run the CLI writes `report.json` next to the outputs:
//! one record per item with its status, effective settings, dimensions and
//! analysis, plus the status counts and the bundle name if one was built.
//!
//! ```json
//! {
//!   "date": "2026-10-16",
//!   "summary": { "idle": 0, "processing": 0, "completed": 2, "error": 1 },
//!   "bundle": "batch-upscale_2026-10-16.zip",
//!   "items": [
//!     {
//!       "id": 1,
//!       "name": "logo.png",
//!       "format": "image/png",
//!       "status": "completed",
//!       "settings": { "upscale_factor": 4, "target_density": 300, ... },
//!       "source_dimensions": { "width": 16, "height": 16 },
//!       "output": { "dimensions": { "width": 64, "height": 64 }, ... }
//!     }
//!   ]
//! }
//! ```

use crate::analysis::Analysis;
use crate::batch::{Batch, Item, ItemId, StatusKind, Summary};
use crate::imaging::Dimensions;
use crate::settings::{Density, Settings};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub date: NaiveDate,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<&'a str>,
    pub items: Vec<ItemReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ItemReport<'a> {
    pub id: ItemId,
    pub name: &'a str,
    pub format: &'static str,
    pub status: StatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    pub settings: Settings,
    pub source_dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputReport<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<&'a Analysis>,
}

#[derive(Debug, Serialize)]
pub struct OutputReport<'a> {
    pub dimensions: Dimensions,
    pub density: Density,
    pub density_written: bool,
    /// Absent when the output was kept in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a Path>,
}

impl<'a> RunReport<'a> {
    pub fn from_batch(batch: &'a Batch, date: NaiveDate, bundle: Option<&'a str>) -> Self {
        Self {
            date,
            summary: batch.summary(),
            bundle,
            items: batch.items().iter().map(ItemReport::from_item).collect(),
        }
    }
}

impl<'a> ItemReport<'a> {
    fn from_item(item: &'a Item) -> Self {
        Self {
            id: item.id,
            name: &item.name,
            format: item.format.to_mime_type(),
            status: item.status.kind(),
            error: item.status.error(),
            settings: item.settings,
            source_dimensions: item.dimensions,
            output: item.output().map(|o| OutputReport {
                dimensions: o.dimensions,
                density: o.density,
                density_written: o.density_written,
                path: o.data.path().map(|p| p.as_path()),
            }),
            analysis: item.analysis.as_ref(),
        }
    }
}
