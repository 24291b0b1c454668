//! CLI output formatting for every command.
//!
//! # Item-First Display
//!
//! The primary display for every item is its positional index and original
//! name. Settings, dimensions, output paths and analysis text follow as
//! indented context lines, so the output reads as an inventory of the batch.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Items (3 of 20)
//! 001 logo.png [idle]
//!     Source: image/png, 16x16
//!     Settings: 4x, 300 dpi, sharp
//!     Analysis: Flat vector logo on a transparent background
//! 002 notes.png [idle]
//!     Source: image/png, size unknown
//!     Settings: 4x, 300 dpi, sharp, disabled
//! ```
//!
//! ## Upscale
//!
//! ```text
//! Upscaling 3 images
//! 001 logo.png (4x, 300 dpi, sharp)
//!     64x64 at 300 dpi → upscaled/logo_UPSCALED.png
//! 002 hero.webp (4x, 300 dpi, sharp)
//!     Error: Decode failed: ...
//! Completed 2, failed 1, idle 0
//! Bundle → upscaled/batch-upscale_2026-10-16.zip (2 entries)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions do no I/O.

use crate::batch::{Batch, Item, SubmitReport, Summary};
use crate::export::Bundle;
use crate::imaging::Kernel;
use crate::orchestrator::BatchEvent;
use crate::settings::Settings;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// `7` → `007`. Wider numbers are left alone.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Four spaces per level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// First `max` characters of the analysis text, with `...` when cut.
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `4x, 300 dpi, sharp`, plus `disabled` when the item is switched off.
fn settings_line(settings: &Settings) -> String {
    let mut line = format!(
        "{}, {}, {}",
        settings.upscale_factor,
        settings.target_density,
        Kernel::for_style(settings.preserve_style).name()
    );
    if !settings.enabled {
        line.push_str(", disabled");
    }
    line
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "image" } else { "images" }
}

// ============================================================================
// Submission and item list
// ============================================================================

/// Format the outcome of a submission: accepted count plus rejected files.
pub fn format_submit_report(report: &SubmitReport) -> Vec<String> {
    let accepted = report.accepted.len();
    let mut lines = vec![format!("Accepted {} {}", accepted, plural(accepted))];
    for name in &report.rejected {
        lines.push(format!("{}Skipped {} (not PNG, JPEG or WebP)", indent(1), name));
    }
    lines
}

fn item_lines(index: usize, item: &Item, preview_chars: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} [{}]",
        format_index(index),
        item.name,
        item.status.kind()
    )];
    let size = match item.dimensions {
        Some(d) => format!("{}x{}", d.width, d.height),
        None => "size unknown".to_string(),
    };
    lines.push(format!(
        "{}Source: {}, {}",
        indent(1),
        item.format.to_mime_type(),
        size
    ));
    lines.push(format!("{}Settings: {}", indent(1), settings_line(&item.settings)));
    if let Some(output) = item.output() {
        let location = match output.data.path() {
            Some(path) => path.display().to_string(),
            None => "in memory".to_string(),
        };
        lines.push(format!(
            "{}Output: {}x{} at {}, {}",
            indent(1),
            output.dimensions.width,
            output.dimensions.height,
            output.density,
            location
        ));
    }
    if let Some(message) = item.status.error() {
        lines.push(format!("{}Error: {}", indent(1), message));
    }
    match item.analysis.as_ref().map(|a| a.text()) {
        Some(Some(text)) => lines.push(format!(
            "{}Analysis: {}",
            indent(1),
            preview(text, preview_chars)
        )),
        Some(None) => lines.push(format!("{}Analysis: no analysis available", indent(1))),
        None => {}
    }
    lines
}

/// Format every item in the batch, in submission order.
pub fn format_item_list(batch: &Batch, preview_chars: usize) -> Vec<String> {
    let mut lines = vec![format!("Items ({} of {})", batch.len(), batch.max_items())];
    for (i, item) in batch.items().iter().enumerate() {
        lines.extend(item_lines(i + 1, item, preview_chars));
    }
    lines
}

pub fn print_item_list(batch: &Batch, preview_chars: usize) {
    for line in format_item_list(batch, preview_chars) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch run
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::RunStarted { total } => {
            vec![format!("Upscaling {} {}", total, plural(*total))]
        }
        BatchEvent::ItemStarted {
            index,
            name,
            settings,
            ..
        } => vec![format!(
            "{} {} ({})",
            format_index(*index),
            name,
            settings_line(settings)
        )],
        BatchEvent::ItemCompleted {
            dimensions,
            density,
            density_written,
            path,
            ..
        } => {
            let mut line = format!(
                "{}{}x{} at {}",
                indent(1),
                dimensions.width,
                dimensions.height,
                density
            );
            if !density_written {
                line.push_str(" (density not stored)");
            }
            if let Some(path) = path {
                line.push_str(&format!(" \u{2192} {}", path.display()));
            }
            vec![line]
        }
        BatchEvent::ItemFailed { error, .. } => {
            vec![format!("{}Error: {}", indent(1), error)]
        }
        BatchEvent::Cancelled { remaining } => {
            vec![format!("Cancelled; {} {} not started", remaining, plural(*remaining))]
        }
    }
}

/// Format status counts. Idle includes disabled items.
pub fn format_summary(summary: &Summary) -> Vec<String> {
    vec![format!(
        "Completed {}, failed {}, idle {}",
        summary.completed, summary.error, summary.idle
    )]
}

pub fn print_summary(summary: &Summary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Export
// ============================================================================

/// Format a written bundle and its entries.
pub fn format_bundle(bundle: &Bundle, path: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Bundle \u{2192} {} ({} entries)",
        path.display(),
        bundle.entries.len()
    )];
    for entry in &bundle.entries {
        lines.push(format!("{}{}", indent(1), entry));
    }
    lines
}

pub fn print_bundle(bundle: &Bundle, path: &Path) {
    for line in format_bundle(bundle, path) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
