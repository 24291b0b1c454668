//! # Batch Upscale
//!
//! Batch raster upscaling for logos, illustrations and photographs. A batch
//! of PNG, JPEG and WebP files is enlarged by 1x, 2x, 4x or 8x, stamped with a
//! print density, and exported one by one or as a single zip bundle.
//!
//! # Architecture: Item Lifecycle
//!
//! Every submitted image becomes an [`Item`](batch::Item) that moves through
//! a small state machine:
//!
//! ```text
//!          begin             complete
//! Idle ───────────▶ Processing ──────────▶ Completed
//!                     │    ▲
//!                fail │    │ begin (retry)
//!                     ▼    │
//!                     Error
//! ```
//!
//! The [`orchestrator`] drives runnable items through the [`imaging`]
//! backend one at a time. A failure is recorded on the item and the run moves
//! on. [`export`] then bundles whatever completed.
//!
//! ```text
//! 1. Scan       input/       →  submissions + sidecar overrides
//! 2. Submit     submissions  →  Batch (format sniffing, capacity check)
//! 3. Run        Batch        →  upscaled PNGs with density metadata
//! 4. Export     Batch        →  <prefix>_<date>.zip
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`settings`] | Settings vocabulary and the sparse patch merge rule |
//! | [`batch`] | Item model, lifecycle transitions, submission and capacity |
//! | [`orchestrator`] | Sequential batch runs, failure isolation, progress events, dimension probes |
//! | [`imaging`] | Pure-Rust decode, alpha-weighted resampling, PNG encode, density metadata |
//! | [`export`] | Bundle completed outputs through a [`BundleSink`](export::BundleSink) |
//! | [`analysis`] | Optional image description through an external command |
//! | [`scan`] | Input directory intake and per-image sidecar overrides |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`naming`] | Output and bundle filename conventions |
//! | [`report`] | `report.json` written after a run |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Item at a Time
//!
//! Batch runs are sequential: at most one item is `Processing`. An 8x
//! upscale of a 4000x3000 photo is 768 megapixels, so memory is bounded by a
//! single source plus a single output, and the stock pixel budget fails
//! anything past 256 megapixels. The rayon pool is used inside the
//! resampler, across the pixels of that one image.
//!
//! ## Lossless Output Only
//!
//! Every output is PNG, RGBA when the source had an alpha channel and RGB
//! otherwise. Transparency survives and color is never recompressed lossily.
//!
//! ## Settings Are Copied, Not Linked
//!
//! Each item owns a copy of its settings. A batch-wide change is a one-shot
//! merge over the items that are `Idle` at that moment; items that have
//! started keep the settings they ran with. See
//! [`Batch::apply_batch_settings`](batch::Batch::apply_batch_settings).
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resizing and encoding use the `image` crate. The alpha handling
//! around the resize and the density writer are implemented here. No system
//! libraries are needed.

pub mod analysis;
pub mod batch;
pub mod config;
pub mod export;
pub mod imaging;
pub mod naming;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod scan;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_helpers;
