//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Upscale** | `image::imageops::resize` on premultiplied `Rgba32FImage` (Nearest or CatmullRom) |
//! | **Encode** | lossless PNG, 8 or 16 bits per channel following the source |
//! | **Density** | PNG `pHYs` / JPEG JFIF, metadata-only rewrite |
//!
//! The module is split into:
//! - **Calculations**: pure functions for dimension math and the pixel budget (unit testable)
//! - **Parameters**: data structures describing one upscale
//! - **Resample**: the pixel pass itself
//! - **Density**: container-level metadata edits
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod density;
mod params;
pub mod resample;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
pub use density::{DensityOutcome, read_density, write_density};
pub use params::{Kernel, UpscaleParams};
pub use rust_backend::{RustBackend, detect_source_format};
