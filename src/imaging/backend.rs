//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify (read dimensions without a full decode) and upscale
//! (decode, resample, encode).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust with no system
//! libraries. Tests use the recording `MockBackend`.

use super::params::UpscaleParams;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// Unreadable, corrupt, or zero-dimension source.
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Output {width}x{height} exceeds the limit of {limit} pixels")]
    OutputTooLarge { width: u64, height: u64, limit: u64 },
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An encoded output image and its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Trait for image processing backends.
///
/// `Sync` so one backend can serve rayon workers during dimension probes.
pub trait ImageBackend: Sync {
    /// Read pixel dimensions from the container header.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode, resample and encode one image.
    fn upscale(&self, params: &UpscaleParams) -> Result<EncodedImage, BackendError>;
}
