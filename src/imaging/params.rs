//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the orchestrator (which decides what each item needs)
//! and the [`backend`](super::backend) (which does the pixel work). The
//! separation lets tests swap in a mock backend without touching the batch
//! logic.
//!
//! ## Types
//!
//! - [`Kernel`]: interpolation kernel. Chosen from the `preserve_style` flag.
//! - [`UpscaleParams`]: everything one upscale needs: source bytes, factor, kernel, pixel budget.

use crate::settings::{Settings, UpscaleFactor};

/// Interpolation kernel used to derive new pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// Nearest neighbour: every source pixel becomes a `factor`-sized block.
    /// Flat color, line art and pixel art stay crisp, with no ringing.
    Sharp,
    /// Catmull-Rom cubic. Smooth gradients for photographic content.
    Smooth,
}

impl Kernel {
    pub fn for_style(preserve_style: bool) -> Self {
        if preserve_style {
            Self::Sharp
        } else {
            Self::Smooth
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sharp => "sharp",
            Self::Smooth => "smooth",
        }
    }
}

/// Parameters for one upscale operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpscaleParams<'a> {
    /// Encoded source bytes (PNG, JPEG or WebP).
    pub source: &'a [u8],
    pub factor: UpscaleFactor,
    pub kernel: Kernel,
    /// Upper bound on output pixels; `None` means unbounded.
    pub max_output_pixels: Option<u64>,
}

impl<'a> UpscaleParams<'a> {
    /// Build parameters from an item's frozen settings snapshot.
    pub fn from_settings(
        source: &'a [u8],
        settings: &Settings,
        max_output_pixels: Option<u64>,
    ) -> Self {
        Self {
            source,
            factor: settings.upscale_factor,
            kernel: Kernel::for_style(settings.preserve_style),
            max_output_pixels,
        }
    }
}
