//! Pure calculation functions for upscaling.
//!
//! Pure and testable without any I/O or images: target dimensions and the
//! pixel budget.

/// Output dimensions for `source` scaled by `factor`, or `None` on overflow.
pub fn upscaled_dimensions(source: (u32, u32), factor: u32) -> Option<(u32, u32)> {
    Some((source.0.checked_mul(factor)?, source.1.checked_mul(factor)?))
}

/// Whether an output of `dims` is over `limit` total pixels.
pub fn exceeds_pixel_budget(dims: (u64, u64), limit: Option<u64>) -> bool {
    limit.is_some_and(|max| dims.0.saturating_mul(dims.1) > max)
}
