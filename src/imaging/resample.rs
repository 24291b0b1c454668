//! Alpha-aware upscaling on top of `image::imageops::resize`.
//!
//! Color is interpolated on premultiplied samples, so a source pixel's color
//! contributes in proportion to its alpha. Whatever RGB happens to sit under a
//! fully transparent pixel (often black, sometimes garbage) never tints the
//! opaque pixels next to it.
//!
//! After interpolation a transparency mask is applied: every output pixel
//! whose source cell had alpha 0 is written as fully transparent. Kernels
//! with negative lobes would otherwise spread a little opacity into
//! transparent areas.
//!
//! Work happens on `Rgba32FImage`, so 16-bit sources keep their precision
//! until the encoder picks the output depth.

use super::params::Kernel;
use crate::settings::UpscaleFactor;
use image::imageops::{self, FilterType};
use image::Rgba32FImage;
use rayon::prelude::*;

impl Kernel {
    /// Filter handed to `imageops::resize`.
    pub fn filter(self) -> FilterType {
        match self {
            Kernel::Sharp => FilterType::Nearest,
            Kernel::Smooth => FilterType::CatmullRom,
        }
    }
}

fn premultiply(src: &Rgba32FImage) -> Rgba32FImage {
    let mut pm = src.clone();
    let samples: &mut [f32] = &mut pm;
    samples.par_chunks_mut(4).for_each(|p| {
        let a = p[3];
        p[0] *= a;
        p[1] *= a;
        p[2] *= a;
    });
    pm
}

fn unpremultiply(p: &mut [f32]) {
    let a = p[3].clamp(0.0, 1.0);
    if a <= 0.0 {
        p.fill(0.0);
        return;
    }
    for c in &mut p[..3] {
        *c = (*c / a).clamp(0.0, 1.0);
    }
    p[3] = a;
}

/// Upscale `src` by `factor` with the given kernel.
///
/// Factor 1 returns an unmodified copy. `src` must have non-zero dimensions;
/// callers reject empty rasters before getting here.
pub fn upscale(src: &Rgba32FImage, factor: UpscaleFactor, kernel: Kernel) -> Rgba32FImage {
    if factor.is_passthrough() {
        return src.clone();
    }
    let f = factor.get();
    let (dw, dh) = (src.width() * f, src.height() * f);

    let mut out = imageops::resize(&premultiply(src), dw, dh, kernel.filter());

    let row_len = dw as usize * 4;
    let samples: &mut [f32] = &mut out;
    samples
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let src_y = y as u32 / f;
            for (x, p) in row.chunks_mut(4).enumerate() {
                if src.get_pixel(x as u32 / f, src_y)[3] == 0.0 {
                    p.fill(0.0);
                } else {
                    unpremultiply(p);
                }
            }
        });
    out
}
