//! Shared test utilities for the batch-upscale test suite.
//!
//! Builds small synthetic rasters in memory and encodes them to the formats
//! the batch accepts, so tests never depend on fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let sprite = checkerboard_sprite(8, 8);
//! let mut batch = Batch::new(Settings::default(), 20);
//! batch.submit(vec![submission("hero.png", png_bytes(&sprite))]).unwrap();
//! ```

use crate::batch::{Batch, ItemId, Submission};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

// =========================================================================
// Rasters
// =========================================================================

/// A flat-color image.
pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

/// Per-pixel checkerboard of opaque green and fully transparent pixels.
///
/// The transparent pixels carry pure red in their color channels, so any
/// red showing up in an opaque output pixel means hidden color bled through.
pub fn checkerboard_sprite(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([0, 255, 0, 255])
        } else {
            Rgba([255, 0, 0, 0])
        }
    })
}

/// An opaque horizontal gradient; stands in for a photograph.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    })
}

// =========================================================================
// Encoders
// =========================================================================

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

pub fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    encode(DynamicImage::ImageRgba8(img.clone()), ImageFormat::Png)
}

/// 16 bits per channel, RGBA.
pub fn png16_bytes(img: &ImageBuffer<Rgba<u16>, Vec<u16>>) -> Vec<u8> {
    encode(DynamicImage::ImageRgba16(img.clone()), ImageFormat::Png)
}

/// A JPEG gradient. The encoder writes a JFIF APP0 header.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// Lossless WebP.
pub fn webp_bytes(img: &RgbaImage) -> Vec<u8> {
    encode(DynamicImage::ImageRgba8(img.clone()), ImageFormat::WebP)
}

// =========================================================================
// Batch fixtures
// =========================================================================

pub fn submission(name: &str, bytes: impl Into<Vec<u8>>) -> Submission {
    Submission {
        name: name.to_string(),
        bytes: bytes.into(),
    }
}

/// Submit `names` as tiny transparent PNGs and return their ids in order.
pub fn submit_sprites(batch: &mut Batch, names: &[&str]) -> Vec<ItemId> {
    let files = names
        .iter()
        .map(|name| submission(name, png_bytes(&checkerboard_sprite(4, 4))))
        .collect();
    batch.submit(files).unwrap().accepted
}

/// Submit raw byte payloads without format checks mattering to the caller.
///
/// Names get a `.png` extension so unrecognized bytes are still admitted;
/// the mock backend never decodes them.
pub fn submit_raw(batch: &mut Batch, payloads: &[&[u8]]) -> Vec<ItemId> {
    let files = payloads
        .iter()
        .enumerate()
        .map(|(i, bytes)| submission(&format!("item-{i}.png"), *bytes))
        .collect();
    batch.submit(files).unwrap().accepted
}
