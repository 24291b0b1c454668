//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (PNG, JPEG, WebP) | `image` crate (pure Rust decoders) |
//! | Resample | [`resample::upscale`](super::resample::upscale) (`imageops::resize`, premultiplied f32) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//!
//! Output is always PNG. Factor 1 writes the decoded source in its own color
//! type. Upscaled output is RGBA when the source had alpha and RGB
//! otherwise, at 16 bits per channel for 16-bit sources and 8 for the rest.

use super::backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
use super::calculations::{exceeds_pixel_budget, upscaled_dimensions};
use super::params::UpscaleParams;
use super::resample;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Accepted source families, by extension.
const SOURCE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("png", ImageFormat::Png),
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("webp", ImageFormat::WebP),
];

/// Decide whether a submitted file is an accepted raster.
///
/// Content sniffing wins: a GIF named `.png` is rejected. When the bytes are
/// not recognizable at all the extension decides, so a corrupt `.png` is
/// admitted and later fails to decode as a normal item error.
pub fn detect_source_format(name: &str, bytes: &[u8]) -> Option<ImageFormat> {
    let accepted = |fmt: ImageFormat| SOURCE_CANDIDATES.iter().any(|(_, f)| *f == fmt);
    match image::guess_format(bytes) {
        Ok(fmt) if accepted(fmt) => Some(fmt),
        Ok(_) => None,
        Err(_) => {
            let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
            SOURCE_CANDIDATES
                .iter()
                .find(|(candidate, _)| *candidate == ext)
                .map(|(_, fmt)| *fmt)
        }
    }
}

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<Dimensions, BackendError> {
    if width == 0 || height == 0 {
        return Err(BackendError::Decode(format!(
            "source has zero dimension ({width}x{height})"
        )));
    }
    Ok(Dimensions { width, height })
}

/// Decode an image from memory.
fn load_image(source: &[u8]) -> Result<DynamicImage, BackendError> {
    let img = image::load_from_memory(source).map_err(|e| BackendError::Decode(e.to_string()))?;
    check_dimensions(img.width(), img.height())?;
    Ok(img)
}

/// Encode as PNG in the image's own color type. The encoder is lossless.
fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
        .map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Bring a resampled raster back to the source's depth: 16 bits per channel
/// for deep sources, 8 otherwise, with alpha only when the source had it.
fn match_source_layout(source: ColorType, img: &DynamicImage) -> DynamicImage {
    let deep = source.bits_per_pixel() / u16::from(source.channel_count()) > 8;
    match (source.has_alpha(), deep) {
        (true, true) => DynamicImage::ImageRgba16(img.to_rgba16()),
        (false, true) => DynamicImage::ImageRgb16(img.to_rgb16()),
        (true, false) => DynamicImage::ImageRgba8(img.to_rgba8()),
        (false, false) => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| BackendError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        check_dimensions(width, height)
    }

    fn upscale(&self, params: &UpscaleParams) -> Result<EncodedImage, BackendError> {
        let img = load_image(params.source)?;
        let factor = params.factor.get();
        let (width, height) = upscaled_dimensions((img.width(), img.height()), factor).ok_or(
            BackendError::OutputTooLarge {
                width: img.width() as u64 * factor as u64,
                height: img.height() as u64 * factor as u64,
                limit: params.max_output_pixels.unwrap_or(u64::MAX),
            },
        )?;
        if exceeds_pixel_budget((width as u64, height as u64), params.max_output_pixels) {
            return Err(BackendError::OutputTooLarge {
                width: width as u64,
                height: height as u64,
                limit: params.max_output_pixels.unwrap_or(u64::MAX),
            });
        }

        let output = if params.factor.is_passthrough() {
            img
        } else {
            let resampled = resample::upscale(&img.to_rgba32f(), params.factor, params.kernel);
            match_source_layout(img.color(), &DynamicImage::ImageRgba32F(resampled))
        };
        Ok(EncodedImage {
            bytes: encode_png(&output)?,
            dimensions: Dimensions { width, height },
        })
    }
}
