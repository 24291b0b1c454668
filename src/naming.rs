//! Filename conventions for exported images and bundles.
//!
//! ## Exported images
//!
//! The original extension is stripped, a fixed marker suffix is appended, and
//! the canonical lossless extension is added:
//! - `logo.png` → `logo_UPSCALED.png`
//! - `photo.final.jpeg` → `photo.final_UPSCALED.png`
//! - `README` → `README_UPSCALED.png`
//!
//! ## Bundles
//!
//! A fixed product prefix plus the ISO calendar date:
//! `batch-upscale_2026-10-16.zip`.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Default marker appended to exported image stems.
pub const DEFAULT_SUFFIX: &str = "_UPSCALED";
/// Default bundle prefix.
pub const DEFAULT_BUNDLE_PREFIX: &str = "batch-upscale";
/// Every output is PNG: lossless and alpha-capable.
pub const OUTPUT_EXTENSION: &str = "png";
pub const BUNDLE_EXTENSION: &str = "zip";

/// Strip the last extension from a filename.
///
/// A leading dot is not an extension separator (`.hidden` keeps its name),
/// and any directory components are dropped.
pub fn file_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(pos) => &base[..pos],
    }
}

/// Export filename for one item.
pub fn output_filename(original: &str, suffix: &str) -> String {
    format!("{}{}.{}", file_stem(original), suffix, OUTPUT_EXTENSION)
}

/// Bundle filename for an export made on `date`.
pub fn bundle_filename(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.{}", prefix, date.format("%Y-%m-%d"), BUNDLE_EXTENSION)
}

/// Hands out names that are unique within one bundle.
///
/// The first claim of a name gets it verbatim; later collisions get `-2`,
/// `-3`, … inserted before the extension.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: String) -> String {
        if self.taken.insert(name.clone()) {
            return name;
        }
        let (stem, ext) = match name.rfind('.') {
            Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
            _ => (name.as_str(), ""),
        };
        let mut n = 2;
        loop {
            let candidate = format!("{stem}-{n}{ext}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_last_extension_only() {
        assert_eq!(file_stem("logo.png"), "logo");
        assert_eq!(file_stem("photo.final.jpeg"), "photo.final");
        assert_eq!(file_stem("README"), "README");
    }

    #[test]
    fn stem_keeps_dotfiles_and_drops_directories() {
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("art/sprites/hero.webp"), "hero");
        assert_eq!(file_stem("C:\\art\\hero.webp"), "hero");
    }

    #[test]
    fn output_name_uses_marker_and_png() {
        assert_eq!(output_filename("logo.png", DEFAULT_SUFFIX), "logo_UPSCALED.png");
        assert_eq!(output_filename("shot.JPG", DEFAULT_SUFFIX), "shot_UPSCALED.png");
        assert_eq!(output_filename("icon.webp", "@4x"), "icon@4x.png");
    }

    #[test]
    fn bundle_name_is_prefix_and_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            bundle_filename(DEFAULT_BUNDLE_PREFIX, date),
            "batch-upscale_2026-03-07.zip"
        );
    }

    #[test]
    fn unique_names_disambiguates_collisions() {
        let mut names = UniqueNames::new();
        assert_eq!(names.claim("a_UPSCALED.png".into()), "a_UPSCALED.png");
        assert_eq!(names.claim("a_UPSCALED.png".into()), "a_UPSCALED-2.png");
        assert_eq!(names.claim("a_UPSCALED.png".into()), "a_UPSCALED-3.png");
        assert_eq!(names.claim("b_UPSCALED.png".into()), "b_UPSCALED.png");
    }

    #[test]
    fn unique_names_without_extension() {
        let mut names = UniqueNames::new();
        assert_eq!(names.claim("x".into()), "x");
        assert_eq!(names.claim("x".into()), "x-2");
    }
}
