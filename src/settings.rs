//! Per-item upscale settings and the partial-update merge rule.
//!
//! Every item carries its own copy of [`Settings`]. Batch-wide changes and
//! per-item changes are both expressed as a [`SettingsPatch`], a sparse set
//! of overrides, and folded in with [`Settings::apply`]. Which items a patch
//! reaches is decided by [`Batch`](crate::batch::Batch), not here.
//!
//! ## Vocabulary
//!
//! | Field | Values | Meaning |
//! |---|---|---|
//! | `upscale_factor` | 1, 2, 4, 8 | Multiplier on both dimensions (1 = pass-through) |
//! | `target_density` | 72, 150, 300, … | Print DPI written into the output metadata |
//! | `preserve_style` | bool | Sharp, edge-preserving kernel vs. smooth photographic kernel |
//! | `enabled` | bool | Whether the item takes part in batch runs |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("upscale factor must be 1, 2, 4 or 8 (got {0})")]
    InvalidFactor(u32),
    #[error("target density must be positive")]
    ZeroDensity,
    #[error("target density must be at most 65535 dpi (got {0})")]
    DensityTooHigh(u32),
}

/// Integer multiplier applied to both raster dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum UpscaleFactor {
    X1,
    X2,
    X4,
    X8,
}

impl UpscaleFactor {
    pub const ALL: [UpscaleFactor; 4] = [Self::X1, Self::X2, Self::X4, Self::X8];

    pub fn get(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }

    /// Factor 1 skips resampling entirely.
    pub fn is_passthrough(self) -> bool {
        self == Self::X1
    }
}

impl TryFrom<u32> for UpscaleFactor {
    type Error = SettingsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::X1),
            2 => Ok(Self::X2),
            4 => Ok(Self::X4),
            8 => Ok(Self::X8),
            other => Err(SettingsError::InvalidFactor(other)),
        }
    }
}

impl From<UpscaleFactor> for u32 {
    fn from(factor: UpscaleFactor) -> Self {
        factor.get()
    }
}

impl fmt::Display for UpscaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.get())
    }
}

/// Target print density in dots per inch. Independent of pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Density(u32);

impl Density {
    pub const SCREEN: Density = Density(72);
    pub const DRAFT: Density = Density(150);
    pub const PRINT: Density = Density(300);
    /// Largest value a JFIF header can hold. PNG's pixels-per-metre field
    /// round-trips every value up to here exactly.
    pub const MAX: Density = Density(u16::MAX as u32);

    pub fn new(dpi: u32) -> Result<Self, SettingsError> {
        if dpi == 0 {
            return Err(SettingsError::ZeroDensity);
        }
        if dpi > Self::MAX.0 {
            return Err(SettingsError::DensityTooHigh(dpi));
        }
        Ok(Self(dpi))
    }

    pub fn dpi(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Density {
    type Error = SettingsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Density> for u32 {
    fn from(density: Density) -> Self {
        density.0
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dpi", self.0)
    }
}

/// Effective settings for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub upscale_factor: UpscaleFactor,
    pub target_density: Density,
    pub preserve_style: bool,
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upscale_factor: UpscaleFactor::X2,
            target_density: Density::PRINT,
            preserve_style: true,
            enabled: true,
        }
    }
}

impl Settings {
    /// Fold a sparse patch into these settings. Unset fields are left alone.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(factor) = patch.upscale_factor {
            self.upscale_factor = factor;
        }
        if let Some(density) = patch.target_density {
            self.target_density = density;
        }
        if let Some(preserve) = patch.preserve_style {
            self.preserve_style = preserve;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
    }

    pub fn patched(mut self, patch: &SettingsPatch) -> Self {
        self.apply(patch);
        self
    }
}

/// A partial settings update. Also the on-disk shape of per-image sidecars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upscale_factor: Option<UpscaleFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_density: Option<Density>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_style: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn factor(factor: UpscaleFactor) -> Self {
        Self {
            upscale_factor: Some(factor),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_accepts_only_powers_of_two_up_to_eight() {
        for (raw, expected) in [
            (1, UpscaleFactor::X1),
            (2, UpscaleFactor::X2),
            (4, UpscaleFactor::X4),
            (8, UpscaleFactor::X8),
        ] {
            assert_eq!(UpscaleFactor::try_from(raw), Ok(expected));
        }
        assert_eq!(
            UpscaleFactor::try_from(3),
            Err(SettingsError::InvalidFactor(3))
        );
        assert!(UpscaleFactor::try_from(16).is_err());
        assert!(UpscaleFactor::try_from(0).is_err());
    }

    #[test]
    fn only_factor_one_is_passthrough() {
        assert!(UpscaleFactor::X1.is_passthrough());
        assert!(!UpscaleFactor::X8.is_passthrough());
    }

    #[test]
    fn density_rejects_zero() {
        assert_eq!(Density::new(0), Err(SettingsError::ZeroDensity));
        assert_eq!(Density::new(600).unwrap().dpi(), 600);
    }

    #[test]
    fn density_is_bounded_by_what_containers_store() {
        assert_eq!(Density::new(65_535), Ok(Density::MAX));
        assert_eq!(Density::new(65_536), Err(SettingsError::DensityTooHigh(65_536)));
        assert_eq!(Density::new(200_000_000), Err(SettingsError::DensityTooHigh(200_000_000)));
    }

    #[test]
    fn oversized_density_in_toml_is_rejected() {
        let result: Result<SettingsPatch, _> = toml::from_str("target_density = 70000");
        assert!(result.is_err());
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.upscale_factor, UpscaleFactor::X2);
        assert_eq!(s.target_density, Density::PRINT);
        assert!(s.preserve_style);
        assert!(s.enabled);
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut s = Settings::default();
        s.apply(&SettingsPatch {
            target_density: Some(Density::SCREEN),
            ..Default::default()
        });
        assert_eq!(s.target_density, Density::SCREEN);
        assert_eq!(s.upscale_factor, UpscaleFactor::X2);
        assert!(s.preserve_style);
    }

    #[test]
    fn empty_patch_is_noop() {
        let patch = SettingsPatch::default();
        assert!(patch.is_empty());
        assert_eq!(Settings::default().patched(&patch), Settings::default());
    }

    #[test]
    fn patch_parses_from_sparse_toml() {
        let patch: SettingsPatch = toml::from_str("upscale_factor = 8\npreserve_style = false").unwrap();
        assert_eq!(patch.upscale_factor, Some(UpscaleFactor::X8));
        assert_eq!(patch.preserve_style, Some(false));
        assert_eq!(patch.target_density, None);
    }

    #[test]
    fn patch_rejects_bad_factor_and_unknown_keys() {
        assert!(toml::from_str::<SettingsPatch>("upscale_factor = 3").is_err());
        assert!(toml::from_str::<SettingsPatch>("scale = 2").is_err());
    }

    #[test]
    fn settings_serialize_factor_as_integer() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["upscale_factor"], 2);
        assert_eq!(json["target_density"], 300);
    }
}
