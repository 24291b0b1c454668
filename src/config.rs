//! Batch configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; a `config.toml` in the input directory overrides any
//! subset of them.
//!
//! ## Location
//!
//! ```text
//! input/
//! ├── config.toml              # Overrides stock defaults (optional)
//! ├── logo.png
//! └── ...
//! ```
//!
//! ## Keys
//!
//! ```toml
//! # Every key is optional; the values below are the defaults
//!
//! [defaults]                   # Settings every new item starts with
//! upscale_factor = 2           # 1, 2, 4 or 8 (1 = pass-through)
//! target_density = 300         # Print DPI written into the output
//! preserve_style = true        # Sharp kernel for flat art; false = smooth
//! enabled = true               # Items take part in batch runs
//!
//! [batch]
//! max_items = 20               # Submissions beyond this are rejected whole
//! max_output_megapixels = 256  # Per-item output ceiling (0 = unlimited)
//!
//! [export]
//! file_suffix = "_UPSCALED"    # logo.png -> logo_UPSCALED.png
//! bundle_prefix = "batch-upscale"
//!
//! [analysis]
//! command = []                 # e.g. ["describe-image", "--short"]; empty = off
//! preview_chars = 120          # Characters of analysis text shown
//!
//! [processing]
//! max_threads = 4              # Resampler threads (omit for auto = CPU cores)
//! ```
//!
//! ## Sparse Files
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [defaults]
//! upscale_factor = 4
//! ```
//!
//! A misspelled key is an error, never silently ignored.

use crate::batch::DEFAULT_MAX_ITEMS;
use crate::naming::{DEFAULT_BUNDLE_PREFIX, DEFAULT_SUFFIX};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpscaleConfig {
    /// Settings each submitted item starts with.
    pub defaults: Settings,
    /// Capacity and resource limits.
    pub batch: BatchConfig,
    /// Output and bundle naming.
    pub export: ExportConfig,
    /// External analysis command.
    pub analysis: AnalysisConfig,
    /// Thread pool settings.
    pub processing: ProcessingConfig,
}

impl UpscaleConfig {
    /// Reject values that would make a run impossible or write outside the
    /// output directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_items == 0 {
            return Err(ConfigError::Validation(
                "batch.max_items must be at least 1".into(),
            ));
        }
        if has_separator(&self.export.file_suffix) {
            return Err(ConfigError::Validation(
                "export.file_suffix must not contain path separators".into(),
            ));
        }
        if self.export.bundle_prefix.is_empty() || has_separator(&self.export.bundle_prefix) {
            return Err(ConfigError::Validation(
                "export.bundle_prefix must be a non-empty file name".into(),
            ));
        }
        if self.analysis.preview_chars == 0 {
            return Err(ConfigError::Validation(
                "analysis.preview_chars must be at least 1".into(),
            ));
        }
        if self.analysis.command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "analysis.command must start with a program name".into(),
            ));
        }
        Ok(())
    }
}

fn has_separator(s: &str) -> bool {
    s.contains(['/', '\\'])
}

/// Capacity and resource limits for one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum number of items in the batch.
    pub max_items: usize,
    /// Upper bound on one output, in megapixels. 0 disables the check.
    pub max_output_megapixels: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_output_megapixels: 256,
        }
    }
}

impl BatchConfig {
    pub fn max_output_pixels(&self) -> Option<u64> {
        (self.max_output_megapixels > 0).then(|| self.max_output_megapixels.saturating_mul(1_000_000))
    }
}

/// Naming for exported files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Marker appended to each output stem.
    pub file_suffix: String,
    /// Bundle name prefix; the ISO date follows it.
    pub bundle_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_suffix: DEFAULT_SUFFIX.to_string(),
            bundle_prefix: DEFAULT_BUNDLE_PREFIX.to_string(),
        }
    }
}

/// External analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Program and arguments. Image bytes go to stdin, text comes from stdout.
    pub command: Vec<String>,
    /// How much of the analysis text to show.
    pub preview_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            preview_chars: 120,
        }
    }
}

/// Thread pool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Resampler and probe threads. `None` means one per core.
    pub max_threads: Option<usize>,
}

/// Thread count for the rayon pool: all cores unless the config asks for
/// fewer. Requests above the core count, or of zero, are clamped.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

// Layered loading

/// Stock defaults as a TOML table: the bottom layer of every load.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(UpscaleConfig::default())?)
}

/// Lay `overlay` over `base`.
///
/// Tables merge key by key, recursively. Any other overlay value (arrays
/// included) replaces the base value whole. Base keys absent from the
/// overlay survive.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read `<dir>/config.toml` without interpreting it.
///
/// A missing file is `Ok(None)`; a file that is not valid TOML is an error.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Apply an optional user layer, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<UpscaleConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: UpscaleConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Stock defaults overlaid with the input directory's `config.toml`, if any.
pub fn load_config(root: &Path) -> Result<UpscaleConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Documented stock `config.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# batch-upscale Configuration
# ===========================
# Every key is optional and the values shown are the defaults.
# Delete whatever you do not want to change.
#
# Place this file in the input directory as config.toml.
# A misspelled key is an error.

# Default settings for every submitted image
[defaults]
# Multiplier applied to width and height: 1, 2, 4 or 8.
# 1 passes the image through unchanged (density is still written).
upscale_factor = 2

# Print density in dots per inch, stored in the output metadata.
# Common choices: 72 (screen), 150 (draft print), 300 (print).
target_density = 300

# true: sharp, edge-preserving kernel for logos, line art and pixel art.
# false: smooth kernel for photographs.
preserve_style = true

# Items with enabled = false are skipped by batch runs.
enabled = true

# Batch limits
[batch]
# Maximum number of images in one batch. A submission that would exceed
# it is rejected as a whole.
max_items = 20

# Largest allowed output, in megapixels. Items above it fail individually.
# 0 disables the check.
max_output_megapixels = 256

# Export naming
[export]
# Appended to each output stem: logo.png -> logo_UPSCALED.png
file_suffix = "_UPSCALED"

# Bundle name prefix; the date follows: batch-upscale_2026-01-31.zip
bundle_prefix = "batch-upscale"

# Image analysis
[analysis]
# External program that describes an image. It receives the original file
# on stdin and prints text on stdout. Empty disables analysis.
# command = ["describe-image", "--short"]
command = []

# Number of characters of analysis text shown per image.
preview_chars = 120

# Processing
[processing]
# Maximum resampler threads.
# Leave unset to use one thread per CPU core.
# max_threads = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Density, UpscaleFactor};
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = UpscaleConfig::default();
        assert_eq!(config.defaults, Settings::default());
        assert_eq!(config.batch.max_items, 20);
        assert_eq!(config.batch.max_output_megapixels, 256);
        assert_eq!(config.export.file_suffix, "_UPSCALED");
        assert_eq!(config.export.bundle_prefix, "batch-upscale");
        assert!(config.analysis.command.is_empty());
        assert_eq!(config.analysis.preview_chars, 120);
        assert_eq!(config.processing.max_threads, None);
    }

    #[test]
    fn sparse_file_keeps_other_defaults() {
        let toml = r#"
[defaults]
upscale_factor = 8
"#;
        let config: UpscaleConfig = toml::from_str(toml).unwrap();
        // Overridden value
        assert_eq!(config.defaults.upscale_factor, UpscaleFactor::X8);
        // untouched keys keep their defaults
        assert_eq!(config.defaults.target_density, Density::PRINT);
        assert!(config.defaults.preserve_style);
        assert_eq!(config.batch.max_items, 20);
    }

    #[test]
    fn parse_invalid_factor_is_toml_error() {
        let toml = r#"
[defaults]
upscale_factor = 3
"#;
        let result: Result<UpscaleConfig, _> = toml::from_str(toml);
        assert!(result.unwrap_err().to_string().contains("upscale factor"));
    }

    #[test]
    fn max_output_pixels_zero_is_unlimited() {
        let mut batch = BatchConfig::default();
        assert_eq!(batch.max_output_pixels(), Some(256_000_000));
        batch.max_output_megapixels = 0;
        assert_eq!(batch.max_output_pixels(), None);
    }

    // load_config tests

    #[test]
    fn missing_file_means_stock_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.defaults, Settings::default());
        assert_eq!(config.batch.max_items, 20);
    }

    #[test]
    fn file_values_are_applied() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[defaults]
target_density = 150
preserve_style = false

[export]
file_suffix = "@2x"

[analysis]
command = ["describe", "--short"]
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.defaults.target_density, Density::DRAFT);
        assert!(!config.defaults.preserve_style);
        assert_eq!(config.export.file_suffix, "@2x");
        assert_eq!(config.analysis.command, vec!["describe", "--short"]);
        // everything else is stock
        assert_eq!(config.defaults.upscale_factor, UpscaleFactor::X2);
        assert_eq!(config.export.bundle_prefix, "batch-upscale");
    }

    #[test]
    fn broken_toml_fails_load() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // Processing config

    #[test]
    fn threads_default_to_core_count() {
        let config = ProcessingConfig { max_threads: None };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn threads_never_exceed_cores() {
        let config = ProcessingConfig {
            max_threads: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn threads_can_be_reduced() {
        let config = ProcessingConfig {
            max_threads: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
        let zero = ProcessingConfig {
            max_threads: Some(0),
        };
        assert_eq!(effective_threads(&zero), 1);
    }

    // merge_toml tests

    #[test]
    fn merge_replaces_scalars() {
        let base: toml::Value = toml::from_str(r#"max_items = 20"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"max_items = 5"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("max_items").unwrap().as_integer(), Some(5));
    }

    #[test]
    fn merge_keeps_sibling_keys() {
        let base: toml::Value = toml::from_str(
            r#"
[defaults]
upscale_factor = 2
target_density = 300
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[defaults]
upscale_factor = 4
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let defaults = merged.get("defaults").unwrap();
        assert_eq!(defaults.get("upscale_factor").unwrap().as_integer(), Some(4));
        // density preserved from base
        assert_eq!(defaults.get("target_density").unwrap().as_integer(), Some(300));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str(r#"command = ["a", "b"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"command = ["c"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("command").unwrap().as_array().unwrap().len(), 1);
    }

    // Typos

    #[test]
    fn misspelled_key_is_an_error() {
        let toml_str = r#"
[defaults]
upscale_facter = 4
"#;
        let result: Result<UpscaleConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn misspelled_section_is_an_error() {
        let toml_str = r#"
[bach]
max_items = 3
"#;
        let result: Result<UpscaleConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn misspelled_key_in_file_fails_load() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[export]\nsufix = \"x\"\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    // Validation tests

    #[test]
    fn stock_defaults_are_valid() {
        assert!(UpscaleConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_capacity() {
        let mut config = UpscaleConfig::default();
        config.batch.max_items = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_items"));
    }

    #[test]
    fn validate_names_without_separators() {
        let mut config = UpscaleConfig::default();
        config.export.file_suffix = "/x".into();
        assert!(config.validate().is_err());

        let mut config = UpscaleConfig::default();
        config.export.bundle_prefix = String::new();
        assert!(config.validate().is_err());

        let mut config = UpscaleConfig::default();
        config.export.file_suffix = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_analysis() {
        let mut config = UpscaleConfig::default();
        config.analysis.preview_chars = 0;
        assert!(config.validate().is_err());

        let mut config = UpscaleConfig::default();
        config.analysis.command = vec![" ".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_values_fail_load() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[batch]\nmax_items = 0\n").unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // Layers

    #[test]
    fn raw_load_of_empty_dir_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_raw_config(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn user_layer_overrides_one_key() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str("[batch]\nmax_items = 3\n").unwrap();
        let config = resolve_config(base, Some(overlay)).unwrap();
        assert_eq!(config.batch.max_items, 3);
        // sibling key comes from the stock layer
        assert_eq!(config.batch.max_output_megapixels, 256);
    }

    // stock config tests

    #[test]
    fn generated_config_parses_back_to_defaults() {
        let config: UpscaleConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = UpscaleConfig::default();
        assert_eq!(config.defaults, defaults.defaults);
        assert_eq!(config.batch.max_items, defaults.batch.max_items);
        assert_eq!(config.batch.max_output_megapixels, defaults.batch.max_output_megapixels);
        assert_eq!(config.export.file_suffix, defaults.export.file_suffix);
        assert_eq!(config.export.bundle_prefix, defaults.export.bundle_prefix);
        assert_eq!(config.analysis.command, defaults.analysis.command);
        assert_eq!(config.processing.max_threads, None);
    }

    #[test]
    fn generated_config_mentions_every_section() {
        let content = stock_config_toml();
        for section in ["[defaults]", "[batch]", "[export]", "[analysis]", "[processing]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_value_lists_every_section() {
        let val = stock_defaults_value().unwrap();
        for section in ["defaults", "batch", "export", "analysis", "processing"] {
            assert!(val.get(section).is_some(), "missing {section}");
        }
    }
}
