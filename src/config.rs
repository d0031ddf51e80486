//! Run configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! overridden by a `config.toml` in the working directory (or the file named
//! with `--config`), and command-line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! max_bytes = 2883584            # Size budget per image, in bytes
//! default_quality = 90           # JPEG quality when the source has none (1-100)
//! decode_source = "memory"       # "memory" or "file"
//! extensions = ["jpg", "jpeg", "png", "bmp"]
//! backup_dir = "Backup"          # Sibling directory receiving originals
//!
//! [limits]
//! min_dimension = 1              # Smallest edge the shrink loop may produce
//! max_iterations = 200           # Encode attempts per image
//! job_timeout_secs = 300         # Wall-clock limit per image (0 = none)
//!
//! [processing]
//! max_processes = 4              # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use crate::imaging::{Quality, SizeBudget, supported_input_extensions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How the source file reaches the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeSource {
    /// Read the whole file into memory, then decode.
    #[default]
    Memory,
    /// Let the decoder stream from the file.
    File,
}

/// Configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    /// Size budget in bytes.
    pub max_bytes: u64,
    /// JPEG quality used when the source carries no quantization tables.
    pub default_quality: u32,
    pub decode_source: DecodeSource,
    /// File extensions considered when scanning a directory.
    pub extensions: Vec<String>,
    /// Name of the backup directory created next to each replaced file.
    pub backup_dir: String,
    /// Bounds on the shrink loop.
    pub limits: LimitsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_bytes: SizeBudget::DEFAULT.bytes(),
            default_quality: Quality::default().value(),
            decode_source: DecodeSource::default(),
            extensions: supported_input_extensions()
                .iter()
                .map(|e| e.to_string())
                .collect(),
            backup_dir: "Backup".to_string(),
            limits: LimitsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl FitConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Validation("max_bytes must be non-zero".into()));
        }
        if !(1..=100).contains(&self.default_quality) {
            return Err(ConfigError::Validation(
                "default_quality must be 1-100".into(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "extensions must not be empty".into(),
            ));
        }
        let supported = supported_input_extensions();
        if let Some(ext) = self
            .extensions
            .iter()
            .find(|e| !supported.contains(&e.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "extension '{ext}' is not supported (expected one of {})",
                supported.join(", ")
            )));
        }
        let backup = Path::new(&self.backup_dir);
        if self.backup_dir.is_empty() || backup.components().count() != 1 {
            return Err(ConfigError::Validation(
                "backup_dir must be a single directory name".into(),
            ));
        }
        if self.limits.min_dimension == 0 {
            return Err(ConfigError::Validation(
                "limits.min_dimension must be at least 1".into(),
            ));
        }
        if self.limits.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "limits.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn budget(&self) -> SizeBudget {
        SizeBudget::new(self.max_bytes)
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.default_quality)
    }
}

/// Bounds that keep the shrink loop finite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub min_dimension: u32,
    pub max_iterations: u32,
    /// Per-image wall-clock limit in seconds; 0 disables it.
    pub job_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_dimension: 1,
            max_iterations: 200,
            job_timeout_secs: 300,
        }
    }
}

impl LimitsConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers. When absent, defaults to the
    /// number of CPU cores. Values larger than the core count are clamped.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a TOML value, the base layer every file merges over.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(FitConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Deep merge two TOML values. Tables merge recursively; anything else in
/// `overlay` replaces the value in `base`.
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

/// Parse a config file into a raw TOML value.
pub fn load_raw_file(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load `config.toml` from `dir` as a raw TOML value, if present.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(None);
    }
    load_raw_file(&config_path).map(Some)
}

/// Merge `overlay` over `base`, deserialize, and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<FitConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: FitConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config for a run in `dir`: stock defaults, then `dir/config.toml`.
pub fn load_config(dir: &Path) -> Result<FitConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(dir)?)
}

/// Load config from an explicit file, which must exist.
pub fn load_config_file(path: &Path) -> Result<FitConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, Some(load_raw_file(path)?))
}

/// A documented stock `config.toml` with all keys and their defaults.
pub fn stock_config_toml() -> &'static str {
    r##"# fitsize configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# fitsize reads config.toml from the working directory, or the file given
# with --config. Command-line flags override values set here.
# Unknown keys will cause an error.

# Size budget per image, in bytes. Images larger than this are re-encoded
# until they fit. 2883584 bytes = 2.75 MiB.
max_bytes = 2883584

# JPEG quality (1-100) used when the source has no quantization tables to
# estimate its quality from, and for non-JPEG sources re-encoded as JPEG.
default_quality = 90

# How source files reach the decoder: "memory" reads the whole file first,
# "file" lets the decoder stream from disk.
decode_source = "memory"

# Extensions picked up when scanning a directory (case-insensitive).
extensions = ["jpg", "jpeg", "png", "bmp"]

# Originals are moved into this directory, next to the replaced file.
backup_dir = "Backup"

# ---------------------------------------------------------------------------
# Shrink loop bounds
# ---------------------------------------------------------------------------
[limits]
# Neither edge is shrunk below this many pixels.
min_dimension = 1

# Maximum encode attempts per image.
max_iterations = 200

# Wall-clock limit per image in seconds. 0 disables the limit.
job_timeout_secs = 300

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = FitConfig::default();
        assert_eq!(config.max_bytes, 2_883_584);
        assert_eq!(config.default_quality, 90);
        assert_eq!(config.decode_source, DecodeSource::Memory);
        assert_eq!(config.extensions, vec!["jpg", "jpeg", "png", "bmp"]);
        assert_eq!(config.backup_dir, "Backup");
        assert_eq!(config.limits.min_dimension, 1);
        assert_eq!(config.limits.max_iterations, 200);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(FitConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
max_bytes = 1000000

[limits]
max_iterations = 10
"#;
        let config: FitConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_bytes, 1_000_000);
        assert_eq!(config.limits.max_iterations, 10);
        assert_eq!(config.limits.min_dimension, 1);
        assert_eq!(config.default_quality, 90);
    }

    #[test]
    fn parse_decode_source() {
        let config: FitConfig = toml::from_str(r#"decode_source = "file""#).unwrap();
        assert_eq!(config.decode_source, DecodeSource::File);
        assert!(toml::from_str::<FitConfig>(r#"decode_source = "mmap""#).is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<FitConfig, _> = toml::from_str("max_byte = 10");
        assert!(result.is_err());
        let result: Result<FitConfig, _> = toml::from_str("[limits]\nmin_dim = 2");
        assert!(result.is_err());
    }

    #[test]
    fn validate_quality_range() {
        let mut config = FitConfig::default();
        config.default_quality = 0;
        assert!(config.validate().is_err());
        config.default_quality = 101;
        assert!(config.validate().is_err());
        config.default_quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_zero_budget() {
        let config = FitConfig {
            max_bytes: 0,
            ..FitConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_extensions() {
        let mut config = FitConfig::default();
        config.extensions = vec![];
        assert!(config.validate().is_err());
        config.extensions = vec!["JPG".into()];
        assert!(config.validate().is_ok());
        config.extensions = vec!["gif".into()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("'gif'"));
    }

    #[test]
    fn validate_backup_dir_is_single_name() {
        let mut config = FitConfig::default();
        config.backup_dir = "nested/dir".into();
        assert!(config.validate().is_err());
        config.backup_dir = String::new();
        assert!(config.validate().is_err());
        config.backup_dir = "originals".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_limits() {
        let mut config = FitConfig::default();
        config.limits.min_dimension = 0;
        assert!(config.validate().is_err());
        config.limits.min_dimension = 1;
        config.limits.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn job_timeout_zero_disables() {
        let mut limits = LimitsConfig::default();
        assert_eq!(limits.job_timeout(), Some(Duration::from_secs(300)));
        limits.job_timeout_secs = 0;
        assert_eq!(limits.job_timeout(), None);
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped() {
        let config = ProcessingConfig {
            max_processes: Some(100_000),
        };
        assert!(effective_threads(&config) <= 100_000);
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn merge_toml_overrides_nested() {
        let base: toml::Value = toml::from_str(
            r#"
max_bytes = 100
[limits]
min_dimension = 1
max_iterations = 200
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str("[limits]\nmax_iterations = 5").unwrap();

        let merged = merge_toml(base, overlay);
        assert_eq!(merged["max_bytes"].as_integer(), Some(100));
        assert_eq!(merged["limits"]["min_dimension"].as_integer(), Some(1));
        assert_eq!(merged["limits"]["max_iterations"].as_integer(), Some(5));
    }

    #[test]
    fn merge_toml_replaces_arrays() {
        let base: toml::Value = toml::from_str(r#"extensions = ["jpg", "png"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"extensions = ["bmp"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["extensions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn load_config_without_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, FitConfig::default());
    }

    #[test]
    fn load_config_merges_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "default_quality = 75\n[processing]\nmax_processes = 2\n",
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.default_quality, 75);
        assert_eq!(config.processing.max_processes, Some(2));
        assert_eq!(config.max_bytes, 2_883_584);
    }

    #[test]
    fn load_config_validates() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "default_quality = 500\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "max_bytes = = 3\n").unwrap();
        assert!(matches!(load_config(tmp.path()), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_file_requires_existing_file() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(matches!(
            load_config_file(&missing),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn load_config_file_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        fs::write(&path, "backup_dir = \"originals\"\n").unwrap();
        let config = load_config_file(&path).unwrap();
        assert_eq!(config.backup_dir, "originals");
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: FitConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, FitConfig::default());
    }
}
