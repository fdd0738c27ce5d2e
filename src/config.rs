//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (`MRIO_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [storage]
//! base_table = "tables/base.csv"
//! output_table = "tables/refined.csv"
//! format = "tabular"
//! threshold = 1e-6
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! MRIO_STORAGE__THRESHOLD=1e-9
//! MRIO_LOGGING__LEVEL=debug
//! ```

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::split_config::SplitEntry;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub splits: Vec<SplitEntry>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Index file + dense matrix file pair.
    Tabular,
    /// Self-describing length-prefixed binary container.
    Binary,
}

/// Input/output table locations and coercion threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the base (pre-refinement) table. For `format = "tabular"`
    /// this is the dense matrix file; the matching index file is
    /// `<base_table>.index`.
    pub base_table: PathBuf,

    /// Path to write the refined table to, same format as `base_table`.
    pub output_table: PathBuf,

    #[serde(default = "default_format")]
    pub format: StorageFormat,

    /// Cells whose absolute value is at or below this are coerced to zero
    /// on load.
    #[serde(default)]
    pub threshold: f64,
}

fn default_format() -> StorageFormat {
    StorageFormat::Tabular
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Small tuning knobs for in-memory collections. The engine is
/// single-threaded by design, so no thread-count knob is exposed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Initial capacity hint for the leaf-pair snapshot taken each level.
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

fn default_initial_capacity() -> usize {
    1024
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            initial_capacity: default_initial_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`MRIO_*` prefix)
    pub fn load() -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("MRIO_").split("__"))
            .extract()
            .map_err(ConfigError::Load)
    }

    /// Loads configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MRIO_").split("__"))
            .extract()
            .map_err(ConfigError::Load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_toml_override_and_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&toml_path).unwrap();
        writeln!(
            f,
            r#"
            [storage]
            base_table = "base.csv"
            output_table = "out.csv"
            threshold = 0.5
            "#
        )
        .unwrap();

        std::env::set_var("MRIO_LOGGING__LEVEL", "debug");
        let config = Config::from_file(toml_path.to_str().unwrap()).unwrap();
        std::env::remove_var("MRIO_LOGGING__LEVEL");

        assert_eq!(config.storage.threshold, 0.5);
        assert_eq!(config.storage.format, StorageFormat::Tabular);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::from_file("/nonexistent/config.toml");
        assert!(err.is_err());
    }
}
