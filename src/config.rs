// ⚙️ Configuration
// Loaded from TOML; every field has a default so a partial (or missing) file is fine

use crate::model::HIGH_VALUE_THRESHOLD;
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default config location, overridable with `BANKING_ETL_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "config/etl.toml";

/// Environment variable that overrides the config path
pub const CONFIG_ENV_VAR: &str = "BANKING_ETL_CONFIG";

/// Seconds within which `rapid_repeat_min_count` transactions count as a burst
pub const RAPID_REPEAT_WINDOW_SECS: i64 = 60;

/// Transactions needed inside the window (the flagged one included)
pub const RAPID_REPEAT_MIN_COUNT: usize = 3;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EtlConfig {
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub detection: DetectionConfig,
    pub generator: GeneratorConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding both output tables
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory scanned for raw `*.csv` files
    pub raw_dir: PathBuf,
}

/// Anomaly detection parameters. These are the only knobs the transform
/// stage sees.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub high_value_threshold: f64,
    pub rapid_repeat_window_secs: i64,
    pub rapid_repeat_min_count: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub rows: usize,
    pub seed: u64,
    pub accounts: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: PathBuf::from("data/warehouse.db"),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            raw_dir: PathBuf::from("data/raw"),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            high_value_threshold: HIGH_VALUE_THRESHOLD,
            rapid_repeat_window_secs: RAPID_REPEAT_WINDOW_SECS,
            rapid_repeat_min_count: RAPID_REPEAT_MIN_COUNT,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            rows: 1000,
            seed: 42,
            accounts: 200,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig { interval_secs: 60 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl EtlConfig {
    /// Load from `BANKING_ETL_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load a TOML file; a missing file yields the defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config = Self::from_toml(&content)
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
            info!(path = %path.display(), "configuration loaded");
            config
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            EtlConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        ensure!(self.generator.accounts > 0, "generator.accounts must be at least 1");
        ensure!(self.schedule.interval_secs > 0, "schedule.interval_secs must be positive");
        Ok(())
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.high_value_threshold.is_finite() && self.high_value_threshold > 0.0,
            "detection.high_value_threshold must be a positive number, got {}",
            self.high_value_threshold
        );
        ensure!(
            self.rapid_repeat_window_secs > 0,
            "detection.rapid_repeat_window_secs must be positive, got {}",
            self.rapid_repeat_window_secs
        );
        ensure!(
            self.rapid_repeat_min_count >= 2,
            "detection.rapid_repeat_min_count must be at least 2, got {}",
            self.rapid_repeat_min_count
        );
        Ok(())
    }
}
