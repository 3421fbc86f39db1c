//! TOML configuration file support.
//!
//! Instead of passing many CLI flags, users can specify settings in a config file:
//!
//! ```toml
//! # silex-import.toml
//! [import]
//! worker_count = 8
//! min_batch_size = 500
//! max_errors = 50
//! max_rows = 100000
//! grace_period_secs = 30
//! default_offset = "+01:00"
//! validation_ttl_secs = 600
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use silex_import::import::ImportConfig;
use silex_import::model::parse_offset;

/// Root configuration structure for silex-import.toml files.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Import pipeline settings.
    #[serde(default)]
    pub import: ImportSettings,
}

/// Configuration of the validation and import pipeline.
#[derive(Debug, Default, Deserialize)]
pub struct ImportSettings {
    /// Number of validation workers.
    pub worker_count: Option<usize>,

    /// Smallest number of rows per batch.
    pub min_batch_size: Option<usize>,

    /// Invalid rows tolerated before validation stops.
    pub max_errors: Option<usize>,

    /// Largest number of data rows accepted.
    pub max_rows: Option<usize>,

    /// Seconds to wait for workers once validation is stopped.
    pub grace_period_secs: Option<u64>,

    /// UTC offset of dates without one.
    pub default_offset: Option<String>,

    /// Seconds a successful validation stays reusable.
    pub validation_ttl_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

impl ImportSettings {
    /// Override `config` with the values set in the file.
    pub fn apply(&self, mut config: ImportConfig) -> Result<ImportConfig> {
        if let Some(count) = self.worker_count {
            config = config.with_worker_count(count);
        }
        if let Some(size) = self.min_batch_size {
            config = config.with_min_batch_size(size);
        }
        if let Some(max) = self.max_errors {
            config = config.with_max_errors(max);
        }
        if let Some(max) = self.max_rows {
            config = config.with_max_rows(max);
        }
        if let Some(secs) = self.grace_period_secs {
            config = config.with_grace_period(Duration::from_secs(secs));
        }
        if let Some(offset) = &self.default_offset {
            let parsed = parse_offset(offset)
                .with_context(|| format!("Invalid default_offset in config: {}", offset))?;
            config = config.with_default_offset(parsed);
        }
        if let Some(secs) = self.validation_ttl_secs {
            config = config.with_validation_ttl(Duration::from_secs(secs));
        }
        Ok(config)
    }
}
