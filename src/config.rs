//! Configuration
//!
//! A directory is described by a single JSON value, typically loaded from
//! a file:
//!
//! ```json
//! { "type": "file",
//!   "path": "/var/lib/strata",
//!   "metrics": [
//!     { "name": "power.node1", "mode": "RW",
//!       "interval_min": 1000000, "interval_factor": 10,
//!       "unit": "W" }
//!   ] }
//! ```
//!
//! Unknown top-level keys are rejected. Unknown per-metric keys (like
//! `unit` above) are retained as opaque metadata and persisted to the
//! metric's `meta.json`.

use crate::error::{Error, Result};
use crate::types::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Capabilities a metric is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricMode {
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "W")]
    Write,
    #[serde(rename = "RW")]
    ReadWrite,
}

impl MetricMode {
    pub fn is_readable(self) -> bool {
        matches!(self, MetricMode::Read | MetricMode::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, MetricMode::Write | MetricMode::ReadWrite)
    }
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricMode::Read => write!(f, "R"),
            MetricMode::Write => write!(f, "W"),
            MetricMode::ReadWrite => write!(f, "RW"),
        }
    }
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One subdirectory per metric under `path`
    File,
}

/// Top-level directory configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "type")]
    pub backend: BackendKind,
    pub path: PathBuf,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// One metric declaration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    pub mode: MetricMode,
    /// Finest aggregate bucket width, in ticks
    pub interval_min: Duration,
    /// Bucket width ratio between adjacent levels
    pub interval_factor: i64,
    /// User-supplied fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    /// Parse and validate a configuration value
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let config: Config = serde_json::from_value(value.clone())
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config file {:?}: {}", path, e)))?;
        Self::from_value(&value)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for metric in &self.metrics {
            if !names.insert(metric.name.as_str()) {
                return Err(Error::Config(format!(
                    "metric {} declared more than once",
                    metric.name
                )));
            }
            if !metric.interval_min.is_positive() {
                return Err(Error::Config(format!(
                    "metric {}: interval_min must be positive, got {}",
                    metric.name, metric.interval_min
                )));
            }
            if metric.interval_factor < 2 {
                return Err(Error::Config(format!(
                    "metric {}: interval_factor must be at least 2, got {}",
                    metric.name, metric.interval_factor
                )));
            }
        }
        Ok(())
    }
}
