//! Per-metric file bundle
//!
//! Each metric lives in its own subdirectory:
//!
//! ```text
//! <root>/<name>/
//!   raw.hta      raw samples
//!   lvl0.hta     finest aggregate level (width = interval_min)
//!   lvl1.hta     width = interval_min * interval_factor
//!   ...
//!   meta.json    interval parameters, mode, opaque user fields
//! ```
//!
//! Level files are created on demand as the cascade grows; a file for
//! level k implies files for all levels below it.

use crate::config::MetricMode;
use crate::error::{Error, Result};
use crate::storage::block::BlockStore;
use crate::storage::codec::AggregateRecord;
use crate::types::{Duration, TimeValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default aggregation parameters for metrics auto-created without a
/// configuration entry: 10 second buckets, factor-10 cascade
const DEFAULT_INTERVAL_MIN: Duration = Duration::new(10_000_000_000);
const DEFAULT_INTERVAL_FACTOR: i64 = 10;

/// Metric metadata, persisted as `meta.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub interval_min: Duration,
    pub interval_factor: i64,
    pub mode: MetricMode,
    /// User-supplied configuration fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Meta {
    pub fn with_defaults(mode: MetricMode) -> Self {
        Self {
            interval_min: DEFAULT_INTERVAL_MIN,
            interval_factor: DEFAULT_INTERVAL_FACTOR,
            mode,
            extra: serde_json::Map::new(),
        }
    }

    /// Bucket width of level k: `interval_min * interval_factor^k`
    pub fn interval(&self, level: usize) -> Result<Duration> {
        let mut width = self.interval_min;
        for _ in 0..level {
            width = width.checked_mul(self.interval_factor).ok_or_else(|| {
                Error::Overflow(format!(
                    "level {} width exceeds the tick range ({} * {}^{})",
                    level, self.interval_min, self.interval_factor, level
                ))
            })?;
        }
        Ok(width)
    }

    fn validate(&self) -> Result<()> {
        if !self.interval_min.is_positive() {
            return Err(Error::Config(format!(
                "interval_min must be positive, got {}",
                self.interval_min
            )));
        }
        if self.interval_factor < 2 {
            return Err(Error::Config(format!(
                "interval_factor must be at least 2, got {}",
                self.interval_factor
            )));
        }
        Ok(())
    }
}

/// The on-disk stores of one metric: raw samples plus one record file per
/// aggregate level
#[derive(Debug)]
pub struct MetricStore {
    dir: PathBuf,
    writable: bool,
    meta: Meta,
    raw: BlockStore<TimeValue>,
    levels: Vec<BlockStore<AggregateRecord>>,
}

impl MetricStore {
    /// Open (or, in a writable mode, create) the stores of `name` under
    /// `root`
    ///
    /// `declared` carries the configuration entry for config-listed
    /// metrics; it must agree with persisted metadata. Auto-created
    /// metrics pass `None` and inherit either the on-disk metadata or
    /// the crate defaults.
    pub fn open(
        root: &Path,
        name: &str,
        mode: MetricMode,
        declared: Option<Meta>,
    ) -> Result<Self> {
        let dir = root.join(name);
        let writable = mode.is_writable();

        if !dir.is_dir() {
            if writable {
                std::fs::create_dir_all(&dir)?;
            } else {
                return Err(Error::NotFound(name.to_string()));
            }
        }

        let raw_path = dir.join("raw.hta");
        let meta_path = dir.join("meta.json");

        let stored: Option<Meta> = if meta_path.is_file() {
            let content = std::fs::read_to_string(&meta_path)?;
            Some(serde_json::from_str(&content).map_err(|e| {
                Error::Corruption(format!("unreadable metadata in {:?}: {}", meta_path, e))
            })?)
        } else {
            None
        };

        if stored.is_none() && raw_size(&raw_path)? > 0 {
            return Err(Error::Corruption(format!(
                "metadata missing for non-empty metric {:?}",
                dir
            )));
        }

        let meta = match (stored, declared) {
            (Some(stored), Some(declared)) => {
                if stored.interval_min != declared.interval_min
                    || stored.interval_factor != declared.interval_factor
                {
                    return Err(Error::Config(format!(
                        "metric {}: declared intervals ({}, x{}) do not match stored ({}, x{})",
                        name,
                        declared.interval_min,
                        declared.interval_factor,
                        stored.interval_min,
                        stored.interval_factor
                    )));
                }
                declared
            }
            (Some(stored), None) => Meta { mode, ..stored },
            (None, Some(declared)) => declared,
            (None, None) => Meta::with_defaults(mode),
        };
        meta.validate()?;

        if !writable && !raw_path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }

        if writable {
            let content = serde_json::to_string_pretty(&meta)
                .map_err(|e| Error::Corruption(e.to_string()))?;
            std::fs::write(&meta_path, content)?;
        }

        let raw = BlockStore::open(&raw_path, writable)?;

        let mut levels = Vec::new();
        loop {
            let path = level_path(&dir, levels.len());
            if !path.is_file() {
                break;
            }
            levels.push(BlockStore::open(&path, writable)?);
        }

        tracing::debug!(
            "opened metric store {:?} in mode {}: {} raw records, {} levels",
            dir,
            mode,
            raw.size(),
            levels.len()
        );

        Ok(Self {
            dir,
            writable,
            meta,
            raw,
            levels,
        })
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn raw(&mut self) -> &mut BlockStore<TimeValue> {
        &mut self.raw
    }

    /// Number of aggregate levels present on disk
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&mut self, k: usize) -> Option<&mut BlockStore<AggregateRecord>> {
        self.levels.get_mut(k)
    }

    /// Open level k, creating its file when it is the next level of the
    /// cascade
    pub fn ensure_level(&mut self, k: usize) -> Result<&mut BlockStore<AggregateRecord>> {
        if k > self.levels.len() {
            return Err(Error::Corruption(format!(
                "level {} requested with only {} levels present in {:?}",
                k,
                self.levels.len(),
                self.dir
            )));
        }
        if k == self.levels.len() {
            let store = BlockStore::open(level_path(&self.dir, k), self.writable)?;
            self.levels.push(store);
        }
        Ok(&mut self.levels[k])
    }

    /// Flush and fsync every store of this metric
    pub fn sync_all(&mut self) -> Result<()> {
        self.raw.sync()?;
        for level in &mut self.levels {
            level.sync()?;
        }
        Ok(())
    }
}

fn level_path(dir: &Path, k: usize) -> PathBuf {
    dir.join(format!("lvl{}.hta", k))
}

fn raw_size(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
