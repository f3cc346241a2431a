//! Metric registry
//!
//! A [`Directory`] owns every metric handle of one storage root. It is
//! built from a configuration value (or file), pre-creating the metrics
//! the configuration declares in their declared modes. Metrics not in
//! the configuration can still be opened by name: read opens require the
//! metric to exist on disk, while write and read-write opens create it,
//! reusing persisted metadata or falling back to the built-in defaults.
//!
//! Capability lookups on an already-open metric dispatch at run time: a
//! metric opened write-only refuses `open_read` with [`Error::Mode`].

use crate::config::{Config, MetricMode};
#[allow(unused_imports)]
use crate::error::{Error, Result};
use crate::metric::{Metric, ReadMetric, ReadWriteMetric, Readable, Writable, WriteMetric};
use crate::storage::{Meta, MetricStore};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Registry of named metrics under one storage root
pub struct Directory {
    root: PathBuf,
    metrics: BTreeMap<String, Metric>,
}

impl Directory {
    /// Build a directory from a configuration value
    pub fn new(config: &serde_json::Value) -> Result<Self> {
        Self::with_config(Config::from_value(config)?)
    }

    /// Build a directory from a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(Config::load(path.as_ref())?)
    }

    fn with_config(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.path)?;

        let mut metrics = BTreeMap::new();
        for declared in &config.metrics {
            let meta = Meta {
                interval_min: declared.interval_min,
                interval_factor: declared.interval_factor,
                mode: declared.mode,
                extra: declared.extra.clone(),
            };
            let metric = open_metric(&config.path, &declared.name, declared.mode, Some(meta))?;
            metrics.insert(declared.name.clone(), metric);
        }

        tracing::info!(
            "opened directory {:?} with {} configured metrics",
            config.path,
            metrics.len()
        );

        Ok(Self {
            root: config.path,
            metrics,
        })
    }

    /// Names of all metrics present under the storage root
    pub fn metric_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// The metric handle as opened, whatever its mode
    pub fn get(&mut self, name: &str) -> Option<&mut Metric> {
        self.metrics.get_mut(name)
    }

    /// Read capability for `name`; opens the metric read-only when it is
    /// not yet resident
    pub fn open_read(&mut self, name: &str) -> Result<&mut dyn Readable> {
        self.lookup(name, MetricMode::Read)?.as_readable()
    }

    /// Write capability for `name`; opens (creating if needed) write-only
    /// when not yet resident
    pub fn open_write(&mut self, name: &str) -> Result<&mut dyn Writable> {
        self.lookup(name, MetricMode::Write)?.as_writable()
    }

    /// Read-write handle for `name`; opens (creating if needed) when not
    /// yet resident
    pub fn open_read_write(&mut self, name: &str) -> Result<&mut ReadWriteMetric> {
        self.lookup(name, MetricMode::ReadWrite)?.as_read_write()
    }

    fn lookup(&mut self, name: &str, mode: MetricMode) -> Result<&mut Metric> {
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let metric = open_metric(&self.root, name, mode, None)?;
                Ok(entry.insert(metric))
            }
        }
    }
}

fn open_metric(
    root: &Path,
    name: &str,
    mode: MetricMode,
    meta: Option<Meta>,
) -> Result<Metric> {
    let store = MetricStore::open(root, name, mode, meta)?;
    Ok(match mode {
        MetricMode::Read => Metric::Read(ReadMetric::new(store)),
        MetricMode::Write => Metric::Write(WriteMetric::new(store)?),
        MetricMode::ReadWrite => Metric::ReadWrite(ReadWriteMetric::new(store)?),
    })
}
