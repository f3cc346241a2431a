//! # Strata
//!
//! Hierarchical time-aggregated storage for numeric time series.
//!
//! Samples stream into per-metric stores and are aggregated on insert
//! into a cascade of fixed-ratio levels, so range queries over wide
//! windows return pre-computed bucket summaries (count, sum, min, max,
//! time-weighted integral) instead of raw points. Response size is
//! bounded by the selected resolution, not the range width.
//!
//! ## Modules
//!
//! - [`directory`]: metric registry and mode dispatch
//! - [`metric`]: read/write capabilities, the level cascade
//! - [`storage`]: record codecs and append-only store files
//! - [`config`]: JSON configuration model
//! - [`types`]: time arithmetic and the aggregate algebra
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strata::{Directory, Duration, Readable, Resolution, TimePoint, TimeValue, Writable};
//! use serde_json::json;
//!
//! fn main() -> strata::Result<()> {
//!     let mut directory = Directory::new(&json!({
//!         "type": "file",
//!         "path": "./strata_data",
//!         "metrics": [
//!             { "name": "power.node1", "mode": "RW",
//!               "interval_min": 1_000_000_000u64, "interval_factor": 10 }
//!         ]
//!     }))?;
//!
//!     let metric = directory.open_read_write("power.node1")?;
//!     metric.insert(TimeValue::new(TimePoint::now(), 245.3))?;
//!     metric.flush()?;
//!
//!     // one bucket per 10 seconds, at most
//!     let rows = metric.retrieve(
//!         TimePoint::new(0),
//!         TimePoint::now(),
//!         Resolution::IntervalMax(Duration::new(10_000_000_000)),
//!     )?;
//!     println!("{} buckets", rows.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod metric;
pub mod storage;
pub mod types;

pub use config::{Config, MetricMode};
pub use directory::Directory;
pub use error::{Error, Result};
pub use metric::{Metric, ReadMetric, ReadWriteMetric, Readable, Writable, WriteMetric};
pub use storage::{BlockStore, Meta, MetricStore};
pub use types::{
    Aggregate, Duration, IntervalScope, Resolution, Row, Scope, TimePoint, TimeValue,
};
