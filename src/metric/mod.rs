//! Metric handles and capabilities
//!
//! A metric opens as one of three handle types depending on its mode.
//! The read and write capabilities are orthogonal traits; the
//! read-write handle implements both. A [`Metric`] holds whichever
//! variant the open mode produced, and the capability accessors
//! downcast at run time, failing with [`Error::Mode`] when the variant
//! lacks the capability.
//!
//! Write-capable handles flush on drop so trailing finalized rows and
//! pending tails reach disk without an explicit `flush` call.

pub mod level;
pub mod read;
pub mod write;

use crate::config::MetricMode;
use crate::error::{Error, Result};
use crate::storage::MetricStore;
use crate::types::{IntervalScope, Resolution, Row, TimePoint, TimeValue};
use write::WritePipeline;

/// Read capability: scoped retrieval at adaptive resolution
pub trait Readable {
    #[doc(hidden)]
    fn storage(&mut self) -> &mut MetricStore;

    /// Aggregate rows for `[begin, end]` at the resolution picked by
    /// `resolution`, with the default aggregate scope (extended begin,
    /// open end)
    fn retrieve(
        &mut self,
        begin: TimePoint,
        end: TimePoint,
        resolution: Resolution,
    ) -> Result<Vec<Row>> {
        read::retrieve(
            self.storage(),
            begin,
            end,
            resolution,
            IntervalScope::AGGREGATE,
        )
    }

    /// Aggregate rows with an explicit endpoint scope
    fn retrieve_scoped(
        &mut self,
        begin: TimePoint,
        end: TimePoint,
        resolution: Resolution,
        scope: IntervalScope,
    ) -> Result<Vec<Row>> {
        read::retrieve(self.storage(), begin, end, resolution, scope)
    }

    /// Raw samples with the default raw scope (closed begin, extended end)
    fn retrieve_raw(&mut self, begin: TimePoint, end: TimePoint) -> Result<Vec<TimeValue>> {
        read::retrieve_raw(self.storage(), begin, end, IntervalScope::RAW)
    }

    /// Raw samples with an explicit endpoint scope
    fn retrieve_raw_scoped(
        &mut self,
        begin: TimePoint,
        end: TimePoint,
        scope: IntervalScope,
    ) -> Result<Vec<TimeValue>> {
        read::retrieve_raw(self.storage(), begin, end, scope)
    }

    /// First and last raw timestamps, `None` for an empty metric
    fn range(&mut self) -> Result<Option<(TimePoint, TimePoint)>> {
        read::range(self.storage())
    }

    /// Total raw sample count
    fn count(&mut self) -> u64 {
        self.storage().raw().size()
    }

    /// Raw sample count within a scoped range
    fn count_range(
        &mut self,
        begin: TimePoint,
        end: TimePoint,
        scope: IntervalScope,
    ) -> Result<u64> {
        read::count_range(self.storage(), begin, end, scope)
    }
}

/// Write capability: strictly-ordered inserts and durable flush
pub trait Writable {
    #[doc(hidden)]
    fn parts(&mut self) -> (&mut MetricStore, &mut WritePipeline);

    /// Insert one sample; its timestamp must be after every previously
    /// inserted one, across reopens
    fn insert(&mut self, tv: TimeValue) -> Result<()> {
        let (store, pipeline) = self.parts();
        pipeline.insert(store, tv)
    }

    /// Persist pending state and fsync all stores of this metric
    fn flush(&mut self) -> Result<()> {
        let (store, pipeline) = self.parts();
        pipeline.flush(store)
    }
}

/// Read-only metric handle
pub struct ReadMetric {
    store: MetricStore,
}

impl ReadMetric {
    pub(crate) fn new(store: MetricStore) -> Self {
        Self { store }
    }
}

impl Readable for ReadMetric {
    fn storage(&mut self) -> &mut MetricStore {
        &mut self.store
    }
}

/// Write-only metric handle; flushes on drop
pub struct WriteMetric {
    store: MetricStore,
    pipeline: WritePipeline,
}

impl WriteMetric {
    pub(crate) fn new(mut store: MetricStore) -> Result<Self> {
        let pipeline = WritePipeline::new(&mut store)?;
        Ok(Self { store, pipeline })
    }
}

impl Writable for WriteMetric {
    fn parts(&mut self) -> (&mut MetricStore, &mut WritePipeline) {
        (&mut self.store, &mut self.pipeline)
    }
}

impl Drop for WriteMetric {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("flush on drop failed: {}", e);
        }
    }
}

/// Read-write metric handle; flushes on drop
pub struct ReadWriteMetric {
    store: MetricStore,
    pipeline: WritePipeline,
}

impl ReadWriteMetric {
    pub(crate) fn new(mut store: MetricStore) -> Result<Self> {
        let pipeline = WritePipeline::new(&mut store)?;
        Ok(Self { store, pipeline })
    }
}

impl Readable for ReadWriteMetric {
    fn storage(&mut self) -> &mut MetricStore {
        &mut self.store
    }
}

impl Writable for ReadWriteMetric {
    fn parts(&mut self) -> (&mut MetricStore, &mut WritePipeline) {
        (&mut self.store, &mut self.pipeline)
    }
}

impl Drop for ReadWriteMetric {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("flush on drop failed: {}", e);
        }
    }
}

/// A metric in whichever mode it was opened
pub enum Metric {
    Read(ReadMetric),
    Write(WriteMetric),
    ReadWrite(ReadWriteMetric),
}

impl Metric {
    pub fn mode(&self) -> MetricMode {
        match self {
            Metric::Read(_) => MetricMode::Read,
            Metric::Write(_) => MetricMode::Write,
            Metric::ReadWrite(_) => MetricMode::ReadWrite,
        }
    }

    /// The read capability, if the open mode provides it
    pub fn as_readable(&mut self) -> Result<&mut dyn Readable> {
        match self {
            Metric::Read(m) => Ok(m),
            Metric::ReadWrite(m) => Ok(m),
            Metric::Write(_) => Err(Error::Mode {
                mode: MetricMode::Write,
                op: "read",
            }),
        }
    }

    /// The write capability, if the open mode provides it
    pub fn as_writable(&mut self) -> Result<&mut dyn Writable> {
        match self {
            Metric::Write(m) => Ok(m),
            Metric::ReadWrite(m) => Ok(m),
            Metric::Read(_) => Err(Error::Mode {
                mode: MetricMode::Read,
                op: "insert",
            }),
        }
    }

    /// The combined handle, only available in read-write mode
    pub fn as_read_write(&mut self) -> Result<&mut ReadWriteMetric> {
        match self {
            Metric::ReadWrite(m) => Ok(m),
            other => Err(Error::Mode {
                mode: other.mode(),
                op: "read-write access",
            }),
        }
    }
}
