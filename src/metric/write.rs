//! Write pipeline: insert, cascade propagation, restoration, flush
//!
//! Inserts append the raw sample, turn it into a zero-width row, and push
//! it through the level cascade. Whenever a level finalizes a bucket, the
//! finished row is persisted to that level's store and fed into the next
//! level up, which is created on demand.
//!
//! # Pending tails
//!
//! Finalized rows are append-only. Behind them, each level store carries
//! a *pending tail*: rows describing the data not yet covered by
//! finalized buckets at that level. `flush` rewrites the tails (truncate
//! to the finalized prefix, append the current pending state) so that at
//! every level the persisted rows account for every raw sample. The tail
//! of level k is level k−1's tail regrouped into level-k buckets plus
//! level k's own partial bucket.
//!
//! # Restoration
//!
//! On reopen the finalized prefix of level k is recomputed, not trusted:
//! a bucket `[s, s + w)` is finalized iff a finalized row of the level
//! below starts at or after `s + w` (a raw sample for level 0). Rows past
//! that prefix are a stale-or-current tail; the writer truncates them
//! before its next append. The in-memory partial bucket is rebuilt by
//! replaying the level below from the finalized frontier, which also
//! re-emits any rows lost in a crash mid-cascade.

use crate::error::{Error, Result};
use crate::metric::level::Level;
use crate::storage::codec::AggregateRecord;
use crate::storage::MetricStore;
use crate::types::{Aggregate, Duration, Row, TimePoint, TimeValue};

struct LevelSlot {
    level: Level,
    /// Count of on-disk rows proven complete
    finalized: u64,
    /// Count of on-disk pending rows after the finalized prefix
    tail: u64,
}

/// Per-metric write state
///
/// Not reentrant; one pipeline per metric. A failed insert poisons the
/// pipeline and every later insert fails with [`Error::Poisoned`].
pub struct WritePipeline {
    previous_time: Option<TimePoint>,
    levels: Vec<LevelSlot>,
    dirty: bool,
    poisoned: bool,
}

impl WritePipeline {
    pub fn new(store: &mut MetricStore) -> Result<Self> {
        let previous_time = store.raw().last()?.map(|tv| tv.time);
        Ok(Self {
            previous_time,
            levels: Vec::new(),
            dirty: false,
            poisoned: false,
        })
    }

    /// Insert one sample; timestamps must be strictly increasing across
    /// the whole life of the metric
    pub fn insert(&mut self, store: &mut MetricStore, tv: TimeValue) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let result = self.insert_inner(store, tv);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn insert_inner(&mut self, store: &mut MetricStore, tv: TimeValue) -> Result<()> {
        if let Some(previous) = self.previous_time {
            if tv.time <= previous {
                return Err(Error::Ordering {
                    time: tv.time,
                    previous,
                });
            }
        }

        store.raw().append(&tv)?;

        let aggregate = Aggregate::from_sample(self.previous_time.unwrap_or(tv.time), tv);
        self.previous_time = Some(tv.time);
        self.dirty = true;

        self.feed(store, 0, Row::new(tv.time, Duration::ZERO, aggregate))
    }

    /// Push a row into level k, cascading finalized buckets upward
    fn feed(&mut self, store: &mut MetricStore, k: usize, row: Row) -> Result<()> {
        if k >= self.levels.len() {
            // restoring the level replays everything on disk below it,
            // which already includes this row
            return self.restore_level(store, k);
        }
        if let Some(finished) = self.levels[k].level.advance(&row)? {
            self.persist(store, k, &finished)?;
            self.feed(store, k + 1, finished)?;
        }
        Ok(())
    }

    /// Append a finalized row at level k, evicting any stale tail first
    fn persist(&mut self, store: &mut MetricStore, k: usize, row: &Row) -> Result<()> {
        let slot = &mut self.levels[k];
        let file = store.ensure_level(k)?;
        if slot.tail > 0 {
            file.truncate(slot.finalized)?;
            slot.tail = 0;
        }
        file.append(&AggregateRecord::new(row.time, row.aggregate))?;
        slot.finalized += 1;
        Ok(())
    }

    /// Bring level k into memory, recomputing its finalized prefix and
    /// rebuilding its partial bucket from the level below
    fn restore_level(&mut self, store: &mut MetricStore, k: usize) -> Result<()> {
        debug_assert_eq!(k, self.levels.len());

        let width = store.meta().interval(k)?;
        let size = store.ensure_level(k)?.size();

        // latest timestamp whose data is fully finalized below this level
        let below_frontier: Option<TimePoint> = if k == 0 {
            store.raw().last()?.map(|tv| tv.time)
        } else {
            let below = &self.levels[k - 1];
            match below.finalized {
                0 => None,
                n => Some(self.level_file(store, k - 1)?.read(n - 1)?.time),
            }
        };

        // bucket [s, s+w) is finalized iff a finalized row below starts
        // at or after s + w, i.e. s <= frontier - w
        let mut finalized = match below_frontier {
            None => 0,
            Some(frontier) => {
                let bound = TimePoint::new(
                    frontier
                        .ticks()
                        .saturating_sub(width.ticks())
                        .saturating_add(1),
                );
                self.level_file(store, k)?.find(bound)?
            }
        };
        // the last finalized row may be a flushed pending row whose
        // bucket only completed after a crash; rewind one row so the
        // replay recomputes and rewrites it instead of trusting it
        finalized = finalized.saturating_sub(1);
        let tail = size - finalized;

        let level = if finalized > 0 {
            let last = self.level_file(store, k)?.read(finalized - 1)?;
            Level::with_start(width, last.time + width)
        } else {
            Level::new(width)
        };

        tracing::debug!(
            "restored level {}: width {}, {} finalized rows, {} pending rows",
            k,
            width,
            finalized,
            tail
        );

        self.levels.push(LevelSlot {
            level,
            finalized,
            tail,
        });
        self.replay(store, k)
    }

    /// Rebuild level k's partial bucket by replaying the level below
    /// past the finalized frontier
    fn replay(&mut self, store: &mut MetricStore, k: usize) -> Result<()> {
        let resume = self.levels[k].level.start();

        if k == 0 {
            let raw = store.raw();
            let begin = match resume {
                Some(t) => raw.find(t)?,
                None => 0,
            };
            if begin >= raw.size() {
                return Ok(());
            }
            let mut previous = if begin > 0 {
                raw.read(begin - 1)?.time
            } else {
                // the very first sample contributes a zero-width interval
                raw.read(0)?.time
            };
            for tv in raw.scan(begin, u64::MAX)? {
                let tv = tv?;
                let aggregate = Aggregate::from_sample(previous, tv);
                previous = tv.time;
                self.absorb(store, k, Row::new(tv.time, Duration::ZERO, aggregate))?;
            }
        } else {
            let below_width = self.levels[k - 1].level.width();
            let below_finalized = self.levels[k - 1].finalized;
            let below = self.level_file(store, k - 1)?;
            let begin = match resume {
                Some(t) => below.find(t)?,
                None => 0,
            };
            if begin >= below_finalized {
                return Ok(());
            }
            for rec in below.scan(begin, below_finalized)? {
                let rec = rec?;
                self.absorb(store, k, Row::new(rec.time, below_width, rec.aggregate))?;
            }
        }
        Ok(())
    }

    /// One replay step: advance level k and cascade any finished bucket
    fn absorb(&mut self, store: &mut MetricStore, k: usize, row: Row) -> Result<()> {
        if let Some(finished) = self.levels[k].level.advance(&row)? {
            self.persist(store, k, &finished)?;
            self.feed(store, k + 1, finished)?;
        }
        Ok(())
    }

    /// Persist the pending tails of every level and fsync all stores
    ///
    /// Idempotent: a second flush with no intervening inserts leaves the
    /// files byte-identical. Partial buckets are never fed into coarser
    /// in-memory levels; the coarser tails are derived afresh each flush.
    pub fn flush(&mut self, store: &mut MetricStore) -> Result<()> {
        if self.poisoned || !self.dirty {
            // nothing coherent (or nothing new) to write; just make the
            // finalized state durable
            return store.sync_all();
        }

        // every level present on disk needs its tail refreshed
        while self.levels.len() < store.level_count() {
            self.restore_level(store, self.levels.len())?;
        }

        let mut below: Vec<Row> = Vec::new();
        for k in 0..self.levels.len() {
            let width = self.levels[k].level.width();

            let mut tail: Vec<Row> = Vec::new();
            if let Some(pending) = self.levels[k].level.pending() {
                tail.push(pending);
            }
            for row in &below {
                let bucket = row.time.floor_to(width);
                match tail.last_mut() {
                    Some(last) if last.time == bucket => {
                        last.aggregate = last.aggregate.combine(row.aggregate);
                    }
                    _ => tail.push(Row::new(bucket, width, row.aggregate)),
                }
            }

            let finalized = self.levels[k].finalized;
            let file = self.level_file(store, k)?;
            file.truncate(finalized)?;
            for row in &tail {
                file.append(&AggregateRecord::new(row.time, row.aggregate))?;
            }
            self.levels[k].tail = tail.len() as u64;

            below = tail;
        }

        store.sync_all()?;
        self.dirty = false;
        tracing::debug!("flushed {} levels", self.levels.len());
        Ok(())
    }

    fn level_file<'a>(
        &self,
        store: &'a mut MetricStore,
        k: usize,
    ) -> Result<&'a mut crate::storage::BlockStore<AggregateRecord>> {
        store.level(k).ok_or_else(|| {
            Error::Corruption(format!("level {} file missing while resident", k))
        })
    }
}
