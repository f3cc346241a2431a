//! In-memory partial bucket for one resolution
//!
//! A [`Level`] holds the single unfinalized bucket of one rung of the
//! cascade. Incoming rows (raw samples travel as zero-width rows) are
//! classified by flooring their timestamp to the level's bucket width;
//! crossing a bucket boundary finalizes the current bucket and hands the
//! finished row back to the caller. Buckets that never received data are
//! skipped silently — empty buckets are not materialized on disk.
//!
//! The level never touches disk itself; persisting emitted rows and
//! feeding them into the next level up is the write pipeline's job.

use crate::error::{Error, Result};
use crate::types::{Aggregate, Duration, Row, TimePoint};

pub struct Level {
    width: Duration,
    /// Start of the current bucket; `None` until the first row arrives
    start: Option<TimePoint>,
    aggregate: Aggregate,
}

impl Level {
    pub fn new(width: Duration) -> Self {
        Self {
            width,
            start: None,
            aggregate: Aggregate::empty(),
        }
    }

    /// A level restored after reopen, positioned just past the last
    /// finalized bucket
    pub fn with_start(width: Duration, start: TimePoint) -> Self {
        Self {
            width,
            start: Some(start),
            aggregate: Aggregate::empty(),
        }
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    /// Start of the current bucket, if one is open
    pub fn start(&self) -> Option<TimePoint> {
        self.start
    }

    /// Absorb one row, returning the finished bucket when a boundary was
    /// crossed
    ///
    /// The incoming row's width must divide this level's width; its
    /// timestamp must not precede the current bucket.
    pub fn advance(&mut self, row: &Row) -> Result<Option<Row>> {
        let target = row.time.floor_to(self.width);

        let finished = match self.start {
            None => {
                self.start = Some(target);
                None
            }
            Some(start) if target == start => None,
            Some(start) if target > start => {
                let finished = (self.aggregate.count > 0)
                    .then(|| Row::new(start, self.width, self.aggregate));
                self.start = Some(target);
                self.aggregate = Aggregate::empty();
                finished
            }
            Some(start) => {
                return Err(Error::Ordering {
                    time: row.time,
                    previous: start,
                })
            }
        };

        self.aggregate = self.aggregate.combine(row.aggregate);
        Ok(finished)
    }

    /// The current bucket as a row, if it has received any data
    pub fn pending(&self) -> Option<Row> {
        self.start
            .filter(|_| self.aggregate.count > 0)
            .map(|start| Row::new(start, self.width, self.aggregate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeValue;

    fn sample_row(t: i64, v: f64) -> Row {
        let tv = TimeValue::new(TimePoint::new(t), v);
        Row::new(
            tv.time,
            Duration::ZERO,
            Aggregate::from_sample(TimePoint::new(t - 1), tv),
        )
    }

    #[test]
    fn test_same_bucket_combines() {
        let mut level = Level::new(Duration::new(10));

        assert_eq!(level.advance(&sample_row(1, 5.0)).unwrap(), None);
        assert_eq!(level.advance(&sample_row(4, 3.0)).unwrap(), None);

        let pending = level.pending().unwrap();
        assert_eq!(pending.time, TimePoint::new(0));
        assert_eq!(pending.width, Duration::new(10));
        assert_eq!(pending.aggregate.count, 2);
        assert_eq!(pending.aggregate.sum, 8.0);
        assert_eq!(pending.aggregate.minimum, 3.0);
        assert_eq!(pending.aggregate.maximum, 5.0);
    }

    #[test]
    fn test_boundary_crossing_emits() {
        let mut level = Level::new(Duration::new(10));

        level.advance(&sample_row(1, 5.0)).unwrap();
        level.advance(&sample_row(4, 3.0)).unwrap();

        let finished = level.advance(&sample_row(12, 7.0)).unwrap().unwrap();
        assert_eq!(finished.time, TimePoint::new(0));
        assert_eq!(finished.aggregate.count, 2);

        let pending = level.pending().unwrap();
        assert_eq!(pending.time, TimePoint::new(10));
        assert_eq!(pending.aggregate.count, 1);
        assert_eq!(pending.aggregate.sum, 7.0);
    }

    #[test]
    fn test_gap_skips_empty_buckets() {
        let mut level = Level::new(Duration::new(10));

        level.advance(&sample_row(1, 5.0)).unwrap();
        // jump over buckets [10,20) .. [90,100)
        let finished = level.advance(&sample_row(105, 2.0)).unwrap().unwrap();
        assert_eq!(finished.time, TimePoint::new(0));
        assert_eq!(level.pending().unwrap().time, TimePoint::new(100));
    }

    #[test]
    fn test_restored_level_skips_silently() {
        // seeded past the last finalized bucket, with no data of its own
        let mut level = Level::with_start(Duration::new(10), TimePoint::new(50));
        assert_eq!(level.pending(), None);

        // first row lands two buckets later: nothing to finalize
        assert_eq!(level.advance(&sample_row(72, 1.0)).unwrap(), None);
        assert_eq!(level.pending().unwrap().time, TimePoint::new(70));
    }

    #[test]
    fn test_regression_is_fatal() {
        let mut level = Level::new(Duration::new(10));
        level.advance(&sample_row(25, 1.0)).unwrap();

        let err = level.advance(&sample_row(14, 1.0)).unwrap_err();
        assert!(matches!(err, Error::Ordering { .. }));
    }

    #[test]
    fn test_aggregate_row_input() {
        // a coarser level fed with finalized rows from the level below
        let mut level = Level::new(Duration::new(20));

        let mut below = Level::new(Duration::new(10));
        below.advance(&sample_row(1, 5.0)).unwrap();
        let finished = below.advance(&sample_row(12, 3.0)).unwrap().unwrap();

        level.advance(&finished).unwrap();
        let pending = level.pending().unwrap();
        assert_eq!(pending.time, TimePoint::new(0));
        assert_eq!(pending.width, Duration::new(20));
        assert_eq!(pending.aggregate.count, 1);
    }
}
