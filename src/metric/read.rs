//! Read pipeline: resolution selection and scoped range scans
//!
//! Aggregate queries pick the coarsest level satisfying the caller's
//! constraint, clamped to the levels that exist on disk, then bisect to
//! the scan bounds. Ranges too small for even the finest level fall back
//! to raw samples wrapped as zero-width rows.
//!
//! Bad ranges (`begin > end`) yield empty results, not errors.

use crate::error::Result;
use crate::storage::block::BlockStore;
use crate::storage::codec::Record;
use crate::storage::MetricStore;
use crate::types::{
    Aggregate, Duration, IntervalScope, Resolution, Row, Scope, TimePoint, TimeValue,
};

/// Aggregate retrieval at adaptive resolution
pub(crate) fn retrieve(
    store: &mut MetricStore,
    begin: TimePoint,
    end: TimePoint,
    resolution: Resolution,
    scope: IntervalScope,
) -> Result<Vec<Row>> {
    if begin > end {
        return Ok(Vec::new());
    }
    match choose_level(store, begin, end, resolution)? {
        Some(k) => {
            let width = store.meta().interval(k)?;
            let Some(file) = store.level(k) else {
                return Ok(Vec::new());
            };
            let (i, j) = scope_bounds(file, begin, end, scope)?;
            file.scan(i, j)?
                .map(|rec| rec.map(|rec| Row::new(rec.time, width, rec.aggregate)))
                .collect()
        }
        None => raw_rows(store, begin, end),
    }
}

/// Raw sample retrieval
pub(crate) fn retrieve_raw(
    store: &mut MetricStore,
    begin: TimePoint,
    end: TimePoint,
    scope: IntervalScope,
) -> Result<Vec<TimeValue>> {
    if begin > end {
        return Ok(Vec::new());
    }
    let raw = store.raw();
    let (i, j) = scope_bounds(raw, begin, end, scope)?;
    raw.scan(i, j)?.collect()
}

/// First and last raw timestamps
pub(crate) fn range(store: &mut MetricStore) -> Result<Option<(TimePoint, TimePoint)>> {
    let raw = store.raw();
    if raw.is_empty() {
        return Ok(None);
    }
    let first = raw.read(0)?.time;
    let last = raw.read(raw.size() - 1)?.time;
    Ok(Some((first, last)))
}

/// Raw sample count within a scoped range
pub(crate) fn count_range(
    store: &mut MetricStore,
    begin: TimePoint,
    end: TimePoint,
    scope: IntervalScope,
) -> Result<u64> {
    if begin > end {
        return Ok(0);
    }
    let raw = store.raw();
    let (i, j) = scope_bounds(raw, begin, end, scope)?;
    Ok(j - i)
}

/// Pick the coarsest level satisfying the constraint, or `None` for the
/// raw fallback
///
/// Increasing `min_samples` never selects a coarser level; increasing
/// `interval_max` never selects a finer one.
fn choose_level(
    store: &mut MetricStore,
    begin: TimePoint,
    end: TimePoint,
    resolution: Resolution,
) -> Result<Option<usize>> {
    let available = store.level_count();
    if available == 0 {
        return Ok(None);
    }
    let meta = store.meta();

    match resolution {
        Resolution::MinSamples(min_samples) => {
            let Ok(min_samples) = i64::try_from(min_samples) else {
                return Ok(None);
            };
            let span = (end - begin).ticks();
            let mut chosen = None;
            for k in 0..available {
                let width = meta.interval(k)?.ticks();
                if span / width >= min_samples {
                    chosen = Some(k);
                } else {
                    break;
                }
            }
            Ok(chosen)
        }
        Resolution::IntervalMax(interval_max) => {
            let mut chosen = None;
            for k in 0..available {
                if meta.interval(k)? <= interval_max {
                    chosen = Some(k);
                } else {
                    break;
                }
            }
            Ok(chosen)
        }
    }
}

/// Serve a too-small range from raw samples as zero-width rows
fn raw_rows(store: &mut MetricStore, begin: TimePoint, end: TimePoint) -> Result<Vec<Row>> {
    let raw = store.raw();
    let (i, j) = scope_bounds(raw, begin, end, IntervalScope::RAW)?;
    raw.scan(i, j)?
        .map(|tv| {
            tv.map(|tv| {
                Row::new(
                    tv.time,
                    Duration::ZERO,
                    Aggregate::from_sample(tv.time, tv),
                )
            })
        })
        .collect()
}

/// Resolve a scoped range to record indices `[i, j)`
///
/// `closed` keeps records starting at the endpoint, `open` drops them,
/// and `extended` widens the closed set by one record outward.
fn scope_bounds<R: Record>(
    store: &mut BlockStore<R>,
    begin: TimePoint,
    end: TimePoint,
    scope: IntervalScope,
) -> Result<(u64, u64)> {
    let size = store.size();

    let at_begin = store.find(begin)?;
    let i = match scope.begin {
        Scope::Closed => at_begin,
        Scope::Open => {
            if at_begin < size && store.read(at_begin)?.time() == begin {
                at_begin + 1
            } else {
                at_begin
            }
        }
        Scope::Extended => at_begin.saturating_sub(1),
    };

    let at_end = store.find(end)?;
    let past_closed = if at_end < size && store.read(at_end)?.time() == end {
        at_end + 1
    } else {
        at_end
    };
    let j = match scope.end {
        Scope::Closed => past_closed,
        Scope::Open => at_end,
        Scope::Extended => (past_closed + 1).min(size),
    };

    Ok((i.min(j), j))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricMode;
    use crate::metric::write::WritePipeline;
    use crate::storage::codec::AggregateRecord;
    use crate::storage::Meta;
    use tempfile::tempdir;

    fn open_store(root: &std::path::Path, interval_min: i64, factor: i64) -> MetricStore {
        let meta = Meta {
            interval_min: Duration::new(interval_min),
            interval_factor: factor,
            mode: MetricMode::ReadWrite,
            extra: serde_json::Map::new(),
        };
        MetricStore::open(root, "m", MetricMode::ReadWrite, Some(meta)).unwrap()
    }

    fn tp(t: i64) -> TimePoint {
        TimePoint::new(t)
    }

    /// A metric with level-1 buckets starting at 0, 20, 40, 60, 80
    fn scoped_fixture(root: &std::path::Path) -> MetricStore {
        let mut store = open_store(root, 10, 2);
        let file = store.ensure_level(0).unwrap();
        for start in [0, 10, 20, 30, 40, 50, 60, 70, 80, 90] {
            let sample = TimeValue::new(tp(start + 5), 1.0);
            file.append(&AggregateRecord::new(
                tp(start),
                Aggregate::from_sample(tp(start), sample),
            ))
            .unwrap();
        }
        let file = store.ensure_level(1).unwrap();
        for start in [0i64, 20, 40, 60, 80] {
            let sample = TimeValue::new(tp(start + 5), 1.0);
            let a = Aggregate::from_sample(tp(start), sample)
                .combine(Aggregate::from_sample(tp(start + 10), sample));
            file.append(&AggregateRecord::new(tp(start), a)).unwrap();
        }
        store
    }

    fn level1_starts(
        store: &mut MetricStore,
        begin: i64,
        end: i64,
        scope: IntervalScope,
    ) -> Vec<i64> {
        retrieve(
            store,
            tp(begin),
            tp(end),
            Resolution::IntervalMax(Duration::new(20)),
            scope,
        )
        .unwrap()
        .iter()
        .map(|r| r.time.ticks())
        .collect()
    }

    #[test]
    fn test_extended_scope_covers_range() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());

        let starts = level1_starts(
            &mut store,
            25,
            55,
            IntervalScope::new(Scope::Extended, Scope::Extended),
        );
        assert_eq!(starts, vec![20, 40, 60]);
    }

    #[test]
    fn test_closed_open_scope() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());

        let starts = level1_starts(
            &mut store,
            25,
            55,
            IntervalScope::new(Scope::Closed, Scope::Open),
        );
        assert_eq!(starts, vec![40]);
    }

    #[test]
    fn test_scope_at_exact_boundaries() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());

        // begin and end on bucket starts
        let closed = level1_starts(
            &mut store,
            20,
            60,
            IntervalScope::new(Scope::Closed, Scope::Closed),
        );
        assert_eq!(closed, vec![20, 40, 60]);

        let open = level1_starts(
            &mut store,
            20,
            60,
            IntervalScope::new(Scope::Open, Scope::Open),
        );
        assert_eq!(open, vec![40]);

        let extended = level1_starts(
            &mut store,
            20,
            60,
            IntervalScope::new(Scope::Extended, Scope::Extended),
        );
        assert_eq!(extended, vec![0, 20, 40, 60, 80]);
    }

    #[test]
    fn test_resolution_interval_max() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());

        // cap below the finest level: raw fallback (raw store is empty)
        let rows = retrieve(
            &mut store,
            tp(0),
            tp(100),
            Resolution::IntervalMax(Duration::new(5)),
            IntervalScope::AGGREGATE,
        )
        .unwrap();
        assert!(rows.is_empty());

        // cap between levels: level 0
        let rows = retrieve(
            &mut store,
            tp(0),
            tp(100),
            Resolution::IntervalMax(Duration::new(15)),
            IntervalScope::new(Scope::Closed, Scope::Closed),
        )
        .unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].width, Duration::new(10));

        // cap far above the coarsest: clamped to level 1
        let rows = retrieve(
            &mut store,
            tp(0),
            tp(100),
            Resolution::IntervalMax(Duration::new(1_000_000)),
            IntervalScope::new(Scope::Closed, Scope::Closed),
        )
        .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].width, Duration::new(20));
    }

    #[test]
    fn test_resolution_min_samples() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());
        let scope = IntervalScope::new(Scope::Closed, Scope::Closed);

        // span 100: level 1 gives 5 buckets, level 0 gives 10
        let rows = retrieve(&mut store, tp(0), tp(100), Resolution::MinSamples(5), scope).unwrap();
        assert_eq!(rows[0].width, Duration::new(20));

        let rows = retrieve(&mut store, tp(0), tp(100), Resolution::MinSamples(6), scope).unwrap();
        assert_eq!(rows[0].width, Duration::new(10));

        // more buckets than even level 0 can give: raw fallback
        let rows = retrieve(&mut store, tp(0), tp(100), Resolution::MinSamples(11), scope).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_selection_monotonicity() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());
        let scope = IntervalScope::new(Scope::Closed, Scope::Closed);

        let mut last_width = i64::MAX;
        for min_samples in 1..12 {
            let rows = retrieve(
                &mut store,
                tp(0),
                tp(100),
                Resolution::MinSamples(min_samples),
                scope,
            )
            .unwrap();
            if rows.is_empty() {
                // raw fallback: width zero from here on
                last_width = 0;
                continue;
            }
            let width = rows[0].width.ticks();
            assert!(width <= last_width, "coarser level at min_samples {}", min_samples);
            last_width = width;
        }
    }

    #[test]
    fn test_bad_range_is_empty() {
        let dir = tempdir().unwrap();
        let mut store = scoped_fixture(dir.path());

        let rows = retrieve(
            &mut store,
            tp(100),
            tp(0),
            Resolution::MinSamples(1),
            IntervalScope::AGGREGATE,
        )
        .unwrap();
        assert!(rows.is_empty());

        assert!(retrieve_raw(&mut store, tp(100), tp(0), IntervalScope::RAW)
            .unwrap()
            .is_empty());
        assert_eq!(
            count_range(&mut store, tp(100), tp(0), IntervalScope::RAW).unwrap(),
            0
        );
    }

    #[test]
    fn test_raw_retrieval_and_range() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 10, 2);
        let mut pipeline = WritePipeline::new(&mut store).unwrap();
        for t in [5, 15, 25, 35] {
            pipeline
                .insert(&mut store, TimeValue::new(tp(t), t as f64))
                .unwrap();
        }

        let samples = retrieve_raw(
            &mut store,
            tp(15),
            tp(25),
            IntervalScope::new(Scope::Closed, Scope::Closed),
        )
        .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].time, tp(15));
        assert_eq!(samples[1].time, tp(25));

        // the raw default scope picks up the sample after the range
        let samples = retrieve_raw(&mut store, tp(15), tp(25), IntervalScope::RAW).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2].time, tp(35));

        assert_eq!(range(&mut store).unwrap(), Some((tp(5), tp(35))));
        assert_eq!(
            count_range(
                &mut store,
                tp(5),
                tp(35),
                IntervalScope::new(Scope::Closed, Scope::Closed)
            )
            .unwrap(),
            4
        );
    }

    #[test]
    fn test_raw_fallback_rows() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 1_000, 10);
        let mut pipeline = WritePipeline::new(&mut store).unwrap();
        for t in [5, 15, 25] {
            pipeline
                .insert(&mut store, TimeValue::new(tp(t), 2.0))
                .unwrap();
        }

        // range far smaller than the finest bucket
        let rows = retrieve(
            &mut store,
            tp(0),
            tp(30),
            Resolution::IntervalMax(Duration::new(100)),
            IntervalScope::AGGREGATE,
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.width, Duration::ZERO);
            assert_eq!(row.aggregate.count, 1);
            assert_eq!(row.aggregate.sum, 2.0);
            assert_eq!(row.aggregate.integral, 0.0);
        }
    }

    #[test]
    fn test_empty_metric() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 10, 2);

        assert_eq!(range(&mut store).unwrap(), None);
        let rows = retrieve(
            &mut store,
            tp(0),
            tp(1000),
            Resolution::MinSamples(1),
            IntervalScope::AGGREGATE,
        )
        .unwrap();
        assert!(rows.is_empty());
    }
}
