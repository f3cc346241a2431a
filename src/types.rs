//! Core data types for the storage engine
//!
//! This module defines the fundamental types used throughout the crate:
//! - `TimePoint` / `Duration`: nanosecond-tick time arithmetic
//! - `TimeValue`: a single raw sample
//! - `Aggregate`: a mergeable bucket summary
//! - `Row`: a persisted aggregate for one bucket at one level
//! - `Scope` / `IntervalScope`: endpoint inclusion rules for range queries
//! - `Resolution`: the constraint that drives level selection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Absolute time as a count of nanosecond ticks since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimePoint(i64);

impl TimePoint {
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        // timestamp_nanos_opt is None past 2262; saturate rather than fail
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Option<Self> {
        dt.timestamp_nanos_opt().map(Self)
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Start of the bucket of the given width containing this point.
    ///
    /// Buckets are aligned to the epoch; negative times round towards
    /// negative infinity so that bucket starts stay multiples of `width`.
    pub fn floor_to(self, width: Duration) -> Self {
        Self(self.0.div_euclid(width.ticks()) * width.ticks())
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: Duration) -> TimePoint {
        TimePoint(self.0 + rhs.0)
    }
}

impl Sub<Duration> for TimePoint {
    type Output = TimePoint;

    fn sub(self, rhs: Duration) -> TimePoint {
        TimePoint(self.0 - rhs.0)
    }
}

impl Sub<TimePoint> for TimePoint {
    type Output = Duration;

    fn sub(self, rhs: TimePoint) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl AddAssign<Duration> for TimePoint {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

/// Signed count of nanosecond ticks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Scale by an interval factor, detecting signed overflow
    pub fn checked_mul(self, factor: i64) -> Option<Duration> {
        self.0.checked_mul(factor).map(Duration)
    }

    /// Divide into `n` parts, rejecting results that round down to zero
    pub fn checked_div(self, n: u64) -> Option<Duration> {
        let n = i64::try_from(n).ok()?;
        let ticks = self.0.checked_div(n)?;
        (ticks != 0).then_some(Duration(ticks))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A single raw sample: one value at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeValue {
    pub time: TimePoint,
    pub value: f64,
}

impl TimeValue {
    pub fn new(time: TimePoint, value: f64) -> Self {
        Self { time, value }
    }
}

/// Summary of a contiguous time interval
///
/// Combining is commutative and associative with [`Aggregate::empty`] as
/// the identity, which is what lets coarser levels be built from finer
/// ones without revisiting raw data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Number of samples contributing
    pub count: u64,
    /// Sum of sample values
    pub sum: f64,
    /// Smallest sample value, `+inf` when empty
    pub minimum: f64,
    /// Largest sample value, `-inf` when empty
    pub maximum: f64,
    /// Time-weighted integral of the value over the interval, in tick-values
    pub integral: f64,
}

impl Aggregate {
    /// The combine identity: an empty bucket
    pub fn empty() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
            integral: 0.0,
        }
    }

    /// Contribution of one sample, holding over `(previous, sample.time]`
    ///
    /// The value stream is treated as a piecewise-constant step function
    /// where a sample's value extends back to the previous sample. The
    /// first sample of a metric passes its own time as `previous` and
    /// contributes a zero-width integral.
    pub fn from_sample(previous: TimePoint, sample: TimeValue) -> Self {
        Self {
            count: 1,
            sum: sample.value,
            minimum: sample.value,
            maximum: sample.value,
            integral: (sample.time - previous).ticks() as f64 * sample.value,
        }
    }

    pub fn combine(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            minimum: self.minimum.min(other.minimum),
            maximum: self.maximum.max(other.maximum),
            integral: self.integral + other.integral,
        }
    }

    /// Arithmetic mean of the contributing samples, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// A persisted aggregate for one bucket: `[time, time + width)`
///
/// Raw samples travel through the write pipeline as rows of zero width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    pub time: TimePoint,
    pub width: Duration,
    pub aggregate: Aggregate,
}

impl Row {
    pub fn new(time: TimePoint, width: Duration, aggregate: Aggregate) -> Self {
        Self {
            time,
            width,
            aggregate,
        }
    }

    /// Exclusive end of the bucket
    pub fn end(&self) -> TimePoint {
        self.time + self.width
    }
}

/// Inclusion rule for one endpoint of a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Include rows starting exactly at the endpoint
    Closed,
    /// Exclude rows starting exactly at the endpoint
    Open,
    /// Like closed, plus the single row beyond the endpoint so the
    /// query range is fully covered by returned buckets
    Extended,
}

/// Per-endpoint inclusion rules for a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalScope {
    pub begin: Scope,
    pub end: Scope,
}

impl IntervalScope {
    /// Default for aggregate retrieval
    pub const AGGREGATE: IntervalScope = IntervalScope {
        begin: Scope::Extended,
        end: Scope::Open,
    };

    /// Default for raw retrieval and the raw-as-rows fallback
    pub const RAW: IntervalScope = IntervalScope {
        begin: Scope::Closed,
        end: Scope::Extended,
    };

    pub const fn new(begin: Scope, end: Scope) -> Self {
        Self { begin, end }
    }
}

/// Constraint driving the resolution selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Coarsest level whose buckets still yield at least this many rows
    /// over the queried range
    MinSamples(u64),
    /// Coarsest level whose bucket width does not exceed this duration
    IntervalMax(Duration),
}
