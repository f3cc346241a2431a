//! Fixed-width record encodings
//!
//! Every store file is a plain sequence of fixed-width records with no
//! header, framing, or checksums, so the n-th record sits at byte offset
//! `n * SIZE` and bisection can seek directly. All fields are
//! little-endian.
//!
//! Layout:
//! ```text
//! raw record (16 bytes)          aggregate record (48 bytes)
//!   time:  i64                     time:     i64  (bucket start)
//!   value: f64                     count:    u64
//!                                  sum:      f64
//!                                  minimum:  f64
//!                                  maximum:  f64
//!                                  integral: f64
//! ```

use crate::types::{Aggregate, TimePoint, TimeValue};
use std::io::{Read, Write};

fn read_i64<R: Read>(r: &mut R) -> std::io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> std::io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// A fixed-width record with a timestamp, storable in a [`BlockStore`]
///
/// [`BlockStore`]: crate::storage::BlockStore
pub trait Record: Copy {
    /// Encoded size in bytes; every record of a type has exactly this size
    const SIZE: u64;

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()>;

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self>;

    /// Timestamp the store bisects on: sample time for raw records,
    /// bucket start for aggregate records
    fn time(&self) -> TimePoint;
}

impl Record for TimeValue {
    const SIZE: u64 = 16;

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.time.ticks().to_le_bytes())?;
        w.write_all(&self.value.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            time: TimePoint::new(read_i64(r)?),
            value: read_f64(r)?,
        })
    }

    fn time(&self) -> TimePoint {
        self.time
    }
}

/// One aggregate row as stored on disk
///
/// The bucket width is not stored; it is implied by which level file the
/// record lives in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateRecord {
    pub time: TimePoint,
    pub aggregate: Aggregate,
}

impl AggregateRecord {
    pub fn new(time: TimePoint, aggregate: Aggregate) -> Self {
        Self { time, aggregate }
    }
}

impl Record for AggregateRecord {
    const SIZE: u64 = 48;

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.time.ticks().to_le_bytes())?;
        w.write_all(&self.aggregate.count.to_le_bytes())?;
        w.write_all(&self.aggregate.sum.to_le_bytes())?;
        w.write_all(&self.aggregate.minimum.to_le_bytes())?;
        w.write_all(&self.aggregate.maximum.to_le_bytes())?;
        w.write_all(&self.aggregate.integral.to_le_bytes())?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            time: TimePoint::new(read_i64(r)?),
            aggregate: Aggregate {
                count: read_u64(r)?,
                sum: read_f64(r)?,
                minimum: read_f64(r)?,
                maximum: read_f64(r)?,
                integral: read_f64(r)?,
            },
        })
    }

    fn time(&self) -> TimePoint {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_roundtrip() {
        let tv = TimeValue::new(TimePoint::new(1520012636139086277), 42.5);

        let mut buf = Vec::new();
        tv.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, TimeValue::SIZE);

        let restored = TimeValue::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, tv);
    }

    #[test]
    fn test_raw_record_layout() {
        let tv = TimeValue::new(TimePoint::new(0x0102030405060708), 1.0);

        let mut buf = Vec::new();
        tv.write_to(&mut buf).unwrap();

        // little-endian time, then IEEE-754 value
        assert_eq!(&buf[0..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[8..16], &1.0f64.to_le_bytes());
    }

    #[test]
    fn test_aggregate_record_roundtrip() {
        let rec = AggregateRecord::new(
            TimePoint::new(-1000),
            Aggregate {
                count: 7,
                sum: 21.5,
                minimum: -3.0,
                maximum: 9.25,
                integral: 1.5e12,
            },
        );

        let mut buf = Vec::new();
        rec.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, AggregateRecord::SIZE);

        let restored = AggregateRecord::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, rec);
    }

    #[test]
    fn test_empty_bucket_roundtrip() {
        // the min/max infinities of an empty aggregate survive encoding
        let rec = AggregateRecord::new(TimePoint::new(0), Aggregate::empty());

        let mut buf = Vec::new();
        rec.write_to(&mut buf).unwrap();
        let restored = AggregateRecord::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.aggregate.count, 0);
        assert_eq!(restored.aggregate.minimum, f64::INFINITY);
        assert_eq!(restored.aggregate.maximum, f64::NEG_INFINITY);
    }

    #[test]
    fn test_short_read() {
        let buf = [0u8; 10];
        let err = TimeValue::read_from(&mut &buf[..]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
