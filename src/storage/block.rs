//! Append-only record files
//!
//! A [`BlockStore`] is a single file of fixed-width records (see
//! [`codec`](super::codec)) with appends at the tail, random reads, and
//! O(log n) timestamp bisection. Writers buffer appends; the buffer is
//! flushed before any read so both views stay consistent.
//!
//! Timestamps are strictly increasing within a store. That is a writer
//! invariant, not something the store verifies on every append; `find`
//! relies on it.
//!
//! A crash can leave a torn record at the tail (file length not a
//! multiple of the record size). Writable opens truncate the file back to
//! the last whole record; read-only opens ignore the trailing bytes.

use crate::error::{Error, Result};
use crate::storage::codec::Record;
use crate::types::TimePoint;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Append-only file of fixed-width records
#[derive(Debug)]
pub struct BlockStore<R> {
    path: PathBuf,
    /// Read handle, seeked per random read
    reader: File,
    /// Append handle, present on writable stores
    writer: Option<BufWriter<File>>,
    /// Record count, including buffered appends
    len: u64,
    _record: PhantomData<R>,
}

impl<R: Record> BlockStore<R> {
    /// Open a record file, creating it when `writable`
    ///
    /// Read-only opens require the file to exist.
    pub fn open(path: impl AsRef<Path>, writable: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let writer = if writable {
            let file = OpenOptions::new().create(true).write(true).open(&path)?;
            Some(file)
        } else {
            None
        };

        let reader = File::open(&path)?;
        let bytes = reader.metadata()?.len();
        let len = bytes / R::SIZE;

        let torn = bytes % R::SIZE;
        if torn != 0 {
            if let Some(file) = &writer {
                tracing::warn!(
                    "truncating torn record tail of {:?}: {} trailing bytes",
                    path,
                    torn
                );
                file.set_len(len * R::SIZE)?;
            } else {
                // can't repair without write access; serve the whole records
                tracing::warn!(
                    "ignoring torn record tail of {:?}: {} trailing bytes",
                    path,
                    torn
                );
            }
        }

        let writer = writer
            .map(|mut file| {
                file.seek(SeekFrom::Start(len * R::SIZE))?;
                Ok::<_, std::io::Error>(BufWriter::new(file))
            })
            .transpose()?;

        Ok(Self {
            path,
            reader,
            writer,
            len,
            _record: PhantomData,
        })
    }

    /// Number of records
    pub fn size(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record at the tail
    pub fn append(&mut self, record: &R) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "store opened read-only",
        )))?;

        record.write_to(writer)?;
        self.len += 1;
        Ok(())
    }

    /// Random read of the i-th record (0-based)
    pub fn read(&mut self, index: u64) -> Result<R> {
        if index >= self.len {
            return Err(Error::Corruption(format!(
                "record index {} out of range (size {}) in {:?}",
                index, self.len, self.path
            )));
        }
        self.flush_buffer()?;

        self.reader.seek(SeekFrom::Start(index * R::SIZE))?;
        Ok(R::read_from(&mut self.reader)?)
    }

    /// The last record, if any
    pub fn last(&mut self) -> Result<Option<R>> {
        if self.len == 0 {
            return Ok(None);
        }
        Ok(Some(self.read(self.len - 1)?))
    }

    /// Index of the first record with timestamp ≥ `t`, or `size()` if none
    ///
    /// Bisection over `read`; assumes monotonic timestamps.
    pub fn find(&mut self, t: TimePoint) -> Result<u64> {
        let mut lo = 0;
        let mut hi = self.len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.read(mid)?.time() < t {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Lazy sequential read of records in `[begin, end)`
    ///
    /// The iterator owns its own file handle, so the store can be used
    /// (and mutated) while a scan is pending.
    pub fn scan(&mut self, begin: u64, end: u64) -> Result<Scan<R>> {
        self.flush_buffer()?;

        let end = end.min(self.len);
        let begin = begin.min(end);

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(begin * R::SIZE))?;

        Ok(Scan {
            reader: BufReader::new(file),
            remaining: end - begin,
            _record: PhantomData,
        })
    }

    /// Rewind the file to `len` records, discarding the tail
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        if len >= self.len {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "store opened read-only",
        )))?;

        writer.flush()?;
        let file = writer.get_mut();
        file.set_len(len * R::SIZE)?;
        file.seek(SeekFrom::Start(len * R::SIZE))?;
        self.len = len;
        Ok(())
    }

    /// Flush buffered appends and fsync
    pub fn sync(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Iterator over a bounded range of records, yielded in file order
pub struct Scan<R> {
    reader: BufReader<File>,
    remaining: u64,
    _record: PhantomData<R>,
}

impl<R: Record> Iterator for Scan<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(R::read_from(&mut self.reader).map_err(Error::from))
    }
}
