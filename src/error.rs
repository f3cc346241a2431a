//! Error types for the storage engine
//!
//! All fallible operations in the crate return [`Result`]. Insert-path
//! failures poison the write session: once an insert has failed, every
//! further insert on the same metric reports [`Error::Poisoned`].

use crate::config::MetricMode;
use crate::types::TimePoint;
use thiserror::Error;

/// Errors that can occur in the storage engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration: unknown backend, bad mode, duplicate
    /// metric name, invalid interval parameters
    #[error("configuration error: {0}")]
    Config(String),

    /// Capability requested that the open mode does not provide
    #[error("metric opened in mode {mode} does not support {op}")]
    Mode { mode: MetricMode, op: &'static str },

    /// Insert with a timestamp not after the previous one
    #[error("non-monotonic insert: {time} is not after {previous}")]
    Ordering { time: TimePoint, previous: TimePoint },

    /// Duration arithmetic overflowed or produced a zero-tick width
    #[error("duration arithmetic overflow: {0}")]
    Overflow(String),

    /// Backend read/write failure, including short reads
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk state violates a store invariant
    #[error("corrupt store: {0}")]
    Corruption(String),

    /// Metric lookup failed and the requested mode cannot create it
    #[error("metric not found: {0}")]
    NotFound(String),

    /// The write session was poisoned by an earlier insert failure
    #[error("write session poisoned by an earlier failure")]
    Poisoned,
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("power.node1".to_string());
        assert_eq!(err.to_string(), "metric not found: power.node1");

        let err = Error::Ordering {
            time: TimePoint::new(100),
            previous: TimePoint::new(100),
        };
        assert_eq!(
            err.to_string(),
            "non-monotonic insert: 100ns is not after 100ns"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
