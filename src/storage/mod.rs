//! On-disk storage for one metric
//!
//! This module provides the file layer beneath the write and read
//! pipelines:
//!
//! - **codec**: fixed-width little-endian record encodings
//! - **block**: append-only record files with timestamp bisection
//! - **store**: the per-metric bundle of raw + level files and metadata
//!
//! # Architecture
//!
//! ```text
//! Write path:
//!   TimeValue → raw.hta → Level 0 → lvl0.hta → Level 1 → lvl1.hta → …
//!
//! Read path:
//!   (begin, end, constraint) → pick level → bisect → scan → rows
//! ```

pub mod block;
pub mod codec;
pub mod store;

pub use block::{BlockStore, Scan};
pub use codec::{AggregateRecord, Record};
pub use store::{Meta, MetricStore};
