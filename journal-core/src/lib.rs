//! Read-only decoding of systemd journal files.
//!
//! This crate provides:
//! - The on-disk layout and a validated file handle: [`mod@file`] module
//! - Conversion of entries into raw or structured records: [`record`] module
//! - Filtered record streams, in place or on a worker thread: [`stream`] module
//!
//! # Examples
//!
//! ```no_run
//! use journal_core::{JournalFile, OutputMode, PagedReaderOptions, TimeRange};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let mut file = JournalFile::open_path("system.journal", PagedReaderOptions::default())?;
//! file.set_output(OutputMode::Raw);
//! file.set_time_range(TimeRange::parse(Some("2024-01-01T00:00:00Z"), None)?);
//!
//! for record in file.logs() {
//!     println!("{}", serde_json::to_string(&record?)?);
//! }
//! # Ok(())
//! # }
//! ```

// Core error types used throughout the crate
pub mod error;

// Journal file format and byte sources
pub mod file;

// Records built from entry fields
pub mod record;

// Filtered record streams
pub mod stream;

// Re-export commonly used types for convenience
pub use error::{JournalError, Result};

pub use file::{
    ByteSource, Follower, HeaderSummary, JournalFile, MAX_PAGE_SIZE, PagedReader,
    PagedReaderOptions, WalkEnd,
};
pub use record::{Classifier, Fields, Record, RecordBody, Value};
pub use stream::{LogStream, OutputMode, ScanHandle, ScanOptions, ScanStats, TimeRange, spawn_scan};
