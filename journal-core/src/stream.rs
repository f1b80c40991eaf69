//! Filtered, lazily decoded streams of records.
//!
//! [`LogStream`] is a pull-based iterator over the entries of one arena walk.
//! [`spawn_scan`] runs the same pipeline on a worker thread and hands the
//! records over through a bounded channel.

use crate::error::{JournalError, Result};
use crate::file::entry::EntryDecoder;
use crate::file::object::{EntryItemEncoding, JournalHeader, ObjectType};
use crate::file::source::ByteSource;
use crate::file::walker::{ArenaWalker, WalkEnd};
use crate::record::{Classifier, Record};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, bounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Inclusive wall-clock bounds. A missing bound does not restrict the scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Parse RFC 3339 bounds, e.g. `2024-01-01T00:00:00Z`.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start: start.map(parse_bound).transpose()?,
            end: end.map(parse_bound).transpose()?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether a realtime value, in microseconds since the epoch, falls
    /// within the range.
    pub fn contains(&self, realtime: u64) -> bool {
        let realtime = i64::try_from(realtime).unwrap_or(i64::MAX);

        self.start.is_none_or(|start| start.timestamp_micros() <= realtime)
            && self.end.is_none_or(|end| realtime <= end.timestamp_micros())
    }
}

fn parse_bound(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| JournalError::MalformedTimeBound {
            value: value.into(),
            source,
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// One flat map of field names to strings.
    Raw,
    /// Typed fields split into `System` and `EventData`.
    #[default]
    Structured,
}

/// Filters and output format of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Only entries with a strictly greater sequence number are emitted.
    pub min_seqnum: u64,
    pub time_range: TimeRange,
    pub output: OutputMode,
}

impl ScanOptions {
    pub fn with_min_seqnum(mut self, seqnum: u64) -> Self {
        self.min_seqnum = seqnum;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    fn matches(&self, seqnum: u64, realtime: u64) -> bool {
        seqnum > self.min_seqnum && self.time_range.contains(realtime)
    }
}

/// Counters collected while a stream is consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub objects_visited: u64,
    /// Objects whose type byte is not a known object type.
    pub unknown_objects: u64,
    pub entries_seen: u64,
    pub entries_emitted: u64,
    /// Entry items that did not resolve to a payload.
    pub skipped_items: u64,
    /// Entry objects too small or too damaged to decode.
    pub malformed_entries: u64,
    /// Entries dropped because their sequence number did not increase.
    pub out_of_order: u64,
    /// Special fields stored as plain strings because they did not parse.
    pub fallbacks: u64,
    /// `None` until the walk has finished.
    pub walk_end: Option<WalkEnd>,
}

/// Lazily decodes the entries of one arena walk that match a set of
/// [`ScanOptions`].
///
/// Records come out in arena order with strictly increasing sequence
/// numbers. Damaged items are skipped; only I/O errors on the arena itself
/// are yielded, after which the stream ends.
pub struct LogStream<'a, S: ByteSource> {
    walker: ArenaWalker<'a, S>,
    decoder: EntryDecoder<'a, S>,
    classifier: Classifier,
    options: ScanOptions,
    last_seqnum: Option<u64>,
    stats: ScanStats,
}

impl<'a, S: ByteSource> LogStream<'a, S> {
    /// The header must have been validated when it was read, see
    /// [`JournalFile::open`](crate::JournalFile::open).
    pub fn new(source: &'a S, header: &JournalHeader, options: ScanOptions) -> Self {
        let arena_start = header.header_size.get();
        let arena_end = header.arena_end();
        let encoding = EntryItemEncoding::from_header(header);

        Self {
            walker: ArenaWalker::new(source, arena_start, arena_end),
            decoder: EntryDecoder::new(source, encoding, arena_end),
            classifier: Classifier::new(),
            options,
            last_seqnum: None,
            stats: ScanStats::default(),
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            fallbacks: self.classifier.fallbacks(),
            walk_end: self.walker.end(),
            ..self.stats.clone()
        }
    }
}

impl<S: ByteSource> Iterator for LogStream<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (offset, object) = match self.walker.next()? {
                Ok(visit) => visit,
                Err(e) => return Some(Err(e)),
            };
            self.stats.objects_visited += 1;

            match object.object_type() {
                Ok(ObjectType::Entry) => {}
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping object at {}: {}", offset, e);
                    self.stats.unknown_objects += 1;
                    continue;
                }
            }

            let entry = match self.decoder.entry_header(offset, &object) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    debug!("Entry object at {} is too small", offset);
                    self.stats.malformed_entries += 1;
                    continue;
                }
                Err(e) => {
                    debug!("Failed to read entry object at {}: {}", offset, e);
                    self.stats.malformed_entries += 1;
                    continue;
                }
            };
            self.stats.entries_seen += 1;

            let seqnum = entry.seqnum.get();
            let realtime = entry.realtime.get();
            if !self.options.matches(seqnum, realtime) {
                continue;
            }

            if let Some(last) = self.last_seqnum.filter(|&last| seqnum <= last) {
                warn!(
                    "Dropping entry at {} with seqnum {} (last emitted {})",
                    offset, seqnum, last
                );
                self.stats.out_of_order += 1;
                continue;
            }

            let fields = self.decoder.fields(offset, object.size(), |_| {
                self.stats.skipped_items += 1;
            });

            let record = match self.options.output {
                OutputMode::Raw => self.classifier.build_raw(seqnum, realtime, &fields),
                OutputMode::Structured => {
                    self.classifier.build_structured(seqnum, realtime, &fields)
                }
            };

            self.last_seqnum = Some(seqnum);
            self.stats.entries_emitted += 1;
            return Some(Ok(record));
        }
    }
}

impl<S: ByteSource> std::iter::FusedIterator for LogStream<'_, S> {}

/// Records produced by a scan running on a worker thread.
///
/// Iterating blocks until the worker sends the next record, and ends once
/// the scan is done. Dropping the handle early stops the worker at its next
/// send.
pub struct ScanHandle {
    receiver: Receiver<Result<Record>>,
    worker: JoinHandle<ScanStats>,
}

impl ScanHandle {
    /// Stop receiving and wait for the worker to finish.
    pub fn join(self) -> Result<ScanStats> {
        let ScanHandle { receiver, worker } = self;
        drop(receiver);

        worker.join().map_err(|_| JournalError::ScanWorkerPanicked)
    }
}

impl Iterator for ScanHandle {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

/// Run a [`LogStream`] on a dedicated thread, buffering at most `capacity`
/// records ahead of the consumer.
pub fn spawn_scan<S>(
    source: Arc<S>,
    header: JournalHeader,
    options: ScanOptions,
    capacity: usize,
) -> Result<ScanHandle>
where
    S: ByteSource + Send + Sync + 'static,
{
    let (sender, receiver) = bounded(capacity);

    let worker = std::thread::Builder::new()
        .name(String::from("journal-scan"))
        .spawn(move || {
            let mut stream = LogStream::new(source.as_ref(), &header, options);

            for item in stream.by_ref() {
                if sender.send(item).is_err() {
                    debug!("Scan receiver dropped, stopping worker");
                    break;
                }
            }

            stream.stats()
        })?;

    Ok(ScanHandle { receiver, worker })
}
