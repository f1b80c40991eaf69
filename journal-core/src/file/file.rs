use super::follow::Follower;
use super::object::{EntryItemEncoding, HeaderExtension, JOURNAL_SIGNATURE, JournalHeader};
use super::paged::{PagedReader, PagedReaderOptions};
use super::source::ByteSource;
use crate::error::{JournalError, Result};
use crate::stream::{LogStream, OutputMode, ScanHandle, ScanOptions, TimeRange, spawn_scan};
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

///
/// An open journal file.
///
/// The handle owns the byte source, the header read when the file was
/// opened and the scan options used by [`JournalFile::logs`]. The options
/// belong to this handle alone; they are only changed between scans.
pub struct JournalFile<S: ByteSource> {
    source: S,
    header: JournalHeader,
    extension: Option<HeaderExtension>,
    encoding: EntryItemEncoding,
    arena_end: u64,
    options: ScanOptions,
}

impl<S: ByteSource> std::fmt::Debug for JournalFile<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalFile")
            .field("encoding", &self.encoding)
            .field("arena_end", &self.arena_end)
            .field("options", &self.options)
            .finish()
    }
}

/// Read and validate the header at offset zero.
pub(crate) fn read_header<S: ByteSource>(source: &S) -> Result<JournalHeader> {
    let header: JournalHeader = source.read_struct(0)?;

    if &header.signature != JOURNAL_SIGNATURE {
        return Err(JournalError::InvalidMagicNumber);
    }

    let header_size = header.header_size.get();
    if header_size < size_of::<JournalHeader>() as u64 {
        return Err(JournalError::InvalidHeaderSize(header_size));
    }

    Ok(header)
}

impl JournalFile<PagedReader> {
    pub fn open_path(path: impl AsRef<Path>, options: PagedReaderOptions) -> Result<Self> {
        Self::open(PagedReader::open(path, options)?)
    }
}

impl<S: ByteSource> JournalFile<S> {
    pub fn open(source: S) -> Result<Self> {
        let header = read_header(&source)?;

        let extension_end = (size_of::<JournalHeader>() + size_of::<HeaderExtension>()) as u64;
        let extension = if header.header_size.get() >= extension_end {
            Some(source.read_struct(size_of::<JournalHeader>() as u64)?)
        } else {
            None
        };

        let encoding = EntryItemEncoding::from_header(&header);
        let arena_end = header.arena_end();

        debug!(
            "Opened journal file: encoding={:?}, arena_end={}, n_entries={}",
            encoding,
            arena_end,
            header.n_entries.get()
        );

        Ok(Self {
            source,
            header,
            extension,
            encoding,
            arena_end,
            options: ScanOptions::default(),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The header as read when the file was opened.
    pub fn header(&self) -> &JournalHeader {
        &self.header
    }

    pub fn header_extension(&self) -> Option<&HeaderExtension> {
        self.extension.as_ref()
    }

    pub fn encoding(&self) -> EntryItemEncoding {
        self.encoding
    }

    pub fn is_compact(&self) -> bool {
        self.encoding == EntryItemEncoding::Compact
    }

    /// Absolute offset one past the end of the arena.
    pub fn arena_end(&self) -> u64 {
        self.arena_end
    }

    pub fn num_entries(&self) -> u64 {
        self.header.n_entries.get()
    }

    pub fn num_objects(&self) -> u64 {
        self.header.n_objects.get()
    }

    /// Re-read the header from the source and return the sequence number of
    /// the most recently appended entry.
    pub fn last_sequence(&self) -> Result<u64> {
        Ok(self.reload_header()?.tail_entry_seqnum.get())
    }

    /// Read a fresh copy of the header. The header held by the handle is
    /// left untouched.
    pub fn reload_header(&self) -> Result<JournalHeader> {
        read_header(&self.source)
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ScanOptions) {
        self.options = options;
    }

    pub fn set_min_seqnum(&mut self, seqnum: u64) {
        self.options.min_seqnum = seqnum;
    }

    pub fn set_time_range(&mut self, time_range: TimeRange) {
        self.options.time_range = time_range;
    }

    pub fn set_output(&mut self, output: OutputMode) {
        self.options.output = output;
    }

    /// Lazily decode the entries matching the current options.
    pub fn logs(&self) -> LogStream<'_, S> {
        LogStream::new(&self.source, &self.header, self.options.clone())
    }

    /// Start following the file from its current tail.
    pub fn follow(&mut self) -> Result<Follower<'_, S>> {
        Follower::new(self)
    }

    pub fn debug_summary(&self) -> super::header::HeaderSummary<'_> {
        super::header::HeaderSummary::new(&self.header, self.extension.as_ref())
    }
}

impl<S: ByteSource + Send + Sync + 'static> JournalFile<Arc<S>> {
    /// Like [`JournalFile::logs`], but decodes on a worker thread.
    pub fn spawn_logs(&self, capacity: usize) -> Result<ScanHandle> {
        spawn_scan(
            Arc::clone(&self.source),
            self.header,
            self.options.clone(),
            capacity,
        )
    }
}
