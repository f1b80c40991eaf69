use super::file::JournalFile;
use super::source::ByteSource;
use super::walker::WalkEnd;
use crate::error::Result;
use crate::record::Record;
use crate::stream::LogStream;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

///
/// Tails a journal file that is still being written.
///
/// Created by [`JournalFile::follow`], which moves the file's lower sequence
/// bound to the current tail. Every [`poll`](Follower::poll) that observes a
/// new tail sequence number rescans the arena and returns only the entries
/// appended since the previous poll.
///
/// A rescan that hits a read error or a cut-off arena keeps what it decoded
/// and leaves the tail unacknowledged, so the next poll picks up the rest.
pub struct Follower<'a, S: ByteSource> {
    file: &'a mut JournalFile<S>,
    last_tail: u64,
    interval: Duration,
}

impl<'a, S: ByteSource> Follower<'a, S> {
    pub(crate) fn new(file: &'a mut JournalFile<S>) -> Result<Self> {
        let last_tail = file.last_sequence()?;
        file.set_min_seqnum(last_tail);

        debug!("Following journal file from seqnum {}", last_tail);

        Ok(Self {
            file,
            last_tail,
            interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Exclusive lower bound of the next poll.
    pub fn min_seqnum(&self) -> u64 {
        self.file.options().min_seqnum
    }

    /// Refresh the source and return the entries appended since the last
    /// poll, if the tail sequence number has moved.
    pub fn poll(&mut self) -> Result<Vec<Record>> {
        self.file.source().refresh()?;

        let header = self.file.reload_header()?;
        let tail = header.tail_entry_seqnum.get();
        if tail == self.last_tail {
            return Ok(Vec::new());
        }

        // Walk with the fresh header so that the grown arena is covered
        let (records, complete) = {
            let mut stream =
                LogStream::new(self.file.source(), &header, self.file.options().clone());
            let mut records = Vec::new();
            let mut complete = true;

            for record in stream.by_ref() {
                match record {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!("Rescan of the journal file failed: {}", e);
                        complete = false;
                    }
                }
            }

            let stats = stream.stats();
            if stats.walk_end == Some(WalkEnd::Truncated) || stats.malformed_entries > 0 {
                complete = false;
            }

            (records, complete)
        };

        info!(
            "Journal tail moved from {} to {}: {} new records",
            self.last_tail,
            tail,
            records.len()
        );

        if complete {
            self.last_tail = tail;
            self.file.set_min_seqnum(tail);
        } else {
            debug!("Rescan was incomplete, retrying on the next poll");
            if let Some(last) = records.last() {
                self.file.set_min_seqnum(last.seqnum);
            }
        }

        Ok(records)
    }

    /// Poll every interval and hand new records to `emit` until `shutdown`
    /// is cancelled.
    ///
    /// Errors from the source are logged and retried on the next tick. An
    /// error from `emit` ends the loop.
    pub async fn run<F>(&mut self, shutdown: CancellationToken, mut emit: F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        while !shutdown.is_cancelled() {
            match self.poll() {
                Ok(records) => {
                    for record in records {
                        emit(record)?;
                    }
                }
                Err(e) => warn!("Failed to poll journal file: {}", e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Stopped following journal file at seqnum {}", self.last_tail);
        Ok(())
    }
}
