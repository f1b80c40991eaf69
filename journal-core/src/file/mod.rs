pub mod entry;
#[allow(clippy::module_inception)]
pub mod file;
pub mod follow;
pub mod header;
pub mod object;
pub mod paged;
pub mod source;
pub mod walker;

pub use entry::{EntryDecoder, SkipReason};
pub use file::JournalFile;
pub use follow::Follower;
pub use header::HeaderSummary;
pub use object::{
    EntryItemEncoding, HeaderCompatibleFlags, HeaderIncompatibleFlags, JournalHeader,
    JournalState, ObjectHeader, ObjectType,
};
pub use paged::{MAX_PAGE_SIZE, PagedReader, PagedReaderOptions};
pub use source::ByteSource;
pub use walker::{ArenaWalker, WalkEnd};
