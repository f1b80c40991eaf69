use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("invalid magic number")]
    InvalidMagicNumber,

    #[error("invalid header size: {0}")]
    InvalidHeaderSize(u64),

    #[error("invalid object type: {0}")]
    InvalidObjectType(u8),

    #[error("i/o error during object operation: {0}")]
    Io(#[from] io::Error),

    #[error("Decompressor error")]
    DecompressorError,

    #[error("unknown compression method")]
    UnknownCompressionMethod,

    #[error("malformed time bound {value:?}: {source}")]
    MalformedTimeBound {
        value: Box<str>,
        source: chrono::ParseError,
    },

    #[error("scan worker panicked")]
    ScanWorkerPanicked,
}

static_assertions::const_assert!(std::mem::size_of::<JournalError>() <= 32);

pub type Result<T> = std::result::Result<T, JournalError>;
