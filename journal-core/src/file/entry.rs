use super::object::{
    CompactEntryItem, EntryItemEncoding, EntryObjectHeader, ObjectHeader, ObjectType,
    RegularEntryItem,
};
use super::source::ByteSource;
use crate::error::{JournalError, Result};
use std::mem::size_of;
use tracing::{debug, trace};

const ENTRY_FIXED_SIZE: u64 = size_of::<EntryObjectHeader>() as u64;

/// Upper bound for a decompressed payload.
const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Why an entry item did not produce a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The item references an offset outside of the arena. Ends the item list.
    InvalidReference,
    /// The referenced object is not a data object.
    NotData,
    /// The data object is too small for its own header, or extends past the
    /// arena or the source.
    Malformed,
    /// Reading the item or the data object failed.
    ReadFailed,
    /// The payload could not be decompressed.
    Decompression,
}

/// Decodes the item lists of entry objects into raw `FIELD=value` payloads.
pub struct EntryDecoder<'a, S: ByteSource> {
    source: &'a S,
    encoding: EntryItemEncoding,
    arena_end: u64,
    source_size: Option<u64>,
}

impl<'a, S: ByteSource> EntryDecoder<'a, S> {
    pub fn new(source: &'a S, encoding: EntryItemEncoding, arena_end: u64) -> Self {
        Self {
            source,
            encoding,
            arena_end,
            source_size: source.size(),
        }
    }

    pub fn encoding(&self) -> EntryItemEncoding {
        self.encoding
    }

    /// Read the fixed fields of the entry object at `offset`.
    ///
    /// Returns `None` when the object is too small to be an entry.
    pub fn entry_header(
        &self,
        offset: u64,
        object: &ObjectHeader,
    ) -> Result<Option<EntryObjectHeader>> {
        if object.size() < ENTRY_FIXED_SIZE {
            return Ok(None);
        }

        self.source.read_struct(offset).map(Some)
    }

    /// Collect the payloads referenced by the entry object at `offset`.
    ///
    /// Items that cannot be resolved are skipped and reported to `on_skip`.
    /// A reference outside of the arena ends the list.
    pub fn fields(
        &self,
        offset: u64,
        object_size: u64,
        mut on_skip: impl FnMut(SkipReason),
    ) -> Vec<Vec<u8>> {
        let mut fields = Vec::new();

        let items_end = offset.saturating_add(object_size).min(self.arena_end);
        let item_size = self.encoding.item_size();

        let mut item_offset = offset.saturating_add(ENTRY_FIXED_SIZE);
        while item_offset
            .checked_add(item_size)
            .is_some_and(|end| end <= items_end)
        {
            let data_offset = match self.item_object_offset(item_offset) {
                Ok(data_offset) => data_offset,
                Err(e) => {
                    debug!("Failed to read entry item at {}: {}", item_offset, e);
                    on_skip(SkipReason::ReadFailed);
                    break;
                }
            };

            if data_offset == 0 || data_offset > self.arena_end {
                trace!(
                    "Entry item at {} references invalid offset {}",
                    item_offset, data_offset
                );
                on_skip(SkipReason::InvalidReference);
                break;
            }

            match self.data_payload(data_offset) {
                Ok(payload) => fields.push(payload),
                Err(reason) => on_skip(reason),
            }

            item_offset += item_size;
        }

        fields
    }

    fn item_object_offset(&self, item_offset: u64) -> Result<u64> {
        match self.encoding {
            EntryItemEncoding::Regular => {
                let item: RegularEntryItem = self.source.read_struct(item_offset)?;
                Ok(item.object_offset.get())
            }
            EntryItemEncoding::Compact => {
                let item: CompactEntryItem = self.source.read_struct(item_offset)?;
                Ok(u64::from(item.object_offset.get()))
            }
        }
    }

    /// Read the payload of the data object at `offset`.
    pub fn data_payload(&self, offset: u64) -> std::result::Result<Vec<u8>, SkipReason> {
        let object: ObjectHeader = self.source.read_struct(offset).map_err(|e| {
            debug!("Failed to read object header at {}: {}", offset, e);
            SkipReason::ReadFailed
        })?;

        if !object.is_type(ObjectType::Data) {
            trace!("Object at {} is not a data object: {}", offset, object.type_);
            return Err(SkipReason::NotData);
        }

        let payload_offset = self.encoding.payload_offset();
        let size = object.size();

        let payload_len = size
            .checked_sub(payload_offset)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or(SkipReason::Malformed)?;

        let object_end = offset.checked_add(size).ok_or(SkipReason::Malformed)?;
        if object_end > self.arena_end || self.source_size.is_some_and(|len| object_end > len) {
            debug!(
                "Data object at {} with size {} extends past the arena",
                offset, size
            );
            return Err(SkipReason::Malformed);
        }

        let payload = self
            .source
            .read_vec(offset + payload_offset, payload_len)
            .map_err(|e| {
                debug!("Failed to read payload of data object at {}: {}", offset, e);
                SkipReason::ReadFailed
            })?;

        if !object.is_compressed() {
            return Ok(payload);
        }

        decompress(&object, &payload).map_err(|e| {
            debug!("Failed to decompress data object at {}: {}", offset, e);
            SkipReason::Decompression
        })
    }
}

fn decompress(object: &ObjectHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    if object.zstd_compressed() {
        use ruzstd::decoding::StreamingDecoder;
        use ruzstd::io::Read;

        let decoder =
            StreamingDecoder::new(payload).map_err(|_| JournalError::DecompressorError)?;

        decoder
            .take(MAX_DECOMPRESSED_SIZE as u64 + 1)
            .read_to_end(&mut buf)
            .map_err(|_| JournalError::DecompressorError)?;
    } else if object.lz4_compressed() {
        // First 8 bytes are the uncompressed size (little-endian u64)
        let (size, compressed_data) = payload
            .split_first_chunk::<8>()
            .ok_or(JournalError::DecompressorError)?;

        let uncompressed_size = usize::try_from(u64::from_le_bytes(*size))
            .ok()
            .filter(|&n| n <= MAX_DECOMPRESSED_SIZE)
            .ok_or(JournalError::DecompressorError)?;

        buf.resize(uncompressed_size, 0);
        let n = lz4_flex::block::decompress_into(compressed_data, &mut buf)
            .map_err(|_| JournalError::DecompressorError)?;
        buf.truncate(n);
    } else if object.xz_compressed() {
        use lzma_rust2::XzReader;
        use std::io::Read;

        let decoder = XzReader::new(payload, false);

        decoder
            .take(MAX_DECOMPRESSED_SIZE as u64 + 1)
            .read_to_end(&mut buf)
            .map_err(|_| JournalError::DecompressorError)?;
    } else {
        return Err(JournalError::UnknownCompressionMethod);
    }

    if buf.len() > MAX_DECOMPRESSED_SIZE {
        return Err(JournalError::DecompressorError);
    }

    Ok(buf)
}
