//! Fixed-layout structures of the journal file format.
//!
//! Every integer is stored little-endian on disk, so the structures use the
//! byte-order aware integers from [`zerocopy::byteorder`]. They have an
//! alignment of one and can be decoded from any offset.

use crate::error::{JournalError, Result};
use static_assertions::const_assert_eq;
use std::mem::size_of;
use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Signature found at the start of every journal file.
pub const JOURNAL_SIGNATURE: &[u8; 8] = b"LPKSHHRH";

/// Objects in the arena start at multiples of this value.
pub const OBJECT_ALIGNMENT: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderIncompatibleFlags {
    CompressedXz = 1 << 0,
    CompressedLz4 = 1 << 1,
    KeyedHash = 1 << 2,
    CompressedZstd = 1 << 3,
    Compact = 1 << 4,
}

impl HeaderIncompatibleFlags {
    pub const ALL: [(HeaderIncompatibleFlags, &'static str); 5] = [
        (HeaderIncompatibleFlags::CompressedXz, "COMPRESSED_XZ"),
        (HeaderIncompatibleFlags::CompressedLz4, "COMPRESSED_LZ4"),
        (HeaderIncompatibleFlags::KeyedHash, "KEYED_HASH"),
        (HeaderIncompatibleFlags::CompressedZstd, "COMPRESSED_ZSTD"),
        (HeaderIncompatibleFlags::Compact, "COMPACT"),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCompatibleFlags {
    Sealed = 1 << 0,
    TailEntryBootId = 1 << 1,
    SealedContinuous = 1 << 2,
}

impl HeaderCompatibleFlags {
    pub const ALL: [(HeaderCompatibleFlags, &'static str); 3] = [
        (HeaderCompatibleFlags::Sealed, "SEALED"),
        (HeaderCompatibleFlags::TailEntryBootId, "TAIL_ENTRY_BOOT_ID"),
        (HeaderCompatibleFlags::SealedContinuous, "SEALED_CONTINUOUS"),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    Offline = 0,
    Online = 1,
    Archived = 2,
}

impl TryFrom<u8> for JournalState {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(JournalState::Offline),
            1 => Ok(JournalState::Online),
            2 => Ok(JournalState::Archived),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for JournalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JournalState::Offline => write!(f, "OFFLINE"),
            JournalState::Online => write!(f, "ONLINE"),
            JournalState::Archived => write!(f, "ARCHIVED"),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct JournalHeader {
    pub signature: [u8; 8],           // "LPKSHHRH"
    pub compatible_flags: U32,        // Compatible extension flags
    pub incompatible_flags: U32,      // Incompatible extension flags
    pub state: u8,                    // File state (offline=0, online=1, archived=2)
    pub reserved: [u8; 7],            // Reserved space
    pub file_id: [u8; 16],            // Unique ID for this file
    pub machine_id: [u8; 16],         // Machine ID this belongs to
    pub tail_entry_boot_id: [u8; 16], // Boot ID of the last entry
    pub seqnum_id: [u8; 16],          // Sequence number ID
    pub header_size: U64,             // Size of the header, the arena starts here
    pub arena_size: U64,              // Offset where the data arena ends
    pub data_hash_table_offset: U64,  // Offset of the data hash table
    pub data_hash_table_size: U64,    // Size of the data hash table
    pub field_hash_table_offset: U64, // Offset of the field hash table
    pub field_hash_table_size: U64,   // Size of the field hash table
    pub tail_object_offset: U64,      // Offset of the last object
    pub n_objects: U64,               // Number of objects
    pub n_entries: U64,               // Number of entries
    pub tail_entry_seqnum: U64,       // Sequence number of the last entry
    pub head_entry_seqnum: U64,       // Sequence number of the first entry
    pub entry_array_offset: U64,      // Offset of the entry array
    pub head_entry_realtime: U64,     // Realtime timestamp of the first entry
    pub tail_entry_realtime: U64,     // Realtime timestamp of the last entry
    pub tail_entry_monotonic: U64,    // Monotonic timestamp of the last entry
}

const_assert_eq!(size_of::<JournalHeader>(), 208);

impl JournalHeader {
    pub fn has_incompatible_flag(&self, flag: HeaderIncompatibleFlags) -> bool {
        (self.incompatible_flags.get() & flag as u32) != 0
    }

    pub fn has_compatible_flag(&self, flag: HeaderCompatibleFlags) -> bool {
        (self.compatible_flags.get() & flag as u32) != 0
    }

    pub fn state(&self) -> std::result::Result<JournalState, u8> {
        JournalState::try_from(self.state)
    }

    /// Absolute offset where the arena ends. The arena starts at
    /// `header_size`.
    pub fn arena_end(&self) -> u64 {
        self.arena_size.get()
    }
}

/// Header fields appended by later versions of the format. Only decoded
/// when `header_size` covers all of them.
#[derive(Default, Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct HeaderExtension {
    // Added in 187
    pub n_data: U64,
    pub n_fields: U64,
    // Added in 189
    pub n_tags: U64,
    pub n_entry_arrays: U64,
    // Added in 246
    pub data_hash_chain_depth: U64,
    pub field_hash_chain_depth: U64,
    // Added in 252
    pub tail_entry_array_offset: U32,
    pub tail_entry_array_n_entries: U32,
    // Added in 254
    pub tail_entry_offset: U64,
}

const_assert_eq!(size_of::<HeaderExtension>(), 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFlags {
    CompressedXz = 1 << 0,
    CompressedLz4 = 1 << 1,
    CompressedZstd = 1 << 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Unused = 0,
    Data = 1,
    Field = 2,
    Entry = 3,
    DataHashTable = 4,
    FieldHashTable = 5,
    EntryArray = 6,
    Tag = 7,
}

impl TryFrom<u8> for ObjectType {
    type Error = JournalError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ObjectType::Unused),
            1 => Ok(ObjectType::Data),
            2 => Ok(ObjectType::Field),
            3 => Ok(ObjectType::Entry),
            4 => Ok(ObjectType::DataHashTable),
            5 => Ok(ObjectType::FieldHashTable),
            6 => Ok(ObjectType::EntryArray),
            7 => Ok(ObjectType::Tag),
            _ => Err(JournalError::InvalidObjectType(value)),
        }
    }
}

#[derive(Default, Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ObjectHeader {
    pub type_: u8,
    pub flags: u8,
    pub reserved: [u8; 6],
    pub size: U64,
}

const_assert_eq!(size_of::<ObjectHeader>(), 16);

impl ObjectHeader {
    pub fn object_type(&self) -> Result<ObjectType> {
        ObjectType::try_from(self.type_)
    }

    pub fn is_type(&self, object_type: ObjectType) -> bool {
        self.type_ == object_type as u8
    }

    /// Total size of the object, header included.
    pub fn size(&self) -> u64 {
        self.size.get()
    }

    /// The object size rounded up to [`OBJECT_ALIGNMENT`], or `None` when
    /// rounding overflows.
    pub fn aligned_size(&self) -> Option<u64> {
        let size = self.size.get();
        match size % OBJECT_ALIGNMENT {
            0 => Some(size),
            rem => size.checked_add(OBJECT_ALIGNMENT - rem),
        }
    }

    pub fn xz_compressed(&self) -> bool {
        (self.flags & ObjectFlags::CompressedXz as u8) != 0
    }

    pub fn lz4_compressed(&self) -> bool {
        (self.flags & ObjectFlags::CompressedLz4 as u8) != 0
    }

    pub fn zstd_compressed(&self) -> bool {
        (self.flags & ObjectFlags::CompressedZstd as u8) != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.zstd_compressed() | self.lz4_compressed() | self.xz_compressed()
    }
}

#[derive(Default, Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct EntryObjectHeader {
    pub object_header: ObjectHeader,
    pub seqnum: U64,
    pub realtime: U64,
    pub monotonic: U64,
    pub boot_id: [u8; 16], // UUID/128-bit ID
    pub xor_hash: U64,
}

const_assert_eq!(size_of::<EntryObjectHeader>(), 64);

// For regular (non-compact) format - an array of these follows the header
#[derive(Default, Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RegularEntryItem {
    pub object_offset: U64,
    pub hash: U64,
}

// For compact format - an array of these follows the header
#[derive(Default, Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CompactEntryItem {
    pub object_offset: U32,
}

#[derive(Default, Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DataObjectHeader {
    pub object_header: ObjectHeader,
    pub hash: U64,
    pub next_hash_offset: U64,
    pub next_field_offset: U64,
    pub entry_offset: U64,
    pub entry_array_offset: U64,
    pub n_entries: U64,
}

const_assert_eq!(size_of::<DataObjectHeader>(), 64);

/// Follows [`DataObjectHeader`] in compact files, before the payload.
#[derive(Default, Debug, Copy, Clone, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CompactDataFields {
    pub tail_entry_array_offset: U32,
    pub tail_entry_array_n_entries: U32,
}

/// How entry items and data objects are laid out in a file.
///
/// Every object of a file uses the same encoding, selected by the
/// [`HeaderIncompatibleFlags::Compact`] flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryItemEncoding {
    Regular,
    Compact,
}

impl EntryItemEncoding {
    pub fn from_header(header: &JournalHeader) -> Self {
        if header.has_incompatible_flag(HeaderIncompatibleFlags::Compact) {
            EntryItemEncoding::Compact
        } else {
            EntryItemEncoding::Regular
        }
    }

    /// On-disk size of one entry item.
    pub const fn item_size(self) -> u64 {
        match self {
            EntryItemEncoding::Regular => size_of::<RegularEntryItem>() as u64,
            EntryItemEncoding::Compact => size_of::<CompactEntryItem>() as u64,
        }
    }

    /// Offset of a data object's payload from the start of the object.
    pub const fn payload_offset(self) -> u64 {
        match self {
            EntryItemEncoding::Regular => size_of::<DataObjectHeader>() as u64,
            EntryItemEncoding::Compact => {
                (size_of::<DataObjectHeader>() + size_of::<CompactDataFields>()) as u64
            }
        }
    }
}
