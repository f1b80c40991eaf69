//! Builds small journal files in memory.

#![allow(dead_code)]

use journal_core::file::object::{
    EntryItemEncoding, EntryObjectHeader, HeaderIncompatibleFlags, JournalHeader, ObjectHeader,
    ObjectType, RegularEntryItem,
};
use std::mem::size_of;
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::{U32, U64};

const HEADER_SIZE: u64 = size_of::<JournalHeader>() as u64;

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub struct JournalBuilder {
    encoding: EntryItemEncoding,
    arena: Vec<u8>,
    n_objects: u64,
    n_entries: u64,
    head_seqnum: u64,
    tail_seqnum: u64,
}

impl JournalBuilder {
    pub fn new() -> Self {
        Self::with_encoding(EntryItemEncoding::Regular)
    }

    pub fn compact() -> Self {
        Self::with_encoding(EntryItemEncoding::Compact)
    }

    fn with_encoding(encoding: EntryItemEncoding) -> Self {
        Self {
            encoding,
            arena: Vec::new(),
            n_objects: 0,
            n_entries: 0,
            head_seqnum: 0,
            tail_seqnum: 0,
        }
    }

    /// Absolute offset of the next object.
    pub fn next_offset(&self) -> u64 {
        HEADER_SIZE + self.arena.len() as u64
    }

    fn push_object(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.next_offset();
        self.arena.extend_from_slice(bytes);
        self.arena.resize(self.arena.len().next_multiple_of(8), 0);
        self.n_objects += 1;
        offset
    }

    /// Append a data object holding `payload`.
    pub fn data(&mut self, payload: &[u8]) -> u64 {
        self.data_with_flags(0, payload)
    }

    pub fn data_with_flags(&mut self, flags: u8, payload: &[u8]) -> u64 {
        let payload_offset = self.encoding.payload_offset();
        let header = ObjectHeader {
            type_: ObjectType::Data as u8,
            flags,
            size: U64::new(payload_offset + payload.len() as u64),
            ..Default::default()
        };

        let mut bytes = header.as_bytes().to_vec();
        bytes.resize(payload_offset as usize, 0);
        bytes.extend_from_slice(payload);
        self.push_object(&bytes)
    }

    /// Append an object of any type with `body` following its header.
    pub fn object(&mut self, object_type: ObjectType, body: &[u8]) -> u64 {
        let header = ObjectHeader {
            type_: object_type as u8,
            size: U64::new((size_of::<ObjectHeader>() + body.len()) as u64),
            ..Default::default()
        };

        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(body);
        self.push_object(&bytes)
    }

    /// Append an entry object referencing the given offsets.
    pub fn entry(&mut self, seqnum: u64, realtime: u64, refs: &[u64]) -> u64 {
        let items_size = refs.len() as u64 * self.encoding.item_size();
        let entry = EntryObjectHeader {
            object_header: ObjectHeader {
                type_: ObjectType::Entry as u8,
                size: U64::new(size_of::<EntryObjectHeader>() as u64 + items_size),
                ..Default::default()
            },
            seqnum: U64::new(seqnum),
            realtime: U64::new(realtime),
            monotonic: U64::new(realtime),
            ..Default::default()
        };

        let mut bytes = entry.as_bytes().to_vec();
        for &offset in refs {
            match self.encoding {
                EntryItemEncoding::Regular => {
                    let item = RegularEntryItem {
                        object_offset: U64::new(offset),
                        hash: U64::new(0),
                    };
                    bytes.extend_from_slice(item.as_bytes());
                }
                EntryItemEncoding::Compact => {
                    bytes.extend_from_slice(U32::new(offset as u32).as_bytes());
                }
            }
        }

        if self.n_entries == 0 {
            self.head_seqnum = seqnum;
        }
        self.n_entries += 1;
        self.tail_seqnum = seqnum;

        self.push_object(&bytes)
    }

    /// Append one data object per field followed by an entry referencing
    /// them.
    pub fn log(&mut self, seqnum: u64, realtime: u64, fields: &[&str]) -> u64 {
        let refs: Vec<u64> = fields.iter().map(|f| self.data(f.as_bytes())).collect();
        self.entry(seqnum, realtime, &refs)
    }

    /// Append raw bytes without updating any counters.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.arena.extend_from_slice(bytes);
    }

    pub fn header(&self) -> JournalHeader {
        let mut incompatible_flags = 0;
        if self.encoding == EntryItemEncoding::Compact {
            incompatible_flags |= HeaderIncompatibleFlags::Compact as u32;
        }

        JournalHeader {
            signature: *b"LPKSHHRH",
            incompatible_flags: U32::new(incompatible_flags),
            state: 1,
            header_size: U64::new(HEADER_SIZE),
            arena_size: U64::new(self.next_offset()),
            n_objects: U64::new(self.n_objects),
            n_entries: U64::new(self.n_entries),
            head_entry_seqnum: U64::new(self.head_seqnum),
            tail_entry_seqnum: U64::new(self.tail_seqnum),
            ..Default::default()
        }
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with(&self.header())
    }

    /// Serialize the arena behind a caller-supplied header.
    pub fn build_with(&self, header: &JournalHeader) -> Vec<u8> {
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&self.arena);
        bytes
    }
}
