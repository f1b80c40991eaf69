//! Human-readable dump of a journal header.

use super::object::{
    HeaderCompatibleFlags, HeaderExtension, HeaderIncompatibleFlags, JournalHeader,
};
use crate::record::timestamp_from_micros;
use std::fmt;
use uuid::Uuid;

pub struct HeaderSummary<'a> {
    header: &'a JournalHeader,
    extension: Option<&'a HeaderExtension>,
}

impl<'a> HeaderSummary<'a> {
    pub fn new(header: &'a JournalHeader, extension: Option<&'a HeaderExtension>) -> Self {
        Self { header, extension }
    }
}

fn flag_names<F: Copy>(
    bits: u32,
    known: &[(F, &'static str)],
    to_bits: impl Fn(F) -> u32,
) -> String {
    let mut names: Vec<String> = known
        .iter()
        .filter(|(flag, _)| bits & to_bits(*flag) != 0)
        .map(|(_, name)| name.to_string())
        .collect();

    let known_bits = known.iter().fold(0, |acc, (flag, _)| acc | to_bits(*flag));
    let unknown = bits & !known_bits;
    if unknown != 0 {
        names.push(format!("{unknown:#x}"));
    }

    if names.is_empty() {
        String::from("-")
    } else {
        names.join("|")
    }
}

fn realtime(micros: u64) -> String {
    if micros == 0 {
        String::from("-")
    } else {
        timestamp_from_micros(micros).to_rfc3339()
    }
}

impl fmt::Display for HeaderSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header;

        let state = match h.state() {
            Ok(state) => state.to_string(),
            Err(raw) => format!("UNKNOWN({raw})"),
        };

        writeln!(f, "Signature: {}", String::from_utf8_lossy(&h.signature))?;
        writeln!(
            f,
            "Compatible flags: {}",
            flag_names(
                h.compatible_flags.get(),
                &HeaderCompatibleFlags::ALL,
                |flag| flag as u32
            )
        )?;
        writeln!(
            f,
            "Incompatible flags: {}",
            flag_names(
                h.incompatible_flags.get(),
                &HeaderIncompatibleFlags::ALL,
                |flag| flag as u32
            )
        )?;
        writeln!(f, "State: {state}")?;
        writeln!(f, "File ID: {}", Uuid::from_bytes(h.file_id).simple())?;
        writeln!(f, "Machine ID: {}", Uuid::from_bytes(h.machine_id).simple())?;
        writeln!(
            f,
            "Tail entry boot ID: {}",
            Uuid::from_bytes(h.tail_entry_boot_id).simple()
        )?;
        writeln!(f, "Sequential number ID: {}", Uuid::from_bytes(h.seqnum_id).simple())?;
        writeln!(f, "Header size: {}", h.header_size.get())?;
        writeln!(f, "Arena size: {}", h.arena_size.get())?;
        writeln!(
            f,
            "Data hash table: offset={} size={}",
            h.data_hash_table_offset.get(),
            h.data_hash_table_size.get()
        )?;
        writeln!(
            f,
            "Field hash table: offset={} size={}",
            h.field_hash_table_offset.get(),
            h.field_hash_table_size.get()
        )?;
        writeln!(f, "Tail object offset: {}", h.tail_object_offset.get())?;
        writeln!(f, "Objects: {}", h.n_objects.get())?;
        writeln!(f, "Entries: {}", h.n_entries.get())?;
        writeln!(f, "Head sequential number: {}", h.head_entry_seqnum.get())?;
        writeln!(f, "Tail sequential number: {}", h.tail_entry_seqnum.get())?;
        writeln!(f, "Entry array offset: {}", h.entry_array_offset.get())?;
        writeln!(f, "Head realtime timestamp: {}", realtime(h.head_entry_realtime.get()))?;
        writeln!(f, "Tail realtime timestamp: {}", realtime(h.tail_entry_realtime.get()))?;
        write!(f, "Tail monotonic timestamp: {}", h.tail_entry_monotonic.get())?;

        if let Some(ext) = self.extension {
            writeln!(f)?;
            writeln!(f, "Data objects: {}", ext.n_data.get())?;
            writeln!(f, "Field objects: {}", ext.n_fields.get())?;
            writeln!(f, "Tag objects: {}", ext.n_tags.get())?;
            writeln!(f, "Entry array objects: {}", ext.n_entry_arrays.get())?;
            writeln!(f, "Deepest data hash chain: {}", ext.data_hash_chain_depth.get())?;
            writeln!(f, "Deepest field hash chain: {}", ext.field_hash_chain_depth.get())?;
            writeln!(
                f,
                "Tail entry array: offset={} entries={}",
                ext.tail_entry_array_offset.get(),
                ext.tail_entry_array_n_entries.get()
            )?;
            write!(f, "Tail entry offset: {}", ext.tail_entry_offset.get())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::byteorder::little_endian::{U32, U64};

    #[test]
    fn summary_names_flags() {
        let mut header = JournalHeader {
            signature: *b"LPKSHHRH",
            ..Default::default()
        };
        header.incompatible_flags = U32::new(
            HeaderIncompatibleFlags::Compact as u32
                | HeaderIncompatibleFlags::CompressedZstd as u32
                | 0x100,
        );
        header.state = 2;
        header.tail_entry_seqnum = U64::new(42);

        let text = HeaderSummary::new(&header, None).to_string();
        assert!(text.contains("Signature: LPKSHHRH"));
        assert!(text.contains("Incompatible flags: COMPRESSED_ZSTD|COMPACT|0x100"));
        assert!(text.contains("Compatible flags: -"));
        assert!(text.contains("State: ARCHIVED"));
        assert!(text.contains("Tail sequential number: 42"));
        assert!(!text.contains("Data objects"));
    }

    #[test]
    fn summary_includes_extension() {
        let header = JournalHeader::default();
        let extension = HeaderExtension {
            n_data: U64::new(7),
            ..Default::default()
        };

        let text = HeaderSummary::new(&header, Some(&extension)).to_string();
        assert!(text.contains("State: OFFLINE"));
        assert!(text.contains("Data objects: 7"));
    }
}
