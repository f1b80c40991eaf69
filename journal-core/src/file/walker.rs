use super::object::ObjectHeader;
use super::source::ByteSource;
use crate::error::{JournalError, Result};
use std::io;
use std::mem::size_of;
use tracing::{debug, warn};

const OBJECT_HEADER_SIZE: u64 = size_of::<ObjectHeader>() as u64;

/// How an arena walk came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// The last object ended at the end of the arena.
    Complete,
    /// The walk stopped at a zero-sized object or at the end of the source,
    /// or an object extended past the end of the arena. Everything before
    /// it was visited.
    Truncated,
}

///
/// Visits the objects of the arena in ascending offset order.
///
/// Yields the offset and header of every object, whatever its type. A
/// zero-sized object, or an object header cut off by the end of the source,
/// ends the walk as if the arena ended there, so that a partially written or
/// damaged file still produces its valid prefix. [`ArenaWalker::end`] tells
/// the cases apart.
pub struct ArenaWalker<'a, S: ByteSource> {
    source: &'a S,
    offset: u64,
    arena_end: u64,
    overrun: bool,
    end: Option<WalkEnd>,
}

impl<'a, S: ByteSource> ArenaWalker<'a, S> {
    pub fn new(source: &'a S, arena_start: u64, arena_end: u64) -> Self {
        Self {
            source,
            offset: arena_start,
            arena_end,
            overrun: false,
            end: None,
        }
    }

    /// Offset of the next object to visit.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// `None` while the walk is in progress.
    pub fn end(&self) -> Option<WalkEnd> {
        self.end
    }

    fn finish(&mut self, end: WalkEnd) {
        if end == WalkEnd::Truncated {
            warn!("Arena walk stopped early at offset {}", self.offset);
        }
        self.end = Some(end);
    }
}

impl<S: ByteSource> Iterator for ArenaWalker<'_, S> {
    type Item = Result<(u64, ObjectHeader)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.is_some() {
            return None;
        }

        let has_room = self
            .offset
            .checked_add(OBJECT_HEADER_SIZE)
            .is_some_and(|header_end| header_end <= self.arena_end);
        if !has_room {
            let end = if self.overrun {
                WalkEnd::Truncated
            } else {
                WalkEnd::Complete
            };
            self.finish(end);
            return None;
        }

        let offset = self.offset;
        let header: ObjectHeader = match self.source.read_struct(offset) {
            Ok(header) => header,
            Err(JournalError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("Object header at {} is past the end of the source", offset);
                self.finish(WalkEnd::Truncated);
                return None;
            }
            Err(e) => {
                self.finish(WalkEnd::Truncated);
                return Some(Err(e));
            }
        };

        let size = header.size();
        if size == 0 {
            self.finish(WalkEnd::Truncated);
            return None;
        }

        if offset.checked_add(size).is_none_or(|end| end > self.arena_end) {
            self.overrun = true;
        }

        // Size is rounded up to be 64 bit aligned
        match header.aligned_size().and_then(|s| offset.checked_add(s)) {
            Some(next) => self.offset = next,
            None => self.offset = u64::MAX,
        }

        Some(Ok((offset, header)))
    }
}

impl<S: ByteSource> std::iter::FusedIterator for ArenaWalker<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::object::ObjectType;

    fn object(type_: ObjectType, size: u64) -> Vec<u8> {
        let mut bytes = vec![0u8; size.max(16).next_multiple_of(8) as usize];
        bytes[0] = type_ as u8;
        bytes[8..16].copy_from_slice(&size.to_le_bytes());
        bytes
    }

    fn offsets(walker: &mut ArenaWalker<'_, Vec<u8>>) -> Vec<(u64, u8)> {
        walker
            .map(|r| r.map(|(offset, h)| (offset, h.type_)))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn walks_aligned_objects() {
        let mut arena = Vec::new();
        arena.extend(object(ObjectType::Data, 70));
        arena.extend(object(ObjectType::Entry, 80));
        arena.extend(object(ObjectType::Field, 41));
        let end = arena.len() as u64;

        let mut walker = ArenaWalker::new(&arena, 0, end);
        assert_eq!(offsets(&mut walker), vec![(0, 1), (72, 3), (152, 2)]);
        assert_eq!(walker.end(), Some(WalkEnd::Complete));
    }

    #[test]
    fn zero_sized_object_stops_the_walk() {
        let mut arena = Vec::new();
        arena.extend(object(ObjectType::Data, 24));
        arena.extend(vec![0u8; 64]);
        arena.extend(object(ObjectType::Data, 24));
        let end = arena.len() as u64;

        let mut walker = ArenaWalker::new(&arena, 0, end);
        assert_eq!(offsets(&mut walker), vec![(0, 1)]);
        assert_eq!(walker.end(), Some(WalkEnd::Truncated));
    }

    #[test]
    fn undersized_object_advances_by_its_rounded_size() {
        let mut arena = object(ObjectType::Data, 24);

        // An 8 byte object whose size field overlaps the next object's
        // header, so the next type byte reads as 8.
        arena.extend([ObjectType::Field as u8, 0, 0, 0, 0, 0, 0, 0]);
        arena.extend(8u64.to_le_bytes());
        arena.extend([0u8; 8]);
        arena.extend(16u64.to_le_bytes());
        let end = arena.len() as u64;

        let mut walker = ArenaWalker::new(&arena, 0, end);
        assert_eq!(offsets(&mut walker), vec![(0, 1), (24, 2), (32, 8)]);
        assert_eq!(walker.end(), Some(WalkEnd::Complete));
    }

    #[test]
    fn oversized_object_is_visited_then_truncates() {
        let mut arena = Vec::new();
        arena.extend(object(ObjectType::Data, 24));
        arena.extend(object(ObjectType::Data, 4096));
        let end = 24 + 16 + 8;

        let mut walker = ArenaWalker::new(&arena, 0, end);
        assert_eq!(offsets(&mut walker), vec![(0, 1), (24, 1)]);
        assert_eq!(walker.end(), Some(WalkEnd::Truncated));
    }

    #[test]
    fn short_source_truncates_without_error() {
        let arena = object(ObjectType::Data, 24);

        // The arena claims more bytes than the source holds.
        let mut walker = ArenaWalker::new(&arena, 0, 1024);
        assert_eq!(offsets(&mut walker), vec![(0, 1)]);
        assert_eq!(walker.end(), Some(WalkEnd::Truncated));
    }

    struct FailingSource;

    impl ByteSource for FailingSource {
        fn read_exact_at(&self, _offset: u64, _buf: &mut [u8]) -> Result<()> {
            Err(io::Error::other("device unavailable").into())
        }
    }

    #[test]
    fn read_error_is_reported_once() {
        let mut walker = ArenaWalker::new(&FailingSource, 0, 1024);
        assert!(walker.next().unwrap().is_err());
        assert!(walker.next().is_none());
        assert_eq!(walker.end(), Some(WalkEnd::Truncated));
    }
}
