//! Random-access byte sources the decoder reads from.

use crate::error::Result;
use std::io;
use std::sync::Arc;
use zerocopy::{FromBytes, IntoBytes};

/// Positional read access to the bytes of a journal file.
///
/// Implementations must support concurrent reads from `&self`. A read that
/// cannot be satisfied in full fails with [`io::ErrorKind::UnexpectedEof`];
/// missing bytes are never zero-filled.
pub trait ByteSource {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Drop any cached state so that later reads observe appended data.
    ///
    /// Only called between scans. Must be idempotent.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Current length of the source in bytes, if known.
    fn size(&self) -> Option<u64> {
        None
    }

    /// Decode one fixed-layout structure at `offset`, reading exactly
    /// `size_of::<T>()` bytes.
    fn read_struct<T: FromBytes + IntoBytes>(&self, offset: u64) -> Result<T>
    where
        Self: Sized,
    {
        let mut value = T::new_zeroed();
        self.read_exact_at(offset, value.as_mut_bytes())?;
        Ok(value)
    }

    /// Read `len` bytes at `offset` into a new buffer.
    fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>>
    where
        Self: Sized,
    {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

pub(crate) fn out_of_bounds(offset: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at offset {offset} is out of bounds"),
    )
}

impl ByteSource for [u8] {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset).map_err(|_| out_of_bounds(offset, buf.len()))?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| out_of_bounds(offset, buf.len()))?;

        buf.copy_from_slice(src);
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl ByteSource for Vec<u8> {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.as_slice().read_exact_at(offset, buf)
    }

    fn size(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn refresh(&self) -> Result<()> {
        (**self).refresh()
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn refresh(&self) -> Result<()> {
        (**self).refresh()
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }
}
