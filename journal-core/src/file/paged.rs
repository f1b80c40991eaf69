use super::source::{ByteSource, out_of_bounds};
use crate::error::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Larger page sizes are clamped to this value.
pub const MAX_PAGE_SIZE: u64 = 16 * 1024 * 1024;
const DEFAULT_MAX_PAGES: NonZeroUsize = NonZeroUsize::new(1024).unwrap();

#[derive(Debug, Clone, Copy)]
pub struct PagedReaderOptions {
    page_size: u64,
    max_pages: NonZeroUsize,
}

impl Default for PagedReaderOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl PagedReaderOptions {
    /// Sizes above [`MAX_PAGE_SIZE`] are clamped.
    pub fn with_page_size(mut self, size: NonZeroU64) -> Self {
        if size.get() > MAX_PAGE_SIZE {
            warn!(
                "Page size {} exceeds the maximum, using {}",
                size, MAX_PAGE_SIZE
            );
        }
        self.page_size = size.get().min(MAX_PAGE_SIZE);
        self
    }

    pub fn with_max_pages(mut self, pages: NonZeroUsize) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn max_pages(&self) -> NonZeroUsize {
        self.max_pages
    }
}

///
/// A positional reader that caches fixed-size pages of a file.
///
/// Pages are filled with positional reads and kept in an LRU cache, so
/// walking the arena touches the disk once per page. The last page of the
/// file is cached with whatever bytes existed when it was read. Reads beyond
/// those bytes fail until [`ByteSource::refresh`] drops the cache.
///
/// The cache sits behind a mutex, which makes the reader usable from several
/// threads at once.
pub struct PagedReader {
    file: File,
    page_size: u64,
    pages: Mutex<LruCache<u64, Arc<[u8]>>>,
}

impl std::fmt::Debug for PagedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedReader")
            .field("page_size", &self.page_size)
            .field("cached_pages", &self.pages.lock().len())
            .finish()
    }
}

impl PagedReader {
    pub fn new(file: File, options: PagedReaderOptions) -> Self {
        Self {
            file,
            page_size: options.page_size,
            pages: Mutex::new(LruCache::new(options.max_pages)),
        }
    }

    pub fn open(path: impl AsRef<Path>, options: PagedReaderOptions) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file, options))
    }

    fn page(&self, index: u64) -> Result<Arc<[u8]>> {
        if let Some(page) = self.pages.lock().get(&index) {
            return Ok(Arc::clone(page));
        }

        let len = usize::try_from(self.page_size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "page size too large"))?;
        let mut buf = vec![0u8; len];
        let filled = read_full_at(&self.file, &mut buf, index * self.page_size)?;
        buf.truncate(filled);

        let page: Arc<[u8]> = buf.into();
        self.pages.lock().put(index, Arc::clone(&page));
        Ok(page)
    }
}

impl ByteSource for PagedReader {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;

        while done < buf.len() {
            let position = offset
                .checked_add(done as u64)
                .ok_or_else(|| out_of_bounds(offset, buf.len()))?;

            let index = position / self.page_size;
            let within = (position % self.page_size) as usize;

            let page = self.page(index)?;
            if within >= page.len() {
                return Err(out_of_bounds(offset, buf.len()).into());
            }

            let n = (page.len() - within).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&page[within..within + n]);
            done += n;
        }

        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        self.pages.lock().clear();
        Ok(())
    }

    fn size(&self) -> Option<u64> {
        self.file.metadata().ok().map(|m| m.len())
    }
}

/// Read until `buf` is full or the end of the file is reached.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match read_at(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}
