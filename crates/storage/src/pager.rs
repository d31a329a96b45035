//! Pager: page-level I/O with an LRU page cache.
//!
//! The pager owns a byte-addressable [`PageStore`] and addresses it in fixed
//! size pages: page `n` lives at byte offset `n * page_size`, there is no
//! indirection table. Allocation only grows the logical length; nothing is
//! written until a page is flushed, so a freshly allocated page reads back as
//! zeroes.
//!
//! Two access paths exist:
//! - `read_page` / `write_page` go straight to the store. A raw write drops
//!   any cached copy of the page instead of updating it.
//! - `get_page` returns the cached [`Page`]. Mutations through
//!   [`Page::data_mut`] mark it dirty; dirty pages are written back when
//!   evicted, flushed, or when the pager is torn down.

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use tracing::{debug, trace, warn};

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::store::{FileStore, MemoryStore, PageStore};

/// A page number (0-based). Page 0 holds the database header.
pub type PageId = u32;

/// A cached page frame.
#[derive(Debug)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
    dirty: bool,
}

impl Page {
    fn new(id: PageId, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            dirty: false,
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the page bytes. Marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Replace the page contents with `bytes` (zero-padding the rest).
    pub(crate) fn overwrite(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(self.data.len());
        self.data[..len].copy_from_slice(&bytes[..len]);
        self.data[len..].fill(0);
        self.dirty = true;
    }
}

/// The pager manages page I/O between a backing store and a bounded cache.
pub struct Pager {
    store: Box<dyn PageStore>,
    page_size: usize,
    /// Logical stream length; allocation grows it without touching the store.
    stream_size: u64,
    cache: LruCache<PageId, Page>,
    closed: bool,
}

impl Pager {
    /// Open or create a database file with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, StorageConfig::default())
    }

    /// Open or create a database file.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: StorageConfig) -> Result<Self> {
        let store = FileStore::open(path)?;
        Self::with_store(store, config)
    }

    /// A pager over a fresh in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::with_store(MemoryStore::new(), StorageConfig::default())
    }

    /// A pager over any backing store.
    pub fn with_store<S: PageStore + 'static>(store: S, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_pages).ok_or_else(|| {
            StorageError::InvalidConfig("page cache must hold at least one page".into())
        })?;
        let stream_size = store.len()?;
        Ok(Self {
            store: Box::new(store),
            page_size: config.page_size,
            stream_size,
            cache: LruCache::new(capacity),
            closed: false,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Logical size of the backing stream in bytes.
    pub fn file_size(&self) -> u64 {
        self.stream_size
    }

    /// Number of whole pages covered by the logical stream length.
    pub fn allocated_pages(&self) -> u64 {
        self.stream_size / self.page_size as u64
    }

    /// Number of pages currently resident in the cache.
    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    /// True when `page_id` is resident in the cache. Does not touch recency.
    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.cache.contains(&page_id)
    }

    /// Reserve the next page-sized region and return its page id.
    ///
    /// Nothing is written; the page reads back as zeroes until it is.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let next = self.stream_size / self.page_size as u64;
        let page_id =
            PageId::try_from(next).map_err(|_| StorageError::InvalidPageId(next as i64))?;
        self.stream_size += self.page_size as u64;
        trace!(page_id, "allocated page");
        Ok(page_id)
    }

    /// Give back `page_id` if it is the last allocated page and nothing has
    /// been written to it, shrinking the logical length by one page.
    ///
    /// Returns whether the page was released.
    pub fn release_page(&mut self, page_id: PageId) -> Result<bool> {
        let offset = self.offset_of(page_id);
        let is_tail = offset + self.page_size as u64 == self.stream_size;
        if !is_tail || self.cache.contains(&page_id) || offset < self.store.len()? {
            return Ok(false);
        }
        self.stream_size = offset;
        trace!(page_id, "released page");
        Ok(true)
    }

    /// Read a page straight from the store, bypassing the cache.
    ///
    /// Pages beyond the logical end come back as a blank buffer.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.page_size];
        let offset = self.offset_of(page_id);
        if offset >= self.stream_size {
            return Ok(data);
        }
        self.store.read_at(offset, &mut data)?;
        Ok(data)
    }

    /// Write a page straight to the store, bypassing the cache.
    ///
    /// A cached copy of the page is dropped, not updated: the next
    /// `get_page` reloads it from the store.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(StorageError::PageBufferSize {
                expected: self.page_size,
                actual: data.len(),
            });
        }
        write_through(
            self.store.as_mut(),
            &mut self.stream_size,
            self.page_size,
            page_id,
            data,
        )?;
        if self.cache.pop(&page_id).is_some() {
            trace!(page_id, "raw write invalidated cached page");
        }
        Ok(())
    }

    /// Fetch a page through the cache, loading it on a miss.
    ///
    /// A hit makes the page most recently used. A miss evicts the least
    /// recently used page first when the cache is full.
    pub fn get_page(&mut self, page_id: PageId) -> Result<&mut Page> {
        if !self.cache.contains(&page_id) {
            if self.cache.len() >= self.cache.cap().get() {
                self.evict_page()?;
            }
            let data = self.read_page(page_id)?;
            self.cache.put(page_id, Page::new(page_id, data));
        }
        self.cache.get_mut(&page_id).ok_or_else(|| {
            StorageError::Corruption(format!("page {page_id} missing from cache after load"))
        })
    }

    /// True if the page is cached or lies within the logical stream.
    pub fn page_exists(&self, page_id: PageId) -> bool {
        if self.cache.contains(&page_id) {
            return true;
        }
        self.stream_size >= self.offset_of(page_id) + self.page_size as u64
    }

    /// Write a cached page back if it is dirty. No-op otherwise.
    pub fn flush_page(&mut self, page_id: PageId) -> Result<()> {
        if let Some(page) = self.cache.peek_mut(&page_id) {
            if page.dirty {
                write_through(
                    self.store.as_mut(),
                    &mut self.stream_size,
                    self.page_size,
                    page_id,
                    &page.data,
                )?;
                page.dirty = false;
            }
        }
        Ok(())
    }

    /// Evict the least recently used page, writing it back if dirty.
    ///
    /// The page stays cached if the write-back fails.
    pub fn evict_page(&mut self) -> Result<()> {
        let Some((&page_id, page)) = self.cache.peek_lru() else {
            return Ok(());
        };
        let dirty = page.dirty;
        if dirty {
            write_through(
                self.store.as_mut(),
                &mut self.stream_size,
                self.page_size,
                page_id,
                &page.data,
            )?;
        }
        self.cache.pop(&page_id);
        trace!(page_id, dirty, "evicted page");
        Ok(())
    }

    /// Write every dirty cached page back and flush the store.
    pub fn flush_all(&mut self) -> Result<()> {
        let mut dirty_pages: Vec<PageId> = self
            .cache
            .iter()
            .filter(|(_, page)| page.dirty)
            .map(|(&page_id, _)| page_id)
            .collect();
        dirty_pages.sort_unstable();

        for page_id in dirty_pages {
            self.flush_page(page_id)?;
        }
        self.store.flush()?;
        Ok(())
    }

    /// Flush all dirty pages and release the store.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        self.closed = true;
        self.flush_all()?;
        debug!(
            allocated_pages = self.allocated_pages(),
            "pager closed"
        );
        Ok(())
    }

    fn offset_of(&self, page_id: PageId) -> u64 {
        u64::from(page_id) * self.page_size as u64
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.teardown() {
            warn!(error = %err, "failed to flush pager on drop");
        }
    }
}

fn write_through(
    store: &mut dyn PageStore,
    stream_size: &mut u64,
    page_size: usize,
    page_id: PageId,
    data: &[u8],
) -> Result<()> {
    let offset = u64::from(page_id) * page_size as u64;
    store.write_at(offset, data)?;
    *stream_size = (*stream_size).max(offset + data.len() as u64);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_pager(cache_pages: usize) -> (Pager, MemoryStore) {
        let store = MemoryStore::new();
        let config = StorageConfig::default()
            .page_size(64)
            .cache_pages(cache_pages);
        let pager = Pager::with_store(store.clone(), config).unwrap();
        (pager, store)
    }

    fn filled(byte: u8) -> Vec<u8> {
        vec![byte; 64]
    }

    #[test]
    fn new_pager_is_empty() {
        let (pager, _) = memory_pager(4);
        assert_eq!(pager.file_size(), 0);
        assert_eq!(pager.allocated_pages(), 0);
        assert_eq!(pager.cached_pages(), 0);
        assert!(!pager.page_exists(0));
    }

    #[test]
    fn allocation_is_sequential_and_writes_nothing() {
        let (mut pager, store) = memory_pager(4);
        assert_eq!(pager.allocate_page().unwrap(), 0);
        assert_eq!(pager.allocate_page().unwrap(), 1);
        assert_eq!(pager.allocate_page().unwrap(), 2);

        assert_eq!(pager.allocated_pages(), 3);
        assert_eq!(pager.file_size(), 3 * 64);
        assert!(store.snapshot().is_empty());
        assert!(pager.page_exists(2));
        assert!(!pager.page_exists(3));
        assert!(pager.read_page(1).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn read_beyond_end_is_blank() {
        let (mut pager, _) = memory_pager(4);
        let data = pager.read_page(99).unwrap();
        assert_eq!(data.len(), 64);
        assert!(data.iter().all(|b| *b == 0));
    }

    #[test]
    fn raw_write_extends_but_never_shrinks_stream() {
        let (mut pager, _) = memory_pager(4);
        for _ in 0..3 {
            pager.allocate_page().unwrap();
        }
        pager.write_page(0, &filled(1)).unwrap();
        assert_eq!(pager.allocated_pages(), 3);

        pager.write_page(5, &filled(5)).unwrap();
        assert_eq!(pager.allocated_pages(), 6);
        assert_eq!(pager.read_page(5).unwrap(), filled(5));
        assert_eq!(pager.read_page(0).unwrap(), filled(1));
    }

    #[test]
    fn write_page_rejects_wrong_buffer_size() {
        let (mut pager, _) = memory_pager(4);
        let err = pager.write_page(0, &[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::PageBufferSize {
                expected: 64,
                actual: 10
            }
        ));
    }

    #[test]
    fn get_page_returns_the_same_cached_page() {
        let (mut pager, _) = memory_pager(4);
        pager.allocate_page().unwrap();

        {
            let page = pager.get_page(0).unwrap();
            assert!(!page.is_dirty());
            page.data_mut()[0..5].copy_from_slice(b"hello");
        }

        let page = pager.get_page(0).unwrap();
        assert!(page.is_dirty());
        assert_eq!(&page.data()[0..5], b"hello");
        assert_eq!(pager.cached_pages(), 1);
    }

    #[test]
    fn raw_write_invalidates_cached_copy() {
        let (mut pager, _) = memory_pager(4);
        pager.allocate_page().unwrap();
        pager.get_page(0).unwrap().data_mut()[0] = 9;

        pager.write_page(0, &filled(3)).unwrap();
        assert!(!pager.is_cached(0));
        assert_eq!(pager.get_page(0).unwrap().data(), filled(3).as_slice());
    }

    #[test]
    fn lru_evicts_least_recently_touched_page() {
        let (mut pager, _) = memory_pager(3);
        for page_id in 0..3 {
            pager.get_page(page_id).unwrap();
        }
        pager.get_page(0).unwrap();
        pager.get_page(3).unwrap();

        assert!(pager.is_cached(0));
        assert!(!pager.is_cached(1));
        assert!(pager.is_cached(2));
        assert!(pager.is_cached(3));
        assert_eq!(pager.cached_pages(), 3);

        // An out-of-band write after eviction is what the next load sees.
        pager.write_page(1, &filled(7)).unwrap();
        assert_eq!(pager.get_page(1).unwrap().data(), filled(7).as_slice());
    }

    #[test]
    fn eviction_writes_back_dirty_pages() {
        let (mut pager, store) = memory_pager(1);
        pager.allocate_page().unwrap();
        pager.allocate_page().unwrap();

        pager.get_page(0).unwrap().data_mut()[0] = 42;
        pager.get_page(1).unwrap();

        assert!(!pager.is_cached(0));
        assert_eq!(store.snapshot()[0], 42);
        assert_eq!(pager.read_page(0).unwrap()[0], 42);
    }

    #[test]
    fn clean_eviction_does_not_write() {
        let (mut pager, store) = memory_pager(1);
        pager.allocate_page().unwrap();
        pager.get_page(0).unwrap();
        pager.get_page(1).unwrap();
        assert!(store.snapshot().is_empty());
    }

    /// Accepts reads, refuses every write.
    struct ReadOnlyStore;

    impl PageStore for ReadOnlyStore {
        fn len(&self) -> std::io::Result<u64> {
            Ok(0)
        }

        fn read_at(&mut self, _offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(0);
            Ok(0)
        }

        fn write_at(&mut self, _offset: u64, _buf: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only store",
            ))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_back_keeps_the_dirty_page_cached() {
        let config = StorageConfig::default().page_size(64).cache_pages(1);
        let mut pager = Pager::with_store(ReadOnlyStore, config).unwrap();
        pager.get_page(0).unwrap().data_mut()[0] = 42;

        assert!(matches!(pager.get_page(1), Err(StorageError::Io(_))));
        assert!(pager.is_cached(0));
        assert!(!pager.is_cached(1));
        let page = pager.get_page(0).unwrap();
        assert!(page.is_dirty());
        assert_eq!(page.data()[0], 42);
    }

    #[test]
    fn only_an_unwritten_tail_page_is_released() {
        let (mut pager, _) = memory_pager(4);
        let first = pager.allocate_page().unwrap();
        let second = pager.allocate_page().unwrap();

        assert!(!pager.release_page(first).unwrap());
        assert!(pager.release_page(second).unwrap());
        assert_eq!(pager.allocated_pages(), 1);
        assert_eq!(pager.allocate_page().unwrap(), second);

        pager.get_page(second).unwrap().data_mut()[0] = 1;
        assert!(!pager.release_page(second).unwrap());

        pager.flush_all().unwrap();
        pager.evict_page().unwrap();
        pager.evict_page().unwrap();
        assert!(!pager.release_page(second).unwrap());
        assert_eq!(pager.allocated_pages(), 2);
    }

    #[test]
    fn flush_page_persists_and_clears_dirty_flag() {
        let (mut pager, store) = memory_pager(4);
        pager.allocate_page().unwrap();
        pager.get_page(0).unwrap().data_mut()[3] = 0xAB;

        pager.flush_page(0).unwrap();
        assert!(pager.is_cached(0));
        assert!(!pager.get_page(0).unwrap().is_dirty());
        assert_eq!(store.snapshot()[3], 0xAB);

        // Not cached: nothing to do.
        pager.flush_page(42).unwrap();
    }

    #[test]
    fn page_exists_covers_cached_pages_past_the_end() {
        let (mut pager, _) = memory_pager(4);
        assert!(!pager.page_exists(7));
        pager.get_page(7).unwrap();
        assert!(pager.page_exists(7));
    }

    #[test]
    fn drop_flushes_dirty_pages() {
        let (mut pager, store) = memory_pager(4);
        pager.allocate_page().unwrap();
        pager.get_page(0).unwrap().data_mut()[0] = 1;
        drop(pager);
        assert_eq!(store.snapshot()[0], 1);
    }

    #[test]
    fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");

        {
            let mut pager = Pager::open(&path).unwrap();
            let page_id = pager.allocate_page().unwrap();
            pager.allocate_page().unwrap();
            pager.get_page(page_id).unwrap().data_mut()[0..6].copy_from_slice(b"world!");
            pager.close().unwrap();
        }

        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.allocated_pages(), 1);
        assert_eq!(&pager.get_page(0).unwrap().data()[0..6], b"world!");
    }
}
