//! Tunables for the pager and the B+trees built on top of it.

use crate::error::{Result, StorageError};
use crate::node_header::{LeafNodeHeader, SLOT_SIZE};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages held by the pager's LRU cache.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Default maximum key count before a B+tree node splits.
pub const DEFAULT_BTREE_DEGREE: usize = 10;

/// Slot offsets are `u16`, so no page may be larger than this.
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize + 1;

/// Configuration shared by a [`crate::Pager`] and the trees it backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Size of every page in bytes.
    pub page_size: usize,
    /// Capacity of the page cache, in pages.
    pub cache_pages: usize,
    /// A node holding this many keys is split.
    pub btree_degree: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
            btree_degree: DEFAULT_BTREE_DEGREE,
        }
    }
}

impl StorageConfig {
    pub fn page_size(mut self, bytes: usize) -> Self {
        self.page_size = bytes;
        self
    }

    pub fn cache_pages(mut self, pages: usize) -> Self {
        self.cache_pages = pages;
        self
    }

    pub fn btree_degree(mut self, degree: usize) -> Self {
        self.btree_degree = degree;
        self
    }

    /// Reject settings the on-disk format cannot represent.
    pub fn validate(&self) -> Result<()> {
        let min_page = LeafNodeHeader::SIZE + SLOT_SIZE;
        if self.page_size < min_page || self.page_size > MAX_PAGE_SIZE {
            return Err(StorageError::InvalidConfig(format!(
                "page size {} outside {}..={}",
                self.page_size, min_page, MAX_PAGE_SIZE
            )));
        }
        if self.cache_pages == 0 {
            return Err(StorageError::InvalidConfig(
                "page cache must hold at least one page".into(),
            ));
        }
        validate_degree(self.btree_degree)
    }
}

pub(crate) fn validate_degree(degree: usize) -> Result<()> {
    if degree < 2 {
        return Err(StorageError::InvalidDegree(degree));
    }
    Ok(())
}
