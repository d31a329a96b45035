//! Database header (stored at the start of page 0).
//!
//! ```text
//! [0..4]  tables_root: u32   root page of the table catalog tree
//! [4..8]  columns_root: u32  root page of the column catalog tree
//! ```
//!
//! A root of 0 means the tree has not been created yet.

use tracing::debug;

use crate::codec::read_u32;
use crate::error::Result;
use crate::pager::{PageId, Pager};
use crate::persisted::allocate_empty_root;

/// Page reserved for the header. No tree node is ever placed here.
pub const HEADER_PAGE_ID: PageId = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub tables_root: PageId,
    pub columns_root: PageId,
}

impl DatabaseHeader {
    pub const SIZE: usize = 8;

    /// Load the header from page 0.
    ///
    /// A store without a page 0 is initialised: pages 0, 1 and 2 are
    /// allocated, the latter two written as the empty catalog roots.
    pub fn load(pager: &mut Pager) -> Result<Self> {
        if pager.page_exists(HEADER_PAGE_ID) {
            let page = pager.get_page(HEADER_PAGE_ID)?;
            return Self::deserialize(page.data());
        }

        let header_page = pager.allocate_page()?;
        debug_assert_eq!(header_page, HEADER_PAGE_ID);
        let header = Self {
            tables_root: allocate_empty_root(pager)?,
            columns_root: allocate_empty_root(pager)?,
        };
        header.save(pager)?;
        debug!(
            tables_root = header.tables_root,
            columns_root = header.columns_root,
            "initialised database header"
        );
        Ok(header)
    }

    /// Write the header into the cached copy of page 0.
    pub fn save(&self, pager: &mut Pager) -> Result<()> {
        let page = pager.get_page(HEADER_PAGE_ID)?;
        self.serialize(page.data_mut());
        Ok(())
    }

    pub fn serialize(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.tables_root.to_le_bytes());
        buf[4..8].copy_from_slice(&self.columns_root.to_le_bytes());
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut pos = 0;
        Ok(Self {
            tables_root: read_u32(buf, &mut pos)?,
            columns_root: read_u32(buf, &mut pos)?,
        })
    }
}
