//! Fixed-layout node headers.
//!
//! ```text
//! common (8 bytes)
//!   [0]     node_type: u8   (1 = leaf, 2 = internal)
//!   [1]     version: u8
//!   [2..6]  parent_page_id: i32 (0 = root)
//!   [6..8]  item_count: u16
//! leaf (+8, 16 bytes total)
//!   [8..12]  next_sibling_page_id: u32 (0 = none)
//!   [12..16] previous_sibling_page_id: u32 (0 = none)
//! internal (+4, 12 bytes total)
//!   [8..12]  first_child_page_id: u32
//! ```
//!
//! `item_count` is the entry count of a leaf or the key count of an
//! internal node. All fields are little-endian.
//!
//! The parent field is a signed 32-bit page id in the file format. It is
//! held here as a [`PageId`]: page 0 is the database header and is never a
//! parent, and for ids up to `i32::MAX` both readings give the same bytes.

use crate::codec::{read_u16, read_u32, read_u8};
use crate::error::{Result, StorageError};
use crate::pager::PageId;

pub const LEAF_NODE_TAG: u8 = 0x01;
pub const INTERNAL_NODE_TAG: u8 = 0x02;

/// Current on-page node format version.
pub const NODE_FORMAT_VERSION: u8 = 1;

/// Width of one slot directory entry (a `u16` page offset).
pub const SLOT_SIZE: usize = 2;

/// The prefix shared by both node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub node_type: u8,
    pub version: u8,
    /// Signed on disk; 0 marks a root.
    pub parent_page_id: PageId,
    pub item_count: u16,
}

impl NodeHeader {
    pub const SIZE: usize = 8;

    fn new(node_type: u8, parent_page_id: PageId, item_count: u16) -> Self {
        Self {
            node_type,
            version: NODE_FORMAT_VERSION,
            parent_page_id,
            item_count,
        }
    }

    /// Peek at the type tag without decoding anything else.
    pub fn node_type_of(buf: &[u8]) -> Option<u8> {
        buf.first().copied()
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.node_type;
        buf[1] = self.version;
        buf[2..6].copy_from_slice(&self.parent_page_id.to_le_bytes());
        buf[6..8].copy_from_slice(&self.item_count.to_le_bytes());
    }

    fn read_from(buf: &[u8], pos: &mut usize) -> Result<Self> {
        Ok(Self {
            node_type: read_u8(buf, pos)?,
            version: read_u8(buf, pos)?,
            parent_page_id: read_u32(buf, pos)?,
            item_count: read_u16(buf, pos)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafNodeHeader {
    pub common: NodeHeader,
    pub next_sibling_page_id: PageId,
    pub previous_sibling_page_id: PageId,
}

impl LeafNodeHeader {
    pub const SIZE: usize = NodeHeader::SIZE + 8;

    pub fn new(
        parent_page_id: PageId,
        item_count: u16,
        next_sibling_page_id: PageId,
        previous_sibling_page_id: PageId,
    ) -> Self {
        Self {
            common: NodeHeader::new(LEAF_NODE_TAG, parent_page_id, item_count),
            next_sibling_page_id,
            previous_sibling_page_id,
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        check_len(buf, Self::SIZE)?;
        self.common.write_to(buf);
        buf[8..12].copy_from_slice(&self.next_sibling_page_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.previous_sibling_page_id.to_le_bytes());
        Ok(())
    }

    pub fn read_from(buf: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let common = NodeHeader::read_from(buf, &mut pos)?;
        Ok(Self {
            common,
            next_sibling_page_id: read_u32(buf, &mut pos)?,
            previous_sibling_page_id: read_u32(buf, &mut pos)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalNodeHeader {
    pub common: NodeHeader,
    pub first_child_page_id: PageId,
}

impl InternalNodeHeader {
    pub const SIZE: usize = NodeHeader::SIZE + 4;

    pub fn new(parent_page_id: PageId, item_count: u16, first_child_page_id: PageId) -> Self {
        Self {
            common: NodeHeader::new(INTERNAL_NODE_TAG, parent_page_id, item_count),
            first_child_page_id,
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        check_len(buf, Self::SIZE)?;
        self.common.write_to(buf);
        buf[8..12].copy_from_slice(&self.first_child_page_id.to_le_bytes());
        Ok(())
    }

    pub fn read_from(buf: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let common = NodeHeader::read_from(buf, &mut pos)?;
        Ok(Self {
            common,
            first_child_page_id: read_u32(buf, &mut pos)?,
        })
    }
}

fn check_len(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(StorageError::PageBufferSize {
            expected: needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes() {
        assert_eq!(NodeHeader::SIZE, 8);
        assert_eq!(LeafNodeHeader::SIZE, 16);
        assert_eq!(InternalNodeHeader::SIZE, 12);
    }

    #[test]
    fn leaf_header_roundtrip() {
        let header = LeafNodeHeader::new(7, 513, 42, 3);
        let mut buf = [0u8; LeafNodeHeader::SIZE];
        header.write_to(&mut buf).unwrap();

        assert_eq!(buf[0], LEAF_NODE_TAG);
        assert_eq!(buf[1], NODE_FORMAT_VERSION);

        let decoded = LeafNodeHeader::read_from(&buf).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.common.parent_page_id, 7);
        assert_eq!(decoded.common.item_count, 513);
        assert_eq!(decoded.next_sibling_page_id, 42);
        assert_eq!(decoded.previous_sibling_page_id, 3);
    }

    #[test]
    fn internal_header_roundtrip() {
        let header = InternalNodeHeader::new(0, 9, 12);
        let mut buf = [0xAAu8; 32];
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf[InternalNodeHeader::SIZE], 0xAA);

        let decoded = InternalNodeHeader::read_from(&buf).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.common.node_type, INTERNAL_NODE_TAG);
    }

    #[test]
    fn fields_are_little_endian() {
        let mut buf = [0u8; LeafNodeHeader::SIZE];
        LeafNodeHeader::new(0x0102_0304, 0x0506, 0, 0)
            .write_to(&mut buf)
            .unwrap();
        assert_eq!(&buf[2..6], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[6..8], &[0x06, 0x05]);
    }

    #[test]
    fn parent_field_reads_as_signed() {
        let mut buf = [0u8; InternalNodeHeader::SIZE];
        InternalNodeHeader::new(i32::MAX as PageId, 1, 2)
            .write_to(&mut buf)
            .unwrap();
        let raw = i32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
        assert_eq!(raw, i32::MAX);

        InternalNodeHeader::new(0, 1, 2).write_to(&mut buf).unwrap();
        assert_eq!(i32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]), 0);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut buf = [0u8; 10];
        assert!(LeafNodeHeader::new(0, 0, 0, 0).write_to(&mut buf).is_err());
        assert!(LeafNodeHeader::read_from(&buf).is_err());
        assert_eq!(NodeHeader::node_type_of(&[]), None);
    }
}
