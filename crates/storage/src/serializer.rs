//! Slotted-page node serializer.
//!
//! Every node occupies exactly one page:
//!
//! ```text
//! [ header ][ slot directory: item_count * u16 ][ free space ][ records ]
//! ```
//!
//! Records are packed from the end of the page backward, last item first,
//! so record 0 sits lowest. Slot `i` holds the page offset where record `i`
//! starts; slots keep key order regardless of physical placement.
//!
//! ```text
//! leaf record:     key_len: u16 | key | value_len: u16 | value
//! internal record: key_len: u16 | key | right_child: u32
//! ```
//!
//! An internal node's leftmost child is stored in its header.

use crate::codec::{read_bytes, read_u16, read_u32, Codec};
use crate::error::{Result, StorageError};
use crate::node::{Entry, InternalNode, LeafNode, Node};
use crate::node_header::{
    InternalNodeHeader, LeafNodeHeader, NodeHeader, INTERNAL_NODE_TAG, LEAF_NODE_TAG,
    NODE_FORMAT_VERSION, SLOT_SIZE,
};
use crate::pager::PageId;

/// Encodes nodes to pages and decodes them back, using a key codec and a
/// value codec for the record payloads.
#[derive(Debug, Clone)]
pub struct NodeSerializer<KC, VC> {
    key_codec: KC,
    value_codec: VC,
    page_size: usize,
}

impl<KC: Codec, VC: Codec> NodeSerializer<KC, VC> {
    pub fn new(key_codec: KC, value_codec: VC, page_size: usize) -> Self {
        Self {
            key_codec,
            value_codec,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Serialize `node` into a fresh page-sized buffer.
    pub fn serialize(&self, node: &Node<KC::Item, VC::Item>) -> Result<Vec<u8>> {
        let mut page = vec![0u8; self.page_size];
        self.serialize_into(node, &mut page)?;
        Ok(page)
    }

    /// Serialize `node` into `page`, which must be exactly one page long.
    ///
    /// Nothing is written if the node does not fit.
    pub fn serialize_into(&self, node: &Node<KC::Item, VC::Item>, page: &mut [u8]) -> Result<()> {
        if page.len() != self.page_size {
            return Err(StorageError::PageBufferSize {
                expected: self.page_size,
                actual: page.len(),
            });
        }
        match node {
            Node::Leaf(leaf) => self.write_leaf(leaf, page),
            Node::Internal(internal) => self.write_internal(internal, page),
        }
    }

    /// Decode the node stored on `page_id`.
    ///
    /// A page whose type tag is neither leaf nor internal (including a page
    /// that was never written) decodes as an empty leaf.
    pub fn deserialize(&self, page_id: PageId, page: &[u8]) -> Result<Node<KC::Item, VC::Item>> {
        match NodeHeader::node_type_of(page) {
            Some(LEAF_NODE_TAG) => self.read_leaf(page_id, page).map(Node::Leaf),
            Some(INTERNAL_NODE_TAG) => self.read_internal(page_id, page).map(Node::Internal),
            _ => Ok(Node::Leaf(LeafNode::new(page_id))),
        }
    }

    fn write_leaf(&self, leaf: &LeafNode<KC::Item, VC::Item>, page: &mut [u8]) -> Result<()> {
        let mut records = Vec::with_capacity(leaf.entries.len());
        for entry in &leaf.entries {
            let mut record = Vec::new();
            push_field(&mut record, &self.key_codec.encode(&entry.key)?)?;
            push_field(&mut record, &self.value_codec.encode(&entry.value)?)?;
            records.push(record);
        }

        let item_count = self.check_fits(leaf.page_id, LeafNodeHeader::SIZE, &records)?;
        page.fill(0);
        LeafNodeHeader::new(
            to_raw(leaf.parent),
            item_count,
            to_raw(leaf.next),
            to_raw(leaf.previous),
        )
        .write_to(page)?;
        write_records(page, LeafNodeHeader::SIZE, &records);
        Ok(())
    }

    fn write_internal(&self, internal: &InternalNode<KC::Item>, page: &mut [u8]) -> Result<()> {
        if internal.children.len() != internal.keys.len() + 1 {
            return Err(StorageError::Corruption(format!(
                "internal node {} has {} keys but {} children",
                internal.page_id,
                internal.keys.len(),
                internal.children.len()
            )));
        }

        let mut records = Vec::with_capacity(internal.keys.len());
        for (key, right_child) in internal.keys.iter().zip(&internal.children[1..]) {
            let mut record = Vec::new();
            push_field(&mut record, &self.key_codec.encode(key)?)?;
            record.extend_from_slice(&right_child.to_le_bytes());
            records.push(record);
        }

        let item_count = self.check_fits(internal.page_id, InternalNodeHeader::SIZE, &records)?;
        page.fill(0);
        InternalNodeHeader::new(to_raw(internal.parent), item_count, internal.children[0])
            .write_to(page)?;
        write_records(page, InternalNodeHeader::SIZE, &records);
        Ok(())
    }

    /// Fail with `NodeOverflow` unless header, slots and records fit the page.
    fn check_fits(&self, page_id: PageId, header_size: usize, records: &[Vec<u8>]) -> Result<u16> {
        let required = header_size
            + records.len() * SLOT_SIZE
            + records.iter().map(Vec::len).sum::<usize>();
        let overflow = || StorageError::NodeOverflow {
            page_id,
            required,
            page_size: self.page_size,
        };
        if required > self.page_size {
            return Err(overflow());
        }
        u16::try_from(records.len()).map_err(|_| overflow())
    }

    fn read_leaf(&self, page_id: PageId, page: &[u8]) -> Result<LeafNode<KC::Item, VC::Item>> {
        let header = LeafNodeHeader::read_from(page)?;
        check_version(&header.common)?;

        let mut leaf = LeafNode::new(page_id);
        leaf.parent = from_raw(header.common.parent_page_id);
        leaf.next = from_raw(header.next_sibling_page_id);
        leaf.previous = from_raw(header.previous_sibling_page_id);

        for mut pos in slots(page, LeafNodeHeader::SIZE, header.common.item_count)? {
            let key_len = read_u16(page, &mut pos)? as usize;
            let key = self.key_codec.decode(read_bytes(page, &mut pos, key_len)?)?;
            let value_len = read_u16(page, &mut pos)? as usize;
            let value = self.value_codec.decode(read_bytes(page, &mut pos, value_len)?)?;
            leaf.entries.push(Entry::new(key, value));
        }
        Ok(leaf)
    }

    fn read_internal(&self, page_id: PageId, page: &[u8]) -> Result<InternalNode<KC::Item>> {
        let header = InternalNodeHeader::read_from(page)?;
        check_version(&header.common)?;

        let mut internal = InternalNode::new(page_id);
        internal.parent = from_raw(header.common.parent_page_id);
        internal.children.push(header.first_child_page_id);

        for mut pos in slots(page, InternalNodeHeader::SIZE, header.common.item_count)? {
            let key_len = read_u16(page, &mut pos)? as usize;
            internal
                .keys
                .push(self.key_codec.decode(read_bytes(page, &mut pos, key_len)?)?);
            internal.children.push(read_u32(page, &mut pos)?);
        }
        Ok(internal)
    }
}

fn push_field(record: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        StorageError::Codec(format!("field of {} bytes exceeds u16 length", bytes.len()))
    })?;
    record.extend_from_slice(&len.to_le_bytes());
    record.extend_from_slice(bytes);
    Ok(())
}

/// Pack records backward from the page end and fill the slot directory.
/// The caller has already checked that everything fits.
fn write_records(page: &mut [u8], header_size: usize, records: &[Vec<u8>]) {
    let mut end = page.len();
    for (idx, record) in records.iter().enumerate().rev() {
        let start = end - record.len();
        page[start..end].copy_from_slice(record);
        let slot = header_size + idx * SLOT_SIZE;
        page[slot..slot + SLOT_SIZE].copy_from_slice(&(start as u16).to_le_bytes());
        end = start;
    }
}

/// Record offsets from the slot directory, each checked to lie past it.
fn slots(page: &[u8], header_size: usize, item_count: u16) -> Result<Vec<usize>> {
    let count = item_count as usize;
    let directory_end = header_size + count * SLOT_SIZE;
    if directory_end > page.len() {
        return Err(StorageError::Corruption(format!(
            "slot directory of {count} entries overruns a {}-byte page",
            page.len()
        )));
    }

    let mut pos = header_size;
    let mut offsets = Vec::with_capacity(count);
    for idx in 0..count {
        let offset = read_u16(page, &mut pos)? as usize;
        if offset < directory_end || offset >= page.len() {
            return Err(StorageError::Corruption(format!(
                "slot {idx} points at offset {offset}, outside the record area"
            )));
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

fn check_version(header: &NodeHeader) -> Result<()> {
    if header.version != NODE_FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: header.version,
            expected: NODE_FORMAT_VERSION,
        });
    }
    Ok(())
}

fn to_raw(page_id: Option<PageId>) -> PageId {
    page_id.unwrap_or(0)
}

fn from_raw(raw: PageId) -> Option<PageId> {
    (raw != 0).then_some(raw)
}
