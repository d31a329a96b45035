//! Storage engine: pager, B+tree, and on-disk format.
//!
//! This crate provides:
//! - Fixed-size page I/O over a file or memory with an LRU page cache (pager)
//! - A slotted-page node format with little-endian headers
//! - One B+tree algorithm running either in memory or over pager pages
//! - Key/value codecs, including schema-aware row and descriptor codecs
//! - A small table catalog that keeps tree roots in the database header

pub mod btree;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod node;
pub mod node_header;
pub mod pager;
pub mod persisted;
pub mod schema;
pub mod serializer;
pub mod store;

pub use btree::{
    BPlusTree, InMemoryBPlusTree, NodeArena, NodeResolver, RootBinding, RootListener, Scan,
};
pub use catalog::Catalog;
pub use codec::{BytesCodec, Codec, I32Codec, StringCodec};
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use header::DatabaseHeader;
pub use node::{Entry, InternalNode, LeafNode, Node};
pub use pager::{Page, PageId, Pager};
pub use persisted::{PagedNodes, PersistedBPlusTree};
pub use schema::{ColumnInfo, DataType, Row, TableInfo, Value};
pub use serializer::NodeSerializer;
pub use store::{FileStore, MemoryStore, PageStore};
