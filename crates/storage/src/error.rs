//! Error type shared by every storage component.

use std::io;

use thiserror::Error;

use crate::pager::PageId;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("B+tree degree must be at least 2, got {0}")]
    InvalidDegree(usize),
    #[error("invalid page id: {0}")]
    InvalidPageId(i64),
    #[error("page buffer is {actual} bytes, expected {expected}")]
    PageBufferSize { expected: usize, actual: usize },
    #[error("node on page {page_id} needs {required} bytes but a page holds {page_size}")]
    NodeOverflow {
        page_id: PageId,
        required: usize,
        page_size: usize,
    },
    #[error("unsupported node format version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("type mismatch: column '{column}' is {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("missing value for column '{0}'")]
    MissingColumn(String),
}
