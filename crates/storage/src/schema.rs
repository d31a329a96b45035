//! Schema types and the codecs that store them.
//!
//! A table is described by a [`TableInfo`] (name, ordered columns, root page
//! of its row tree). Rows are maps from column name to an optional
//! [`Value`]; they are encoded against the table's column list, so the byte
//! layout follows column order, not map order.
//!
//! ```text
//! ColumnInfo: name: str | type_name: str
//! TableInfo:  name: str | root_page: u32 | column_count: u32 | ColumnInfo*
//! Row:        per column: present: u8 (0/1) | value if present
//!             INTEGER -> i32, TEXT -> str
//! ```
//!
//! `str` is a varint byte length followed by UTF-8. Integers are
//! little-endian.

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{read_bool, read_i32, read_string, read_u32, write_string, Codec};
use crate::error::{Result, StorageError};
use crate::pager::PageId;

/// Column types a table may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Text,
}

impl DataType {
    /// The name persisted in column descriptors.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "INTEGER",
            DataType::Text => "TEXT",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "INTEGER" => Ok(DataType::Int),
            "TEXT" => Ok(DataType::Text),
            other => Err(StorageError::Codec(format!("unknown column type '{other}'"))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single non-null cell value. Integers order before text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Text(_) => DataType::Text,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Column name to value; `None` is SQL NULL.
pub type Row = BTreeMap<String, Option<Value>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    fn check(&self, value: &Value) -> Result<()> {
        if value.data_type() != self.data_type {
            return Err(StorageError::TypeMismatch {
                column: self.name.clone(),
                expected: self.data_type.name(),
                found: value.data_type().name(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub root_page: PageId,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>, root_page: PageId) -> Self {
        Self {
            name: name.into(),
            columns,
            root_page,
        }
    }

    /// Rows are keyed by their first column.
    pub fn primary_key(&self) -> Option<&ColumnInfo> {
        self.columns.first()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Key codec for a table's primary-key column.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    column: ColumnInfo,
}

impl ValueCodec {
    pub fn for_column(column: &ColumnInfo) -> Self {
        Self {
            column: column.clone(),
        }
    }
}

impl Codec for ValueCodec {
    type Item = Value;

    fn encode(&self, item: &Value) -> Result<Vec<u8>> {
        self.column.check(item)?;
        Ok(match item {
            Value::Int(value) => value.to_le_bytes().to_vec(),
            Value::Text(value) => value.as_bytes().to_vec(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        match self.column.data_type {
            DataType::Int => crate::codec::I32Codec.decode(bytes).map(Value::Int),
            DataType::Text => crate::codec::StringCodec.decode(bytes).map(Value::Text),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnInfoCodec;

impl ColumnInfoCodec {
    fn write(buf: &mut Vec<u8>, column: &ColumnInfo) -> Result<()> {
        write_string(buf, &column.name)?;
        write_string(buf, column.data_type.name())
    }

    fn read(data: &[u8], pos: &mut usize) -> Result<ColumnInfo> {
        let name = read_string(data, pos)?;
        let data_type = DataType::from_name(&read_string(data, pos)?)?;
        Ok(ColumnInfo { name, data_type })
    }
}

impl Codec for ColumnInfoCodec {
    type Item = ColumnInfo;

    fn encode(&self, item: &ColumnInfo) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Self::write(&mut buf, item)?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ColumnInfo> {
        let mut pos = 0;
        Self::read(bytes, &mut pos)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableInfoCodec;

impl Codec for TableInfoCodec {
    type Item = TableInfo;

    fn encode(&self, item: &TableInfo) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        write_string(&mut buf, &item.name)?;
        buf.extend_from_slice(&item.root_page.to_le_bytes());
        let count = u32::try_from(item.columns.len())
            .map_err(|_| StorageError::Codec("too many columns".into()))?;
        buf.extend_from_slice(&count.to_le_bytes());
        for column in &item.columns {
            ColumnInfoCodec::write(&mut buf, column)?;
        }
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<TableInfo> {
        let mut pos = 0;
        let name = read_string(bytes, &mut pos)?;
        let root_page = read_u32(bytes, &mut pos)?;
        let count = read_u32(bytes, &mut pos)? as usize;
        let mut columns = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            columns.push(ColumnInfoCodec::read(bytes, &mut pos)?);
        }
        Ok(TableInfo {
            name,
            columns,
            root_page,
        })
    }
}

/// Encodes rows against a fixed column list.
#[derive(Debug, Clone)]
pub struct RowCodec {
    columns: Vec<ColumnInfo>,
}

impl RowCodec {
    pub fn new(table: &TableInfo) -> Self {
        Self {
            columns: table.columns.clone(),
        }
    }
}

impl Codec for RowCodec {
    type Item = Row;

    /// Every column must be present in the row, with `None` for NULL.
    fn encode(&self, row: &Row) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for column in &self.columns {
            let cell = row
                .get(&column.name)
                .ok_or_else(|| StorageError::MissingColumn(column.name.clone()))?;
            let Some(value) = cell else {
                buf.push(0);
                continue;
            };
            column.check(value)?;
            buf.push(1);
            match value {
                Value::Int(value) => buf.extend_from_slice(&value.to_le_bytes()),
                Value::Text(value) => write_string(&mut buf, value)?,
            }
        }
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Row> {
        let mut pos = 0;
        let mut row = Row::new();
        for column in &self.columns {
            let value = if read_bool(bytes, &mut pos)? {
                Some(match column.data_type {
                    DataType::Int => Value::Int(read_i32(bytes, &mut pos)?),
                    DataType::Text => Value::Text(read_string(bytes, &mut pos)?),
                })
            } else {
                None
            };
            row.insert(column.name.clone(), value);
        }
        Ok(row)
    }
}
