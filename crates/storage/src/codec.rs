//! Key and value codecs.
//!
//! A [`Codec`] turns a typed key or value into the opaque byte string stored
//! in a node record and back. The node serializer is generic over a key codec
//! and a value codec; schema-aware codecs for rows and catalog descriptors
//! live in [`crate::schema`].
//!
//! All fixed-width integers are little-endian. Strings embedded in composite
//! records carry a 7-bit-group varint byte length.

use crate::error::{Result, StorageError};

/// Encodes and decodes one item type to and from bytes.
pub trait Codec {
    type Item;

    fn encode(&self, item: &Self::Item) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Self::Item>;
}

/// Fixed-width 4-byte little-endian `i32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct I32Codec;

impl Codec for I32Codec {
    type Item = i32;

    fn encode(&self, item: &i32) -> Result<Vec<u8>> {
        Ok(item.to_le_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<i32> {
        let raw: [u8; 4] = bytes.try_into().map_err(|_| {
            StorageError::Codec(format!("i32 needs 4 bytes, got {}", bytes.len()))
        })?;
        Ok(i32::from_le_bytes(raw))
    }
}

/// Raw UTF-8, no length prefix (the record carries the length).
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    type Item = String;

    fn encode(&self, item: &String) -> Result<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StorageError::Codec(format!("invalid UTF-8: {e}")))
    }
}

/// Identity codec for opaque blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    type Item = Vec<u8>;

    fn encode(&self, item: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(item.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

// Cursor helpers shared by the node serializer and the schema codecs.

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            StorageError::Corruption(format!(
                "record truncated: need {len} bytes at offset {}, have {}",
                pos,
                data.len()
            ))
        })?;
    let bytes = &data[*pos..end];
    *pos = end;
    Ok(bytes)
}

pub(crate) fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    Ok(take(data, pos, 1)?[0])
}

pub(crate) fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16> {
    let bytes = take(data, pos, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = take(data, pos, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_i32(data: &[u8], pos: &mut usize) -> Result<i32> {
    let bytes = take(data, pos, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    take(data, pos, len)
}

pub(crate) fn read_bool(data: &[u8], pos: &mut usize) -> Result<bool> {
    match read_u8(data, pos)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StorageError::Codec(format!("invalid bool byte {other:#04x}"))),
    }
}

/// Unsigned LEB128-style length: 7 bits per byte, high bit means "more".
pub(crate) fn read_varint(data: &[u8], pos: &mut usize) -> Result<u32> {
    let mut value = 0u32;
    for shift in (0..35).step_by(7) {
        let byte = read_u8(data, pos)?;
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(StorageError::Codec("varint longer than 5 bytes".into()))
}

pub(crate) fn write_varint(buf: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

pub(crate) fn read_string(data: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_varint(data, pos)? as usize;
    let bytes = read_bytes(data, pos, len)?;
    StringCodec.decode(bytes)
}

pub(crate) fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| StorageError::Codec(format!("string of {} bytes is too long", s.len())))?;
    write_varint(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}
