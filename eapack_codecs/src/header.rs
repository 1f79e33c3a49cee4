use eapack_core::bits::{push_be, read_be};
use eapack_core::{CodecError, Result};

/// Magic bit selecting a 4-byte length field instead of a 3-byte one.
pub const FLAG_WIDE: u16 = 0x8000;
/// Magic bit announcing an extra length-sized field ahead of the real one.
pub const FLAG_SKIP: u16 = 0x0100;

/// Largest length a 3-byte field can carry.
pub const MAX_NARROW_SIZE: usize = 0xFF_FFFF;

/// Read the first two bytes as the big-endian magic.
pub fn magic(data: &[u8]) -> Option<u16> {
    match data {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Parsed header shared by RefPack and Huffman streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedHeader {
    pub magic: u16,
    /// Declared uncompressed length.
    pub size: usize,
    /// Bytes occupied by magic, optional skip field, and length field.
    pub len: usize,
}

impl SizedHeader {
    /// Parse `magic [skip] size`, where the width of both fields is chosen
    /// by `FLAG_WIDE` and the presence of `skip` by `FLAG_SKIP`.
    ///
    /// The caller has already checked the magic against its own set.
    pub fn parse(codec: &'static str, data: &[u8]) -> Result<Self> {
        let magic = magic(data).ok_or_else(|| CodecError::truncated(codec, 2, data.len()))?;
        let width = if magic & FLAG_WIDE != 0 { 4 } else { 3 };
        let offset = if magic & FLAG_SKIP != 0 { 2 + width } else { 2 };
        let len = offset + width;
        if data.len() < len {
            return Err(CodecError::truncated(codec, len, data.len()));
        }
        Ok(Self {
            magic,
            size: read_be(&data[offset..len]) as usize,
            len,
        })
    }
}

/// Append `magic` followed by `size` in a 3-byte field, or a 4-byte one
/// when `magic` carries `FLAG_WIDE`.
pub fn write_sized(out: &mut Vec<u8>, magic: u16, size: usize) {
    push_be(out, magic as u32, 2);
    let width = if magic & FLAG_WIDE != 0 { 4 } else { 3 };
    push_be(out, size as u32, width);
}
