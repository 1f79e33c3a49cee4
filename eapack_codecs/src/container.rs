//! Tagged container shared by the game's archive tooling.
//!
//! ```text
//! [tag: 4 bytes] [original length: u32 BE] [payload]
//! ```
//!
//! The tag names the engine (`EAB\0`, `EAH\0`, `EAR\0`, `NOX\0`) or a zlib
//! level (`ZL1\0`..=`ZL9\0`). The payload is the engine's own stream,
//! native header included. Buffers without a known tag pass through
//! unchanged in both directions.

use std::fmt;
use std::io::{Read, Write};

use eapack_core::bits::read_be;
use eapack_core::{Codec, CodecError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{BinaryTreeCodec, HuffmanCodec, LightZhlCodec, RefPackCodec};

const NAME: &str = "container";

/// Tag plus original length.
pub const HEADER_SIZE: usize = 8;

const MAX_PREALLOC: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    None,
    RefPack,
    NoxLzh,
    /// zlib at level `1..=9`.
    ZLib(u8),
    BinaryTree,
    Huffman,
}

impl CompressionKind {
    /// The 4-byte tag, or `None` for [`CompressionKind::None`] and zlib
    /// levels outside `1..=9`.
    pub fn tag(self) -> Option<[u8; 4]> {
        match self {
            CompressionKind::None => None,
            CompressionKind::RefPack => Some(*b"EAR\0"),
            CompressionKind::NoxLzh => Some(*b"NOX\0"),
            CompressionKind::ZLib(level @ 1..=9) => Some([b'Z', b'L', b'0' + level, 0]),
            CompressionKind::ZLib(_) => None,
            CompressionKind::BinaryTree => Some(*b"EAB\0"),
            CompressionKind::Huffman => Some(*b"EAH\0"),
        }
    }

    fn from_tag(tag: &[u8]) -> Self {
        match tag {
            [b'Z', b'L', level @ b'1'..=b'9', 0] => CompressionKind::ZLib(level - b'0'),
            b"NOX\0" => CompressionKind::NoxLzh,
            b"EAB\0" => CompressionKind::BinaryTree,
            b"EAH\0" => CompressionKind::Huffman,
            b"EAR\0" => CompressionKind::RefPack,
            _ => CompressionKind::None,
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionKind::None => f.write_str("none"),
            CompressionKind::RefPack => f.write_str("refpack"),
            CompressionKind::NoxLzh => f.write_str("nox-lzh"),
            CompressionKind::ZLib(level) => write!(f, "zlib-{level}"),
            CompressionKind::BinaryTree => f.write_str("binary-tree"),
            CompressionKind::Huffman => f.write_str("huffman"),
        }
    }
}

/// Identify the container tag. Buffers shorter than the header are
/// never recognized.
pub fn detect(data: &[u8]) -> CompressionKind {
    if data.len() < HEADER_SIZE {
        return CompressionKind::None;
    }
    CompressionKind::from_tag(&data[..4])
}

pub fn is_compressed(data: &[u8]) -> bool {
    detect(data) != CompressionKind::None
}

/// Original length recorded in a recognized container header.
pub fn declared_size(data: &[u8]) -> Option<usize> {
    match detect(data) {
        CompressionKind::None => None,
        _ => Some(read_be(&data[4..HEADER_SIZE]) as usize),
    }
}

/// 1..=3 fast, 4..=7 default, 8..=9 best.
fn zlib_level(level: u8) -> Compression {
    match level {
        0..=3 => Compression::fast(),
        4..=7 => Compression::default(),
        _ => Compression::best(),
    }
}

fn encode_payload(kind: CompressionKind, data: &[u8]) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(data.to_vec()),
        CompressionKind::RefPack => RefPackCodec::default().encode(data),
        CompressionKind::NoxLzh => LightZhlCodec::default().encode(data),
        CompressionKind::BinaryTree => BinaryTreeCodec::default().encode(data),
        CompressionKind::Huffman => HuffmanCodec::default().encode(data),
        CompressionKind::ZLib(level) => {
            let mut z = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), zlib_level(level));
            z.write_all(data)?;
            Ok(z.finish()?)
        }
    }
}

fn decode_payload(kind: CompressionKind, payload: &[u8], declared: usize) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(payload.to_vec()),
        CompressionKind::RefPack => RefPackCodec::default().decode(payload),
        CompressionKind::NoxLzh => LightZhlCodec::default().decode(payload),
        CompressionKind::BinaryTree => BinaryTreeCodec::default().decode(payload),
        CompressionKind::Huffman => HuffmanCodec::default().decode(payload),
        CompressionKind::ZLib(_) => {
            let mut out = Vec::with_capacity(declared.min(MAX_PREALLOC));
            ZlibDecoder::new(payload).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

fn header(kind: CompressionKind, original_len: usize) -> Result<[u8; HEADER_SIZE]> {
    let tag = kind.tag().ok_or(CodecError::Unsupported {
        codec: NAME,
        operation: match kind {
            CompressionKind::None => "a header for uncompressed data",
            _ => "zlib level outside 1..=9",
        },
    })?;
    let len = u32::try_from(original_len).map_err(|_| CodecError::InputTooLarge {
        codec: NAME,
        len: original_len,
        max: u32::MAX as usize,
    })?;
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&tag);
    header[4..].copy_from_slice(&len.to_be_bytes());
    Ok(header)
}

/// Prefix an already encoded `payload` with the header for `kind`.
///
/// For callers that encode with non-default options; the payload must be
/// what the default codec for `kind` can decode.
pub fn wrap(kind: CompressionKind, original_len: usize, payload: &[u8]) -> Result<Vec<u8>> {
    let header = header(kind, original_len)?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Wrap `data` under `kind`. [`CompressionKind::None`] returns a copy of
/// the input.
pub fn compress(kind: CompressionKind, data: &[u8]) -> Result<Vec<u8>> {
    if kind == CompressionKind::None {
        return Ok(data.to_vec());
    }
    header(kind, data.len())?;
    let out = wrap(kind, data.len(), &encode_payload(kind, data)?)?;
    log::debug!(
        "container: wrapped {} bytes as {kind} into {}",
        data.len(),
        out.len()
    );
    Ok(out)
}

/// Unwrap a tagged buffer. Untagged input comes back unchanged.
///
/// The decoded length must equal the one in the header.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let kind = detect(data);
    if kind == CompressionKind::None {
        return Ok(data.to_vec());
    }
    let declared = read_be(&data[4..HEADER_SIZE]) as usize;
    let out = decode_payload(kind, &data[HEADER_SIZE..], declared)?;
    if out.len() != declared {
        return Err(CodecError::malformed(
            NAME,
            4,
            format!("header declares {declared} bytes but {kind} produced {}", out.len()),
        ));
    }
    log::debug!("container: unwrapped {kind} into {} bytes", out.len());
    Ok(out)
}
