use std::fmt;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// What a codec instance is able to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const ENCODE = 1 << 0;
        const DECODE = 1 << 1;
        /// The codec can write and read 4-byte length fields.
        const WIDE_SIZE = 1 << 2;
    }
}

/// Four ASCII bytes packed big-endian into a `u32`.
///
/// Shorter names are padded with spaces, so `"REF"` becomes `"REF "`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(u32);

impl Signature {
    pub const fn from_ascii(name: &[u8]) -> Self {
        let mut bytes = [b' '; 4];
        let mut i = 0;
        while i < name.len() && i < 4 {
            bytes[i] = name[i];
            i += 1;
        }
        Self(u32::from_be_bytes(bytes))
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

/// Immutable description of a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecInfo {
    pub signature: Signature,
    pub capabilities: Capabilities,
    /// `(major, minor)`
    pub version: (u16, u16),
    /// Short type name, also used to tag errors (`"ref"`, `"btr"`, ...).
    pub short_name: &'static str,
    pub long_name: &'static str,
}

/// The surface every codec exposes.
///
/// - `is_valid` only inspects the header magic; it never fails and returns
///   `false` on inputs shorter than two bytes.
/// - `extract_size` reads the declared uncompressed length from the header.
/// - `decode` rejects any input for which `is_valid` would return `false`,
///   unless the format has no header at all (LightZhl), in which case
///   `is_valid` is always `false` and `decode` reads until its end marker.
///
/// Implementations keep no per-call state, so one instance can be reused
/// for any number of sequential calls and shared between threads.
pub trait Codec: Send + Sync {
    fn about(&self) -> CodecInfo;

    /// Short type name, for CLI display and error tags.
    fn name(&self) -> &'static str {
        self.about().short_name
    }

    fn is_valid(&self, data: &[u8]) -> bool;

    fn extract_size(&self, data: &[u8]) -> Result<usize>;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}
