mod btree;
pub mod container;
mod cursor;
pub mod header;
mod huffman;
mod lightzhl;
mod refpack;

pub use btree::{BinaryTreeCodec, BinaryTreeOptions};
pub use container::CompressionKind;
pub use huffman::{HuffmanCodec, HuffmanOptions, MAX_DELTA_RUNS};
pub use lightzhl::{LightZhlCodec, LightZhlOptions};
pub use refpack::{RefPackCodec, RefPackOptions};

use eapack_core::{Codec, CodecError, Result};
use std::sync::Arc;

/// Short names accepted by [`codec_by_name`].
pub const CODEC_NAMES: [&str; 4] = ["ref", "btr", "huff", "lzhl"];

/// Resolve a codec with default options from its short type name.
pub fn codec_by_name(name: &str) -> Result<Arc<dyn Codec>> {
    match name {
        "ref" => Ok(Arc::new(RefPackCodec::default())),
        "btr" => Ok(Arc::new(BinaryTreeCodec::default())),
        "huff" => Ok(Arc::new(HuffmanCodec::default())),
        "lzhl" => Ok(Arc::new(LightZhlCodec::default())),
        _ => Err(CodecError::Unsupported {
            codec: "registry",
            operation: "lookup of an unknown codec name",
        }),
    }
}

/// The codec whose magic `data` starts with, if any. LightZhl streams
/// carry no magic and are never detected.
pub fn detect_codec(data: &[u8]) -> Option<Arc<dyn Codec>> {
    CODEC_NAMES
        .iter()
        .filter_map(|name| codec_by_name(name).ok())
        .find(|codec| codec.is_valid(data))
}
