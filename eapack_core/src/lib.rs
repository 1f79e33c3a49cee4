pub mod bits;
pub mod codec;
pub mod error;

pub use bits::{BitReader, BitWriter};
pub use codec::{Capabilities, Codec, CodecInfo, Signature};
pub use error::{CodecError, DecodeStage, DecodingError, Result};
