use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors surfaced by every codec in the workspace.
///
/// Each variant names the codec that raised it (its short type name, e.g.
/// `"ref"`), so a caller juggling several formats can tell them apart
/// without keeping extra state.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Header magic does not belong to this codec.
    #[error("{codec}: data is not in this codec's format")]
    InvalidFormat { codec: &'static str },

    /// The buffer ends before a header field or body element is complete.
    #[error("{codec}: truncated input, needed {needed} bytes but only {available} are available")]
    Truncated {
        codec: &'static str,
        needed: usize,
        available: usize,
    },

    /// A decoded field is outside the range the format allows.
    #[error("{codec}: malformed stream at byte {offset}: {reason}")]
    Malformed {
        codec: &'static str,
        offset: usize,
        reason: String,
    },

    /// The codec does not implement the requested direction or query.
    #[error("{codec}: {operation} is not supported")]
    Unsupported {
        codec: &'static str,
        operation: &'static str,
    },

    /// The input is longer than the header's length field can describe.
    #[error("{codec}: input of {len} bytes exceeds the format limit of {max} bytes")]
    InputTooLarge {
        codec: &'static str,
        len: usize,
        max: usize,
    },

    /// LightZhl decode failure with the full decoder state attached.
    #[error("lzhl: {0}")]
    Decoding(Box<DecodingError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    pub fn malformed(codec: &'static str, offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            codec,
            offset,
            reason: reason.into(),
        }
    }

    pub fn truncated(codec: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            codec,
            needed,
            available,
        }
    }
}

impl From<DecodingError> for CodecError {
    fn from(err: DecodingError) -> Self {
        Self::Decoding(Box::new(err))
    }
}

// ── LightZhl decoder diagnostics ───────────────────────────────────────────

/// Which step of the LightZhl decode loop was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Init,
    ReadGroup,
    ReadSymbol,
    RecalcTables,
    DecodeMatchOver,
    DecodeDisplacement,
    CopyMatch,
    EndOfStream,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeStage::Init => "init",
            DecodeStage::ReadGroup => "read-group",
            DecodeStage::ReadSymbol => "read-symbol",
            DecodeStage::RecalcTables => "recalc-tables",
            DecodeStage::DecodeMatchOver => "decode-match-over",
            DecodeStage::DecodeDisplacement => "decode-displacement",
            DecodeStage::CopyMatch => "copy-match",
            DecodeStage::EndOfStream => "end-of-stream",
        };
        f.write_str(name)
    }
}

/// Snapshot of the LightZhl decoder at the moment a stream was rejected.
///
/// `last_group` and `last_symbol` are `None` until the first group selector
/// or symbol has been decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodingError {
    pub stage: DecodeStage,
    pub message: String,
    /// Index of the next unread source byte.
    pub src_index: usize,
    /// Bits currently held in the accumulator.
    pub bit_count: u32,
    /// Accumulator contents, right-aligned.
    pub bit_buffer: u64,
    /// Logical write cursor of the sliding window.
    pub buf_pos: u64,
    pub last_group: Option<u8>,
    pub last_symbol: Option<u16>,
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (stage={}, src_index={}, bits={}/{:#x}, buf_pos={}",
            self.message, self.stage, self.src_index, self.bit_count, self.bit_buffer, self.buf_pos
        )?;
        if let Some(group) = self.last_group {
            write!(f, ", last_group={}", group)?;
        }
        if let Some(symbol) = self.last_symbol {
            write!(f, ", last_symbol={}", symbol)?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for DecodingError {}
