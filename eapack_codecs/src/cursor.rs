use eapack_core::{CodecError, Result};

/// Forward-only reader over a byte-oriented stream that reports
/// truncation against the owning codec.
pub struct ByteCursor<'a> {
    codec: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(codec: &'static str, data: &'a [u8], pos: usize) -> Self {
        Self { codec, data, pos }
    }

    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self.pos + count;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| CodecError::truncated(self.codec, end, self.data.len()))?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Offset of the next unread byte within the whole stream.
    pub fn pos(&self) -> usize {
        self.pos
    }
}
