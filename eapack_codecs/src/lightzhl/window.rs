//! The 64 KiB sliding window shared by the compressor and decompressor.

pub(super) const WINDOW_BITS: u32 = 16;
pub(super) const WINDOW_SIZE: usize = 1 << WINDOW_BITS;
pub(super) const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Circular byte buffer with a monotonically increasing logical cursor.
///
/// Only the most recent `WINDOW_SIZE` bytes are retrievable. Slots that were
/// never written read as zero on both sides of the stream.
pub(super) struct Window {
    buf: Box<[u8]>,
    cursor: u64,
}

impl Window {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            cursor: 0,
        }
    }

    #[inline]
    pub fn wrap(pos: u64) -> usize {
        pos as usize & WINDOW_MASK
    }

    /// Forward distance from physical slot `from` to physical slot `to`.
    #[inline]
    pub fn distance(to: usize, from: usize) -> usize {
        to.wrapping_sub(from) & WINDOW_MASK
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Physical slot the next byte will land in.
    pub fn here(&self) -> usize {
        Self::wrap(self.cursor)
    }

    /// Move the cursor to an earlier (or restored) logical position. The
    /// bytes already in the ring are left as they are.
    pub fn seek(&mut self, cursor: u64) {
        self.cursor = cursor;
    }

    pub fn get(&self, slot: usize) -> u8 {
        self.buf[slot & WINDOW_MASK]
    }

    pub fn push(&mut self, byte: u8) {
        self.buf[Self::wrap(self.cursor)] = byte;
        self.cursor += 1;
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            let start = self.here();
            let n = rest.len().min(WINDOW_SIZE - start);
            self.buf[start..start + n].copy_from_slice(&rest[..n]);
            self.cursor += n as u64;
            rest = &rest[n..];
        }
    }

    /// How many leading bytes of `pattern` agree with the ring starting at
    /// physical slot `slot`, compared up to `limit` bytes.
    pub fn matching(&self, slot: usize, pattern: &[u8], limit: usize) -> usize {
        pattern
            .iter()
            .take(limit)
            .enumerate()
            .take_while(|&(i, &b)| self.buf[(slot + i) & WINDOW_MASK] == b)
            .count()
    }

    /// Append `len` bytes copied from `disp` bytes behind the cursor to both
    /// the ring and `out`. A `disp` shorter than `len` repeats the copied
    /// bytes.
    pub fn copy_back(&mut self, disp: usize, len: usize, out: &mut Vec<u8>) {
        for _ in 0..len {
            let byte = self.buf[Self::wrap(self.cursor.wrapping_sub(disp as u64))];
            self.push(byte);
            out.push(byte);
        }
    }
}
