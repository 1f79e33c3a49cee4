//! Big-endian field helpers and an MSB-first bit packer/unpacker.
//!
//! Every codec in the workspace stores multi-byte header fields big-endian
//! and packs its bitstreams most-significant-bit first, so a value written
//! with `n` bits occupies the next `n` positions of the stream in reading
//! order. The final partial byte is padded with zero bits.

// ── Big-endian fields ──────────────────────────────────────────────────────

/// Read `bytes` (1 to 4 of them) as one big-endian value.
pub fn read_be(bytes: &[u8]) -> u32 {
    debug_assert!(bytes.len() <= 4);
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// Append the low `width` bytes of `value`, most significant first.
pub fn push_be(out: &mut Vec<u8>, value: u32, width: usize) {
    debug_assert!((1..=4).contains(&width));
    out.extend_from_slice(&value.to_be_bytes()[4 - width..]);
}

#[inline]
fn mask(n: u32) -> u64 {
    (1u64 << n) - 1
}

// ── Writer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    /// Bits in `acc` not yet flushed (always < 8 between calls).
    held: u32,
}

impl BitWriter {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            out: Vec::with_capacity(bytes),
            acc: 0,
            held: 0,
        }
    }

    /// Append the low `n` bits of `value` (`n <= 32`).
    pub fn write(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32);
        if n == 0 {
            return;
        }
        self.acc = (self.acc << n) | (value as u64 & mask(n));
        self.held += n;
        while self.held >= 8 {
            self.held -= 8;
            self.out.push((self.acc >> self.held) as u8);
        }
        self.acc &= mask(self.held);
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write(bit as u32, 1);
    }

    /// Total bits written so far.
    pub fn bit_len(&self) -> u64 {
        self.out.len() as u64 * 8 + self.held as u64
    }

    /// Pad the last byte with zeros and return the stream.
    pub fn finish(mut self) -> Vec<u8> {
        if self.held > 0 {
            self.out.push((self.acc << (8 - self.held)) as u8);
        }
        self.out
    }
}

// ── Reader ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Next byte of `data` to pull into the accumulator.
    pos: usize,
    acc: u64,
    held: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            held: 0,
        }
    }

    fn refill(&mut self, n: u32) {
        while self.held < n && self.pos < self.data.len() {
            self.acc = (self.acc << 8) | self.data[self.pos] as u64;
            self.pos += 1;
            self.held += 8;
        }
    }

    /// Look at the next `n` bits (`n <= 32`) without consuming them.
    /// Bits past the end of the input read as zero.
    pub fn peek(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        self.refill(n);
        if self.held >= n {
            ((self.acc >> (self.held - n)) & mask(n)) as u32
        } else {
            ((self.acc << (n - self.held)) & mask(n)) as u32
        }
    }

    /// Consume `n` bits (`n <= 32`). `None` if fewer than `n` remain.
    pub fn read(&mut self, n: u32) -> Option<u32> {
        if n == 0 {
            return Some(0);
        }
        let value = self.peek(n);
        if self.held < n {
            return None;
        }
        self.held -= n;
        self.acc &= mask(self.held);
        Some(value)
    }

    pub fn read_bit(&mut self) -> Option<bool> {
        self.read(1).map(|b| b != 0)
    }

    /// Bits not yet consumed.
    pub fn remaining(&self) -> u64 {
        (self.data.len() - self.pos) as u64 * 8 + self.held as u64
    }

    /// Index of the next source byte that has not been pulled in.
    pub fn byte_pos(&self) -> usize {
        self.pos
    }

    /// Bits pulled from the source but not yet consumed.
    pub fn held(&self) -> u32 {
        self.held
    }

    /// The pulled-but-unconsumed bits, right-aligned.
    pub fn accumulator(&self) -> u64 {
        self.acc
    }
}
