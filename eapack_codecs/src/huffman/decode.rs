use eapack_core::{BitReader, CodecError, Result};

use super::tree::{MAX_TABLE_BITS, SYMBOLS};
use super::NAME;

/// Longest unary prefix a stream number may carry.
const MAX_NUM_CLASS: u32 = 29;

/// Give up preallocating past this; the declared size is untrusted.
const MAX_PREALLOC: usize = 1 << 24;

struct Unpacker<'a> {
    r: BitReader<'a>,
    /// Offset of the bitstream within the whole input, for error positions.
    base: usize,
    total: usize,
}

impl Unpacker<'_> {
    fn offset(&self) -> usize {
        self.base + self.r.byte_pos()
    }

    fn truncated(&self) -> CodecError {
        CodecError::truncated(NAME, self.offset() + 1, self.total)
    }

    fn malformed(&self, reason: impl Into<String>) -> CodecError {
        CodecError::malformed(NAME, self.offset(), reason)
    }

    fn bits(&mut self, n: u32) -> Result<u32> {
        self.r.read(n).ok_or_else(|| self.truncated())
    }

    fn num(&mut self) -> Result<u32> {
        let mut class = 0;
        loop {
            match self.r.read_bit() {
                Some(true) => break,
                Some(false) => class += 1,
                None => return Err(self.truncated()),
            }
            if class > MAX_NUM_CLASS {
                return Err(self.malformed("number prefix too long"));
            }
        }
        let width = class + 2;
        let value = self.bits(width)?;
        Ok(value + (1u32 << width) - 4)
    }
}

/// Prefix width resolved by the quick table.
const QUICK_BITS: u32 = 8;

/// Canonical decoding tables rebuilt from the stream.
struct Tables {
    clue: u8,
    /// First code of each length, and how many codes that length has.
    first_code: [u32; MAX_TABLE_BITS as usize + 1],
    count: [u32; MAX_TABLE_BITS as usize + 1],
    /// Index into `symbols` of the first code of each length.
    first_index: [u32; MAX_TABLE_BITS as usize + 1],
    /// One past the last code of each length, left-justified to
    /// `MAX_TABLE_BITS`. Nondecreasing in length.
    limit: [u32; MAX_TABLE_BITS as usize + 1],
    most_bits: u32,
    symbols: Vec<u8>,
    /// `(symbol, length)` for every 8-bit prefix that starts a code of at
    /// most 8 bits; length 0 sends the lookup to `limit`.
    quick: [(u8, u8); 1 << QUICK_BITS],
}

impl Tables {
    /// `empty` streams carry only the clue, as a lone 1-bit code.
    fn read(u: &mut Unpacker<'_>, empty: bool) -> Result<Self> {
        let clue = u.bits(8)? as u8;

        let mut first_code = [0u32; MAX_TABLE_BITS as usize + 1];
        let mut count = [0u32; MAX_TABLE_BITS as usize + 1];
        let mut first_index = [0u32; MAX_TABLE_BITS as usize + 1];
        let mut next = 0u32;
        let mut total = 0u32;
        let mut len = 0;
        loop {
            len += 1;
            if len > MAX_TABLE_BITS {
                return Err(u.malformed("code lengths never complete the tree"));
            }
            next <<= 1;
            let n = u.num()?;
            first_code[len as usize] = next;
            first_index[len as usize] = total;
            count[len as usize] = n;
            next = next.saturating_add(n);
            total = total.saturating_add(n);
            if next > 1 << len || total > SYMBOLS as u32 {
                return Err(u.malformed(format!("{n} codes of length {len} overflow the tree")));
            }
            if n != 0 && (next == 1 << len || (empty && total == 1)) {
                break;
            }
        }

        let mut placed = [false; SYMBOLS];
        let mut free = SYMBOLS as u32;
        let mut at = 0xFFusize;
        let mut symbols = Vec::with_capacity(total as usize);
        for _ in 0..total {
            let skip = u.num()?;
            // Walking more than once around the free values lands on the
            // same value as walking the remainder.
            let mut steps = skip % free + 1;
            loop {
                at = (at + 1) & 0xFF;
                if !placed[at] {
                    steps -= 1;
                    if steps == 0 {
                        break;
                    }
                }
            }
            placed[at] = true;
            free -= 1;
            symbols.push(at as u8);
        }

        let mut limit = [0u32; MAX_TABLE_BITS as usize + 1];
        for l in 1..=len as usize {
            limit[l] = (first_code[l] + count[l]) << (MAX_TABLE_BITS as usize - l);
        }

        let mut quick = [(0u8, 0u8); 1 << QUICK_BITS];
        for l in 1..=len.min(QUICK_BITS) {
            let span = 1usize << (QUICK_BITS - l);
            for offset in 0..count[l as usize] {
                let symbol = symbols[(first_index[l as usize] + offset) as usize];
                let start = ((first_code[l as usize] + offset) as usize) * span;
                quick[start..start + span].fill((symbol, l as u8));
            }
        }

        Ok(Self {
            clue,
            first_code,
            count,
            first_index,
            limit,
            most_bits: len,
            symbols,
            quick,
        })
    }

    fn symbol(&self, u: &mut Unpacker<'_>) -> Result<u8> {
        let (symbol, len) = self.quick[u.r.peek(QUICK_BITS) as usize];
        if len != 0 {
            u.bits(u32::from(len))?;
            return Ok(symbol);
        }

        // Longer codes: the first length whose limit lies above the window.
        let window = u.r.peek(MAX_TABLE_BITS);
        let long = (QUICK_BITS + 1) as usize..=self.most_bits as usize;
        let Some(limits) = self.limit.get(long) else {
            return Err(u.malformed("bit pattern matches no code"));
        };
        let at = limits.partition_point(|&limit| limit <= window);
        if at == limits.len() {
            return Err(u.malformed("bit pattern matches no code"));
        }
        let len = QUICK_BITS + 1 + at as u32;
        let code = window >> (MAX_TABLE_BITS - len);
        let index = self.first_index[len as usize] + (code - self.first_code[len as usize]);
        u.bits(len)?;
        Ok(self.symbols[index as usize])
    }
}

/// Decode the bitstream that follows a header of `header_len` bytes and
/// declares `size` output bytes.
pub(super) fn unpack(data: &[u8], header_len: usize, size: usize) -> Result<Vec<u8>> {
    let mut u = Unpacker {
        r: BitReader::new(&data[header_len..]),
        base: header_len,
        total: data.len(),
    };
    let tables = Tables::read(&mut u, size == 0)?;

    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
    loop {
        let symbol = tables.symbol(&mut u)?;
        if symbol != tables.clue {
            out.push(symbol);
        } else {
            let run = u.num()? as usize;
            if run != 0 {
                let Some(&last) = out.last() else {
                    return Err(u.malformed("run before any byte"));
                };
                if out.len() + run > size {
                    return Err(u.malformed(format!("run of {run} overruns {size} bytes")));
                }
                out.resize(out.len() + run, last);
                continue;
            }
            if u.bits(1)? == 1 {
                break;
            }
            out.push(u.bits(8)? as u8);
        }
        if out.len() > size {
            return Err(u.malformed(format!("output exceeds the declared {size} bytes")));
        }
    }

    if out.len() != size {
        return Err(u.malformed(format!(
            "stream ended after {} of {size} bytes",
            out.len()
        )));
    }
    Ok(out)
}
