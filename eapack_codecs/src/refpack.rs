use eapack_core::{Capabilities, Codec, CodecError, CodecInfo, Result, Signature};

use crate::cursor::ByteCursor;
use crate::header::{self, SizedHeader, FLAG_WIDE, MAX_NARROW_SIZE};

const NAME: &str = "ref";

const MAGICS: [u16; 4] = [0x10FB, 0x11FB, 0x90FB, 0x91FB];
const MAGIC_NARROW: u16 = 0x10FB;
const MAGIC_WIDE: u16 = MAGIC_NARROW | FLAG_WIDE;

const HASH_SIZE: usize = 1 << 16;
const LINK_SIZE: usize = 1 << 17;
const LINK_MASK: usize = LINK_SIZE - 1;

/// Farthest back a match source may start, relative to the current byte.
const MAX_BACK: usize = 131_071;
const MAX_MATCH: usize = 1028;
const MAX_LITERAL_BLOCK: usize = 112;

/// `0xE0..=0xFB` carry 4..=112 literals; `0xFC..=0xFF` end the stream
/// with 0..=3 trailing literals.
const LITERAL_COMMAND: u8 = 0xE0;
const EOF_COMMAND: u8 = 0xFC;

/// Decoded sizes beyond this are allocated on demand instead of up front.
const MAX_PREALLOC: usize = 1 << 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefPackOptions {
    /// Insert only the first position of each match into the hash chains.
    /// Faster, slightly worse ratio.
    pub quick: bool,
}

/// RefPack: the LZ77 variant behind most `0x10FB` asset streams.
///
/// The encoder walks a hash chain of earlier positions sharing a 3-byte
/// hash, picks the candidate with the best `length - command cost`, and
/// emits one of three back-reference commands carrying up to three
/// embedded literals each.
#[derive(Debug, Clone, Default)]
pub struct RefPackCodec {
    pub options: RefPackOptions,
}

impl RefPackCodec {
    pub fn new(options: RefPackOptions) -> Self {
        Self { options }
    }
}

impl Codec for RefPackCodec {
    fn about(&self) -> CodecInfo {
        CodecInfo {
            signature: Signature::from_ascii(b"REF"),
            capabilities: Capabilities::ENCODE | Capabilities::DECODE | Capabilities::WIDE_SIZE,
            version: (1, 1),
            short_name: NAME,
            long_name: "Refpack",
        }
    }

    fn is_valid(&self, data: &[u8]) -> bool {
        header::magic(data).is_some_and(|m| MAGICS.contains(&m))
    }

    fn extract_size(&self, data: &[u8]) -> Result<usize> {
        if !self.is_valid(data) {
            return Err(CodecError::InvalidFormat { codec: NAME });
        }
        Ok(SizedHeader::parse(NAME, data)?.size)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() > u32::MAX as usize {
            return Err(CodecError::InputTooLarge {
                codec: NAME,
                len: data.len(),
                max: u32::MAX as usize,
            });
        }
        let out = Encoder::new(data, self.options).run();
        log::debug!(
            "ref: encoded {} bytes into {} ({} mode)",
            data.len(),
            out.len(),
            if self.options.quick { "quick" } else { "slow" }
        );
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_valid(data) {
            return Err(CodecError::InvalidFormat { codec: NAME });
        }
        let header = SizedHeader::parse(NAME, data)?;
        let out = decode_body(data, header.len, header.size)?;
        log::debug!("ref: decoded {} bytes into {}", data.len(), out.len());
        Ok(out)
    }
}

// ── Encoder ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    /// Distance minus one, as stored in the command.
    offset: usize,
    len: usize,
    /// Command size in bytes: 2, 3 or 4.
    cost: usize,
}

impl Match {
    /// Placeholder that any real candidate must beat.
    const NONE: Match = Match {
        offset: 0,
        len: 2,
        cost: 2,
    };

    fn gain(&self) -> isize {
        self.len as isize - self.cost as isize
    }
}

fn command_cost(offset: usize, len: usize) -> usize {
    if offset < 1024 && len <= 10 {
        2
    } else if offset < 16384 && len <= 67 {
        3
    } else {
        4
    }
}

fn hash(src: &[u8], at: usize) -> usize {
    if at + 2 >= src.len() {
        return 0;
    }
    (((src[at] as usize) << 8) | src[at + 2] as usize) ^ ((src[at + 1] as usize) << 4)
}

struct Encoder<'a> {
    src: &'a [u8],
    out: Vec<u8>,
    /// Most recent position per hash, or -1.
    heads: Vec<i32>,
    /// Previous position with the same hash, indexed by `pos & LINK_MASK`.
    links: Vec<i32>,
    quick: bool,
}

impl<'a> Encoder<'a> {
    fn new(src: &'a [u8], options: RefPackOptions) -> Self {
        let mut out = Vec::with_capacity(src.len() + src.len() / 64 + 16);
        let magic = if src.len() > MAX_NARROW_SIZE {
            MAGIC_WIDE
        } else {
            MAGIC_NARROW
        };
        header::write_sized(&mut out, magic, src.len());
        Self {
            src,
            out,
            heads: vec![-1; HASH_SIZE],
            links: vec![-1; LINK_SIZE],
            quick: options.quick,
        }
    }

    fn insert(&mut self, pos: usize, hash: usize) {
        self.links[pos & LINK_MASK] = self.heads[hash];
        self.heads[hash] = pos as i32;
    }

    fn match_len(&self, cur: usize, candidate: usize, limit: usize) -> usize {
        self.src[cur..]
            .iter()
            .zip(&self.src[candidate..])
            .take(limit)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Walk the chain for `cur`, keeping the first candidate with the best gain.
    fn find_match(&self, cur: usize, limit: usize) -> Match {
        let n = self.src.len();
        let limit = limit.min(MAX_MATCH);
        let floor = cur.saturating_sub(MAX_BACK) as i32;
        let mut best = Match::NONE;

        let mut candidate = self.heads[hash(self.src, cur)];
        while candidate >= floor {
            let at = candidate as usize;
            // Cheap reject: a longer match must also agree one byte past the best.
            if cur + best.len < n && at + best.len < n && self.src[cur + best.len] == self.src[at + best.len] {
                let len = self.match_len(cur, at, limit);
                if len > best.len {
                    let offset = cur - 1 - at;
                    let found = Match {
                        offset,
                        len,
                        cost: command_cost(offset, len),
                    };
                    if found.gain() > best.gain() {
                        best = found;
                        if best.len >= MAX_MATCH {
                            break;
                        }
                    }
                }
            }
            candidate = self.links[at & LINK_MASK];
        }
        best
    }

    /// Emit pending literals in 4-aligned blocks of up to 112 until at most
    /// three remain.
    fn flush_literal_blocks(&mut self, start: &mut usize, run: &mut usize) {
        while *run > 3 {
            let block = MAX_LITERAL_BLOCK.min(*run & !3);
            self.out.push(LITERAL_COMMAND + (block >> 2) as u8 - 1);
            self.out.extend_from_slice(&self.src[*start..*start + block]);
            *start += block;
            *run -= block;
        }
    }

    fn emit_match(&mut self, m: &Match, literals: usize) {
        let (off, len, lit) = (m.offset, m.len, literals);
        match m.cost {
            2 => self.out.extend_from_slice(&[
                (((off >> 8) << 5) + ((len - 3) << 2) + lit) as u8,
                off as u8,
            ]),
            3 => self.out.extend_from_slice(&[
                (0x80 + (len - 4)) as u8,
                ((lit << 6) + (off >> 8)) as u8,
                off as u8,
            ]),
            _ => self.out.extend_from_slice(&[
                (0xC0 + ((off >> 16) << 4) + (((len - 5) >> 8) << 2) + lit) as u8,
                (off >> 8) as u8,
                off as u8,
                (len - 5) as u8,
            ]),
        }
    }

    fn run(mut self) -> Vec<u8> {
        let n = self.src.len();
        let mut cur = 0usize;
        let mut literal_start = 0usize;
        let mut run = 0usize;
        // Positions left to scan, minus the 4-byte tail that is never matched.
        let mut left = n as isize - 4;

        while left >= 0 {
            let available = left as usize;
            let best = self.find_match(cur, available);
            let h = hash(self.src, cur);

            if best.cost >= best.len || available < 4 {
                self.insert(cur, h);
                run += 1;
                cur += 1;
                left -= 1;
                continue;
            }

            self.flush_literal_blocks(&mut literal_start, &mut run);
            self.emit_match(&best, run);
            self.out
                .extend_from_slice(&self.src[literal_start..literal_start + run]);
            run = 0;

            if self.quick {
                self.insert(cur, h);
            } else {
                for pos in cur..cur + best.len {
                    if pos + 2 < n {
                        self.insert(pos, hash(self.src, pos));
                    }
                }
            }

            cur += best.len;
            literal_start = cur;
            left -= best.len as isize;
        }

        run += (left + 4) as usize;
        self.flush_literal_blocks(&mut literal_start, &mut run);
        self.out.push(EOF_COMMAND + run as u8);
        self.out
            .extend_from_slice(&self.src[literal_start..literal_start + run]);
        self.out
    }
}

// ── Decoder ────────────────────────────────────────────────────────────────

/// Decode the command stream that starts at `start` into exactly `size` bytes.
fn decode_body(data: &[u8], start: usize, size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
    let mut input = ByteCursor::new(NAME, data, start);

    loop {
        let command_at = input.pos();
        let f = input.byte()? as usize;

        let (literals, distance, len) = if f & 0x80 == 0 {
            let b2 = input.byte()? as usize;
            (f & 3, ((f & 0x60) << 3) + b2, ((f & 0x1C) >> 2) + 3)
        } else if f & 0x40 == 0 {
            let (b2, b3) = (input.byte()? as usize, input.byte()? as usize);
            (b2 >> 6, ((b2 & 0x3F) << 8) + b3, (f & 0x3F) + 4)
        } else if f & 0x20 == 0 {
            let b = input.take(3)?;
            let (b2, b3, b4) = (b[0] as usize, b[1] as usize, b[2] as usize);
            (
                f & 3,
                (((f & 0x10) >> 4) << 16) + (b2 << 8) + b3,
                (((f & 0x0C) >> 2) << 8) + b4 + 5,
            )
        } else {
            let run = ((f & 0x1F) << 2) + 4;
            if run <= MAX_LITERAL_BLOCK {
                out.extend_from_slice(input.take(run)?);
                continue;
            }
            out.extend_from_slice(input.take(f & 3)?);
            break;
        };

        out.extend_from_slice(input.take(literals)?);

        if distance >= out.len() {
            return Err(CodecError::malformed(
                NAME,
                command_at,
                format!(
                    "back-reference distance {} reaches before the start of {} decoded bytes",
                    distance + 1,
                    out.len()
                ),
            ));
        }
        // Byte by byte: the source may overlap the bytes being written.
        let from = out.len() - 1 - distance;
        for i in 0..len {
            let b = out[from + i];
            out.push(b);
        }

        if out.len() > size {
            return Err(CodecError::malformed(
                NAME,
                command_at,
                format!("output overruns the declared size of {} bytes", size),
            ));
        }
    }

    if out.len() != size {
        return Err(CodecError::malformed(
            NAME,
            input.pos(),
            format!("stream produced {} bytes but the header declares {}", out.len(), size),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(data: &[u8]) -> Vec<u8> {
        RefPackCodec::default().encode(data).unwrap()
    }

    #[test]
    fn cost_classes_follow_distance_and_length() {
        assert_eq!(command_cost(0, 3), 2);
        assert_eq!(command_cost(1023, 10), 2);
        assert_eq!(command_cost(1024, 10), 3);
        assert_eq!(command_cost(0, 11), 3);
        assert_eq!(command_cost(16383, 67), 3);
        assert_eq!(command_cost(16384, 5), 4);
        assert_eq!(command_cost(10, 68), 4);
    }

    #[test]
    fn empty_and_tiny_inputs_are_literal_only() {
        assert_eq!(encode(&[]), [0x10, 0xFB, 0x00, 0x00, 0x00, 0xFC]);
        assert_eq!(encode(&[0x00]), [0x10, 0xFB, 0x00, 0x00, 0x01, 0xFD, 0x00]);
        assert_eq!(
            encode(b"abc"),
            [0x10, 0xFB, 0x00, 0x00, 0x03, 0xFF, b'a', b'b', b'c']
        );
    }

    #[test]
    fn unmatched_bytes_become_a_literal_block() {
        let mut expected = vec![0x10, 0xFB, 0x00, 0x00, 0x08, 0xE1];
        expected.extend_from_slice(b"abcdefgh");
        expected.push(0xFC);
        assert_eq!(encode(b"abcdefgh"), expected);
    }

    #[test]
    fn run_of_one_byte_uses_short_self_overlapping_match() {
        let packed = encode(&[b'a'; 10]);
        assert_eq!(
            packed,
            [0x10, 0xFB, 0x00, 0x00, 0x0A, 0x09, 0x00, b'a', 0xE0, b'a', b'a', b'a', b'a', 0xFC]
        );
        assert_eq!(RefPackCodec::default().decode(&packed).unwrap(), [b'a'; 10]);
    }

    #[test]
    fn literal_blocks_cap_at_112_bytes() {
        // No 3-byte window repeats, so everything is literal.
        let data: Vec<u8> = (0..=255u8).collect();
        let packed = encode(&data);
        assert_eq!(packed[5], 0xE0 + 27);
        assert_eq!(packed[5 + 1 + 112], 0xE0 + 27);
        assert_eq!(packed[5 + 2 + 224], 0xE0 + 7);
        assert_eq!(*packed.last().unwrap(), 0xFC);
    }

    /// `(distance, length)` of every back-reference in an encoded stream.
    fn references(stream: &[u8]) -> Vec<(usize, usize)> {
        let mut refs = Vec::new();
        let mut i = 5;
        loop {
            let f = stream[i] as usize;
            let (literals, distance, len, size) = if f & 0x80 == 0 {
                let b2 = stream[i + 1] as usize;
                (f & 3, ((f & 0x60) << 3) + b2, ((f & 0x1C) >> 2) + 3, 2)
            } else if f & 0x40 == 0 {
                let (b2, b3) = (stream[i + 1] as usize, stream[i + 2] as usize);
                (b2 >> 6, ((b2 & 0x3F) << 8) + b3, (f & 0x3F) + 4, 3)
            } else if f & 0x20 == 0 {
                let (b2, b3, b4) = (stream[i + 1] as usize, stream[i + 2] as usize, stream[i + 3] as usize);
                let distance = (((f & 0x10) >> 4) << 16) + (b2 << 8) + b3;
                (f & 3, distance, (((f & 0x0C) >> 2) << 8) + b4 + 5, 4)
            } else if f < 0xFC {
                i += 1 + ((f & 0x1F) << 2) + 4;
                continue;
            } else {
                return refs;
            };
            refs.push((distance + 1, len));
            i += size + literals;
        }
    }

    fn lcg_bytes(len: usize, seed: u32) -> Vec<u8> {
        let mut rng = seed;
        (0..len)
            .map(|_| {
                rng = rng.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (rng >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn matches_stay_inside_window_and_length_limits() {
        let head = lcg_bytes(4000, 1);
        let mut data = head.clone();
        data.extend(lcg_bytes(140_000, 2));
        // Repeats `head` from farther back than the window reaches.
        data.extend_from_slice(&head);
        data.extend(std::iter::repeat(0u8).take(5000));

        let packed = encode(&data);
        let refs = references(&packed);
        assert!(refs.iter().all(|&(d, _)| d <= 131_072), "distance beyond window");
        assert!(refs.iter().all(|&(_, l)| (3..=MAX_MATCH).contains(&l)));
        assert!(refs.iter().any(|&(_, l)| l == MAX_MATCH), "zero run should hit the length cap");
        assert_eq!(RefPackCodec::default().decode(&packed).unwrap(), data);
    }

    #[test]
    fn decode_rejects_reference_before_start() {
        // Short command with zero literals and distance 1 on empty output.
        let stream = [0x10, 0xFB, 0x00, 0x00, 0x03, 0x00, 0x00, 0xFC];
        let err = RefPackCodec::default().decode(&stream).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { codec: "ref", offset: 5, .. }), "{err}");
    }

    #[test]
    fn decode_rejects_missing_terminator() {
        let stream = [0x10, 0xFB, 0x00, 0x00, 0x04, 0xE0, 1, 2];
        let err = RefPackCodec::default().decode(&stream).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { codec: "ref", .. }), "{err}");
    }

    #[test]
    fn decode_checks_declared_size() {
        let stream = [0x10, 0xFB, 0x00, 0x00, 0x05, 0xFD, 0x41];
        let err = RefPackCodec::default().decode(&stream).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }), "{err}");
    }
}
