//! Huffman coding with run-length escapes.
//!
//! One byte value is reserved as the clue. Behind it a stream number either
//! repeats the previous byte that many times, or (when zero) is followed by
//! an end bit and, if that bit is clear, an escaped literal byte. Up to two
//! delta passes can be applied to the input first; the header magic records
//! how many and the decoder undoes them.

mod decode;
mod encode;
mod tree;

use eapack_core::{Capabilities, Codec, CodecError, CodecInfo, Result, Signature};

use crate::header::{self, SizedHeader, FLAG_SKIP, FLAG_WIDE, MAX_NARROW_SIZE};

pub(crate) const NAME: &str = "huff";

/// `0x30FB`, `0x32FB` and `0x34FB` carry 0, 1 and 2 delta passes; each has
/// a skip-field variant (`| 0x0100`) and a wide-length variant (`| 0x8000`).
const MAGICS: [u16; 12] = [
    0x30FB, 0x31FB, 0x32FB, 0x33FB, 0x34FB, 0x35FB, 0xB0FB, 0xB1FB, 0xB2FB, 0xB3FB, 0xB4FB, 0xB5FB,
];
const MAGIC_PLAIN: u16 = 0x30FB;

pub const MAX_DELTA_RUNS: u8 = 2;

/// Codes longer than this are clipped when the tree is built.
const MAX_CODE_BITS: u32 = 15;

/// Longest run folded into one escape; longer runs continue in the next.
const MAX_RUN: usize = 30_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HuffmanOptions {
    /// Delta passes applied before coding, 0 to 2.
    pub delta_runs: u8,
}

#[derive(Debug, Clone, Default)]
pub struct HuffmanCodec {
    options: HuffmanOptions,
}

impl HuffmanCodec {
    /// Out-of-range `delta_runs` is clamped to `MAX_DELTA_RUNS`.
    pub fn new(options: HuffmanOptions) -> Self {
        let delta_runs = if options.delta_runs > MAX_DELTA_RUNS {
            log::warn!(
                "huff: {} delta passes requested, clamping to {MAX_DELTA_RUNS}",
                options.delta_runs
            );
            MAX_DELTA_RUNS
        } else {
            options.delta_runs
        };
        Self {
            options: HuffmanOptions { delta_runs },
        }
    }

    pub fn options(&self) -> HuffmanOptions {
        self.options
    }
}

/// Replace every byte with its difference from the one before it.
fn delta(data: &[u8]) -> Vec<u8> {
    let mut prev = 0u8;
    data.iter()
        .map(|&b| {
            let d = b.wrapping_sub(prev);
            prev = b;
            d
        })
        .collect()
}

/// Inverse of `delta`, in place.
fn undelta(data: &mut [u8]) {
    let mut acc = 0u8;
    for b in data {
        acc = acc.wrapping_add(*b);
        *b = acc;
    }
}

/// Delta passes recorded in `magic`.
fn delta_passes(magic: u16) -> u8 {
    let variant = ((magic & !(FLAG_WIDE | FLAG_SKIP)) >> 8) as u8;
    (variant - 0x30) / 2
}

impl Codec for HuffmanCodec {
    fn about(&self) -> CodecInfo {
        CodecInfo {
            signature: Signature::from_ascii(b"HUFF"),
            capabilities: Capabilities::ENCODE | Capabilities::DECODE,
            version: (1, 4),
            short_name: NAME,
            long_name: "Huffman",
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
        let passes = self.options.delta_runs.min(MAX_DELTA_RUNS);
        let mut src = data.to_vec();
        for _ in 0..passes {
            src = delta(&src);
        }

        let wide = src.len() > MAX_NARROW_SIZE;
        let mut magic = MAGIC_PLAIN + ((passes as u16) << 9);
        if wide {
            magic |= FLAG_WIDE;
        }
        let (out, plan) = encode::pack(&src, magic, wide);
        log::debug!(
            "huff: encoded {} bytes into {} (magic {magic:#06x}, clue {:#04x}, {} codes, longest {} bits)",
            data.len(),
            out.len(),
            plan.clue,
            plan.table.order.len(),
            plan.table.most_bits
        );
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_valid(data) {
            return Err(CodecError::InvalidFormat { codec: NAME });
        }
        let header = SizedHeader::parse(NAME, data)?;
        let mut out = decode::unpack(data, header.len, header.size)?;
        for _ in 0..delta_passes(header.magic) {
            undelta(&mut out);
        }
        log::debug!("huff: decoded {} bytes into {}", data.len(), out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_bytes(seed: u64, len: usize, alphabet: u8) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) % alphabet as u64) as u8
            })
            .collect()
    }

    #[test]
    fn delta_magic_selects_passes() {
        assert_eq!(delta_passes(0x30FB), 0);
        assert_eq!(delta_passes(0x31FB), 0);
        assert_eq!(delta_passes(0x32FB), 1);
        assert_eq!(delta_passes(0xB3FB), 1);
        assert_eq!(delta_passes(0x34FB), 2);
        assert_eq!(delta_passes(0xB5FB), 2);
    }

    #[test]
    fn delta_filters_invert() {
        let data = lcg_bytes(7, 300, 255);
        let mut twice = delta(&delta(&data));
        undelta(&mut twice);
        undelta(&mut twice);
        assert_eq!(twice, data);
    }

    #[test]
    fn empty_input_stream() {
        // clue 0x00, one 1-bit code, leapfrog skip 0, then the end sequence.
        let out = HuffmanCodec::default().encode(&[]).unwrap();
        assert_eq!(out, [0x30, 0xFB, 0x00, 0x00, 0x00, 0x00, 0xB1, 0x20]);
        assert_eq!(HuffmanCodec::default().decode(&out).unwrap(), b"");
        // A zero size still needs the tables and the end code behind it.
        assert!(matches!(
            HuffmanCodec::default().decode(&out[..5]),
            Err(CodecError::Truncated { codec: "huff", .. })
        ));
        assert!(HuffmanCodec::default().decode(&out[..7]).is_err());
    }

    #[test]
    fn clamps_delta_runs() {
        let codec = HuffmanCodec::new(HuffmanOptions { delta_runs: 9 });
        assert_eq!(codec.options().delta_runs, 2);
        let out = codec.encode(b"ramp").unwrap();
        assert_eq!(header::magic(&out), Some(0x34FB));
    }

    #[test]
    fn delta_passes_round_trip() {
        let ramp: Vec<u8> = (0..2000u32).map(|i| (i * 3 + i / 7) as u8).collect();
        for passes in 0..=2 {
            let codec = HuffmanCodec::new(HuffmanOptions { delta_runs: passes });
            let out = codec.encode(&ramp).unwrap();
            assert_eq!(header::magic(&out), Some(0x30FB + ((passes as u16) << 9)));
            assert_eq!(codec.decode(&out).unwrap(), ramp, "{passes} passes");
        }
    }

    #[test]
    fn long_runs_use_escapes() {
        let mut data = vec![b'x'; 10_000];
        data.extend_from_slice(b"tail");
        data.extend(std::iter::repeat(b'y').take(70_000));
        let out = HuffmanCodec::default().encode(&data).unwrap();
        assert!(out.len() < 64, "{} bytes", out.len());
        assert_eq!(HuffmanCodec::default().decode(&out).unwrap(), data);
    }

    #[test]
    fn every_byte_value_forces_an_escaped_clue() {
        let data = lcg_bytes(99, 5000, 255)
            .into_iter()
            .chain(0..=255u8)
            .collect::<Vec<_>>();
        let codec = HuffmanCodec::default();
        let out = codec.encode(&data).unwrap();
        assert_eq!(codec.decode(&out).unwrap(), data);
    }

    #[test]
    fn skewed_input_keeps_codes_short() {
        // Fibonacci frequencies would give a 21-level tree.
        let mut data = Vec::new();
        let (mut a, mut b) = (1usize, 1usize);
        for symbol in 0u8..22 {
            data.extend(std::iter::repeat(symbol).take(a));
            (a, b) = (b, a + b);
        }
        let mut state = 0x2545_F491u64;
        for i in (1..data.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.swap(i, (state >> 33) as usize % (i + 1));
        }

        let plan = encode::analyse(&data);
        assert!(plan.table.most_bits <= MAX_CODE_BITS);
        let codec = HuffmanCodec::default();
        assert_eq!(codec.decode(&codec.encode(&data).unwrap()).unwrap(), data);
    }

    #[test]
    fn truncated_body_is_reported() {
        let codec = HuffmanCodec::default();
        let out = codec.encode(&lcg_bytes(3, 400, 16)).unwrap();
        let err = codec.decode(&out[..out.len() / 2]).unwrap_err();
        assert!(
            matches!(err, CodecError::Truncated { codec: "huff", .. } | CodecError::Malformed { codec: "huff", .. }),
            "{err}"
        );
        assert!(matches!(
            codec.decode(&[0x30, 0xFB, 0x00]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            codec.decode(&[0x10, 0xFB, 0, 0, 0]),
            Err(CodecError::InvalidFormat { codec: "huff" })
        ));
    }
}
