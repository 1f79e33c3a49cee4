//! LightZhl: LZ77 over a 64 KiB window feeding an adaptive group-Huffman
//! coder.
//!
//! The stream has no header. It is a run of symbols from a 274-entry
//! alphabet (256 literals, 16 match-length symbols, a table-rebuild marker
//! and an end marker), each coded as a 4-bit group selector plus an offset
//! within the group. Matches are followed by their length extension bits
//! and a displacement. Every 4096 symbols the encoder rebuilds the group
//! layout from halved counts; the decoder keeps the same counts and reads
//! only the new group widths.

mod compress;
mod decoder;
mod encoder;
mod stat;
mod window;

use eapack_core::{Capabilities, Codec, CodecError, CodecInfo, Result, Signature};

pub(crate) const NAME: &str = "lzhl";

pub(crate) const MIN_MATCH: usize = 4;
pub(crate) const MAX_MATCH_OVER: u32 = 517;
pub(crate) const MAX_MATCH: usize = MIN_MATCH + MAX_MATCH_OVER as usize;

/// Longest literal run the matcher accumulates before flushing it.
pub(crate) const MAX_RAW: usize = 64;

/// `(extra bits, base excess)` for match-length symbols 264..=271.
pub(crate) const MATCH_OVER_TABLE: [(u32, u32); 8] =
    [(1, 8), (2, 10), (3, 14), (4, 22), (5, 38), (6, 70), (7, 134), (8, 262)];

/// Displacements carry their low bits verbatim behind a 3-bit prefix that
/// selects `(extra bits, base)` for the high part.
pub(crate) const LOW_DISP_BITS: u32 = window::WINDOW_BITS - 7;
pub(crate) const DISP_TABLE: [(u32, u32); 8] =
    [(0, 0), (0, 1), (1, 2), (2, 4), (3, 8), (4, 16), (5, 32), (6, 64)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightZhlOptions {
    /// Rotate-and-multiply hash instead of shift-xor. Fewer collisions.
    pub slow_hash: bool,
    /// Hold each match one byte to see whether a longer one starts there.
    pub lazy_match: bool,
    /// Let a match run on through the bytes it is producing.
    pub overlap: bool,
    /// Grow matches backward over the literals in front of them.
    pub backward_match: bool,
}

impl Default for LightZhlOptions {
    fn default() -> Self {
        Self {
            slow_hash: true,
            lazy_match: true,
            overlap: true,
            backward_match: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightZhlCodec {
    pub options: LightZhlOptions,
}

impl LightZhlCodec {
    pub fn new(options: LightZhlOptions) -> Self {
        Self { options }
    }
}

impl Codec for LightZhlCodec {
    fn about(&self) -> CodecInfo {
        CodecInfo {
            signature: Signature::from_ascii(b"LZHL"),
            capabilities: Capabilities::ENCODE | Capabilities::DECODE,
            version: (1, 0),
            short_name: NAME,
            long_name: "LightZhl",
        }
    }

    /// Streams carry no magic, so nothing is recognized.
    fn is_valid(&self, _data: &[u8]) -> bool {
        false
    }

    fn extract_size(&self, _data: &[u8]) -> Result<usize> {
        Err(CodecError::Unsupported {
            codec: NAME,
            operation: "extract_size",
        })
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (out, matches, recalcs) = compress::Compressor::new(data, self.options).run();
        log::debug!(
            "lzhl: encoded {} bytes into {} ({matches} matches, {recalcs} table rebuilds)",
            data.len(),
            out.len()
        );
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = decoder::Decoder::new(data);
        let out = decoder.run()?;
        log::debug!(
            "lzhl: decoded {} bytes into {} ({} table rebuilds)",
            data.len(),
            out.len(),
            decoder.recalcs
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eapack_core::DecodeStage;

    fn lcg_bytes(seed: u64, len: usize, alphabet: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) % u64::from(alphabet)) as u8
            })
            .collect()
    }

    fn words(seed: u64, count: usize) -> Vec<u8> {
        let vocab: Vec<Vec<u8>> = (0..300)
            .map(|i| lcg_bytes(seed + i, 2 + (i as usize % 7), 26).iter().map(|b| b + b'a').collect())
            .collect();
        let picks = lcg_bytes(seed ^ 0xABCD, count, 250);
        let mut out = Vec::new();
        for (i, &p) in picks.iter().enumerate() {
            let index = (p as usize + i * 7) % vocab.len();
            out.extend_from_slice(&vocab[index]);
            out.push(b' ');
        }
        out
    }

    fn round_trip(codec: &LightZhlCodec, data: &[u8]) -> Vec<u8> {
        let packed = codec.encode(data).unwrap();
        assert_eq!(codec.decode(&packed).unwrap(), data, "{} bytes", data.len());
        packed
    }

    #[test]
    fn known_streams() {
        let codec = LightZhlCodec::default();
        assert_eq!(round_trip(&codec, b""), [0xFE, 0x80]);
        assert_eq!(round_trip(&codec, b"a"), [0x8E, 0xFE, 0x80]);
        assert_eq!(round_trip(&codec, b"abcd"), [0x8E, 0x8F, 0x90, 0x91, 0xFE, 0x80]);
        // 'a', then one self-overlapping match of 19 at distance 1.
        assert_eq!(round_trip(&codec, &[b'a'; 20]), [0x8E, 0x1C, 0x40, 0x07, 0xFA]);
    }

    #[test]
    fn every_option_combination_round_trips() {
        let text = words(11, 3000);
        for bits in 0..16u8 {
            let codec = LightZhlCodec::new(LightZhlOptions {
                slow_hash: bits & 1 != 0,
                lazy_match: bits & 2 != 0,
                overlap: bits & 4 != 0,
                backward_match: bits & 8 != 0,
            });
            let packed = round_trip(&codec, &text);
            assert!(packed.len() < text.len() / 2, "options {bits:04b}: {}", packed.len());
        }
    }

    #[test]
    fn rebuilds_and_window_wrap() {
        // Well past one window and many rebuild intervals.
        let text = words(3, 40_000);
        assert!(text.len() > 3 * window::WINDOW_SIZE);
        let codec = LightZhlCodec::default();
        let packed = codec.encode(&text).unwrap();
        let mut decoder = decoder::Decoder::new(&packed);
        assert_eq!(decoder.run().unwrap(), text);
        assert!(decoder.recalcs > 3, "{} rebuilds", decoder.recalcs);
    }

    #[test]
    fn incompressible_input_round_trips() {
        let codec = LightZhlCodec::default();
        let noise = lcg_bytes(77, 20_000, 256);
        let packed = round_trip(&codec, &noise);
        assert!(packed.len() < noise.len() + noise.len() / 8);
    }

    #[test]
    fn long_runs_cap_at_the_longest_match() {
        let codec = LightZhlCodec::default();
        let mut data = vec![0u8; 5000];
        data.extend(std::iter::repeat(0xEE).take(3000));
        let packed = round_trip(&codec, &data);
        assert!(packed.len() < 96, "{} bytes", packed.len());
    }

    #[test]
    fn no_magic_and_no_size() {
        let codec = LightZhlCodec::default();
        let packed = codec.encode(b"some text some text").unwrap();
        assert!(!codec.is_valid(&packed));
        assert!(matches!(
            codec.extract_size(&packed),
            Err(CodecError::Unsupported { codec: "lzhl", .. })
        ));
    }

    #[test]
    fn truncation_is_diagnosed() {
        let codec = LightZhlCodec::default();
        let packed = codec.encode(&words(5, 500)).unwrap();
        let err = codec.decode(&packed[..packed.len() / 2]).unwrap_err();
        let CodecError::Decoding(ctx) = err else {
            panic!("expected decoding context, got {err}");
        };
        assert!(ctx.message.contains("unexpected end of input"), "{}", ctx.message);
        assert_ne!(ctx.stage, DecodeStage::EndOfStream);
        assert!(ctx.src_index <= packed.len() / 2);
        assert!(ctx.last_symbol.is_some());
    }
}
