use eapack_core::{BitReader, DecodeStage, DecodingError, Result};

use super::stat::{SymbolStats, EOF_SYMBOL, GROUP_SELECTOR_BITS, GROUPS, MAX_GROUP_BITS, RECALC_SYMBOL, SYMBOLS};
use super::window::Window;
use super::{DISP_TABLE, LOW_DISP_BITS, MATCH_OVER_TABLE, MIN_MATCH};

/// Output preallocation is capped; the input length is only a hint.
const MAX_PREALLOC: usize = 1 << 24;

pub(super) struct Decoder<'a> {
    r: BitReader<'a>,
    stats: SymbolStats,
    starts: [usize; GROUPS],
    window: Window,
    stage: DecodeStage,
    last_group: Option<u8>,
    last_symbol: Option<u16>,
    pub recalcs: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let stats = SymbolStats::new();
        let starts = stats.group_starts();
        Self {
            r: BitReader::new(data),
            stats,
            starts,
            window: Window::new(),
            stage: DecodeStage::Init,
            last_group: None,
            last_symbol: None,
            recalcs: 0,
        }
    }

    fn fail(&self, message: impl Into<String>) -> DecodingError {
        DecodingError {
            stage: self.stage,
            message: message.into(),
            src_index: self.r.byte_pos(),
            bit_count: self.r.held(),
            bit_buffer: self.r.accumulator(),
            buf_pos: self.window.cursor(),
            last_group: self.last_group,
            last_symbol: self.last_symbol,
        }
    }

    fn bits(&mut self, n: u32, what: &str) -> Result<u32> {
        match self.r.read(n) {
            Some(v) => Ok(v),
            None => Err(self
                .fail(format!("unexpected end of input while reading {what}"))
                .into()),
        }
    }

    fn symbol(&mut self) -> Result<u16> {
        self.stage = DecodeStage::ReadGroup;
        let group = self.bits(GROUP_SELECTOR_BITS, "a group selector")? as usize;
        self.last_group = Some(group as u8);

        self.stage = DecodeStage::ReadSymbol;
        let width = u32::from(self.stats.group_bits[group]);
        let offset = self.bits(width, "a symbol offset")? as usize;
        let pos = self.starts[group] + offset;
        if pos >= SYMBOLS {
            return Err(self
                .fail(format!("rank position {pos} is past the alphabet"))
                .into());
        }
        let symbol = self.stats.order[pos];
        self.last_symbol = Some(symbol);
        self.stats.bump(symbol);
        Ok(symbol)
    }

    /// Re-rank from the decoder's own counts and read the new group widths.
    fn recalc(&mut self) -> Result<()> {
        self.stage = DecodeStage::RecalcTables;
        self.stats.rank_and_age();
        let mut bits = 0u32;
        for group in 0..GROUPS {
            loop {
                if self.bits(1, "group widths")? == 1 {
                    break;
                }
                bits += 1;
                if bits > u32::from(MAX_GROUP_BITS) {
                    return Err(self
                        .fail(format!("group {group} is wider than {MAX_GROUP_BITS} bits"))
                        .into());
                }
            }
            self.stats.group_bits[group] = bits as u8;
        }
        self.starts = self.stats.group_starts();
        self.recalcs += 1;
        Ok(())
    }

    fn match_over(&mut self, symbol: u16) -> Result<u32> {
        self.stage = DecodeStage::DecodeMatchOver;
        let index = usize::from(symbol - 256);
        if index < 8 {
            return Ok(index as u32);
        }
        let Some(&(extra_bits, base)) = MATCH_OVER_TABLE.get(index - 8) else {
            return Err(self.fail(format!("symbol {symbol} is not a match length")).into());
        };
        Ok(base + self.bits(extra_bits, "match length bits")?)
    }

    fn displacement(&mut self) -> Result<usize> {
        self.stage = DecodeStage::DecodeDisplacement;
        let prefix = self.bits(3, "a displacement prefix")? as usize;
        let (extra_bits, base) = DISP_TABLE[prefix];
        let value = self.bits(extra_bits + LOW_DISP_BITS, "displacement bits")?;
        let disp = (value + (base << LOW_DISP_BITS)) as usize;
        if disp == 0 {
            return Err(self.fail("zero displacement").into());
        }
        Ok(disp)
    }

    pub fn run(&mut self) -> Result<Vec<u8>> {
        let hint = self.r.remaining() as usize / 4;
        let mut out = Vec::with_capacity(hint.min(MAX_PREALLOC));
        loop {
            let symbol = self.symbol()?;
            match symbol {
                0..=255 => {
                    let byte = symbol as u8;
                    self.window.push(byte);
                    out.push(byte);
                }
                RECALC_SYMBOL => self.recalc()?,
                EOF_SYMBOL => {
                    self.stage = DecodeStage::EndOfStream;
                    break;
                }
                _ => {
                    let len = self.match_over(symbol)? as usize + MIN_MATCH;
                    let disp = self.displacement()?;
                    self.stage = DecodeStage::CopyMatch;
                    self.window.copy_back(disp, len, &mut out);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eapack_core::{BitWriter, CodecError};

    fn decode(data: &[u8]) -> Result<Vec<u8>> {
        Decoder::new(data).run()
    }

    #[test]
    fn literals_then_end() {
        // 'a' (0x8E in 8 bits), then the end symbol 0x1FD in 9 bits.
        assert_eq!(decode(&[0x8E, 0xFE, 0x80]).unwrap(), b"a");
        assert_eq!(decode(&[0xFE, 0x80]).unwrap(), b"");
    }

    #[test]
    fn missing_end_symbol_reports_context() {
        let err = decode(&[0x8E]).unwrap_err();
        let CodecError::Decoding(ctx) = err else {
            panic!("expected decoding context, got {err}");
        };
        assert_eq!(ctx.stage, DecodeStage::ReadGroup);
        assert_eq!(ctx.src_index, 1);
        assert_eq!(ctx.buf_pos, 1);
        assert_eq!(ctx.last_symbol, Some(u16::from(b'a')));
        assert_eq!(ctx.last_group, Some(8));
    }

    #[test]
    fn rank_past_the_alphabet_is_rejected() {
        // Group 15 holds 30 symbols in 5 bits; offset 31 is unused.
        let mut w = BitWriter::default();
        w.write(0x1FF, 9);
        let err = decode(&w.finish()).unwrap_err();
        let CodecError::Decoding(ctx) = err else {
            panic!("expected decoding context, got {err}");
        };
        assert_eq!(ctx.stage, DecodeStage::ReadSymbol);
        assert_eq!(ctx.last_group, Some(15));
        assert_eq!(ctx.last_symbol, None);
    }

    #[test]
    fn zero_displacement_is_rejected() {
        let mut w = BitWriter::default();
        w.write(0x00, 6); // symbol 256: 4-byte match
        w.write(0, 3 + 9);
        let err = decode(&w.finish()).unwrap_err();
        assert!(
            matches!(&err, CodecError::Decoding(ctx) if ctx.stage == DecodeStage::DecodeDisplacement),
            "{err}"
        );
    }

    #[test]
    fn match_copies_from_the_window() {
        let mut w = BitWriter::default();
        w.write(0x8E, 8); // 'a'
        w.write(0x01, 6); // symbol 257: match of 5
        w.write(0, 3);
        w.write(1, 9); // disp 1
        w.write(0x1FD, 9);
        assert_eq!(decode(&w.finish()).unwrap(), b"aaaaaa");
    }
}
