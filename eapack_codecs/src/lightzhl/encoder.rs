use eapack_core::BitWriter;

use super::stat::{choose_groups, SymbolStats, EOF_SYMBOL, RECALC_INTERVAL, RECALC_SYMBOL, SYMBOLS};
use super::window::WINDOW_SIZE;
use super::{DISP_TABLE, LOW_DISP_BITS, MATCH_OVER_TABLE, MAX_MATCH_OVER};

/// Match excess below this is a bare symbol (`256 + excess`).
const DIRECT_MATCH_OVER: u32 = 8;

/// Turns literals, matches and control symbols into the adaptive bitstream.
pub(super) struct SymbolEncoder {
    stats: SymbolStats,
    codes: [(u32, u32); SYMBOLS],
    /// Symbols left before the next rebuild.
    until_recalc: u32,
    w: BitWriter,
    pub recalcs: usize,
}

impl SymbolEncoder {
    pub fn new(capacity: usize) -> Self {
        let stats = SymbolStats::new();
        let codes = stats.codes();
        Self {
            stats,
            codes,
            until_recalc: RECALC_INTERVAL,
            w: BitWriter::with_capacity(capacity),
            recalcs: 0,
        }
    }

    fn put(&mut self, symbol: u16) {
        self.until_recalc -= 1;
        if self.until_recalc == 0 {
            self.recalc();
        }
        self.stats.bump(symbol);
        let (bits, code) = self.codes[symbol as usize];
        self.w.write(code, bits);
    }

    /// Announce a rebuild under the old codes, rebuild, then send the new
    /// group widths as unary deltas.
    fn recalc(&mut self) {
        // Keeps the nested `put` from recursing.
        self.until_recalc = 2;
        self.put(RECALC_SYMBOL);

        let (ranked, total) = self.stats.rank_and_age();
        let groups = choose_groups(&ranked, total);
        let mut last = 0u8;
        for &bits in &groups {
            let delta = u32::from(bits - last);
            self.w.write(1, delta + 1);
            last = bits;
        }
        self.stats.group_bits = groups;
        self.codes = self.stats.codes();
        self.until_recalc = RECALC_INTERVAL;
        self.recalcs += 1;
    }

    pub fn literals(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.put(u16::from(b));
        }
    }

    /// `excess` is the match length minus the 4-byte minimum; `disp` is the
    /// distance back from the write cursor, `1..WINDOW_SIZE`.
    pub fn put_match(&mut self, excess: u32, disp: usize) {
        debug_assert!(excess <= MAX_MATCH_OVER);
        debug_assert!(disp > 0 && disp < WINDOW_SIZE);

        if excess < DIRECT_MATCH_OVER {
            self.put(256 + excess as u16);
        } else {
            let k = MATCH_OVER_TABLE
                .iter()
                .rposition(|&(_, base)| excess >= base)
                .unwrap_or(0);
            let (extra_bits, base) = MATCH_OVER_TABLE[k];
            self.put(264 + k as u16);
            self.w.write(excess - base, extra_bits);
        }

        let high = (disp >> LOW_DISP_BITS) as u32;
        let prefix = DISP_TABLE
            .iter()
            .rposition(|&(_, base)| high >= base)
            .unwrap_or(0);
        let (extra_bits, base) = DISP_TABLE[prefix];
        self.w.write(prefix as u32, 3);
        self.w.write(high - base, extra_bits);
        self.w.write(disp as u32, LOW_DISP_BITS);
    }

    /// End-of-stream symbol, then pad to a byte.
    pub fn finish(mut self) -> (Vec<u8>, usize) {
        self.put(EOF_SYMBOL);
        let recalcs = self.recalcs;
        (self.w.finish(), recalcs)
    }
}
