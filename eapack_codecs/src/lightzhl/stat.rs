//! Adaptive symbol statistics and the 16-group code layout.
//!
//! Symbols are ranked by frequency and split into 16 consecutive groups. A
//! code is the 4-bit group index followed by the symbol's offset within its
//! group in that group's width (0 to 8 bits). Both sides start from the same
//! fixed layout and rebuild it from their own counts whenever the encoder
//! emits the recalculation symbol, so only the group widths travel in the
//! stream.

pub(super) const SYMBOLS: usize = 256 + 16 + 2;
pub(super) const RECALC_SYMBOL: u16 = 272;
pub(super) const EOF_SYMBOL: u16 = 273;

pub(super) const GROUPS: usize = 16;
pub(super) const GROUP_SELECTOR_BITS: u32 = 4;
pub(super) const MAX_GROUP_BITS: u8 = 8;

/// Symbols emitted between two rebuilds.
pub(super) const RECALC_INTERVAL: u32 = 4096;

const INITIAL_GROUP_BITS: [u8; GROUPS] = [2, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5];

/// A symbol's count at the moment of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Ranked {
    pub symbol: u16,
    pub count: u32,
}

/// Counts, group widths and the rank-ordered symbol list. Shared by the
/// encoder and the decoder.
#[derive(Debug, Clone)]
pub(super) struct SymbolStats {
    counts: [u32; SYMBOLS],
    pub group_bits: [u8; GROUPS],
    /// Symbol at each rank position.
    pub order: [u16; SYMBOLS],
}

impl SymbolStats {
    pub fn new() -> Self {
        Self {
            counts: [0; SYMBOLS],
            group_bits: INITIAL_GROUP_BITS,
            order: initial_order(),
        }
    }

    pub fn bump(&mut self, symbol: u16) {
        self.counts[symbol as usize] += 1;
    }

    /// First rank position of every group.
    pub fn group_starts(&self) -> [usize; GROUPS] {
        let mut starts = [0usize; GROUPS];
        let mut pos = 0;
        for (start, &bits) in starts.iter_mut().zip(&self.group_bits) {
            *start = pos;
            pos += 1 << bits;
        }
        starts
    }

    /// Rank every symbol by count (most frequent first, higher symbol first
    /// on ties), adopt that ranking as the new order and halve every count.
    /// Returns the ranking with the counts before halving, and their total.
    pub fn rank_and_age(&mut self) -> ([Ranked; SYMBOLS], u32) {
        let mut ranked = [Ranked { symbol: 0, count: 0 }; SYMBOLS];
        let mut total = 0;
        for (symbol, entry) in ranked.iter_mut().enumerate() {
            *entry = Ranked {
                symbol: symbol as u16,
                count: self.counts[symbol],
            };
            total += self.counts[symbol];
            self.counts[symbol] >>= 1;
        }
        ranked.sort_unstable_by(|a, b| b.count.cmp(&a.count).then(b.symbol.cmp(&a.symbol)));
        for (slot, entry) in self.order.iter_mut().zip(&ranked) {
            *slot = entry.symbol;
        }
        (ranked, total)
    }

    /// Per-symbol `(bit length, code)` under the current layout.
    pub fn codes(&self) -> [(u32, u32); SYMBOLS] {
        let mut codes = [(0u32, 0u32); SYMBOLS];
        let starts = self.group_starts();
        for (group, (&bits, &start)) in self.group_bits.iter().zip(&starts).enumerate() {
            let width = 1usize << bits;
            for offset in 0..width.min(SYMBOLS.saturating_sub(start)) {
                let symbol = self.order[start + offset];
                codes[symbol as usize] = (
                    GROUP_SELECTOR_BITS + u32::from(bits),
                    ((group as u32) << bits) | offset as u32,
                );
            }
        }
        codes
    }
}

/// Starting layout: match lengths first, then the four most common bytes
/// of typical asset data, the remaining bytes, and the two control symbols.
fn initial_order() -> [u16; SYMBOLS] {
    let mut order = [0u16; SYMBOLS];
    let symbols = (256..272)
        .chain([0, 32, 48, 255])
        .chain((1..255).filter(|&s| s != 32 && s != 48))
        .chain([RECALC_SYMBOL, EOF_SYMBOL]);
    for (slot, symbol) in order.iter_mut().zip(symbols) {
        *slot = symbol;
    }
    order
}

/// Insert `bits` as entry `group`, keeping `groups[..=group]` ascending.
fn add_group(groups: &mut [u8; GROUPS], group: usize, bits: u8) {
    debug_assert!(bits <= MAX_GROUP_BITS);
    let mut j = group;
    while j > 0 && bits < groups[j - 1] {
        groups[j] = groups[j - 1];
        j -= 1;
    }
    groups[j] = bits;
}

/// Width for the group starting at rank `pos`: grow it while its share of
/// the counts stays at or below `target`, then keep whichever of the last
/// two widths lands closer to `target`. Returns the width and the counts it
/// covers.
fn fit_group(ranked: &[Ranked; SYMBOLS], pos: usize, target: i64) -> (u8, i64) {
    let (mut taken, mut covered, mut grown) = (0usize, 0i64, 0i64);
    let mut bits = 0u8;
    loop {
        let mut items = 1usize << bits;
        let mut over = false;
        if pos + taken + items > SYMBOLS {
            items = SYMBOLS.saturating_sub(pos);
            over = true;
        }
        while taken < items {
            grown += i64::from(ranked[pos + taken].count);
            taken += 1;
        }
        if over || bits >= MAX_GROUP_BITS || grown > target {
            if bits == 0 || (covered - target).abs() > (grown - target).abs() {
                covered = grown;
            } else {
                bits -= 1;
            }
            return (bits, covered);
        }
        covered = grown;
        bits += 1;
    }
}

/// Widths for the last two groups: the split of the remaining ranks that
/// costs the fewest offset bits.
fn split_tail(ranked: &[Ranked; SYMBOLS], pos: usize) -> (u8, u8) {
    let left: i64 = ranked.iter().skip(pos).map(|r| i64::from(r.count)).sum();
    let (mut best_bits, mut best_tail_bits) = (0u8, 0u8);
    let mut best = i64::MAX;
    let (mut taken, mut covered) = (0usize, 0i64);
    for bits in 0u8.. {
        let items = 1usize << bits;
        if pos + taken + items > SYMBOLS {
            break;
        }
        while taken < items {
            covered += i64::from(ranked[pos + taken].count);
            taken += 1;
        }
        let tail = SYMBOLS - (pos + taken);
        let tail_bits = (0u8..).find(|&b| 1usize << b >= tail).unwrap_or(MAX_GROUP_BITS + 1);
        if bits > MAX_GROUP_BITS || tail_bits > MAX_GROUP_BITS {
            continue;
        }
        let cost = covered * i64::from(bits) + (left - covered) * i64::from(tail_bits);
        if cost >= best {
            break;
        }
        best = cost;
        best_bits = bits;
        best_tail_bits = tail_bits;
    }
    (best_bits, best_tail_bits)
}

/// Choose the 16 group widths for a ranking. The widths come back sorted
/// ascending, so the most frequent symbols get the shortest codes.
pub(super) fn choose_groups(ranked: &[Ranked; SYMBOLS], total: u32) -> [u8; GROUPS] {
    let mut groups = [0u8; GROUPS];
    let mut pos = 0usize;
    let mut assigned = 0i64;
    for group in 0..GROUPS - 2 {
        let target = (i64::from(total) - assigned) / (GROUPS - group) as i64;
        let (bits, covered) = fit_group(ranked, pos, target);
        add_group(&mut groups, group, bits);
        assigned += covered;
        pos += 1 << bits;
    }
    let (bits, tail_bits) = split_tail(ranked, pos);
    add_group(&mut groups, GROUPS - 2, bits);
    add_group(&mut groups, GROUPS - 1, tail_bits);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(groups: &[u8; GROUPS]) -> usize {
        groups.iter().map(|&b| 1usize << b).sum()
    }

    #[test]
    fn initial_layout_covers_every_symbol_once() {
        let stats = SymbolStats::new();
        let mut seen = [false; SYMBOLS];
        for &s in &stats.order {
            assert!(!seen[s as usize], "symbol {s} listed twice");
            seen[s as usize] = true;
        }
        assert!(capacity(&stats.group_bits) >= SYMBOLS);
    }

    #[test]
    fn initial_codes() {
        let codes = SymbolStats::new().codes();
        assert_eq!(codes[256], (6, 0x00));
        assert_eq!(codes[260], (7, 0x08));
        assert_eq!(codes[0], (7, 0x14));
        assert_eq!(codes[255], (7, 0x17));
        assert_eq!(codes[1], (8, 0x30));
        assert_eq!(codes[b'a' as usize], (8, 0x8E));
        assert_eq!(codes[162], (8, 0xCF));
        assert_eq!(codes[163], (9, 0x1A0));
        assert_eq!(codes[RECALC_SYMBOL as usize], (9, 0x1FC));
        assert_eq!(codes[EOF_SYMBOL as usize], (9, 0x1FD));
    }

    #[test]
    fn ranking_orders_by_count_then_higher_symbol() {
        let mut stats = SymbolStats::new();
        for _ in 0..5 {
            stats.bump(10);
        }
        for _ in 0..3 {
            stats.bump(20);
            stats.bump(7);
        }
        let (ranked, total) = stats.rank_and_age();
        assert_eq!(total, 11);
        assert_eq!(&stats.order[..3], &[10, 20, 7]);
        assert_eq!(ranked[0], Ranked { symbol: 10, count: 5 });
        // Zero counts fall back to descending symbol order.
        assert_eq!(stats.order[3], EOF_SYMBOL);
        assert_eq!(stats.counts[10], 2);
        assert_eq!(stats.counts[7], 1);
    }

    #[test]
    fn chosen_groups_are_sorted_and_cover_the_alphabet() {
        let mut stats = SymbolStats::new();
        let mut state = 12345u32;
        for _ in 0..RECALC_INTERVAL {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            // Skewed: low byte values dominate.
            let symbol = ((state >> 16) % 64) as u16 * ((state >> 28) as u16 % 4 + 1) % 274;
            stats.bump(symbol);
        }
        let (ranked, total) = stats.rank_and_age();
        let groups = choose_groups(&ranked, total);
        assert!(groups.windows(2).all(|w| w[0] <= w[1]), "{groups:?}");
        assert!(groups.iter().all(|&b| b <= MAX_GROUP_BITS));
        assert!(capacity(&groups) >= SYMBOLS, "{groups:?}");
    }

    #[test]
    fn few_dominant_symbols_still_cover_the_alphabet() {
        let mut stats = SymbolStats::new();
        for s in 0..14u16 {
            for _ in 0..292 {
                stats.bump(s * 3);
            }
        }
        let (ranked, total) = stats.rank_and_age();
        let groups = choose_groups(&ranked, total);
        assert!(capacity(&groups) >= SYMBOLS, "{groups:?}");
        assert_eq!(groups[0], 0);
    }

    #[test]
    fn codes_follow_the_rebuilt_layout() {
        let mut stats = SymbolStats::new();
        for _ in 0..100 {
            stats.bump(b'e' as u16);
        }
        let (ranked, total) = stats.rank_and_age();
        stats.group_bits = choose_groups(&ranked, total);
        let codes = stats.codes();
        assert_eq!(stats.order[0], b'e' as u16);
        assert_eq!(codes[b'e' as usize], (4 + u32::from(stats.group_bits[0]), 0));
    }
}
