use eapack_core::BitWriter;

use super::tree::{code_lengths, limit_lengths, CodeTable, SYMBOLS};
use super::{MAX_CODE_BITS, MAX_RUN};

/// "No previous byte" marker; never equal to a byte value.
const NO_PREV: u32 = 256;

/// Run lengths below this have a known escape cost; longer ones are
/// priced flat at `LONG_RUN_COST`.
const RUN_TABLE: u32 = 252;
const LONG_RUN_COST: u32 = 20;

/// Size class `k` of `num` in `write_num`: the largest `k` with
/// `2^(k+2) - 4 <= num`.
fn num_class(num: u32) -> u32 {
    let mut k = 0;
    while u64::from(num) >= (1u64 << (k + 3)) - 4 {
        k += 1;
    }
    k
}

/// Variable-length integer: `k` zero bits, a one bit, then `num - base`
/// in `k + 2` bits, with `base = 2^(k+2) - 4`.
pub(super) fn write_num(w: &mut BitWriter, num: u32) {
    let k = num_class(num);
    let base = ((1u64 << (k + 2)) - 4) as u32;
    w.write(1, k + 1);
    w.write(num - base, k + 2);
}

/// Consume the rest of a run of `value` starting at `*pos`.
///
/// Returns how many further bytes were read before the first byte that
/// differs, the end of input, or the run cap. `src[*pos - 1]` is then the
/// byte that ended the scan and is coded on its own.
fn scan_run(src: &[u8], pos: &mut usize, value: u32) -> u32 {
    let limit = (*pos + MAX_RUN).min(src.len());
    let mut run = 0;
    let mut look = value;
    while *pos < limit && look == value {
        look = u32::from(src[*pos]);
        *pos += 1;
        run += 1;
    }
    run
}

/// Everything decided by the two statistics passes.
#[derive(Debug)]
pub(super) struct Plan {
    pub clue: u8,
    pub table: CodeTable,
}

impl Plan {
    fn bits(&self, symbol: u32) -> u32 {
        self.table.bits[symbol as usize]
    }
}

fn rep_cost(clue_bits: u32, run: u32) -> u32 {
    if run < RUN_TABLE {
        clue_bits + 3 + num_class(run) * 2
    } else {
        LONG_RUN_COST
    }
}

/// Escape byte: start of the last longest stretch of unused byte values,
/// or the rarest byte when every value occurs.
fn choose_clue(counts: &[u32; SYMBOLS]) -> u8 {
    let (mut best_start, mut best_len) = (0usize, 0usize);
    let mut i = 0;
    while i < SYMBOLS {
        let mut j = i;
        while j < SYMBOLS && counts[j] == 0 {
            j += 1;
        }
        if j - i >= best_len {
            best_start = i;
            best_len = j - i;
        }
        i = j + 1;
    }
    if best_len > 0 {
        return best_start as u8;
    }

    let mut rarest = 0;
    for (symbol, &count) in counts.iter().enumerate() {
        if count < counts[rarest] {
            rarest = symbol;
        }
    }
    rarest as u8
}

/// Two passes over `src`.
///
/// The first counts bytes outside runs and the runs that would cost the
/// flat long-run price, picks the clue, and builds a provisional tree.
/// The second recounts with each run priced against that tree as either
/// repeated literals or a single clue plus count, then builds the final
/// tree and clips it to `MAX_CODE_BITS`.
pub(super) fn analyse(src: &[u8]) -> Plan {
    let mut counts = [0u32; SYMBOLS];
    let mut flat_runs = 0u32;

    let mut prev = NO_PREV;
    let mut pos = 0;
    while pos < src.len() {
        let mut cur = u32::from(src[pos]);
        pos += 1;
        if cur == prev {
            let run = scan_run(src, &mut pos, prev);
            if run == 0 || run >= 255 {
                flat_runs += 1;
            }
            cur = u32::from(src[pos - 1]);
        }
        counts[cur as usize] += 1;
        prev = cur;
    }

    let clue = choose_clue(&counts);
    counts[clue as usize] = flat_runs.max(1);
    let provisional = code_lengths(&counts);
    let clue_bits = provisional[clue as usize];

    let mut second = [0u32; SYMBOLS];
    let mut prev = NO_PREV;
    let mut pos = 0;
    while pos < src.len() {
        let mut cur = u32::from(src[pos]);
        pos += 1;
        if cur == prev {
            let run = scan_run(src, &mut pos, prev);
            if run * provisional[prev as usize] <= rep_cost(clue_bits, run) {
                second[prev as usize] += run;
            } else {
                second[clue as usize] += 1;
            }
            cur = u32::from(src[pos - 1]);
        }
        second[cur as usize] += 1;
        prev = cur;
    }
    second[clue as usize] += 1;

    let mut bits = code_lengths(&second);
    let steps = limit_lengths(&mut bits, &second, MAX_CODE_BITS);
    if steps > 0 {
        log::trace!("huff: clipped code lengths in {steps} steps");
    }

    Plan {
        clue,
        table: CodeTable::new(bits),
    }
}

struct Packer<'p> {
    plan: &'p Plan,
    w: BitWriter,
}

impl Packer<'_> {
    fn clue(&mut self) {
        let clue = self.plan.clue as usize;
        let table = &self.plan.table;
        self.w.write(table.patterns[clue], table.bits[clue]);
    }

    fn symbol(&mut self, symbol: u32) {
        if symbol == u32::from(self.plan.clue) {
            // Escaped literal: clue, zero count, a clear end bit and the byte.
            self.clue();
            write_num(&mut self.w, 0);
            self.w.write(symbol, 9);
        } else {
            let table = &self.plan.table;
            self.w
                .write(table.patterns[symbol as usize], table.bits[symbol as usize]);
        }
    }

    /// Clue byte, count of codes per length, then the symbols in code order
    /// as skip counts over the values not yet placed, starting after 0xFF.
    fn tables(&mut self) {
        self.w.write(u32::from(self.plan.clue), 8);
        for len in 1..=self.plan.table.most_bits {
            write_num(&mut self.w, self.plan.table.per_length[len as usize]);
        }

        let mut placed = [false; SYMBOLS];
        let mut at = 0xFFusize;
        for &symbol in &self.plan.table.order {
            let mut skipped = 0u32;
            loop {
                at = (at + 1) & 0xFF;
                if at == symbol as usize {
                    break;
                }
                if !placed[at] {
                    skipped += 1;
                }
            }
            placed[at] = true;
            write_num(&mut self.w, skipped);
        }
    }

    fn body(&mut self, src: &[u8]) {
        let clue_bits = self.plan.bits(u32::from(self.plan.clue));
        let mut prev = NO_PREV;
        let mut pos = 0;
        while pos < src.len() {
            let mut cur = u32::from(src[pos]);
            pos += 1;
            if cur == prev {
                let run = scan_run(src, &mut pos, prev);
                if run * self.plan.bits(prev) <= rep_cost(clue_bits, run) {
                    for _ in 0..run {
                        self.symbol(prev);
                    }
                } else {
                    self.clue();
                    write_num(&mut self.w, run);
                }
                cur = u32::from(src[pos - 1]);
            }
            self.symbol(cur);
            prev = cur;
        }

        // Clue, zero count, set end bit, one pad bit.
        self.clue();
        write_num(&mut self.w, 0);
        self.w.write(0b10, 2);
    }
}

/// Pack `src` after the header `magic` + length field.
pub(super) fn pack(src: &[u8], magic: u16, wide: bool) -> (Vec<u8>, Plan) {
    let plan = analyse(src);
    let mut packer = Packer {
        plan: &plan,
        w: BitWriter::with_capacity(src.len() / 2 + 16),
    };
    packer.w.write(u32::from(magic), 16);
    packer.w.write(src.len() as u32, if wide { 32 } else { 24 });
    packer.tables();
    packer.body(src);
    let out = packer.w.finish();
    (out, plan)
}
