//! Match finder: one-entry hash table over 5-byte windows, with lazy,
//! backward and overlap extension of the candidates it finds.

use super::encoder::SymbolEncoder;
use super::window::{Window, WINDOW_SIZE};
use super::{LightZhlOptions, MAX_MATCH, MAX_RAW, MIN_MATCH};

/// Bytes covered by one hash.
const HASH_WINDOW: usize = 5;
const TABLE_BITS: u32 = 15;
const TABLE_SIZE: usize = 1 << TABLE_BITS;
const TABLE_MASK: u32 = TABLE_SIZE as u32 - 1;
const HASH_SHIFT: u32 = 5;

/// Matches longer than this skip hashing their interior positions.
const SKIP_HASH: usize = 1024;

const EMPTY: u16 = u16::MAX;

/// Rolling hash over `HASH_WINDOW` bytes.
#[derive(Debug, Clone, Copy)]
struct Hasher {
    slow: bool,
}

impl Hasher {
    #[inline]
    fn update(self, hash: u32, byte: u8) -> u32 {
        if self.slow {
            (hash ^ u32::from(byte)).rotate_left(HASH_SHIFT)
        } else {
            (hash << HASH_SHIFT) ^ u32::from(byte)
        }
    }

    fn calc(self, window: &[u8]) -> u32 {
        window[..HASH_WINDOW]
            .iter()
            .fold(0, |hash, &b| self.update(hash, b))
    }

    /// Slide the hash of `src[at..at + 5]` one byte to the right.
    #[inline]
    fn roll(self, hash: u32, src: &[u8], at: usize) -> u32 {
        let outgoing = u32::from(src[at]);
        let hash = if self.slow {
            hash ^ outgoing.rotate_left(HASH_SHIFT * HASH_WINDOW as u32)
        } else {
            hash ^ (outgoing << (HASH_SHIFT * (HASH_WINDOW as u32 - 1)))
        };
        self.update(hash, src[at + HASH_WINDOW])
    }

    #[inline]
    fn slot(self, hash: u32) -> usize {
        if self.slow {
            (hash.wrapping_mul(214_013).wrapping_add(2_531_011) >> (32 - TABLE_BITS)) as usize
        } else {
            ((hash ^ (hash >> TABLE_BITS)) & TABLE_MASK) as usize
        }
    }
}

/// A match waiting one position to see whether the next byte starts a
/// longer one.
#[derive(Debug, Clone, Copy)]
struct Pending {
    literals: usize,
    len: usize,
    disp: usize,
    cursor: u64,
}

pub(super) struct Compressor<'a> {
    src: &'a [u8],
    options: LightZhlOptions,
    hasher: Hasher,
    table: Vec<u16>,
    window: Window,
    out: SymbolEncoder,
    matches: usize,
}

impl<'a> Compressor<'a> {
    pub fn new(src: &'a [u8], options: LightZhlOptions) -> Self {
        Self {
            src,
            options,
            hasher: Hasher { slow: options.slow_hash },
            table: vec![EMPTY; TABLE_SIZE],
            window: Window::new(),
            out: SymbolEncoder::new(src.len() / 2 + 16),
            matches: 0,
        }
    }

    /// Hash the interior of a match so later positions can find it.
    fn index_match(&mut self, start: usize, cursor: u64, len: usize) {
        if len > SKIP_HASH {
            return;
        }
        let end = (start + len).min(self.src.len().saturating_sub(HASH_WINDOW - 1));
        if start >= end {
            return;
        }
        let mut hash = self.hasher.calc(&self.src[start..]);
        for (i, at) in (start..end).enumerate() {
            if i > 0 {
                hash = self.hasher.roll(hash, self.src, at - 1);
            }
            let slot = self.hasher.slot(hash);
            self.table[slot] = Window::wrap(cursor + i as u64) as u16;
        }
    }

    /// Emit `literals` bytes from `at` followed by a match, and return the
    /// position after it.
    fn emit(&mut self, at: usize, literals: usize, len: usize, disp: usize, cursor: u64) -> usize {
        let start = at + literals;
        self.out.literals(&self.src[at..start]);
        self.out.put_match((len - MIN_MATCH) as u32, disp);
        self.window.seek(cursor);
        self.index_match(start + 1, cursor + 1, len - 1);
        self.window.extend(&self.src[start..start + len]);
        self.matches += 1;
        start + len
    }

    /// Compress one run of literals and the match that ends it, starting at
    /// `at`. Returns where the next run starts.
    fn step(&mut self, at: usize) -> usize {
        let src = self.src;
        let left = src.len() - at;
        let max_raw = (left - HASH_WINDOW).min(MAX_RAW);
        let opts = self.options;

        let mut literals = 0usize;
        let mut pending: Option<Pending> = None;
        let mut hash = self.hasher.calc(&src[at..]);
        loop {
            let mut cur = at + literals;
            let slot = self.hasher.slot(hash);
            let candidate = self.table[slot];
            let mut here = self.window.here();
            self.table[slot] = here as u16;

            let (mut len, mut disp, mut forced) = (0usize, 0usize, false);
            if candidate != EMPTY && usize::from(candidate) != here {
                let mut from = usize::from(candidate);
                let dist = Window::distance(here, from);
                let limit = dist.min(left - literals).min(MAX_MATCH);
                len = self.window.matching(from, &src[cur..], limit);

                // The source reaches the cursor: keep going through the
                // bytes this match is itself producing.
                if opts.overlap && Window::wrap((from + len) as u64) == here {
                    let extra_limit = (MAX_MATCH - len).min(left - literals - len);
                    let extra = (0..extra_limit)
                        .take_while(|&x| src[cur + x] == src[cur + len + x])
                        .count();
                    len += extra;
                }

                if opts.backward_match && len + 1 >= MIN_MATCH {
                    let extra_limit = (MAX_MATCH - len)
                        .min(literals)
                        .min(dist.saturating_sub(len))
                        .min(WINDOW_SIZE - dist);
                    let extra = (0..extra_limit)
                        .take_while(|&x| self.window.get(from.wrapping_sub(x + 1)) == src[cur - x - 1])
                        .count();
                    if extra > 0 {
                        literals -= extra;
                        cur -= extra;
                        len += extra;
                        from = from.wrapping_sub(extra);
                        self.window.seek(self.window.cursor() - extra as u64);
                        here = self.window.here();
                        hash = self.hasher.calc(&src[cur..]);
                        forced = true;
                    }
                }
                disp = Window::distance(here, from);
            }

            if let Some(p) = pending {
                let cursor = self.window.cursor();
                return if len > p.len {
                    self.emit(at, literals, len, disp, cursor)
                } else {
                    self.emit(at, p.literals, p.len, p.disp, p.cursor)
                };
            }

            if len >= MIN_MATCH {
                let cursor = self.window.cursor();
                if opts.lazy_match && !forced {
                    pending = Some(Pending {
                        literals,
                        len,
                        disp,
                        cursor,
                    });
                } else {
                    return self.emit(at, literals, len, disp, cursor);
                }
            }

            if literals + 1 > max_raw {
                if let Some(p) = pending {
                    return self.emit(at, p.literals, p.len, p.disp, p.cursor);
                }
                // A short tail rides along with this literal run.
                if literals + HASH_WINDOW >= left && left <= MAX_RAW {
                    self.window.extend(&src[cur..]);
                    literals = left;
                }
                self.out.literals(&src[at..at + literals]);
                return at + literals;
            }

            hash = self.hasher.roll(hash, src, cur);
            self.window.push(src[cur]);
            literals += 1;
        }
    }

    /// Returns the stream, the number of matches and of table rebuilds.
    pub fn run(mut self) -> (Vec<u8>, usize, usize) {
        let mut at = 0;
        loop {
            let left = self.src.len() - at;
            if left < HASH_WINDOW {
                let tail = &self.src[at..];
                self.window.extend(tail);
                self.out.literals(tail);
                break;
            }
            at = self.step(at);
        }
        let matches = self.matches;
        let (out, recalcs) = self.out.finish();
        (out, matches, recalcs)
    }
}
