//! Code lengths from symbol counts, length limiting, and canonical patterns.

pub(super) const SYMBOLS: usize = 256;

/// Length recorded for symbols that never occur.
pub(super) const UNUSED: u32 = 99;

/// Widest code the bit-count table can describe.
pub(super) const MAX_TABLE_BITS: u32 = 16;

pub(super) type Lengths = [u32; SYMBOLS];

/// Build a Huffman tree over every symbol with a nonzero count and return
/// each symbol's depth.
///
/// Merging always takes the two smallest live weights found by a linear
/// scan from the end of the list, so equal weights resolve toward the
/// lower list slot. A lone symbol gets a 1-bit code.
pub(super) fn code_lengths(counts: &[u32; SYMBOLS]) -> Lengths {
    let mut bits = [UNUSED; SYMBOLS];

    // Slot 0 is a zero weight that stops the backward scan.
    let mut weight = vec![0u32];
    let mut node = vec![0usize];
    for (symbol, &count) in counts.iter().enumerate() {
        if count != 0 {
            weight.push(count);
            node.push(symbol);
        }
    }

    let mut children: Vec<(usize, usize)> = Vec::with_capacity(SYMBOLS);
    let mut live = weight.len();
    while live > 2 {
        let (smallest, other) = two_smallest(&weight[..live]);
        children.push((node[other], node[smallest]));
        weight[other] += weight[smallest];
        node[other] = SYMBOLS + children.len() - 1;
        live -= 1;
        weight[smallest] = weight[live];
        node[smallest] = node[live];
    }

    let (root, depth) = if children.is_empty() {
        (node[live - 1], 1)
    } else {
        (node[1], 0)
    };

    let mut stack = vec![(root, depth)];
    while let Some((n, depth)) = stack.pop() {
        if n < SYMBOLS {
            bits[n] = depth;
            continue;
        }
        let (left, right) = children[n - SYMBOLS];
        stack.push((right, depth + 1));
        stack.push((left, depth + 1));
    }
    bits
}

/// Indices of the smallest and second-smallest weights in `weight[1..]`,
/// as `(smallest, second)`.
fn two_smallest(weight: &[u32]) -> (usize, usize) {
    let mut i = weight.len() - 2;
    let mut second = i + 1;
    let mut smallest = i;
    if weight[second] < weight[smallest] {
        std::mem::swap(&mut second, &mut smallest);
    }

    while i != 0 {
        i -= 1;
        while weight[i] > weight[second] {
            i -= 1;
        }
        if i == 0 {
            break;
        }
        second = i;
        if weight[second] > weight[smallest] {
            continue;
        }
        second = smallest;
        smallest = i;
    }
    (smallest, second)
}

/// Clip every code to `max` bits.
///
/// Each step takes the two deepest used symbols (necessarily siblings),
/// lifts one of them a level and hangs the other beside the deepest code
/// still shorter than `max`. The Kraft sum is unchanged, so the result is
/// still a complete prefix code. Returns the number of steps taken.
pub(super) fn limit_lengths(bits: &mut Lengths, counts: &[u32; SYMBOLS], max: u32) -> usize {
    let mut steps = 0;
    loop {
        let mut deepest = 0;
        let (mut below, mut last) = (0, 0);
        for symbol in 0..SYMBOLS {
            if counts[symbol] == 0 || bits[symbol] < deepest {
                continue;
            }
            below = last;
            last = symbol;
            deepest = bits[symbol];
        }
        if deepest <= max {
            break;
        }

        let eligible = |s: usize| counts[s] != 0 && bits[s] < max;
        let Some(first) = (0..SYMBOLS).find(|&s| eligible(s)) else {
            break;
        };
        let mut host = first;
        for symbol in first..SYMBOLS {
            if eligible(symbol) && bits[symbol] > bits[host] {
                host = symbol;
            }
        }

        bits[host] += 1;
        bits[last] = bits[host];
        bits[below] -= 1;
        steps += 1;
    }
    steps
}

/// Canonical prefix code: symbols ordered by length, then by value, and
/// numbered consecutively within each length.
#[derive(Debug, Clone)]
pub(super) struct CodeTable {
    pub bits: Lengths,
    pub patterns: [u32; SYMBOLS],
    /// Number of codes of each length; index 0 is unused.
    pub per_length: [u32; MAX_TABLE_BITS as usize + 1],
    /// Symbols in code order.
    pub order: Vec<u8>,
    pub most_bits: u32,
}

impl CodeTable {
    pub fn new(bits: Lengths) -> Self {
        let mut per_length = [0u32; MAX_TABLE_BITS as usize + 1];
        for &b in &bits {
            if b <= MAX_TABLE_BITS {
                per_length[b as usize] += 1;
            }
        }

        let mut order = Vec::with_capacity(SYMBOLS);
        let mut most_bits = 0;
        for len in 1..=MAX_TABLE_BITS {
            if per_length[len as usize] == 0 {
                continue;
            }
            order.extend((0..SYMBOLS).filter(|&s| bits[s] == len).map(|s| s as u8));
            most_bits = len;
        }

        let mut patterns = [0u32; SYMBOLS];
        let (mut pattern, mut width) = (0u32, 0u32);
        for &symbol in &order {
            let len = bits[symbol as usize];
            while width < len {
                width += 1;
                pattern <<= 1;
            }
            patterns[symbol as usize] = pattern;
            pattern += 1;
        }

        Self {
            bits,
            patterns,
            per_length,
            order,
            most_bits,
        }
    }
}
