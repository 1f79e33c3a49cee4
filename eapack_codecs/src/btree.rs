use std::cmp::Reverse;

use eapack_core::bits::push_be;
use eapack_core::{Capabilities, Codec, CodecError, CodecInfo, Result, Signature};

use crate::cursor::ByteCursor;
use crate::header::{self, MAX_NARROW_SIZE};

const NAME: &str = "btr";

const MAGIC: u16 = 0x46FB;
/// Same layout with a 3-byte field to skip ahead of the length.
const MAGIC_SKIP: u16 = 0x47FB;

const PAIRS: usize = 1 << 16;
const MAX_NODES: usize = 255;

/// A valid tree is built bottom-up from at most 255 joins, so expansion
/// never needs more than one pending entry per level plus the root.
const MAX_EXPANSION_DEPTH: usize = MAX_NODES + 2;

const MAX_PREALLOC: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryTreeOptions {
    /// Pairs counted at least `best / ratio` times join in the same pass as
    /// the most frequent one.
    pub ratio: u32,
    /// Upper bound on rewrite passes.
    pub passes: u32,
    /// A pair must occur this often to be worth a 3-byte node entry.
    pub min_count: u32,
}

impl Default for BinaryTreeOptions {
    fn default() -> Self {
        Self {
            ratio: 2,
            passes: 256,
            min_count: 4,
        }
    }
}

/// BinaryTree: byte-pair dictionary coding.
///
/// Byte values absent from the input become dictionary nodes, each standing
/// for an adjacent pair of (possibly nested) symbols. A reserved clue byte
/// escapes literals and terminates the stream.
#[derive(Debug, Clone, Default)]
pub struct BinaryTreeCodec {
    pub options: BinaryTreeOptions,
}

impl BinaryTreeCodec {
    pub fn new(options: BinaryTreeOptions) -> Self {
        Self { options }
    }
}

fn header_len(magic: u16) -> usize {
    if magic == MAGIC_SKIP {
        8
    } else {
        5
    }
}

impl Codec for BinaryTreeCodec {
    fn about(&self) -> CodecInfo {
        CodecInfo {
            signature: Signature::from_ascii(b"BTRE"),
            capabilities: Capabilities::ENCODE | Capabilities::DECODE,
            version: (1, 2),
            short_name: NAME,
            long_name: "BTree",
        }
    }

    fn is_valid(&self, data: &[u8]) -> bool {
        matches!(header::magic(data), Some(MAGIC | MAGIC_SKIP))
    }

    fn extract_size(&self, data: &[u8]) -> Result<usize> {
        let magic = header::magic(data)
            .filter(|m| matches!(*m, MAGIC | MAGIC_SKIP))
            .ok_or(CodecError::InvalidFormat { codec: NAME })?;
        let end = header_len(magic);
        if data.len() < end {
            return Err(CodecError::truncated(NAME, end, data.len()));
        }
        let field = &data[end - 3..end];
        Ok(((field[0] as usize) << 16) | u16::from_be_bytes([field[1], field[2]]) as usize)
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() > MAX_NARROW_SIZE {
            return Err(CodecError::InputTooLarge {
                codec: NAME,
                len: data.len(),
                max: MAX_NARROW_SIZE,
            });
        }
        let tree = build_tree(data, &self.options);
        let out = tree.serialize(data.len());
        log::debug!(
            "btr: encoded {} bytes into {} (clue {:#04x}, {} nodes)",
            data.len(),
            out.len(),
            tree.clue,
            tree.nodes.len()
        );
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let size = self.extract_size(data)?;
        let magic = header::magic(data).unwrap_or(MAGIC);
        let out = decode_body(data, header_len(magic), size)?;
        log::debug!("btr: decoded {} bytes into {}", data.len(), out.len());
        Ok(out)
    }
}

// ── Encoder ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Join {
    node: u8,
    left: u8,
    right: u8,
}

#[derive(Debug)]
struct Tree {
    clue: u8,
    nodes: Vec<Join>,
    /// Rewritten stream. Any `clue` byte in here is an escaped literal.
    stream: Vec<u8>,
}

impl Tree {
    fn serialize(&self, raw_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.nodes.len() * 3 + self.stream.len() + 2);
        push_be(&mut out, MAGIC as u32, 2);
        push_be(&mut out, raw_len as u32, 3);
        out.push(self.clue);
        out.push(self.nodes.len() as u8);
        for join in &self.nodes {
            out.extend_from_slice(&[join.node, join.left, join.right]);
        }
        for &b in &self.stream {
            if b == self.clue {
                out.push(self.clue);
            }
            out.push(b);
        }
        out.extend_from_slice(&[self.clue, 0x00]);
        out
    }
}

/// Pick the escape byte: any value absent from the input if there is one,
/// else the rarest nonzero value (zero after a clue is the terminator).
fn choose_clue(counts: &[u32; 256]) -> u8 {
    if let Some(unused) = (0..=255u8).find(|&b| counts[b as usize] == 0) {
        return unused;
    }
    (1..=255u8)
        .min_by_key(|&b| (counts[b as usize], b))
        .unwrap_or(1)
}

fn pair_index(a: u8, b: u8) -> usize {
    ((a as usize) << 8) | b as usize
}

struct PairStats {
    counts: Vec<u32>,
    first_seen: Vec<u32>,
}

impl PairStats {
    fn new() -> Self {
        Self {
            counts: vec![0; PAIRS],
            first_seen: vec![u32::MAX; PAIRS],
        }
    }

    /// Count adjacent pairs that do not touch the clue. Runs of one byte are
    /// counted without overlap, matching what a rewrite can replace.
    fn tally(&mut self, stream: &[u8], clue: u8) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.first_seen.iter_mut().for_each(|f| *f = u32::MAX);
        let mut last_run_pair: Option<usize> = None;
        for (i, w) in stream.windows(2).enumerate() {
            let (a, b) = (w[0], w[1]);
            if a == clue || b == clue {
                continue;
            }
            if a == b {
                if i > 0 && last_run_pair == Some(i - 1) {
                    last_run_pair = None;
                    continue;
                }
                last_run_pair = Some(i);
            }
            let idx = pair_index(a, b);
            self.counts[idx] += 1;
            if self.first_seen[idx] == u32::MAX {
                self.first_seen[idx] = i as u32;
            }
        }
    }

    /// Pairs worth joining this pass, best first.
    fn candidates(&self, options: &BinaryTreeOptions) -> Vec<usize> {
        let best = self.counts.iter().copied().max().unwrap_or(0);
        let floor = options.min_count.max(1);
        if best < floor {
            return Vec::new();
        }
        let ratio = options.ratio.max(1) as u64;
        let mut picked: Vec<usize> = (0..PAIRS)
            .filter(|&p| {
                let c = self.counts[p];
                c >= floor && c as u64 * ratio >= best as u64
            })
            .collect();
        picked.sort_by_key(|&p| (Reverse(self.counts[p]), self.first_seen[p]));
        picked
    }
}

fn build_tree(data: &[u8], options: &BinaryTreeOptions) -> Tree {
    let mut counts = [0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let clue = choose_clue(&counts);
    let mut free: Vec<u8> = (0..=255u8)
        .filter(|&b| counts[b as usize] == 0 && b != clue)
        .rev()
        .collect();

    let mut stream = data.to_vec();
    let mut nodes: Vec<Join> = Vec::new();
    let mut stats = PairStats::new();
    let mut joins: Vec<Option<u8>> = vec![None; PAIRS];

    for pass in 0..options.passes {
        if free.is_empty() || nodes.len() >= MAX_NODES || stream.len() < 2 {
            break;
        }
        stats.tally(&stream, clue);

        let mut used = [false; 256];
        let mut selected = Vec::new();
        for pair in stats.candidates(options) {
            if nodes.len() + selected.len() >= MAX_NODES {
                break;
            }
            let (left, right) = ((pair >> 8) as u8, pair as u8);
            if used[left as usize] || used[right as usize] {
                continue;
            }
            let Some(node) = free.pop() else { break };
            used[left as usize] = true;
            used[right as usize] = true;
            joins[pair] = Some(node);
            selected.push(Join { node, left, right });
        }
        if selected.is_empty() {
            break;
        }

        stream = join_nodes(&stream, &joins);
        log::trace!(
            "btr: pass {} joined {} pairs, stream now {} bytes",
            pass,
            selected.len(),
            stream.len()
        );
        for join in &selected {
            joins[pair_index(join.left, join.right)] = None;
        }
        nodes.extend(selected);
    }

    Tree {
        clue,
        nodes,
        stream,
    }
}

/// One left-to-right rewrite replacing every selected pair with its node.
fn join_nodes(stream: &[u8], joins: &[Option<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stream.len());
    let mut i = 0;
    while i < stream.len() {
        if i + 1 < stream.len() {
            if let Some(node) = joins[pair_index(stream[i], stream[i + 1])] {
                out.push(node);
                i += 2;
                continue;
            }
        }
        out.push(stream[i]);
        i += 1;
    }
    out
}

// ── Decoder ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Leaf,
    Node,
    Clue,
}

struct Dictionary {
    kind: [Kind; 256],
    left: [u8; 256],
    right: [u8; 256],
}

impl Dictionary {
    /// Append the leaves under `node`, left subtree first.
    fn expand(&self, node: u8, out: &mut Vec<u8>, size: usize, at: usize) -> Result<()> {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match self.kind[current as usize] {
                Kind::Leaf => {
                    out.push(current);
                    if out.len() > size {
                        return Err(overrun(at, size));
                    }
                }
                Kind::Node => {
                    stack.push(self.right[current as usize]);
                    stack.push(self.left[current as usize]);
                    if stack.len() > MAX_EXPANSION_DEPTH {
                        return Err(CodecError::malformed(
                            NAME,
                            at,
                            format!("node {:#04x} expands without bottoming out", node),
                        ));
                    }
                }
                Kind::Clue => {
                    return Err(CodecError::malformed(
                        NAME,
                        at,
                        format!("node {:#04x} reaches the clue byte", node),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn overrun(at: usize, size: usize) -> CodecError {
    CodecError::malformed(
        NAME,
        at,
        format!("output overruns the declared size of {} bytes", size),
    )
}

fn decode_body(data: &[u8], start: usize, size: usize) -> Result<Vec<u8>> {
    let mut input = ByteCursor::new(NAME, data, start);

    let clue = input.byte()?;
    let mut dict = Dictionary {
        kind: [Kind::Leaf; 256],
        left: [0; 256],
        right: [0; 256],
    };
    dict.kind[clue as usize] = Kind::Clue;

    let node_count = input.byte()?;
    for _ in 0..node_count {
        let entry = input.take(3)?;
        let node = entry[0] as usize;
        dict.left[node] = entry[1];
        dict.right[node] = entry[2];
        dict.kind[node] = Kind::Node;
    }

    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
    loop {
        let at = input.pos();
        let b = input.byte()?;
        match dict.kind[b as usize] {
            Kind::Leaf => out.push(b),
            Kind::Node => dict.expand(b, &mut out, size, at)?,
            Kind::Clue => match input.byte()? {
                0 => break,
                literal => out.push(literal),
            },
        }
        if out.len() > size {
            return Err(overrun(at, size));
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
