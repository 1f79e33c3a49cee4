use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;
use xxhash_rust::xxh3::xxh3_64;

use eapack_codecs::container::{self, CompressionKind};
use eapack_codecs::{
    codec_by_name, detect_codec, header, BinaryTreeCodec, BinaryTreeOptions, HuffmanCodec,
    HuffmanOptions, LightZhlCodec, LightZhlOptions, RefPackCodec, RefPackOptions, CODEC_NAMES,
};
use eapack_core::Codec;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "eapack",
    about = "Pack, unpack, inspect and benchmark RefPack, BinaryTree, Huffman and LightZhl asset streams",
    version
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file, wrapped in the 8-byte tagged container by default
    Compress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Codec: ref | btr | huff | lzhl | zl1..zl9
        #[arg(short, long, default_value = "ref")]
        codec: String,
        /// Write the bare codec stream without the container header
        #[arg(long)]
        raw: bool,
        #[command(flatten)]
        options: CodecFlags,
    },
    /// Decompress a container or a bare stream identified by its magic
    Decompress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Codec for bare streams without a magic (LightZhl)
        #[arg(short, long)]
        codec: Option<String>,
    },
    /// Print the detected format, header fields and codec descriptor
    Inspect {
        /// File to inspect
        file: PathBuf,
    },
    /// Encode and decode a file with every codec and compare against
    /// zstd and lz4
    Bench {
        /// Input file
        file: PathBuf,
        /// Round trips per codec
        #[arg(short, long, default_value_t = 3)]
        iterations: u32,
        /// zstd level for the baseline
        #[arg(long, default_value_t = 3)]
        zstd_level: i32,
    },
}

/// Per-codec tuning. Flags for codecs other than the selected one are
/// ignored.
#[derive(Args, Clone, Copy, Default)]
struct CodecFlags {
    /// RefPack: hash only the first position of each match
    #[arg(long)]
    quick: bool,
    /// BinaryTree: pairs within best/ratio join in the same pass
    #[arg(long)]
    ratio: Option<u32>,
    /// BinaryTree: upper bound on rewrite passes
    #[arg(long)]
    passes: Option<u32>,
    /// BinaryTree: minimum pair count worth a node
    #[arg(long)]
    min_count: Option<u32>,
    /// Huffman: delta passes before coding (0-2)
    #[arg(long, default_value_t = 0)]
    delta_runs: u8,
    /// LightZhl: shift-xor hash instead of rotate-multiply
    #[arg(long)]
    fast_hash: bool,
    /// LightZhl: emit matches as soon as they are found
    #[arg(long)]
    no_lazy: bool,
    /// LightZhl: stop matches at the write cursor
    #[arg(long)]
    no_overlap: bool,
    /// LightZhl: do not extend matches backward over pending literals
    #[arg(long)]
    no_backward: bool,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// What `--codec` selected: one of the native engines or a zlib level.
enum Target {
    Native(Box<dyn Codec>, CompressionKind),
    ZLib(u8),
}

fn target_from_name(name: &str, flags: CodecFlags) -> anyhow::Result<Target> {
    let defaults = BinaryTreeOptions::default();
    let target = match name {
        "ref" => Target::Native(
            Box::new(RefPackCodec::new(RefPackOptions { quick: flags.quick })),
            CompressionKind::RefPack,
        ),
        "btr" => Target::Native(
            Box::new(BinaryTreeCodec::new(BinaryTreeOptions {
                ratio: flags.ratio.unwrap_or(defaults.ratio),
                passes: flags.passes.unwrap_or(defaults.passes),
                min_count: flags.min_count.unwrap_or(defaults.min_count),
            })),
            CompressionKind::BinaryTree,
        ),
        "huff" => Target::Native(
            Box::new(HuffmanCodec::new(HuffmanOptions {
                delta_runs: flags.delta_runs,
            })),
            CompressionKind::Huffman,
        ),
        "lzhl" => Target::Native(
            Box::new(LightZhlCodec::new(LightZhlOptions {
                slow_hash: !flags.fast_hash,
                lazy_match: !flags.no_lazy,
                overlap: !flags.no_overlap,
                backward_match: !flags.no_backward,
            })),
            CompressionKind::NoxLzh,
        ),
        _ => match name.strip_prefix("zl").and_then(|l| l.parse::<u8>().ok()) {
            Some(level @ 1..=9) => Target::ZLib(level),
            _ => anyhow::bail!(
                "unknown codec '{}'. Valid options: {}, zl1..zl9",
                name,
                CODEC_NAMES.join(", ")
            ),
        },
    };
    Ok(target)
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.to_str() == Some("-") {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    let mut buf = Vec::new();
    File::open(path)
        .with_context(|| format!("opening input file {:?}", path))?
        .read_to_end(&mut buf)
        .with_context(|| format!("reading {:?}", path))?;
    Ok(buf)
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if path.to_str() == Some("-") {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()?;
        return Ok(());
    }
    std::fs::write(path, bytes).with_context(|| format!("writing output file {:?}", path))
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn throughput(bytes: usize, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64().max(1e-9);
    format!("{}/s", human_bytes((bytes as f64 / secs) as u64))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    codec_name: &str,
    raw: bool,
    flags: CodecFlags,
) -> anyhow::Result<()> {
    let target = target_from_name(codec_name, flags)?;
    let data = read_input(&input)?;

    let t0 = Instant::now();
    let packed = match target {
        Target::Native(codec, kind) => {
            let stream = codec
                .encode(&data)
                .with_context(|| format!("{} encoding {:?}", codec.name(), input))?;
            if raw {
                stream
            } else {
                container::wrap(kind, data.len(), &stream)?
            }
        }
        Target::ZLib(_) if raw => {
            anyhow::bail!("--raw needs a native codec; zlib output is always container-wrapped")
        }
        Target::ZLib(level) => container::compress(CompressionKind::ZLib(level), &data)?,
    };
    let elapsed = t0.elapsed();
    write_output(&output, &packed)?;

    log::info!("compressed {:?} with {} in {:?}", input, codec_name, elapsed);
    eprintln!("  codec       : {}{}", codec_name, if raw { " (raw)" } else { "" });
    eprintln!("  raw size    : {}", human_bytes(data.len() as u64));
    eprintln!("  compressed  : {}", human_bytes(packed.len() as u64));
    eprintln!(
        "  ratio       : {:.2}x",
        data.len() as f64 / packed.len().max(1) as f64
    );
    eprintln!("  throughput  : {}", throughput(data.len(), elapsed));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(input: PathBuf, output: PathBuf, codec_name: Option<&str>) -> anyhow::Result<()> {
    let data = read_input(&input)?;

    let t0 = Instant::now();
    let kind = container::detect(&data);
    let raw = if kind != CompressionKind::None {
        log::info!("{:?}: container tag {}", input, kind);
        container::decompress(&data).with_context(|| format!("unwrapping {:?}", input))?
    } else {
        let codec = match (detect_codec(&data), codec_name) {
            (Some(codec), _) => codec,
            (None, Some(name)) => codec_by_name(name)?,
            (None, None) => anyhow::bail!(
                "{:?} has no container tag or known magic; pass --codec for bare LightZhl streams",
                input
            ),
        };
        log::info!("{:?}: bare {} stream", input, codec.name());
        codec
            .decode(&data)
            .with_context(|| format!("{} decoding {:?}", codec.name(), input))?
    };
    let elapsed = t0.elapsed();
    write_output(&output, &raw)?;

    eprintln!("  raw size    : {}", human_bytes(raw.len() as u64));
    eprintln!("  throughput  : {}", throughput(raw.len(), elapsed));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn print_stream(stream: &[u8]) {
    let Some(magic) = header::magic(stream) else {
        println!("  magic          : (stream shorter than 2 bytes)");
        return;
    };
    println!("  magic          : 0x{:04X}", magic);
    match detect_codec(stream) {
        Some(codec) => {
            let info = codec.about();
            println!(
                "  codec          : {} ({}), signature \"{}\" v{}.{}",
                info.short_name, info.long_name, info.signature, info.version.0, info.version.1
            );
            println!("  capabilities   : {:?}", info.capabilities);
            match codec.extract_size(stream) {
                Ok(size) => println!("  declared size  : {}", human_bytes(size as u64)),
                Err(e) => println!("  declared size  : unreadable ({})", e),
            }
        }
        None => println!("  codec          : unrecognized (LightZhl streams carry no magic)"),
    }
}

fn run_inspect(file: PathBuf) -> anyhow::Result<()> {
    let data = read_input(&file)?;

    println!("=== {:?} ({}) ===", file, human_bytes(data.len() as u64));
    println!();
    let kind = container::detect(&data);
    println!("  container      : {}", kind);
    if let Some(size) = container::declared_size(&data) {
        println!("  original size  : {}", human_bytes(size as u64));
        match kind {
            CompressionKind::ZLib(level) => println!("  zlib level     : {}", level),
            CompressionKind::NoxLzh => println!("  payload        : LightZhl (no header)"),
            _ => print_stream(&data[container::HEADER_SIZE..]),
        }
    } else {
        print_stream(&data);
    }
    Ok(())
}

struct BenchRow {
    name: String,
    size: usize,
    encode: Duration,
    decode: Duration,
    verified: bool,
}

fn bench_one(
    name: &str,
    data: &[u8],
    iterations: u32,
    encode: impl Fn(&[u8]) -> anyhow::Result<Vec<u8>>,
    decode: impl Fn(&[u8]) -> anyhow::Result<Vec<u8>>,
) -> anyhow::Result<BenchRow> {
    let expected = xxh3_64(data);
    let (mut enc_total, mut dec_total) = (Duration::ZERO, Duration::ZERO);
    let mut size = 0;
    let mut verified = true;
    for _ in 0..iterations {
        let t = Instant::now();
        let packed = encode(data).with_context(|| format!("{} encode", name))?;
        enc_total += t.elapsed();

        let t = Instant::now();
        let unpacked = decode(&packed).with_context(|| format!("{} decode", name))?;
        dec_total += t.elapsed();

        size = packed.len();
        verified &= xxh3_64(&unpacked) == expected;
    }
    Ok(BenchRow {
        name: name.to_string(),
        size,
        encode: enc_total / iterations,
        decode: dec_total / iterations,
        verified,
    })
}

fn run_bench(file: PathBuf, iterations: u32, zstd_level: i32) -> anyhow::Result<()> {
    let data = read_input(&file)?;
    let iterations = iterations.max(1);
    eprintln!(
        "benchmarking {} ({}) with {} round trips per codec...",
        file.display(),
        human_bytes(data.len() as u64),
        iterations
    );

    let mut rows = Vec::new();
    for name in CODEC_NAMES {
        let codec = codec_by_name(name)?;
        rows.push(bench_one(
            name,
            &data,
            iterations,
            |d| Ok(codec.encode(d)?),
            |d| Ok(codec.decode(d)?),
        )?);
    }
    rows.push(bench_one(
        "zstd",
        &data,
        iterations,
        |d| Ok(zstd::bulk::compress(d, zstd_level)?),
        |d| Ok(zstd::decode_all(d)?),
    )?);
    rows.push(bench_one(
        "lz4",
        &data,
        iterations,
        |d| Ok(lz4_flex::compress_prepend_size(d)),
        |d| {
            lz4_flex::decompress_size_prepended(d)
                .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))
        },
    )?);

    println!();
    println!(
        "  {:<6}  {:>12}  {:>8}  {:>14}  {:>14}  {:>6}",
        "codec", "size", "ratio", "encode", "decode", "xxh3"
    );
    println!("  {}", "-".repeat(70));
    for row in &rows {
        println!(
            "  {:<6}  {:>12}  {:>7.2}x  {:>14}  {:>14}  {:>6}",
            row.name,
            human_bytes(row.size as u64),
            data.len() as f64 / row.size.max(1) as f64,
            throughput(data.len(), row.encode),
            throughput(data.len(), row.decode),
            if row.verified { "ok" } else { "FAIL" }
        );
    }

    if let Some(bad) = rows.iter().find(|r| !r.verified) {
        anyhow::bail!("{} round trip does not reproduce the input", bad.name);
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Compress {
            input,
            output,
            codec,
            raw,
            options,
        } => run_compress(input, output, &codec, raw, options),
        Commands::Decompress {
            input,
            output,
            codec,
        } => run_decompress(input, output, codec.as_deref()),
        Commands::Inspect { file } => run_inspect(file),
        Commands::Bench {
            file,
            iterations,
            zstd_level,
        } => run_bench(file, iterations, zstd_level),
    }
}
