/// Integration tests: every engine through the public `Codec` surface, the
/// name registry, and the tagged container.
///
/// The same helpers drive all four engines:
///  1. Round trip over random, compressible and edge-case inputs
///  2. `is_valid` / `extract_size` against what `encode` wrote
///  3. Hand-built and truncated streams map onto the error taxonomy
use eapack_codecs::container::{self, CompressionKind};
use eapack_codecs::{
    codec_by_name, detect_codec, BinaryTreeCodec, HuffmanCodec, HuffmanOptions, LightZhlCodec,
    RefPackCodec, CODEC_NAMES,
};
use eapack_core::{Capabilities, Codec, CodecError};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

fn all_codecs() -> Vec<Box<dyn Codec>> {
    vec![
        Box::new(RefPackCodec::default()),
        Box::new(BinaryTreeCodec::default()),
        Box::new(HuffmanCodec::default()),
        Box::new(LightZhlCodec::default()),
    ]
}

/// Codecs whose streams start with a magic and a declared size.
fn sized_codecs() -> Vec<Box<dyn Codec>> {
    vec![
        Box::new(RefPackCodec::default()),
        Box::new(BinaryTreeCodec::default()),
        Box::new(HuffmanCodec::default()),
    ]
}

fn assert_round_trip(codec: &dyn Codec, data: &[u8]) -> Vec<u8> {
    let packed = codec
        .encode(data)
        .unwrap_or_else(|e| panic!("{} encode of {} bytes: {e}", codec.name(), data.len()));
    let unpacked = codec
        .decode(&packed)
        .unwrap_or_else(|e| panic!("{} decode of {} bytes: {e}", codec.name(), data.len()));
    assert_eq!(unpacked, data, "{} round trip of {} bytes", codec.name(), data.len());
    packed
}

/// Bytes 0..=255 once each, then a long run: every value is live and the
/// run exercises each engine's repeat path.
fn edge_bytes() -> Vec<u8> {
    let mut data: Vec<u8> = (0..=255u8).collect();
    data.extend(std::iter::repeat(0xAB).take(5000));
    data.extend((0..=255u8).rev());
    data
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_every_codec() {
    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0x00],
        vec![0xFF; 3],
        b"ab".to_vec(),
        compressible_bytes(10_000),
        pseudo_random_bytes(10_000, 7),
        edge_bytes(),
    ];
    for codec in all_codecs() {
        for data in &inputs {
            assert_round_trip(codec.as_ref(), data);
        }
    }
}

#[test]
fn test_compressible_data_shrinks() {
    let data = compressible_bytes(64 * 1024);
    for codec in all_codecs() {
        let packed = assert_round_trip(codec.as_ref(), &data);
        assert!(
            packed.len() < data.len() * 3 / 5,
            "{} left {} of {} bytes",
            codec.name(),
            packed.len(),
            data.len()
        );
    }
}

#[test]
fn test_random_data_across_windows() {
    // Longer than the LightZhl and RefPack windows, with a repeat of the
    // head placed far enough back to fall outside both.
    let head = pseudo_random_bytes(2000, 1);
    let mut data = head.clone();
    data.extend(pseudo_random_bytes(140_000, 2));
    data.extend_from_slice(&head);
    data.extend(compressible_bytes(3000));
    for codec in all_codecs() {
        assert_round_trip(codec.as_ref(), &data);
    }
}

#[test]
fn test_validity_gate_and_size_extraction() {
    let data = compressible_bytes(4321);
    for codec in sized_codecs() {
        let packed = codec.encode(&data).unwrap();
        assert!(codec.is_valid(&packed), "{}", codec.name());
        // Validation reads only the header and can be repeated.
        assert!(codec.is_valid(&packed));
        assert_eq!(codec.extract_size(&packed).unwrap(), data.len(), "{}", codec.name());

        assert!(!codec.is_valid(&[]));
        assert!(!codec.is_valid(&packed[..1]));
        assert!(!codec.is_valid(b"PK\x03\x04"));
    }
}

#[test]
fn test_foreign_streams_are_rejected() {
    let data = compressible_bytes(500);
    for producer in sized_codecs() {
        let packed = producer.encode(&data).unwrap();
        for consumer in sized_codecs() {
            if consumer.name() == producer.name() {
                continue;
            }
            assert!(!consumer.is_valid(&packed));
            let err = consumer.decode(&packed).unwrap_err();
            assert!(
                matches!(err, CodecError::InvalidFormat { codec } if codec == consumer.name()),
                "{} reading {}: {err}",
                consumer.name(),
                producer.name()
            );
            assert!(consumer.extract_size(&packed).is_err());
        }
    }
}

#[test]
fn test_truncated_streams_fail_cleanly() {
    let data = compressible_bytes(700);
    for codec in all_codecs() {
        let packed = codec.encode(&data).unwrap();
        for cut in 0..packed.len() {
            assert!(
                codec.decode(&packed[..cut]).is_err(),
                "{} accepted a stream cut to {cut} of {} bytes",
                codec.name(),
                packed.len()
            );
        }
    }
}

#[test]
fn test_corrupted_bodies_never_panic() {
    let data = compressible_bytes(2000);
    for codec in all_codecs() {
        let packed = codec.encode(&data).unwrap();
        // Leave the headers alone so declared sizes stay small.
        for at in (8..packed.len()).step_by(3) {
            let mut bad = packed.clone();
            bad[at] ^= 0x5A;
            if let Ok(out) = codec.decode(&bad) {
                if codec.name() != "lzhl" {
                    assert_eq!(out.len(), data.len(), "{} ignored its declared size", codec.name());
                }
            }
        }
    }
}

#[test]
fn test_descriptors() {
    let expected = [
        ("ref", "Refpack", *b"REF ", (1, 1), true),
        ("btr", "BTree", *b"BTRE", (1, 2), false),
        ("huff", "Huffman", *b"HUFF", (1, 4), false),
        ("lzhl", "LightZhl", *b"LZHL", (1, 0), false),
    ];
    for (codec, (short, long, sig, version, wide)) in all_codecs().iter().zip(expected) {
        let info = codec.about();
        assert_eq!(info.short_name, short);
        assert_eq!(info.long_name, long);
        assert_eq!(info.signature.to_bytes(), sig);
        assert_eq!(info.version, version);
        assert!(info.capabilities.contains(Capabilities::ENCODE | Capabilities::DECODE));
        assert_eq!(info.capabilities.contains(Capabilities::WIDE_SIZE), wide, "{short}");
    }
}

#[test]
fn test_registry_and_detection() {
    for name in CODEC_NAMES {
        let codec = codec_by_name(name).unwrap();
        assert_eq!(codec.name(), name);
        let packed = codec.encode(b"registry registry registry").unwrap();
        match name {
            "lzhl" => assert!(detect_codec(&packed).is_none()),
            _ => assert_eq!(detect_codec(&packed).unwrap().name(), name),
        }
    }
    assert!(matches!(
        codec_by_name("lz4"),
        Err(CodecError::Unsupported { codec: "registry", .. })
    ));
}

#[test]
fn test_lightzhl_has_no_header() {
    let codec = LightZhlCodec::default();
    let packed = codec.encode(&compressible_bytes(1000)).unwrap();
    assert!(!codec.is_valid(&packed));
    assert!(matches!(
        codec.extract_size(&packed),
        Err(CodecError::Unsupported { codec: "lzhl", operation: "extract_size" })
    ));
}

#[test]
fn test_huffman_delta_variants() {
    let ramp: Vec<u8> = (0..3000u32).map(|i| (i * 3 / 2) as u8).collect();
    for (runs, magic) in [(0u8, 0x30u8), (1, 0x32), (2, 0x34)] {
        let codec = HuffmanCodec::new(HuffmanOptions { delta_runs: runs });
        let packed = assert_round_trip(&codec, &ramp);
        assert_eq!(&packed[..2], &[magic, 0xFB]);
        // Any Huffman instance reads any variant.
        assert_eq!(HuffmanCodec::default().decode(&packed).unwrap(), ramp);
    }
}

#[test]
fn test_container_wraps_every_kind() {
    let data = compressible_bytes(20_000);
    let kinds = [
        CompressionKind::RefPack,
        CompressionKind::BinaryTree,
        CompressionKind::Huffman,
        CompressionKind::NoxLzh,
        CompressionKind::ZLib(1),
        CompressionKind::ZLib(5),
        CompressionKind::ZLib(9),
    ];
    for kind in kinds {
        let packed = container::compress(kind, &data).unwrap();
        assert_eq!(container::detect(&packed), kind);
        assert!(container::is_compressed(&packed));
        assert_eq!(container::declared_size(&packed), Some(data.len()));
        assert!(packed.len() < data.len() * 3 / 5, "{kind}: {} bytes", packed.len());
        assert_eq!(container::decompress(&packed).unwrap(), data, "{kind}");
    }
}

#[test]
fn test_container_payload_is_the_native_stream() {
    let data = compressible_bytes(3000);
    let packed = container::compress(CompressionKind::BinaryTree, &data).unwrap();
    let native = BinaryTreeCodec::default().encode(&data).unwrap();
    assert_eq!(&packed[..4], b"EAB\0");
    assert_eq!(&packed[4..8], &(data.len() as u32).to_be_bytes());
    assert_eq!(&packed[8..], &native[..]);
}

#[test]
fn test_container_passes_unknown_data_through() {
    let data = pseudo_random_bytes(100, 3);
    assert!(!container::is_compressed(&data[..7]));
    assert_eq!(container::decompress(b"EAR\0").unwrap(), b"EAR\0");
    assert_eq!(container::compress(CompressionKind::None, &data).unwrap(), data);
    // A native RefPack stream is not a container.
    let native = RefPackCodec::default().encode(&data).unwrap();
    assert_eq!(container::detect(&native), CompressionKind::None);
    assert_eq!(container::decompress(&native).unwrap(), native);
}
