mod common;

use common::{
    DICTIONARY, EXPECTED_TARGET, interleaved_delta_with_checksum, interleaved_window_body,
    standard_delta_with_checksum, standard_window_body,
};
use oxipatch::vcdiff::{DecoderOptions, StreamingDecoder, VcdiffDecoder};

#[derive(Debug)]
struct Vector {
    name: String,
    dictionary: Vec<u8>,
    delta: Vec<u8>,
    target: Vec<u8>,
}

fn hex_to_bytes(s: &str) -> Vec<u8> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }
    assert!(
        s.len().is_multiple_of(2),
        "hex string must have even length"
    );
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn load_vectors() -> Vec<Vector> {
    let manifest = include_str!("vectors/manifest.tsv");
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let parts: Vec<_> = line.split('|').collect();
            assert_eq!(parts.len(), 4, "invalid vector row: {line}");
            Vector {
                name: parts[0].to_string(),
                dictionary: hex_to_bytes(parts[1]),
                delta: hex_to_bytes(parts[2]),
                target: hex_to_bytes(parts[3]),
            }
        })
        .collect()
}

fn small_limits() -> DecoderOptions {
    DecoderOptions {
        max_target_file_size: 1 << 20,
        max_target_window_size: 1 << 20,
        ..Default::default()
    }
}

#[test]
fn vector_database_is_non_empty() {
    let vectors = load_vectors();
    assert!(!vectors.is_empty());
}

#[test]
fn decode_all_vectors() {
    for v in load_vectors() {
        let decoded = oxipatch::vcdiff::decode(&v.dictionary, &v.delta)
            .unwrap_or_else(|e| panic!("vector {}: {e}", v.name));
        assert_eq!(decoded, v.target, "vector {}", v.name);
    }
}

#[test]
fn decode_all_vectors_byte_by_byte() {
    for v in load_vectors() {
        let mut decoder = StreamingDecoder::new();
        let mut out = Vec::new();
        decoder.start_decoding(&v.dictionary).unwrap();
        for b in v.delta.chunks(1) {
            decoder
                .decode_chunk(b, &mut out)
                .unwrap_or_else(|e| panic!("vector {}: {e}", v.name));
        }
        decoder.finish_decoding().unwrap();
        assert_eq!(out, v.target, "vector {}", v.name);
    }
}

#[test]
fn every_strict_prefix_of_a_vector_is_incomplete_or_clean() {
    for v in load_vectors() {
        for cut in 0..v.delta.len() {
            let mut decoder = StreamingDecoder::new();
            let mut out = Vec::new();
            decoder.start_decoding(&v.dictionary).unwrap();
            decoder.decode_chunk(&v.delta[..cut], &mut out).unwrap();
            assert!(v.target.starts_with(&out), "vector {} cut {cut}", v.name);
            if decoder.finish_decoding().is_ok() {
                assert!(cut >= 5, "vector {} cut {cut}", v.name);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bit-mask sweep
// ---------------------------------------------------------------------------

/// (and, or, xor) masks applied to one delta byte at a time.
const MASKS: [(u8, u8, u8); 6] = [
    (0xFF, 0x80, 0x00),
    (0xFF, 0xFF, 0x00),
    (0xFF, 0x00, 0x80),
    (0xFF, 0x00, 0xFF),
    (0xFF, 0x01, 0x00),
    (0x7F, 0x00, 0x00),
];

/// Corrupt each byte of `delta` under every mask and decode. The decoder
/// must never panic. `body_start` marks where the checksummed window body
/// begins: a corrupted body either fails or still yields the exact target.
fn sweep(delta: &[u8], body_start: usize) {
    let decoder = VcdiffDecoder::with_options(small_limits());
    for (i, &original) in delta.iter().enumerate() {
        for (and, or, xor) in MASKS {
            let mutated = ((original & and) | or) ^ xor;
            if mutated == original {
                continue;
            }
            let mut fuzzed = delta.to_vec();
            fuzzed[i] = mutated;

            let one_shot = decoder.decode(DICTIONARY, &fuzzed);

            let mut streaming = StreamingDecoder::with_options(small_limits());
            let mut out = Vec::new();
            streaming.start_decoding(DICTIONARY).unwrap();
            let chunked = fuzzed
                .chunks(3)
                .try_for_each(|c| streaming.decode_chunk(c, &mut out))
                .and_then(|()| streaming.finish_decoding());

            assert_eq!(
                one_shot.is_ok(),
                chunked.is_ok(),
                "byte {i} masks {and:02x}/{or:02x}/{xor:02x}"
            );
            if let Ok(target) = one_shot {
                assert_eq!(target, out);
                if i >= body_start {
                    assert_eq!(target, EXPECTED_TARGET, "byte {i}");
                }
            }
        }
    }
}

#[test]
fn fuzz_masks_standard_with_checksum() {
    let delta = standard_delta_with_checksum();
    let body_start = delta.len() - standard_window_body().len();
    sweep(&delta, body_start);
}

#[test]
fn fuzz_masks_interleaved_with_checksum() {
    let delta = interleaved_delta_with_checksum();
    let body_start = delta.len() - interleaved_window_body().len();
    sweep(&delta, body_start);
}

#[test]
fn fuzz_masks_all_vectors_never_panic() {
    let decoder = VcdiffDecoder::with_options(small_limits());
    for v in load_vectors() {
        for i in 0..v.delta.len() {
            for (and, or, xor) in MASKS {
                let mut fuzzed = v.delta.clone();
                fuzzed[i] = ((fuzzed[i] & and) | or) ^ xor;
                let _ = decoder.decode(&v.dictionary, &fuzzed);
            }
        }
    }
}
