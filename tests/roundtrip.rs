//! Integration tests against the public byte-buffer API, covering the
//! round-trip, checksum, corruption-rejection, determinism and boundary
//! properties. Unit tests closer to each wire-format detail (FSE spread
//! coverage, Huffman TREELESS/COMPRESSED equivalence, literals sub-block
//! framing) live alongside their modules.

use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

fn roundtrip_vec(data: &[u8], level: i32) {
    let compressed = zstdcore::compress_to_vec(data, level);
    let decompressed = zstdcore::decompress_to_vec(&compressed).expect("decompress");
    assert_eq!(decompressed, data, "roundtrip mismatch at level {level}");
}

/// Replays just enough of the frame-header layout (magic + descriptor +
/// optional window byte + content-size field) to find where the block
/// payload starts, since its width varies with `Single_Segment_flag` and
/// `Frame_Content_Size_flag`.
fn frame_payload_start(compressed: &[u8]) -> usize {
    let descriptor = compressed[4];
    let single_segment = descriptor & 0x20 != 0;
    let fcs_flag = descriptor >> 6;
    let mut cursor = 5usize;
    if !single_segment {
        cursor += 1;
    }
    cursor += match fcs_flag {
        0 if single_segment => 1,
        0 => 0,
        1 => 2,
        2 => 4,
        _ => 8,
    };
    cursor
}

fn roundtrip_buffers(data: &[u8], level: i32) {
    let mut compressed = vec![0u8; zstdcore::max_compressed_bound(data.len())];
    let n = zstdcore::compress(data, &mut compressed, level).expect("compress");
    compressed.truncate(n);

    let mut out = vec![0u8; data.len()];
    let m = zstdcore::decompress(&compressed, &mut out).expect("decompress");
    out.truncate(m);
    assert_eq!(out, data);
}

#[test_log::test]
fn roundtrip_empty_input() {
    roundtrip_vec(b"", 3);
    roundtrip_buffers(b"", 3);
}

#[test_log::test]
fn roundtrip_one_byte() {
    roundtrip_vec(b"x", 3);
}

#[test_log::test]
fn roundtrip_all_zero_1mib() {
    let data = vec![0u8; 1 << 20];
    roundtrip_vec(&data, 3);
}

#[test_log::test]
fn roundtrip_random_1mib() {
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let mut data = vec![0u8; 1 << 20];
    rng.fill_bytes(&mut data);
    roundtrip_vec(&data, 3);
}

#[test_log::test]
fn roundtrip_repeating_abc_pattern() {
    let data: Vec<u8> = b"abc".iter().copied().cycle().take(128 * 1024).collect();
    roundtrip_vec(&data, 3);
}

#[test_log::test]
fn roundtrip_pathological_block_boundary_crossing() {
    // 131073 bytes crosses exactly one MAX_BLOCK_SIZE (131072) boundary.
    let mut rng = SmallRng::seed_from_u64(42);
    let mut data = vec![0u8; 131_073];
    rng.fill_bytes(&mut data);
    roundtrip_vec(&data, 1);
}

#[test_log::test]
fn roundtrip_all_levels() {
    let mut rng = SmallRng::seed_from_u64(7);
    let mut data = vec![0u8; 50_000];
    rng.fill_bytes(&mut data);
    for level in zstdcore::MIN_COMPRESSION_LEVEL..=zstdcore::MAX_COMPRESSION_LEVEL {
        roundtrip_vec(&data, level);
    }
}

#[test_log::test]
fn checksum_detects_single_bit_flips() {
    let data: Vec<u8> = (0..4000u32).map(|i| (i % 200) as u8).collect();
    let mut flips_caught = 0usize;
    let mut rng = SmallRng::seed_from_u64(99);

    for _ in 0..100 {
        let mut compressed = zstdcore::compress_to_vec(&data, 4);
        let payload_start = frame_payload_start(&compressed);
        let payload_end = compressed.len() - 4; // before the trailing checksum
        if payload_end <= payload_start {
            continue;
        }
        let byte_idx = payload_start + rng.gen_range(0..(payload_end - payload_start));
        let bit_idx = rng.gen_range(0..8u32);
        compressed[byte_idx] ^= 1 << bit_idx;

        match zstdcore::decompress_to_vec(&compressed) {
            Err(e) if e.kind == zstdcore::ErrorKind::BadChecksum => flips_caught += 1,
            Err(_) => {} // corrupted structurally instead of just content; also acceptable
            Ok(out) if out == data => {} // flip happened to land somewhere inert
            Ok(_) => panic!("bit flip silently produced different output without a checksum failure"),
        }
    }

    assert!(flips_caught > 0, "expected at least some flips to be caught as BadChecksum");
}

#[test_log::test]
fn corruption_never_panics_or_goes_out_of_bounds() {
    let data: Vec<u8> = (0..8000u32).map(|i| (i * 31 % 256) as u8).collect();
    let mut rng = SmallRng::seed_from_u64(123);

    for _ in 0..200 {
        let mut compressed = zstdcore::compress_to_vec(&data, 3);
        let idx = rng.gen_range(0..compressed.len());
        compressed[idx] = rng.gen();

        let mut out = vec![0u8; data.len() + 64];
        // Must not panic; any outcome (Ok or a typed Err) is acceptable.
        let _ = zstdcore::decompress(&compressed, &mut out);
    }
}

#[test_log::test]
fn compression_is_deterministic() {
    let data: Vec<u8> = b"deterministic output please ".iter().copied().cycle().take(9001).collect();
    let a = zstdcore::compress_to_vec(&data, 5);
    let b = zstdcore::compress_to_vec(&data, 5);
    assert_eq!(a, b);
}

#[test_log::test]
fn rejects_legacy_magic() {
    let mut frame = vec![0x27, 0xB5, 0x2F, 0xFD]; // 0xFD2FB527 LE
    frame.extend_from_slice(&[0u8; 16]);
    let mut out = vec![0u8; 64];
    let err = zstdcore::decompress(&frame, &mut out).unwrap_err();
    assert_eq!(err.kind, zstdcore::ErrorKind::Unsupported);
}

#[test_log::test]
fn raw_one_byte_block_roundtrips() {
    roundtrip_vec(b"Q", 1);
}

#[test_log::test]
fn four_stream_literal_block_length_exactly_divisible_by_four() {
    let mut rng = SmallRng::seed_from_u64(5);
    let mut data = vec![0u8; 1024]; // divisible by 4, large enough to force 4-stream Huffman
    rng.fill_bytes(&mut data);
    roundtrip_vec(&data, 6);
}

#[test_log::test]
fn four_stream_literal_block_length_not_divisible_by_four() {
    let mut rng = SmallRng::seed_from_u64(6);
    let mut data = vec![0u8; 1025]; // 4k+1
    rng.fill_bytes(&mut data);
    roundtrip_vec(&data, 6);
}

#[test_log::test]
fn literal_scenario_empty_input_frame_shape() {
    let compressed = zstdcore::compress_to_vec(b"", 3);
    assert!(compressed.len() >= 6 + 4);
    let decompressed = zstdcore::decompress_to_vec(&compressed).unwrap();
    assert!(decompressed.is_empty());
}

#[test_log::test]
fn literal_scenario_repeated_a() {
    let data = [b'A'; 32];
    let compressed = zstdcore::compress_to_vec(&data, 3);
    let decompressed = zstdcore::decompress_to_vec(&compressed).unwrap();
    assert_eq!(decompressed, data);
}

#[test_log::test]
fn literal_scenario_full_byte_range_repeated() {
    let mut data = Vec::with_capacity(131_072);
    for _ in 0..512 {
        data.extend(0u8..=255u8);
    }
    assert_eq!(data.len(), 131_072);
    let compressed = zstdcore::compress_to_vec(&data, 3);
    assert!(compressed.len() <= data.len());
    let decompressed = zstdcore::decompress_to_vec(&compressed).unwrap();
    assert_eq!(decompressed, data);
}

#[test_log::test]
fn literal_scenario_random_incompressible_input_falls_back_to_bound() {
    let mut rng = SmallRng::seed_from_u64(77);
    let mut data = vec![0u8; 200 * 1024];
    rng.fill_bytes(&mut data);
    let compressed = zstdcore::compress_to_vec(&data, 3);
    assert!(compressed.len() <= zstdcore::max_compressed_bound(data.len()));
    let decompressed = zstdcore::decompress_to_vec(&compressed).unwrap();
    assert_eq!(decompressed, data);
}

#[test_log::test]
fn reports_decompressed_size_without_decompressing() {
    let data = vec![3u8; 70_000];
    let compressed = zstdcore::compress_to_vec(&data, 2);
    let size = zstdcore::get_decompressed_size(&compressed).unwrap();
    assert_eq!(size, Some(data.len() as u64));
}
