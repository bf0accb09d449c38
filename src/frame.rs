//! Frame assembly (C8): magic number and legacy-frame rejection, the frame
//! header, the block loop, and the trailing XXH64 checksum.
//!
//! The magic number and the legacy-magic range are exact (RFC 8478
//! §3.1.1/§G). The frame header descriptor picks the real encoding §4.1.1
//! describes: `Single_Segment_flag` is set whenever the window covers the
//! whole input (`window_size >= content_size`), omitting the
//! `Window_Descriptor` byte entirely, and `Frame_Content_Size_flag` always
//! selects the narrowest of the four content-size field widths (1/2/4/8
//! bytes) that can hold the value — `parse_header` accepts every RFC-legal
//! combination on decode, including unknown-size (non-single-segment,
//! flag 0) frames this crate's own encoder never emits.
//!
//! Match finding (see `match_engine.rs`) never reaches across a block
//! boundary, so repeat-offsets and entropy tables persist across blocks of
//! a frame (via `block::CompressState`/`block::DecodeState`) but literal
//! back-references do not; this only costs ratio on multi-block frames,
//! never correctness, since `execute_sequences` always copies from the
//! frame's full accumulated output regardless of which block it came from.

use crate::block::{self, BlockType, CompressState, DecodeState};
use crate::error::{ErrorContext, ErrorKind, Res, SliceErrors, ZstdError};
use crate::params::{self, MAX_WINDOW_LOG, MIN_WINDOW_LOG};
use crate::xxhash::{self, Xxh64};

pub const MAGIC: u32 = 0xFD2F_B528;
const LEGACY_MAGIC_MIN: u32 = 0xFD2F_B51E;
const LEGACY_MAGIC_MAX: u32 = 0xFD2F_B527;

const CONTENT_CHECKSUM_BIT: u8 = 0x04;
const SIZE_FLAG_MASK: u8 = 0xC0;
const SINGLE_SEGMENT_BIT: u8 = 0x20;
const RESERVED_BIT: u8 = 0x08;
const DICT_ID_MASK: u8 = 0x03;

struct Ctx;
impl ErrorContext for Ctx {}

/// Upper bound on a compressed frame's size for a given input length:
/// worst case is every block falling back to Raw, plus frame/block header
/// overhead and the trailing checksum.
pub fn max_compressed_bound(input_len: usize) -> usize {
    let block_size = params::MAX_BLOCK_SIZE;
    let num_blocks = input_len.div_ceil(block_size).max(1);
    input_len + num_blocks * 3 + 4 + 1 + 1 + 8 + 4
}

/// Peeks a frame's header to report its declared content size, without
/// decompressing anything, per §4.14. Returns `Ok(None)` for an
/// unknown-size (non-single-segment, `Frame_Content_Size_flag = 0`) frame.
pub fn decompressed_size(input: &[u8]) -> Res<Option<u64>> {
    let header = parse_header(input)?;
    Ok(header.content_size)
}

struct FrameHeader {
    window_size: u64,
    content_size: Option<u64>,
    has_checksum: bool,
    body_offset: usize,
}

fn parse_header(input: &[u8]) -> Res<FrameHeader> {
    let magic_bytes = input.get_range(0, 4)?;
    let magic = u32::from_le_bytes(magic_bytes.try_into().unwrap());
    if (LEGACY_MAGIC_MIN..=LEGACY_MAGIC_MAX).contains(&magic) {
        return Ctx.unsupported(format!("legacy zstd frame magic 0x{magic:08X} is not supported"));
    }
    if magic != MAGIC {
        return Ctx.unsupported(format!("not a zstd frame (magic 0x{magic:08X})"));
    }

    let descriptor = input.get_copy(4)?;
    Ctx.assert(descriptor & RESERVED_BIT == 0, "frame header reserved bit set")?;
    Ctx.assert(
        descriptor & DICT_ID_MASK == 0,
        "dictionary-bearing frames are not supported",
    )?;
    let has_checksum = descriptor & CONTENT_CHECKSUM_BIT != 0;
    let single_segment = descriptor & SINGLE_SEGMENT_BIT != 0;
    let fcs_flag = (descriptor & SIZE_FLAG_MASK) >> 6;

    let mut cursor = 5usize;
    let window_descriptor_size = if single_segment {
        None
    } else {
        let window_byte = input.get_copy(cursor)?;
        cursor += 1;
        let exponent = (window_byte >> 3) as u32;
        let mantissa = (window_byte & 0x7) as u32;
        let window_log = MIN_WINDOW_LOG + exponent;
        if window_log > MAX_WINDOW_LOG {
            return Ctx.unsupported(format!("frame window (2^{window_log}) exceeds the supported maximum"));
        }
        let window_base = 1u64 << window_log;
        Some(window_base + (window_base >> 3) * mantissa as u64)
    };

    let content_size = match fcs_flag {
        0 if single_segment => {
            let b = input.get_copy(cursor)?;
            cursor += 1;
            Some(b as u64)
        }
        0 => None,
        1 => {
            let bytes = input.get_range(cursor, cursor + 2)?;
            cursor += 2;
            Some(u16::from_le_bytes(bytes.try_into().unwrap()) as u64 + 256)
        }
        2 => {
            let bytes = input.get_range(cursor, cursor + 4)?;
            cursor += 4;
            Some(u32::from_le_bytes(bytes.try_into().unwrap()) as u64)
        }
        _ => {
            let bytes = input.get_range(cursor, cursor + 8)?;
            cursor += 8;
            Some(u64::from_le_bytes(bytes.try_into().unwrap()))
        }
    };

    let window_size = if single_segment {
        content_size.ok_or_else(|| {
            ZstdError::new(ErrorKind::Corruption, "single-segment frame header missing a content size")
        })?
    } else {
        window_descriptor_size.expect("computed above whenever the frame is not single-segment")
    };

    Ok(FrameHeader {
        window_size,
        content_size,
        has_checksum,
        body_offset: cursor,
    })
}

/// Writes a frame header choosing the real RFC-legal encoding: single
/// segment (no `Window_Descriptor`) whenever the window already covers the
/// whole input, and the narrowest content-size field width that fits.
fn write_header(out: &mut Vec<u8>, window_log: u32, content_size: u64, checksum: bool) {
    out.extend_from_slice(&MAGIC.to_le_bytes());

    let window_base = 1u64 << window_log;
    let single_segment = window_base >= content_size;

    // MIN_WINDOW_LOG guarantees window_base >= 1024, so a non-single-segment
    // frame (window_base < content_size) never needs to represent a
    // content_size below 256 — the 2-byte field's smallest encodable value.
    let fcs_flag: u8 = if single_segment && content_size < 256 {
        0
    } else if content_size < 256 + (1u64 << 16) {
        1
    } else if content_size < (1u64 << 32) {
        2
    } else {
        3
    };

    let descriptor = (fcs_flag << 6)
        | if single_segment { SINGLE_SEGMENT_BIT } else { 0 }
        | if checksum { CONTENT_CHECKSUM_BIT } else { 0 };
    out.push(descriptor);

    if !single_segment {
        let exponent = (window_log - MIN_WINDOW_LOG) as u8;
        out.push(exponent << 3);
    }

    match fcs_flag {
        0 => out.push(content_size as u8),
        1 => out.extend_from_slice(&((content_size - 256) as u16).to_le_bytes()),
        2 => out.extend_from_slice(&(content_size as u32).to_le_bytes()),
        _ => out.extend_from_slice(&content_size.to_le_bytes()),
    }
}

/// Compresses `input` at the given level into a standalone frame.
pub fn compress(input: &[u8], level: i32) -> Vec<u8> {
    let params = params::derive(level, input.len());
    let mut out = Vec::with_capacity(max_compressed_bound(input.len()).min(input.len() + 1024));
    write_header(&mut out, params.window_log, input.len() as u64, true);

    let mut state = CompressState::default();
    let mut hasher = Xxh64::new(0);
    let block_size = params.block_size();

    if input.is_empty() {
        block::write_block_header(&mut out, true, BlockType::Raw, 0);
    } else {
        let mut pos = 0usize;
        while pos < input.len() {
            let end = (pos + block_size).min(input.len());
            let chunk = &input[pos..end];
            let payload = block::encode_block(chunk, &params, &mut state);
            let block_type = block::classify(chunk, &payload);
            let header_size = if block_type == BlockType::Rle { chunk.len() } else { payload.len() };
            let last = end == input.len();

            block::write_block_header(&mut out, last, block_type, header_size);
            out.extend_from_slice(&payload);
            hasher.update(chunk);
            pos = end;
        }
    }

    let digest = hasher.finish();
    out.extend_from_slice(&(digest as u32).to_le_bytes());
    log::debug!("compressed {} bytes -> {} bytes (level {level})", input.len(), out.len());
    out
}

/// Decompresses a frame produced by [`compress`].
pub fn decompress(input: &[u8]) -> Res<Vec<u8>> {
    let header = parse_header(input)?;
    let mut out = Vec::with_capacity(header.content_size.unwrap_or(0).min(1 << 26) as usize);
    let mut state = DecodeState::default();
    let mut cursor = header.body_offset;

    loop {
        let block_header = block::read_block_header(input.get_range(cursor, input.len())?)?;
        cursor += 3;
        let (payload_len, decompressed_size) = match block_header.block_type {
            BlockType::Rle => (1usize, block_header.size),
            _ => (block_header.size, 0),
        };
        let payload = input.get_range(cursor, cursor + payload_len)?;
        cursor += payload_len;

        block::decode_block(block_header.block_type, payload, decompressed_size, &mut out, &mut state)?;
        if let Some(expected) = header.content_size {
            Ctx.assert(
                out.len() as u64 <= expected.saturating_add(header.window_size),
                "decompressed output grew far beyond the declared content size",
            )?;
        }
        if block_header.last {
            break;
        }
    }

    if let Some(expected) = header.content_size {
        Ctx.assert_eq(out.len() as u64, expected)?;
    }

    if header.has_checksum {
        let expected = u32::from_le_bytes(input.get_range(cursor, cursor + 4)?.try_into().unwrap());
        let actual = xxhash::hash64(0, &out) as u32;
        if actual != expected {
            return Err(crate::error::ZstdError::new(
                crate::error::ErrorKind::BadChecksum,
                format!("content checksum mismatch: expected {expected:08x}, got {actual:08x}"),
            ));
        }
    }

    Ok(out)
}

/// Thin session wrapper around [`compress`]; each call builds its own
/// scratch state, so instances carry no mutable fields worth reusing, but
/// the type exists for API symmetry with [`Decompressor`] and to give
/// callers a place to pin a compression level.
pub struct Compressor {
    level: i32,
}

impl Compressor {
    pub fn new(level: i32) -> Self {
        Compressor { level }
    }

    pub fn compress(&self, input: &[u8]) -> Vec<u8> {
        compress(input, self.level)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Compressor::new(params::DEFAULT_COMPRESSION_LEVEL)
    }
}

#[derive(Default)]
pub struct Decompressor;

impl Decompressor {
    pub fn new() -> Self {
        Decompressor
    }

    pub fn decompress(&self, input: &[u8]) -> Res<Vec<u8>> {
        decompress(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8], level: i32) {
        let compressed = compress(data, level);
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data, "mismatch at level {level}");
    }

    #[test_log::test]
    fn roundtrips_empty_input() {
        roundtrip(b"", 3);
    }

    #[test_log::test]
    fn roundtrips_across_levels() {
        let data = b"the quick brown fox jumps over the lazy dog ".repeat(200);
        for level in 1..=9 {
            roundtrip(&data, level);
        }
    }

    #[test_log::test]
    fn roundtrips_single_byte() {
        roundtrip(b"A", 5);
    }

    #[test_log::test]
    fn roundtrips_multi_block_input() {
        let params = params::derive(1, 400_000);
        assert!(400_000 > params.block_size());
        let data: Vec<u8> = (0..400_000u32).map(|i| (i % 251) as u8).collect();
        roundtrip(&data, 1);
    }

    #[test_log::test]
    fn rejects_legacy_magic() {
        let mut frame = vec![0x27, 0xB5, 0x2F, 0xFD]; // 0xFD2FB527 little-endian
        frame.extend_from_slice(&[0u8; 10]);
        let err = decompress(&frame).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Unsupported);
    }

    #[test_log::test]
    fn detects_checksum_corruption() {
        let data = b"some reasonably compressible text text text text".repeat(10);
        let mut compressed = compress(&data, 4);
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;
        let err = decompress(&compressed).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::BadChecksum);
    }

    #[test_log::test]
    fn rejects_truncated_frame() {
        let data = b"hello world, this is some sample text for compression".repeat(5);
        let compressed = compress(&data, 3);
        let truncated = &compressed[..compressed.len() - 5];
        assert!(decompress(truncated).is_err());
    }

    #[test_log::test]
    fn reports_decompressed_size() {
        let data = b"some content of a known length".repeat(3);
        let compressed = compress(&data, 3);
        let size = decompressed_size(&compressed).unwrap();
        assert_eq!(size, Some(data.len() as u64));
    }

    #[test_log::test]
    fn single_segment_when_input_fits_window() {
        // Any level's window covers this input, so the header must omit the
        // Window_Descriptor byte and set Single_Segment_flag.
        let data = b"tiny input".to_vec();
        let compressed = compress(&data, 3);
        let descriptor = compressed[4];
        assert_ne!(descriptor & SINGLE_SEGMENT_BIT, 0);
        roundtrip(&data, 3);
    }

    #[test_log::test]
    fn multi_segment_when_input_exceeds_window() {
        let len = 600_000usize;
        let params = params::derive(1, len);
        assert!(len > (1usize << params.window_log));
        let data: Vec<u8> = (0..len as u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress(&data, 1);
        let descriptor = compressed[4];
        assert_eq!(descriptor & SINGLE_SEGMENT_BIT, 0);
        roundtrip(&data, 1);
    }
}
