#![allow(clippy::too_many_arguments)]
#![warn(clippy::indexing_slicing, clippy::unwrap_used, clippy::panic)]

mod bits;
mod block;
mod error;
mod frame;
mod fse;
mod huffman;
mod match_engine;
mod params;
mod sequence;
mod xxhash;

pub use error::{ErrorKind, Res, ZstdError};
pub use frame::{Compressor, Decompressor};
pub use params::{DEFAULT_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL};

use error::ErrorContext;

struct Ctx;
impl ErrorContext for Ctx {}

/// Upper bound on the compressed size of an `input_len`-byte buffer, for
/// sizing an output buffer ahead of [`compress`].
pub fn max_compressed_bound(input_len: usize) -> usize {
    frame::max_compressed_bound(input_len)
}

/// Reads a frame's declared content size without decompressing it. Returns
/// `Ok(None)` only for frame layouts this crate's own encoder never
/// produces (streaming/unknown-size frames); `Err` for anything that isn't
/// a frame this crate can read at all.
pub fn get_decompressed_size(input: &[u8]) -> Res<Option<u64>> {
    frame::decompressed_size(input)
}

/// Compresses `input` at `level` (clamped to
/// `[MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL]`) into `output`, returning
/// the number of bytes written. Fails with [`ErrorKind::BufferTooSmall`] if
/// `output` cannot hold the compressed frame.
pub fn compress(input: &[u8], output: &mut [u8], level: i32) -> Res<usize> {
    let compressed = frame::compress(input, level);
    if output.len() < compressed.len() {
        return Ctx.too_small(format!(
            "output buffer has {} bytes, need {}",
            output.len(),
            compressed.len()
        ));
    }
    let dst = output
        .get_mut(..compressed.len())
        .ok_or_else(|| ZstdError::new(ErrorKind::BufferTooSmall, "output buffer shorter than compressed frame"))?;
    dst.copy_from_slice(&compressed);
    Ok(compressed.len())
}

/// Decompresses a frame produced by [`compress`] into `output`, returning
/// the number of bytes written. Fails with [`ErrorKind::BufferTooSmall`] if
/// `output` cannot hold the decompressed content.
pub fn decompress(input: &[u8], output: &mut [u8]) -> Res<usize> {
    let decompressed = frame::decompress(input)?;
    if output.len() < decompressed.len() {
        return Ctx.too_small(format!(
            "output buffer has {} bytes, need {}",
            output.len(),
            decompressed.len()
        ));
    }
    let dst = output.get_mut(..decompressed.len()).ok_or_else(|| {
        ZstdError::new(ErrorKind::BufferTooSmall, "output buffer shorter than decompressed content")
    })?;
    dst.copy_from_slice(&decompressed);
    Ok(decompressed.len())
}

/// Convenience wrapper over [`compress`] that allocates its own output
/// buffer, for callers that don't need to manage buffer reuse themselves.
pub fn compress_to_vec(input: &[u8], level: i32) -> Vec<u8> {
    frame::compress(input, level)
}

/// Convenience wrapper over [`decompress`] that allocates its own output
/// buffer.
pub fn decompress_to_vec(input: &[u8]) -> Res<Vec<u8>> {
    frame::decompress(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn public_api_roundtrips() {
        let data = b"public API roundtrip test data, repeated. ".repeat(50);
        let mut compressed = vec![0u8; max_compressed_bound(data.len())];
        let n = compress(&data, &mut compressed, 5).unwrap();
        compressed.truncate(n);

        let mut out = vec![0u8; data.len()];
        let m = decompress(&compressed, &mut out).unwrap();
        out.truncate(m);
        assert_eq!(out, data);
    }

    #[test_log::test]
    fn compress_reports_buffer_too_small() {
        let data = vec![7u8; 10_000];
        let mut tiny = vec![0u8; 4];
        let err = compress(&data, &mut tiny, 3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BufferTooSmall);
    }

    #[test_log::test]
    fn decompress_reports_buffer_too_small() {
        let data = vec![7u8; 10_000];
        let compressed = compress_to_vec(&data, 3);
        let mut tiny = vec![0u8; 4];
        let err = decompress(&compressed, &mut tiny).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BufferTooSmall);
    }

    #[test_log::test]
    fn decompress_rejects_corrupt_input() {
        let garbage = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut out = vec![0u8; 16];
        assert!(decompress(&garbage, &mut out).is_err());
    }
}
