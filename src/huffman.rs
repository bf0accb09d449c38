//! Canonical Huffman literal coding (C4): weight-based table construction,
//! 1-stream and 4-stream encode/decode, and the two weight-header
//! serializations (raw nibbles / FSE-compressed) RFC 8478 §4.2 allows.
//!
//! `MAX_HUFFMAN_TABLE_LOG` is 11, following RFC 8478's Huffman_Max_Table_Log
//! rather than the narrower range quoted informally elsewhere in early
//! drafts of this design — see the Huffman entry in `DESIGN.md`.

use crate::bits::{BitReader, BitWriter};
use crate::error::{ErrorContext, Res};
use crate::fse;

pub const MAX_HUFFMAN_TABLE_LOG: u32 = 11;
const WEIGHT_ALPHABET_MAX: usize = 11;

struct Ctx;
impl ErrorContext for Ctx {}

/// Canonical lengths for a symbol alphabet, Kraft-limited to `limit` bits.
/// Built from a plain binary-heap Huffman tree; when the natural tree
/// exceeds `limit`, lengths are clamped and the Kraft sum is repaired by
/// greedily lengthening the shallowest eligible codes (and, symmetrically,
/// shortening them if clamping left code space unused). This does not
/// reproduce zstd reference's exact rebalancing walk but always yields a
/// valid, uniquely decodable length set.
fn huffman_lengths(counts: &[u32], limit: u32) -> Vec<u32> {
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    let n = counts.len();
    let present: Vec<usize> = (0..n).filter(|&s| counts[s] > 0).collect();
    let mut lengths = vec![0u32; n];
    if present.is_empty() {
        return lengths;
    }
    if present.len() == 1 {
        lengths[present[0]] = 1;
        return lengths;
    }

    // (count, insertion-order-tiebreak, node id); node ids >= n are internal.
    let mut heap: BinaryHeap<Reverse<(u64, usize, usize)>> = BinaryHeap::new();
    let mut parent = vec![usize::MAX; 2 * n];
    let mut next_id = n;
    for (order, &s) in present.iter().enumerate() {
        heap.push(Reverse((counts[s] as u64, order, s)));
    }
    let mut order = present.len();
    while heap.len() > 1 {
        let Reverse((c1, _, a)) = heap.pop().unwrap();
        let Reverse((c2, _, b)) = heap.pop().unwrap();
        let id = next_id;
        next_id += 1;
        parent[a] = id;
        parent[b] = id;
        heap.push(Reverse((c1 + c2, order, id)));
        order += 1;
    }

    for &s in &present {
        let mut depth = 0u32;
        let mut node = s;
        while parent[node] != usize::MAX {
            node = parent[node];
            depth += 1;
        }
        lengths[s] = depth.max(1);
    }

    limit_lengths(&mut lengths, limit);
    lengths
}

fn limit_lengths(lengths: &mut [u32], limit: u32) {
    if lengths.iter().all(|&l| l <= limit) {
        // still need to verify/repair the Kraft sum below even if nothing
        // needed clamping, in case of a degenerate single-depth tree.
    }
    for l in lengths.iter_mut() {
        if *l > limit {
            *l = limit;
        }
    }
    let target = 1i64 << limit;
    let kraft_of = |l: u32| -> i64 { 1i64 << (limit - l) };
    let mut kraft: i64 = lengths.iter().filter(|&&l| l > 0).map(|&l| kraft_of(l)).sum();

    while kraft > target {
        let idx = (0..lengths.len())
            .filter(|&i| lengths[i] > 0 && lengths[i] < limit)
            .max_by_key(|&i| lengths[i]);
        match idx {
            Some(i) => {
                kraft -= kraft_of(lengths[i]);
                lengths[i] += 1;
                kraft += kraft_of(lengths[i]);
            }
            None => break,
        }
    }
    while kraft < target {
        let idx = (0..lengths.len())
            .filter(|&i| lengths[i] > 1)
            .min_by_key(|&i| lengths[i]);
        match idx {
            Some(i) => {
                kraft -= kraft_of(lengths[i]);
                lengths[i] -= 1;
                kraft += kraft_of(lengths[i]);
            }
            None => break,
        }
    }
}

fn assign_codes(lengths: &[u32]) -> Vec<u32> {
    let max_len = *lengths.iter().max().unwrap_or(&0) as usize;
    let mut bl_count = vec![0u32; max_len + 2];
    for &l in lengths {
        if l > 0 {
            bl_count[l as usize] += 1;
        }
    }
    let mut next_code = vec![0u32; max_len + 2];
    let mut code = 0u32;
    for bits in 1..=max_len {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    let mut codes = vec![0u32; lengths.len()];
    for (sym, &len) in lengths.iter().enumerate() {
        if len > 0 {
            codes[sym] = next_code[len as usize];
            next_code[len as usize] += 1;
        }
    }
    codes
}

fn weights_from_lengths(lengths: &[u32], table_log: u32) -> Vec<u8> {
    lengths
        .iter()
        .map(|&l| if l == 0 { 0 } else { (table_log + 1 - l) as u8 })
        .collect()
}

fn lengths_from_weights(weights: &[u8], table_log: u32) -> Res<Vec<u32>> {
    let mut lengths = vec![0u32; weights.len()];
    for (i, &w) in weights.iter().enumerate() {
        if w == 0 {
            continue;
        }
        if w as u32 > table_log + 1 {
            return Ctx.corrupt("huffman weight exceeds tableLog");
        }
        lengths[i] = table_log + 1 - w as u32;
    }
    Ok(lengths)
}

pub(crate) struct HuffmanCTable {
    pub table_log: u32,
    codes: Vec<u32>,
    lengths: Vec<u32>,
}

pub(crate) struct HuffmanDTable {
    pub table_log: u32,
    entries: Vec<(u8, u8)>,
}

/// Builds a canonical Huffman table for `counts` (weighted by literal
/// frequency), capped at `max_table_log` bits per code.
pub(crate) fn build_table(counts: &[u32], max_table_log: u32) -> (HuffmanCTable, Vec<u8>) {
    let limit = max_table_log.min(MAX_HUFFMAN_TABLE_LOG);
    let max_symbol = counts.iter().rposition(|&c| c > 0).unwrap_or(0);
    let counts = &counts[..=max_symbol];

    let lengths = huffman_lengths(counts, limit);
    let table_log = lengths.iter().copied().max().unwrap_or(1);
    let codes = assign_codes(&lengths);
    let weights = weights_from_lengths(&lengths, table_log);
    (
        HuffmanCTable {
            table_log,
            codes,
            lengths,
        },
        weights,
    )
}

pub(crate) fn dtable_from_weights(weights: &[u8]) -> Res<HuffmanDTable> {
    let table_log = weights.iter().copied().max().unwrap_or(1).max(1) as u32;
    let lengths = lengths_from_weights(weights, table_log)?;
    let codes = assign_codes(&lengths);
    let size = 1usize << table_log;
    let mut entries = vec![(0u8, 0u8); size];
    for (sym, (&len, &code)) in lengths.iter().zip(codes.iter()).enumerate() {
        if len == 0 {
            continue;
        }
        let shift = table_log - len;
        let start = (code << shift) as usize;
        for slot in entries.iter_mut().skip(start).take(1usize << shift) {
            *slot = (sym as u8, len as u8);
        }
    }
    Ok(HuffmanDTable { table_log, entries })
}

fn encode_one_symbol(ctable: &HuffmanCTable, writer: &mut BitWriter, symbol: u8) -> Res<()> {
    let len = ctable.lengths[symbol as usize];
    if len == 0 {
        return Ctx.corrupt(format!("literal byte {symbol} has no huffman code"));
    }
    writer.push(ctable.codes[symbol as usize], len);
    Ok(())
}

/// Encodes `data` as a single Huffman-coded bit stream.
pub(crate) fn encode_stream(ctable: &HuffmanCTable, data: &[u8]) -> Res<Vec<u8>> {
    let mut writer = BitWriter::new();
    for &b in data {
        encode_one_symbol(ctable, &mut writer, b)?;
    }
    Ok(writer.finish())
}

/// Decodes exactly `out_len` bytes from a single Huffman-coded stream.
pub(crate) fn decode_stream(dtable: &HuffmanDTable, bytes: &[u8], out_len: usize) -> Res<Vec<u8>> {
    let mut reader = BitReader::new(bytes, 0, bytes.len())?;
    let mut out = Vec::with_capacity(out_len);
    for _ in 0..out_len {
        out.push(decode_one_symbol(dtable, &mut reader)?);
    }
    Ok(out)
}

fn decode_one_symbol(dtable: &HuffmanDTable, reader: &mut BitReader) -> Res<u8> {
    let avail = (reader.bits_remaining() as u32).min(dtable.table_log);
    if avail == 0 {
        return Ctx.corrupt("huffman stream exhausted before expected symbol count");
    }
    let raw = reader.peek(avail)?;
    let idx = (raw as usize) << (dtable.table_log - avail);
    let (sym, len) = dtable.entries[idx];
    Ctx.assert(
        len as u32 <= avail,
        "huffman code longer than remaining bits",
    )?;
    reader.consume(len as u32);
    Ok(sym)
}

/// Encodes `data` as four independent streams with a leading `3*u16`
/// jump table, used whenever the literal block is at least 256 bytes
/// (§4.2): this lets a decoder process the four streams in parallel, which
/// we don't exploit here but still lay out byte-for-byte compatibly.
pub(crate) fn encode_four_streams(ctable: &HuffmanCTable, data: &[u8]) -> Res<Vec<u8>> {
    let n = data.len();
    let chunk = n.div_ceil(4);
    let parts = [
        &data[0..chunk.min(n)],
        &data[chunk.min(n)..(2 * chunk).min(n)],
        &data[(2 * chunk).min(n)..(3 * chunk).min(n)],
        &data[(3 * chunk).min(n)..n],
    ];
    let mut streams = Vec::with_capacity(4);
    for part in parts {
        streams.push(encode_stream(ctable, part)?);
    }
    let mut out = Vec::new();
    for len in [streams[0].len(), streams[1].len(), streams[2].len()] {
        Ctx.assert(len <= u16::MAX as usize, "huffman substream too large")?;
        out.extend_from_slice(&(len as u16).to_le_bytes());
    }
    for s in &streams {
        out.extend_from_slice(s);
    }
    Ok(out)
}

/// Inverse of [`encode_four_streams`]; `part_lens` gives the four
/// decompressed lengths (derived from the literal count, same split as the
/// encoder: `ceil(n/4)` for the first three streams, the remainder last).
pub(crate) fn decode_four_streams(dtable: &HuffmanDTable, bytes: &[u8], total_out: usize) -> Res<Vec<u8>> {
    if bytes.len() < 6 {
        return Ctx.corrupt("huffman 4-stream block missing jump table");
    }
    let l1 = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let l2 = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let l3 = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    let body = &bytes[6..];
    Ctx.assert_le(l1 + l2 + l3, body.len())?;
    let s1 = &body[0..l1];
    let s2 = &body[l1..l1 + l2];
    let s3 = &body[l1 + l2..l1 + l2 + l3];
    let s4 = &body[l1 + l2 + l3..];

    let chunk = total_out.div_ceil(4);
    let out_lens = [
        chunk.min(total_out),
        (2 * chunk).min(total_out).saturating_sub(chunk.min(total_out)),
        (3 * chunk).min(total_out).saturating_sub((2 * chunk).min(total_out)),
        total_out.saturating_sub((3 * chunk).min(total_out)),
    ];

    let mut out = Vec::with_capacity(total_out);
    for (stream, &len) in [s1, s2, s3, s4].iter().zip(out_lens.iter()) {
        out.extend(decode_stream(dtable, stream, len)?);
    }
    Ok(out)
}

/// Serializes Huffman weights (all but the implicit last symbol) as raw
/// 4-bit nibbles, per the `headerByte >= 128` branch of §4.2's weight
/// header. This encoder never emits the FSE-compressed form — a valid,
/// spec-legal simplification recorded in `DESIGN.md` — but decode supports
/// both so a `REPEAT`-free table from elsewhere in the format family would
/// still parse.
pub(crate) fn write_weights_raw(weights: &[u8]) -> Vec<u8> {
    let explicit = &weights[..weights.len() - 1];
    let mut out = Vec::with_capacity(1 + explicit.len().div_ceil(2));
    out.push(127 + explicit.len() as u8);
    for pair in explicit.chunks(2) {
        let hi = pair[0] & 0xF;
        let lo = pair.get(1).copied().unwrap_or(0) & 0xF;
        out.push((hi << 4) | lo);
    }
    out
}

/// Reads a weight header in either the raw or FSE-compressed form and
/// reconstructs the implicit last weight from the Kraft/power-of-two rule
/// in §4.2.
pub(crate) fn read_weights(data: &[u8]) -> Res<(Vec<u8>, usize)> {
    let header = *data.first().ok_or_else(|| {
        crate::error::ZstdError::new(crate::error::ErrorKind::Corruption, "missing huffman weight header")
    })?;
    let mut explicit = Vec::new();
    let consumed;
    if header >= 128 {
        let n = (header - 127) as usize;
        let nibble_bytes = n.div_ceil(2);
        let body = data.get(1..1 + nibble_bytes).ok_or_else(|| {
            crate::error::ZstdError::new(crate::error::ErrorKind::Corruption, "truncated huffman weight nibbles")
        })?;
        for &byte in body {
            explicit.push(byte >> 4);
            explicit.push(byte & 0xF);
        }
        explicit.truncate(n);
        consumed = 1 + nibble_bytes;
    } else {
        let fse_len = header as usize;
        let body = data.get(1..1 + fse_len).ok_or_else(|| {
            crate::error::ZstdError::new(crate::error::ErrorKind::Corruption, "truncated huffman fse weights")
        })?;
        let (counts, table_log, hdr_len) = fse::read_ncount(body, WEIGHT_ALPHABET_MAX, 6)?;
        let dtable = fse::build_dtable(&counts, table_log)?;
        let mut reader = BitReader::new(body, hdr_len, body.len())?;
        let mut decoder = fse::FseDecoder::new(&dtable, &mut reader)?;
        loop {
            explicit.push(decoder.symbol());
            if reader.is_finished() {
                break;
            }
            decoder.advance(&mut reader)?;
        }
        consumed = 1 + fse_len;
    }

    let total_weight: u32 = explicit.iter().map(|&w| if w == 0 { 0 } else { 1u32 << (w - 1) }).sum();
    Ctx.assert(total_weight > 0, "huffman weights sum to zero")?;
    let table_size = total_weight.next_power_of_two();
    let remaining = table_size - total_weight;
    let last_weight = if remaining == 0 {
        0
    } else {
        (remaining.trailing_zeros() + 1) as u8
    };
    let mut weights = explicit;
    weights.push(last_weight);
    Ok((weights, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_of(data: &[u8]) -> Vec<u32> {
        let mut c = vec![0u32; 256];
        for &b in data {
            c[b as usize] += 1;
        }
        c
    }

    #[test_log::test]
    fn single_stream_roundtrip() {
        let data = b"abracadabra huffman test data with enough repetition to matter";
        let (ctable, weights) = build_table(&counts_of(data), MAX_HUFFMAN_TABLE_LOG);
        let dtable = dtable_from_weights(&weights).unwrap();
        let encoded = encode_stream(&ctable, data).unwrap();
        let decoded = decode_stream(&dtable, &encoded, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test_log::test]
    fn four_stream_roundtrip() {
        let data: Vec<u8> = (0..2000).map(|i| ((i * 37) % 251) as u8).collect();
        let (ctable, weights) = build_table(&counts_of(&data), MAX_HUFFMAN_TABLE_LOG);
        let dtable = dtable_from_weights(&weights).unwrap();
        let encoded = encode_four_streams(&ctable, &data).unwrap();
        let decoded = decode_four_streams(&dtable, &encoded, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test_log::test]
    fn weight_header_roundtrip() {
        let data = b"some sample text to drive a realistic weight distribution here";
        let (_, weights) = build_table(&counts_of(data), MAX_HUFFMAN_TABLE_LOG);
        let header = write_weights_raw(&weights);
        let (decoded, consumed) = read_weights(&header).unwrap();
        assert_eq!(consumed, header.len());
        assert_eq!(decoded, weights);
    }

    #[test_log::test]
    fn single_symbol_alphabet() {
        let data = [7u8; 50];
        let (ctable, weights) = build_table(&counts_of(&data), MAX_HUFFMAN_TABLE_LOG);
        let dtable = dtable_from_weights(&weights).unwrap();
        let encoded = encode_stream(&ctable, &data).unwrap();
        let decoded = decode_stream(&dtable, &encoded, data.len()).unwrap();
        assert_eq!(decoded, data);
    }
}
