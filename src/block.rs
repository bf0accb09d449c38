//! Block assembly (C7): the 3-byte block header, the literals sub-section,
//! the sequences sub-section, and the mode-selection policy tying them to
//! the entropy coders in `huffman.rs`/`fse.rs`.
//!
//! The block header (last-block flag, 2-bit type, 21-bit size packed into
//! three little-endian bytes), the Literals_Section_Header's bit-packed
//! `Size_Format` fields (§3.1.1.3.1) and the Number_of_Sequences/
//! Symbol_Compression_Modes framing (§3.1.1.3.2.1.1) follow RFC 8478
//! exactly, as does the sequences section's single interleaved FSE
//! bitstream (§3.1.1.3.2.2): literal-length, match-length and offset state
//! transitions and their extra bits share one `BitWriter`/`BitReader`
//! rather than independent per-component blobs. See `execute_sequences`'s
//! trailing-literal copy for where the "last sequence" handling the spec
//! calls out lives.

use crate::bits::{BitReader, BitWriter};
use crate::error::{ErrorContext, ErrorKind, Res, SliceErrors, ZstdError};
use crate::fse::{self, FseDTable};
use crate::huffman::{self, HuffmanDTable};
use crate::params::CompressionParameters;
use crate::sequence::{self, RepeatOffsets, SeqCompressionMode, SequenceStore};
use crate::{match_engine, params};

struct Ctx;
impl ErrorContext for Ctx {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockType {
    Raw = 0,
    Rle = 1,
    Compressed = 2,
}

impl BlockType {
    fn from_bits(v: u32) -> Res<Self> {
        match v {
            0 => Ok(BlockType::Raw),
            1 => Ok(BlockType::Rle),
            2 => Ok(BlockType::Compressed),
            _ => Ctx.unsupported("reserved block type"),
        }
    }
}

pub(crate) struct BlockHeader {
    pub last: bool,
    pub block_type: BlockType,
    pub size: usize,
}

pub(crate) fn read_block_header(data: &[u8]) -> Res<BlockHeader> {
    let bytes = data.get_range(0, 3)?;
    let raw = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
    Ok(BlockHeader {
        last: raw & 1 != 0,
        block_type: BlockType::from_bits((raw >> 1) & 0b11)?,
        size: (raw >> 3) as usize,
    })
}

pub(crate) fn write_block_header(out: &mut Vec<u8>, last: bool, block_type: BlockType, size: usize) {
    let raw = (last as u32) | ((block_type as u32) << 1) | ((size as u32) << 3);
    out.push(raw as u8);
    out.push((raw >> 8) as u8);
    out.push((raw >> 16) as u8);
}

/// Per-frame state a [`crate::frame::Compressor`] carries across blocks:
/// repeat offsets and the last actually-used entropy table for each of the
/// four coded streams, enabling `Repeat`/`Treeless` modes.
#[derive(Default)]
pub(crate) struct CompressState {
    pub rep: RepeatOffsets,
    pub huffman: Option<Vec<u32>>, // last literal histogram used to build a table, for Treeless reuse
    pub ll: Option<(Vec<i32>, u32)>,
    pub of: Option<(Vec<i32>, u32)>,
    pub ml: Option<(Vec<i32>, u32)>,
}

#[derive(Default)]
pub(crate) struct DecodeState {
    pub rep: RepeatOffsets,
    pub huffman: Option<HuffmanDTable>,
    pub ll: Option<FseDTable>,
    pub of: Option<FseDTable>,
    pub ml: Option<FseDTable>,
}

/// Encodes one block's worth of `data` (already sliced to the frame's
/// block size), choosing Raw/RLE/Compressed by whichever is smallest.
pub(crate) fn encode_block(data: &[u8], params: &CompressionParameters, state: &mut CompressState) -> Vec<u8> {
    if !data.is_empty() && data.iter().all(|&b| b == data[0]) {
        return vec![data[0]];
    }

    match encode_compressed(data, params, state) {
        Some(payload) if payload.len() < data.len() => payload,
        _ => data.to_vec(),
    }
}

/// Determines which [`BlockType`] `encode_block`'s output corresponds to,
/// given the original (uncompressed) block bytes.
pub(crate) fn classify(data: &[u8], payload: &[u8]) -> BlockType {
    if payload.len() == 1 && data.len() != 1 && data.iter().all(|&b| b == data[0]) {
        BlockType::Rle
    } else if payload.len() == data.len() {
        BlockType::Raw
    } else {
        BlockType::Compressed
    }
}

fn encode_compressed(data: &[u8], params: &CompressionParameters, state: &mut CompressState) -> Option<Vec<u8>> {
    let (store, trailing) = match_engine::find_sequences(data, params);
    let mut literals = store.literals.clone();
    literals.extend_from_slice(&trailing);

    let mut out = Vec::new();
    encode_literals(&mut out, &literals, state);
    encode_sequences(&mut out, &store, state);
    Some(out)
}

pub(crate) fn decode_block(
    block_type: BlockType,
    payload: &[u8],
    decompressed_size: usize,
    out: &mut Vec<u8>,
    state: &mut DecodeState,
) -> Res<()> {
    match block_type {
        BlockType::Raw => {
            out.extend_from_slice(payload);
            Ok(())
        }
        BlockType::Rle => {
            let b = payload.first().copied().unwrap_or(0);
            out.resize(out.len() + decompressed_size, b);
            Ok(())
        }
        BlockType::Compressed => decode_compressed(payload, out, state),
    }
}

// ---------------------------------------------------------------- literals

#[derive(Clone, Copy)]
enum LiteralsMode {
    Raw = 0,
    Rle = 1,
    Compressed = 2,
    Treeless = 3,
}

/// Writes a Raw/RLE Literals_Section_Header (§3.1.1.3.1): `Literals_Block_Type`
/// in bits 0-1, `Size_Format` in bits 2-3 (0/1/3 selecting a 1/2/3-byte
/// header), and `Regenerated_Size` packed starting at bit 3 of byte 0.
fn write_literals_header_raw_rle(out: &mut Vec<u8>, mode: LiteralsMode, regen_size: usize) {
    let block_type = mode as u8;
    if regen_size < 32 {
        out.push(block_type | ((regen_size as u8) << 3));
    } else if regen_size < 4096 {
        let v = regen_size as u32;
        out.push(block_type | (1 << 2) | ((v as u8) << 4));
        out.push((v >> 4) as u8);
    } else {
        let v = regen_size as u32;
        out.push(block_type | (3 << 2) | ((v as u8) << 4));
        out.push((v >> 4) as u8);
        out.push((v >> 12) as u8);
    }
}

/// Inverse of [`write_literals_header_raw_rle`]; returns `(regen_size, header_len)`.
fn read_literals_header_raw_rle(data: &[u8]) -> Res<(usize, usize)> {
    let b0 = data.get_copy(0)? as u32;
    match (b0 >> 2) & 0b11 {
        0 | 2 => Ok(((b0 >> 3) as usize, 1)),
        1 => {
            let b1 = data.get_copy(1)? as u32;
            Ok(((((b0 >> 4) & 0xF) | (b1 << 4)) as usize, 2))
        }
        _ => {
            let b1 = data.get_copy(1)? as u32;
            let b2 = data.get_copy(2)? as u32;
            Ok(((((b0 >> 4) & 0xF) | (b1 << 4) | (b2 << 12)) as usize, 3))
        }
    }
}

/// Writes a Compressed/Treeless Literals_Section_Header: `Size_Format`
/// selects between the 1-stream (3-byte, 10-bit fields) and 4-stream
/// (3/4/5-byte, 10/14/18-bit fields) layouts per §3.1.1.3.1.
fn write_literals_header_compressed(
    out: &mut Vec<u8>,
    mode: LiteralsMode,
    regen_size: usize,
    comp_size: usize,
    four_stream: bool,
) {
    let block_type = mode as u64;
    if !four_stream || (regen_size < 1024 && comp_size < 1024) {
        let size_format = if four_stream { 1 } else { 0 };
        let v = (regen_size as u64) | ((comp_size as u64) << 10);
        let word = block_type | (size_format << 2) | (v << 4);
        out.push(word as u8);
        out.push((word >> 8) as u8);
        out.push((word >> 16) as u8);
    } else if regen_size < 16384 && comp_size < 16384 {
        let v = (regen_size as u64) | ((comp_size as u64) << 14);
        let word = block_type | (2 << 2) | (v << 4);
        out.push(word as u8);
        out.push((word >> 8) as u8);
        out.push((word >> 16) as u8);
        out.push((word >> 24) as u8);
    } else {
        let v = (regen_size as u64) | ((comp_size as u64) << 18);
        let word = block_type | (3 << 2) | (v << 4);
        out.push(word as u8);
        out.push((word >> 8) as u8);
        out.push((word >> 16) as u8);
        out.push((word >> 24) as u8);
        out.push((word >> 32) as u8);
    }
}

/// Inverse of [`write_literals_header_compressed`]; returns
/// `(four_stream, regen_size, comp_size, header_len)`.
fn read_literals_header_compressed(data: &[u8]) -> Res<(bool, usize, usize, usize)> {
    let b0 = data.get_copy(0)? as u64;
    match (b0 >> 2) & 0b11 {
        fmt @ (0 | 1) => {
            let b1 = data.get_copy(1)? as u64;
            let b2 = data.get_copy(2)? as u64;
            let v = (b0 | (b1 << 8) | (b2 << 16)) >> 4;
            Ok((fmt == 1, (v & 0x3FF) as usize, ((v >> 10) & 0x3FF) as usize, 3))
        }
        2 => {
            let b1 = data.get_copy(1)? as u64;
            let b2 = data.get_copy(2)? as u64;
            let b3 = data.get_copy(3)? as u64;
            let v = (b0 | (b1 << 8) | (b2 << 16) | (b3 << 24)) >> 4;
            Ok((true, (v & 0x3FFF) as usize, ((v >> 14) & 0x3FFF) as usize, 4))
        }
        _ => {
            let b1 = data.get_copy(1)? as u64;
            let b2 = data.get_copy(2)? as u64;
            let b3 = data.get_copy(3)? as u64;
            let b4 = data.get_copy(4)? as u64;
            let v = (b0 | (b1 << 8) | (b2 << 16) | (b3 << 24) | (b4 << 32)) >> 4;
            Ok((true, (v & 0x3FFFF) as usize, ((v >> 18) & 0x3FFFF) as usize, 5))
        }
    }
}

fn literal_histogram(data: &[u8]) -> Vec<u32> {
    let mut counts = vec![0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    counts
}

fn estimated_huffman_bits(counts: &[u32], table_log: u32) -> f64 {
    let total: u32 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    // a code of length `table_log + 1 - weight` would need building the
    // full table to know exactly; approximate via the same entropy
    // estimate used for FSE stream selection, which is what actually
    // drives the raw-vs-compressed decision.
    sequence::estimated_bits(counts, total)
}

fn encode_literals(out: &mut Vec<u8>, data: &[u8], state: &mut CompressState) {
    if data.is_empty() {
        write_literals_header_raw_rle(out, LiteralsMode::Raw, 0);
        return;
    }
    if data.iter().all(|&b| b == data[0]) {
        write_literals_header_raw_rle(out, LiteralsMode::Rle, data.len());
        out.push(data[0]);
        return;
    }

    let counts = literal_histogram(data);
    let raw_bits = data.len() as f64 * 8.0;
    let huff_bits = estimated_huffman_bits(&counts, huffman::MAX_HUFFMAN_TABLE_LOG);

    // minimum-gain threshold: only bother with a Huffman table if it beats
    // raw storage by more than the rough weight-header overhead.
    if huff_bits + 64.0 >= raw_bits {
        write_literals_header_raw_rle(out, LiteralsMode::Raw, data.len());
        out.extend_from_slice(data);
        return;
    }

    let can_treeless = state.huffman.is_some();
    let (ctable, weights, treeless) = if can_treeless {
        let prev_counts = state.huffman.as_ref().unwrap();
        let prev_weights_valid = counts.iter().zip(prev_counts.iter()).all(|(&c, &p)| c == 0 || p > 0);
        if prev_weights_valid {
            let (ctable, weights) = huffman::build_table(prev_counts, huffman::MAX_HUFFMAN_TABLE_LOG);
            (ctable, weights, true)
        } else {
            let (ctable, weights) = huffman::build_table(&counts, huffman::MAX_HUFFMAN_TABLE_LOG);
            (ctable, weights, false)
        }
    } else {
        let (ctable, weights) = huffman::build_table(&counts, huffman::MAX_HUFFMAN_TABLE_LOG);
        (ctable, weights, false)
    };

    let four_stream = data.len() >= 256;
    let encoded = if four_stream {
        huffman::encode_four_streams(&ctable, data)
    } else {
        huffman::encode_stream(&ctable, data)
    };
    let encoded = match encoded {
        Ok(e) => e,
        Err(_) => {
            write_literals_header_raw_rle(out, LiteralsMode::Raw, data.len());
            out.extend_from_slice(data);
            return;
        }
    };

    if encoded.len() as f64 >= raw_bits / 8.0 {
        write_literals_header_raw_rle(out, LiteralsMode::Raw, data.len());
        out.extend_from_slice(data);
        return;
    }

    let header = if treeless { Vec::new() } else { huffman::write_weights_raw(&weights) };
    let mode = if treeless { LiteralsMode::Treeless } else { LiteralsMode::Compressed };
    write_literals_header_compressed(out, mode, data.len(), header.len() + encoded.len(), four_stream);
    out.extend_from_slice(&header);
    out.extend_from_slice(&encoded);
    if !treeless {
        // Treeless reused the previously tracked histogram unchanged; only
        // a fresh Compressed table replaces what a future Treeless block
        // would reuse.
        state.huffman = Some(counts);
    }
}

fn decode_literals(data: &[u8], state: &mut DecodeState) -> Res<(Vec<u8>, usize)> {
    let b0 = *data.first().ok_or_else(|| ZstdError::new(ErrorKind::Corruption, "empty literals section"))?;
    let mode = b0 & 0b11;

    match mode {
        0 => {
            let (reg_size, hdr_len) = read_literals_header_raw_rle(data)?;
            let bytes = data.get_range(hdr_len, hdr_len + reg_size)?;
            Ok((bytes.to_vec(), hdr_len + reg_size))
        }
        1 => {
            let (reg_size, hdr_len) = read_literals_header_raw_rle(data)?;
            let b = data.get_copy(hdr_len)?;
            Ok((vec![b; reg_size], hdr_len + 1))
        }
        2 | 3 => {
            let (four_stream, reg_size, comp_size, hdr_len) = read_literals_header_compressed(data)?;
            let mut cursor = hdr_len;

            if mode == 2 {
                let header = data.get_range(cursor, data.len())?;
                let (weights, consumed) = huffman::read_weights(header)?;
                cursor += consumed;
                state.huffman = Some(huffman::dtable_from_weights(&weights)?);
            } else {
                Ctx.assert(state.huffman.is_some(), "treeless literals without a prior huffman table")?;
            }
            let table_ref = state.huffman.as_ref().unwrap();
            let end = hdr_len + comp_size;
            let body = data.get_range(cursor, end)?;
            let decoded = if four_stream {
                huffman::decode_four_streams(table_ref, body, reg_size)?
            } else {
                huffman::decode_stream(table_ref, body, reg_size)?
            };
            Ok((decoded, end))
        }
        _ => Ctx.corrupt("invalid literals block type"),
    }
}

// --------------------------------------------------------------- sequences

fn table_covers(counts: &[i32], codes: &[u8]) -> bool {
    codes
        .iter()
        .all(|&c| (c as usize) < counts.len() && counts[c as usize] != 0)
}

fn cost_with_table(counts: &[i32], table_log: u32, raw: &[u32]) -> f64 {
    let size = (1u32 << table_log) as f64;
    raw.iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .map(|(s, &c)| {
            let p = counts.get(s).copied().unwrap_or(0).unsigned_abs() as f64 / size;
            c as f64 * -p.max(1e-6).log2()
        })
        .sum()
}

struct StreamPlan {
    mode: SeqCompressionMode,
    counts: Vec<i32>,
    table_log: u32,
}

fn plan_stream(
    codes: &[u8],
    default_dist: &[i32],
    default_log: u32,
    max_log: u32,
    prev: &Option<(Vec<i32>, u32)>,
) -> StreamPlan {
    if codes.iter().all(|&c| c == codes[0]) {
        return StreamPlan {
            mode: SeqCompressionMode::Rle,
            counts: vec![codes[0] as i32],
            table_log: 0,
        };
    }

    let max_symbol = codes.iter().copied().max().unwrap() as usize;
    let mut raw = vec![0u32; max_symbol + 1];
    for &c in codes {
        raw[c as usize] += 1;
    }
    let total = codes.len() as u32;
    let fresh_counts = sequence::normalize_counts(&raw, total, max_log);
    let mut best = StreamPlan {
        mode: SeqCompressionMode::Compressed,
        counts: fresh_counts.clone(),
        table_log: max_log,
    };
    let mut best_cost = cost_with_table(&fresh_counts, max_log, &raw) + 6.0 * fresh_counts.len() as f64;

    if default_dist.len() > max_symbol && table_covers(default_dist, codes) {
        let cost = cost_with_table(default_dist, default_log, &raw);
        if cost < best_cost {
            best_cost = cost;
            best = StreamPlan {
                mode: SeqCompressionMode::Predefined,
                counts: default_dist.to_vec(),
                table_log: default_log,
            };
        }
    }
    if let Some((counts, log)) = prev {
        if table_covers(counts, codes) {
            let cost = cost_with_table(counts, *log, &raw);
            if cost < best_cost {
                best = StreamPlan {
                    mode: SeqCompressionMode::Repeat,
                    counts: counts.clone(),
                    table_log: *log,
                };
            }
        }
    }
    best
}

/// Builds the encode-side FSE table for a planned stream, mirroring
/// [`fse::rle_dtable`]'s decode-side stand-in for Rle mode (whose "counts"
/// field is really just the repeated symbol, not a distribution).
fn ctable_for_plan(plan: &StreamPlan) -> Res<fse::FseCTable> {
    if plan.mode == SeqCompressionMode::Rle {
        fse::rle_ctable(plan.counts[0] as u8)
    } else {
        fse::build_ctable(&plan.counts, plan.table_log)
    }
}

fn encode_sequences(out: &mut Vec<u8>, store: &SequenceStore, state: &mut CompressState) {
    let n = store.len();
    if n == 0 {
        out.push(0);
        return;
    }

    if n < 128 {
        out.push(n as u8);
    } else if n < 0x7F00 {
        let v = n - 128;
        out.push(0x80 | (v >> 8) as u8);
        out.push((v & 0xFF) as u8);
    } else {
        let v = n - 0x7F00;
        out.push(0xFF);
        out.push((v & 0xFF) as u8);
        out.push((v >> 8) as u8);
    }

    let mut rep = state.rep;
    let mut ll_codes = Vec::with_capacity(n);
    let mut ml_codes = Vec::with_capacity(n);
    let mut of_codes = Vec::with_capacity(n);

    struct Extra {
        ll: (u32, u8),
        ml: (u32, u8),
        of: (u32, u8),
    }
    let mut extras = Vec::with_capacity(n);

    for i in 0..n {
        let ll = store.literal_lengths[i];
        let ml = store.match_lengths[i];
        let offset_value = rep.encode(store.offsets[i], ll);
        let (llc, lle, llb) = sequence::ll_code(ll);
        let (mlc, mle, mlb) = sequence::ml_code(ml);
        let (ofc, ofe, ofb) = sequence::offset_code(offset_value);
        ll_codes.push(llc);
        ml_codes.push(mlc);
        of_codes.push(ofc);
        extras.push(Extra {
            ll: (lle, llb),
            ml: (mle, mlb),
            of: (ofe, ofb),
        });
    }
    state.rep = rep;

    let ll_plan = plan_stream(
        &ll_codes,
        &sequence::LL_DEFAULT_DISTRIBUTION,
        sequence::LL_DEFAULT_TABLE_LOG,
        9,
        &state.ll,
    );
    let of_plan = plan_stream(
        &of_codes,
        &sequence::OF_DEFAULT_DISTRIBUTION,
        sequence::OF_DEFAULT_TABLE_LOG,
        8,
        &state.of,
    );
    let ml_plan = plan_stream(
        &ml_codes,
        &sequence::ML_DEFAULT_DISTRIBUTION,
        sequence::ML_DEFAULT_TABLE_LOG,
        9,
        &state.ml,
    );

    out.push((ll_plan.mode as u8) | ((of_plan.mode as u8) << 2) | ((ml_plan.mode as u8) << 4));

    for plan in [&ll_plan, &of_plan, &ml_plan] {
        match plan.mode {
            SeqCompressionMode::Rle => out.push(plan.counts[0] as u8),
            SeqCompressionMode::Compressed => {
                out.extend_from_slice(&fse::write_ncount(&plan.counts, plan.table_log))
            }
            SeqCompressionMode::Predefined | SeqCompressionMode::Repeat => {}
        }
    }

    // Rle mode's "counts" is just the repeated symbol, not a reusable
    // distribution, so it must not clobber what a later Repeat block would
    // reuse; Predefined/Compressed/Repeat all leave a genuine table behind.
    for (plan, slot) in [
        (&ll_plan, &mut state.ll),
        (&of_plan, &mut state.of),
        (&ml_plan, &mut state.ml),
    ] {
        if plan.mode != SeqCompressionMode::Rle {
            *slot = Some((plan.counts.clone(), plan.table_log));
        }
    }

    // RFC 8478's sequences section carries the LL/ML/OF FSE states and every
    // sequence's extra bits in one shared bitstream (§3.1.1.3.2.2), written
    // backward like any tANS stream: the 3 initial states come first, then
    // for each sequence but the last, its extra bits followed by the state
    // transition that consumes its code, then the final sequence's extra
    // bits on their own (no transition follows the last sequence).
    let ll_ctable = ctable_for_plan(&ll_plan).expect("valid plan counts");
    let of_ctable = ctable_for_plan(&of_plan).expect("valid plan counts");
    let ml_ctable = ctable_for_plan(&ml_plan).expect("valid plan counts");

    let mut ll_enc = fse::FseEncoder::new(&ll_ctable, ll_codes[n - 1]);
    let mut ml_enc = fse::FseEncoder::new(&ml_ctable, ml_codes[n - 1]);
    let mut of_enc = fse::FseEncoder::new(&of_ctable, of_codes[n - 1]);

    // Computed backward (tANS states can only be built that way), one block
    // of 6 chunks per sequence 0..n-2; blocks are replayed in reverse below
    // so the stream reads in ascending sequence order.
    let mut blocks: Vec<[(u32, u32); 6]> = Vec::with_capacity(n - 1);
    for i in (0..n - 1).rev() {
        let e = &extras[i];
        blocks.push([
            (e.ll.0, e.ll.1 as u32),
            (e.ml.0, e.ml.1 as u32),
            (e.of.0, e.of.1 as u32),
            ll_enc.step(ll_codes[i]),
            ml_enc.step(ml_codes[i]),
            of_enc.step(of_codes[i]),
        ]);
    }

    let mut writer = BitWriter::new();
    let (ll_init, ll_bits) = ll_enc.flush();
    let (ml_init, ml_bits) = ml_enc.flush();
    let (of_init, of_bits) = of_enc.flush();
    writer.push(ll_init, ll_bits);
    writer.push(ml_init, ml_bits);
    writer.push(of_init, of_bits);
    for block in blocks.iter().rev() {
        for &(value, bits) in block {
            writer.push(value, bits);
        }
    }
    let last = &extras[n - 1];
    writer.push(last.ll.0, last.ll.1 as u32);
    writer.push(last.ml.0, last.ml.1 as u32);
    writer.push(last.of.0, last.of.1 as u32);

    out.extend_from_slice(&writer.finish());
}

fn read_seq_count(data: &[u8]) -> Res<(usize, usize)> {
    let b0 = data.get_copy(0)? as usize;
    if b0 == 0 {
        Ok((0, 1))
    } else if b0 < 128 {
        Ok((b0, 1))
    } else if b0 < 255 {
        let b1 = data.get_copy(1)? as usize;
        Ok((((b0 - 128) << 8) + b1, 2))
    } else {
        let b1 = data.get_copy(1)? as usize;
        let b2 = data.get_copy(2)? as usize;
        Ok((b1 + (b2 << 8) + 0x7F00, 3))
    }
}

fn read_stream_table(
    data: &[u8],
    mode: SeqCompressionMode,
    default_dist: &[i32],
    default_log: u32,
    max_log: u32,
    max_symbol_hint: usize,
    prev: &Option<FseDTable>,
) -> Res<(Option<FseDTable>, usize)> {
    match mode {
        SeqCompressionMode::Rle => {
            let symbol = data.get_copy(0)?;
            Ok((Some(fse::rle_dtable(symbol)), 1))
        }
        SeqCompressionMode::Predefined => {
            Ok((Some(fse::build_dtable(default_dist, default_log)?), 0))
        }
        SeqCompressionMode::Repeat => {
            Ctx.assert(prev.is_some(), "repeat mode without a prior table")?;
            Ok((None, 0))
        }
        SeqCompressionMode::Compressed => {
            let (counts, log, consumed) = fse::read_ncount(data, max_symbol_hint, max_log)?;
            Ok((Some(fse::build_dtable(&counts, log)?), consumed))
        }
    }
}

fn decode_compressed(payload: &[u8], out: &mut Vec<u8>, state: &mut DecodeState) -> Res<()> {
    let (literals, cursor) = decode_literals(payload, state)?;
    let rest = payload.get_range(cursor, payload.len())?;

    let (n_seq, mut pos) = read_seq_count(rest)?;
    if n_seq == 0 {
        out.extend_from_slice(&literals);
        return Ok(());
    }

    let modes_byte = rest.get_copy(pos)?;
    pos += 1;
    let ll_mode = seq_mode_from_bits(modes_byte & 0b11)?;
    let of_mode = seq_mode_from_bits((modes_byte >> 2) & 0b11)?;
    let ml_mode = seq_mode_from_bits((modes_byte >> 4) & 0b11)?;

    let (ll_new, n) = read_stream_table(
        &rest[pos..],
        ll_mode,
        &sequence::LL_DEFAULT_DISTRIBUTION,
        sequence::LL_DEFAULT_TABLE_LOG,
        9,
        35,
        &state.ll,
    )?;
    pos += n;
    let (of_new, n) = read_stream_table(
        &rest[pos..],
        of_mode,
        &sequence::OF_DEFAULT_DISTRIBUTION,
        sequence::OF_DEFAULT_TABLE_LOG,
        8,
        31,
        &state.of,
    )?;
    pos += n;
    let (ml_new, n) = read_stream_table(
        &rest[pos..],
        ml_mode,
        &sequence::ML_DEFAULT_DISTRIBUTION,
        sequence::ML_DEFAULT_TABLE_LOG,
        9,
        52,
        &state.ml,
    )?;
    pos += n;

    // An Rle table is a throwaway single-entry stand-in used only to decode
    // this block's own stream; it must not become what a later Repeat block
    // resolves against (see the matching comment in `encode_sequences`).
    if ll_mode != SeqCompressionMode::Rle {
        if let Some(t) = ll_new {
            state.ll = Some(t);
        }
    }
    if of_mode != SeqCompressionMode::Rle {
        if let Some(t) = of_new {
            state.of = Some(t);
        }
    }
    if ml_mode != SeqCompressionMode::Rle {
        if let Some(t) = ml_new {
            state.ml = Some(t);
        }
    }

    let ll_table = state.ll.as_ref().unwrap();
    let of_table = state.of.as_ref().unwrap();
    let ml_table = state.ml.as_ref().unwrap();

    // The rest of the block payload is the single interleaved FSE bitstream
    // (§3.1.1.3.2.2): no length prefix, it simply runs to the end.
    let bitstream = rest.get_range(pos, rest.len())?;
    let mut reader = BitReader::new(bitstream, 0, bitstream.len())?;

    let mut ll_dec = fse::FseDecoder::new(ll_table, &mut reader)?;
    let mut ml_dec = fse::FseDecoder::new(ml_table, &mut reader)?;
    let mut of_dec = fse::FseDecoder::new(of_table, &mut reader)?;

    let mut ll_vals = Vec::with_capacity(n_seq);
    let mut ml_vals = Vec::with_capacity(n_seq);
    let mut offsets = Vec::with_capacity(n_seq);

    for i in 0..n_seq {
        let (ll_base, ll_bits) = sequence::LL_CODE_TABLE[ll_dec.symbol() as usize];
        let ll_extra = reader.take(ll_bits as u32)?;
        let ll = ll_base + ll_extra;

        let (ml_base, ml_bits) = sequence::ML_CODE_TABLE[ml_dec.symbol() as usize];
        let ml_extra = reader.take(ml_bits as u32)?;
        let ml = ml_base + ml_extra;

        let of_code = of_dec.symbol();
        let of_extra = reader.take(of_code as u32)?;
        let offset_value = (1u32 << of_code) + of_extra;

        if i < n_seq - 1 {
            ll_dec.advance(&mut reader)?;
            ml_dec.advance(&mut reader)?;
            of_dec.advance(&mut reader)?;
        }

        let offset = state.rep.resolve(offset_value, ll)?;
        ll_vals.push(ll);
        ml_vals.push(ml);
        offsets.push(offset);
    }

    execute_sequences(out, &literals, &ll_vals, &ml_vals, &offsets)
}

fn seq_mode_from_bits(v: u8) -> Res<SeqCompressionMode> {
    match v {
        0 => Ok(SeqCompressionMode::Predefined),
        1 => Ok(SeqCompressionMode::Rle),
        2 => Ok(SeqCompressionMode::Compressed),
        3 => Ok(SeqCompressionMode::Repeat),
        _ => unreachable!(),
    }
}

/// Replays literals and match copies into `out`, finishing with any
/// trailing literal bytes that belong to no sequence — the "last
/// sequence" special case from the Design Notes.
fn execute_sequences(
    out: &mut Vec<u8>,
    literals: &[u8],
    ll: &[u32],
    ml: &[u32],
    offsets: &[u32],
) -> Res<()> {
    let mut cursor = 0usize;
    for i in 0..ll.len() {
        let n = ll[i] as usize;
        let chunk = literals.get_range(cursor, cursor + n)?;
        out.extend_from_slice(chunk);
        cursor += n;

        let offset = offsets[i] as usize;
        Ctx.assert(offset != 0 && offset <= out.len(), "match offset out of range")?;
        let match_len = ml[i] as usize;
        for _ in 0..match_len {
            let b = out[out.len() - offset];
            out.push(b);
        }
    }
    out.extend_from_slice(&literals[cursor..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn rle_block_roundtrips() {
        let data = vec![b'x'; 500];
        let mut cstate = CompressState::default();
        let p = params::derive(3, data.len());
        let payload = encode_block(&data, &p, &mut cstate);
        let block_type = classify(&data, &payload);
        assert_eq!(block_type, BlockType::Rle);

        let mut dstate = DecodeState::default();
        let mut out = Vec::new();
        decode_block(block_type, &payload, data.len(), &mut out, &mut dstate).unwrap();
        assert_eq!(out, data);
    }

    #[test_log::test]
    fn compressed_block_roundtrips() {
        let data = b"the quick brown fox jumps over the lazy dog. the quick brown fox jumps over the lazy dog again and again and again."
            .to_vec();
        let mut cstate = CompressState::default();
        let p = params::derive(6, data.len());
        let payload = encode_block(&data, &p, &mut cstate);
        let block_type = classify(&data, &payload);

        let mut dstate = DecodeState::default();
        let mut out = Vec::new();
        decode_block(block_type, &payload, data.len(), &mut out, &mut dstate).unwrap();
        assert_eq!(out, data);
    }

    #[test_log::test]
    fn raw_block_for_incompressible_data() {
        let data: Vec<u8> = (0..400u32).map(|i| (i.wrapping_mul(2654435761) >> 20) as u8).collect();
        let mut cstate = CompressState::default();
        let p = params::derive(3, data.len());
        let payload = encode_block(&data, &p, &mut cstate);

        let mut dstate = DecodeState::default();
        let mut out = Vec::new();
        let block_type = classify(&data, &payload);
        decode_block(block_type, &payload, data.len(), &mut out, &mut dstate).unwrap();
        assert_eq!(out, data);
    }

    #[test_log::test]
    fn repeat_mode_reuses_prior_table_across_blocks() {
        let data1 = b"aaaaaaaabbbbbbbbccccccccddddddddaaaaaaaabbbbbbbbccccccccdddddddd".to_vec();
        let data2 = b"aaaaaaaabbbbbbbbccccccccddddddddaaaaaaaabbbbbbbbccccccccdddddddd".to_vec();
        let p = params::derive(6, data1.len());
        let mut cstate = CompressState::default();
        let payload1 = encode_block(&data1, &p, &mut cstate);
        let payload2 = encode_block(&data2, &p, &mut cstate);

        let mut dstate = DecodeState::default();
        let mut out = Vec::new();
        decode_block(classify(&data1, &payload1), &payload1, data1.len(), &mut out, &mut dstate).unwrap();
        decode_block(classify(&data2, &payload2), &payload2, data2.len(), &mut out, &mut dstate).unwrap();
        let mut expected = data1;
        expected.extend_from_slice(&data2);
        assert_eq!(out, expected);
    }
}
