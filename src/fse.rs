//! Finite-State Entropy coding (C3): normalized-count header I/O, decoding
//! table construction, and the encode/decode state machine used for the
//! literal-length, match-length and offset-code streams (§4.3).
//!
//! The decoding table build (`build_dtable`) and the normalized-count wire
//! format (`read_ncount`/`write_ncount`) follow RFC 8478 directly: symbols
//! with normalized count `-1` occupy the high end of the table one slot
//! each, the rest are spread with the canonical
//! `(tableSize>>1)+(tableSize>>3)+3` step, and a run of "probability zero"
//! symbols is header-encoded with a 2-bit/0xFFFF-escalating run length
//! exactly as described in §4.3.
//!
//! The accompanying encode table (`build_ctable`) is the standard
//! cumulative-position / symbol-transform construction paired with it
//! (`deltaNbBits`/`deltaFindState`), run in reverse over the symbol
//! sequence the way tANS implementations always do: the sequence is pushed
//! last-symbol-first so that reading forward from the final flushed state
//! reproduces it in original order.

use crate::bits::{BitReader, BitWriter};
use crate::error::{ErrorContext, ErrorKind, Res, SliceErrors, ZstdError};

pub const MIN_TABLE_LOG: u32 = 5;

struct Ctx;
impl ErrorContext for Ctx {}

fn highbit_u32(x: u32) -> u32 {
    debug_assert_ne!(x, 0);
    31 - x.leading_zeros()
}

/// Reads the low `n` bits (0 ≤ n ≤ 32) of `data` starting at bit offset
/// `bit_pos`, little-endian, LSB-first — the plain forward bit order used
/// by the normalized-count header (distinct from the reversed convention
/// in `bits.rs` used for the FSE/Huffman payload itself).
fn peek_forward_bits(data: &[u8], bit_pos: usize, n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let byte_start = bit_pos / 8;
    let bit_off = (bit_pos % 8) as u32;
    let mut buf = [0u8; 5];
    for (i, slot) in buf.iter_mut().enumerate() {
        if let Some(&b) = data.get(byte_start + i) {
            *slot = b;
        }
    }
    let word = u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], 0, 0, 0]);
    ((word >> bit_off) & ((1u64 << n) - 1)) as u32
}

/// Reads a normalized-count header per §4.3: `tableLog` (4 bits +
/// `MIN_TABLE_LOG`) followed by a variable-length stream of count deltas
/// with a zero-run shortcut. Returns `(counts, tableLog, bytesConsumed)`;
/// `counts` is truncated to the actual highest symbol observed even if
/// `max_symbol_hint` was larger.
pub(crate) fn read_ncount(
    data: &[u8],
    max_symbol_hint: usize,
    max_table_log: u32,
) -> Res<(Vec<i32>, u32, usize)> {
    let mut bit_pos = 0usize;
    let mut rb = |n: u32| -> u32 {
        let v = peek_forward_bits(data, bit_pos, n);
        bit_pos += n as usize;
        v
    };

    let table_log = rb(4) + MIN_TABLE_LOG;
    if table_log > max_table_log {
        return Ctx.corrupt(format!("FSE tableLog {table_log} exceeds max {max_table_log}"));
    }

    let mut remaining: i64 = (1i64 << table_log) + 1;
    let mut threshold: i64 = 1i64 << table_log;
    let mut nbbits = table_log + 1;
    let mut charnum = 0usize;
    let mut previous0 = false;
    let mut counts = vec![0i32; max_symbol_hint + 1];

    while remaining > 1 && charnum <= max_symbol_hint {
        if previous0 {
            let mut n0 = charnum;
            loop {
                let two = rb(2);
                if two == 3 {
                    n0 += 3;
                } else {
                    n0 += two as usize;
                    break;
                }
            }
            if n0 > max_symbol_hint + 1 {
                return Ctx.corrupt("FSE zero-run overruns symbol table");
            }
            while charnum < n0 {
                counts[charnum] = 0;
                charnum += 1;
            }
            if charnum > max_symbol_hint {
                break;
            }
        }

        let peeked = peek_forward_bits(data, bit_pos, nbbits) as i64;
        let low_mask = threshold - 1;
        let max = (2 * threshold - 1) - remaining;
        let masked_low = peeked & low_mask;
        let mut count;
        if masked_low < max {
            count = masked_low;
            bit_pos += (nbbits - 1) as usize;
        } else {
            let full_mask = 2 * threshold - 1;
            count = peeked & full_mask;
            if count >= threshold {
                count -= max;
            }
            bit_pos += nbbits as usize;
        }
        count -= 1;
        remaining -= count.abs();
        counts[charnum] = count as i32;
        charnum += 1;
        previous0 = count == 0;
        while remaining < threshold {
            nbbits -= 1;
            threshold >>= 1;
        }
    }

    if remaining != 1 {
        return Ctx.corrupt("FSE normalized counts do not sum to table size");
    }
    counts.truncate(charnum);
    let bytes_consumed = bit_pos.div_ceil(8);
    Ok((counts, table_log, bytes_consumed))
}

/// Mirrors [`read_ncount`] on the write side, used when the encoder selects
/// `COMPRESSED` mode for a sequence stream.
pub(crate) fn write_ncount(counts: &[i32], table_log: u32) -> Vec<u8> {
    let table_size = 1i64 << table_log;
    let mut bits: Vec<(u32, u32)> = Vec::new();
    bits.push((table_log - MIN_TABLE_LOG, 4));

    let mut remaining: i64 = table_size + 1;
    let mut threshold: i64 = table_size;
    let mut nbbits = table_log + 1;
    let mut charnum = 0usize;
    let mut previous0 = false;

    while charnum < counts.len() {
        let count = counts[charnum] as i64;
        if previous0 {
            // count the run of zeroes starting here
            let mut run = 0usize;
            while charnum + run < counts.len() && counts[charnum + run] == 0 {
                run += 1;
            }
            let mut n0 = run;
            while n0 >= 3 {
                bits.push((3, 2));
                n0 -= 3;
            }
            bits.push((n0 as u32, 2));
            charnum += run;
            previous0 = false;
            continue;
        }

        let biased = count + 1;
        if biased < threshold {
            bits.push((biased as u32, nbbits - 1));
        } else {
            let max = (2 * threshold - 1) - remaining;
            let mut v = biased;
            if v >= threshold {
                v += max;
            }
            bits.push((v as u32, nbbits));
        }
        remaining -= count.abs();
        previous0 = count == 0;
        charnum += 1;
        while remaining < threshold {
            nbbits -= 1;
            threshold >>= 1;
        }
    }

    // This header is read forward, LSB-first (see `peek_forward_bits`), the
    // opposite convention from the reversed Huffman/FSE payload stream in
    // `bits.rs`, so it is packed directly here rather than through
    // `BitWriter`.
    let mut forward_bits: Vec<bool> = Vec::new();
    for (value, n) in bits {
        for i in 0..n {
            forward_bits.push((value >> i) & 1 != 0);
        }
    }
    let pad = (8 - (forward_bits.len() % 8)) % 8;
    forward_bits.resize(forward_bits.len() + pad, false);

    let mut out = Vec::with_capacity(forward_bits.len() / 8);
    for byte_bits in forward_bits.chunks_exact(8) {
        let mut byte = 0u8;
        for (i, bit) in byte_bits.iter().enumerate() {
            if *bit {
                byte |= 1 << i;
            }
        }
        out.push(byte);
    }
    out
}

#[derive(Clone, Copy, Default)]
pub(crate) struct DTableEntry {
    pub symbol: u8,
    pub nb_bits: u8,
    pub new_state: u16,
}

pub(crate) struct FseDTable {
    pub table_log: u32,
    pub entries: Vec<DTableEntry>,
}

/// Builds a decode table from normalized counts, per §4.3: `-1` entries
/// occupy the high end of the table one slot each, the rest are spread
/// with the canonical step, and every cell must be visited exactly once.
pub(crate) fn build_dtable(counts: &[i32], table_log: u32) -> Res<FseDTable> {
    let table_size = 1usize << table_log;
    let mut symbol_next = vec![0u32; counts.len()];
    let mut table_symbol = vec![0u8; table_size];
    let mut high_threshold = table_size - 1;

    for (s, &c) in counts.iter().enumerate() {
        if c == -1 {
            table_symbol[high_threshold] = s as u8;
            high_threshold -= 1;
            symbol_next[s] = 1;
        } else {
            symbol_next[s] = c.max(0) as u32;
        }
    }

    let table_mask = table_size - 1;
    let step = (table_size >> 1) + (table_size >> 3) + 3;
    let mut position = 0usize;
    for (s, &c) in counts.iter().enumerate() {
        if c <= 0 {
            continue;
        }
        for _ in 0..c {
            table_symbol[position] = s as u8;
            position = (position + step) & table_mask;
            while position > high_threshold {
                position = (position + step) & table_mask;
            }
        }
    }
    if position != 0 {
        return Ctx.corrupt("FSE spread did not cover every table cell");
    }

    let mut entries = vec![DTableEntry::default(); table_size];
    for (u, entry) in entries.iter_mut().enumerate() {
        let symbol = table_symbol[u];
        let next_state = symbol_next[symbol as usize];
        symbol_next[symbol as usize] += 1;
        let nb_bits = (table_log - highbit_u32(next_state)) as u8;
        let new_state = ((next_state << nb_bits) - table_size as u32) as u16;
        *entry = DTableEntry {
            symbol,
            nb_bits,
            new_state,
        };
    }

    Ok(FseDTable { table_log, entries })
}

/// A single-symbol RLE "table": every state maps to the same symbol with
/// zero bits consumed.
pub(crate) fn rle_dtable(symbol: u8) -> FseDTable {
    FseDTable {
        table_log: 0,
        entries: vec![DTableEntry {
            symbol,
            nb_bits: 0,
            new_state: 0,
        }],
    }
}

pub(crate) struct FseDecoder<'a> {
    table: &'a FseDTable,
    state: usize,
}

impl<'a> FseDecoder<'a> {
    pub fn new(table: &'a FseDTable, reader: &mut BitReader) -> Res<Self> {
        let state = reader.take(table.table_log)? as usize;
        Ok(FseDecoder { table, state })
    }

    pub fn symbol(&self) -> u8 {
        self.table.entries[self.state].symbol
    }

    pub fn advance(&mut self, reader: &mut BitReader) -> Res<()> {
        let entry = &self.table.entries[self.state];
        let extra = reader.take(entry.nb_bits as u32)?;
        self.state = entry.new_state as usize + extra as usize;
        Ok(())
    }
}

struct SymbolTransform {
    delta_nb_bits: u32,
    delta_find_state: i32,
}

pub(crate) struct FseCTable {
    table_log: u32,
    table_size: u32,
    state_table: Vec<u16>,
    transforms: Vec<SymbolTransform>,
}

/// Builds the matching encode table for `counts`, by the classic
/// cumulative-position / symbol-transform construction (mirrors
/// `build_dtable`'s spread so the two stay in lock-step).
pub(crate) fn build_ctable(counts: &[i32], table_log: u32) -> Res<FseCTable> {
    let table_size = 1u32 << table_log;
    let max_symbol = counts.len() - 1;
    let mut high_threshold = table_size - 1;
    let mut cumul = vec![0u32; counts.len() + 1];
    let mut table_symbol = vec![0u8; table_size as usize];

    for u in 1..=max_symbol + 1 {
        let s = u - 1;
        if counts[s] == -1 {
            cumul[u] = cumul[u - 1] + 1;
            table_symbol[high_threshold as usize] = s as u8;
            high_threshold -= 1;
        } else {
            cumul[u] = cumul[u - 1] + counts[s].max(0) as u32;
        }
    }

    let table_mask = table_size - 1;
    let step = (table_size >> 1) + (table_size >> 3) + 3;
    let mut position = 0u32;
    for (s, &c) in counts.iter().enumerate() {
        if c <= 0 {
            continue;
        }
        for _ in 0..c {
            table_symbol[position as usize] = s as u8;
            position = (position + step) & table_mask;
            while position > high_threshold {
                position = (position + step) & table_mask;
            }
        }
    }
    if position != 0 {
        return Ctx.corrupt("FSE encode-table spread did not cover every cell");
    }

    let mut cumul_cursor = cumul.clone();
    let mut state_table = vec![0u16; table_size as usize];
    for u in 0..table_size {
        let s = table_symbol[u as usize] as usize;
        let idx = cumul_cursor[s];
        state_table[idx as usize] = (table_size + u) as u16;
        cumul_cursor[s] += 1;
    }

    let mut transforms = Vec::with_capacity(counts.len());
    for (s, &c) in counts.iter().enumerate() {
        let t = match c {
            0 => SymbolTransform {
                delta_nb_bits: ((table_log + 1) << 16).wrapping_sub(table_size),
                delta_find_state: 0,
            },
            -1 | 1 => SymbolTransform {
                delta_nb_bits: (table_log << 16).wrapping_sub(table_size),
                delta_find_state: cumul[s] as i32 - 1,
            },
            freq => {
                let freq = freq as u32;
                let max_bits_out = table_log - highbit_u32(freq - 1);
                let min_state_plus = freq << max_bits_out;
                SymbolTransform {
                    delta_nb_bits: (max_bits_out << 16).wrapping_sub(min_state_plus),
                    delta_find_state: cumul[s] as i32 - freq as i32,
                }
            }
        };
        transforms.push(t);
    }

    Ok(FseCTable {
        table_log,
        table_size,
        state_table,
        transforms,
    })
}

/// Encodes `symbols` (already in forward/logical order) into a standalone
/// bit-packed buffer, processing them last-to-first the way tANS always
/// does. Returns the bytes; the initial flushed state is embedded as the
/// first `table_log` bits a [`BitReader`] over the result will yield.
pub(crate) fn encode_symbols(ctable: &FseCTable, symbols: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    if symbols.is_empty() {
        return writer.finish();
    }

    let last = *symbols.last().unwrap() as usize;
    let t = &ctable.transforms[last];
    let nb_bits_out = (t.delta_nb_bits.wrapping_add(1 << 15)) >> 16;
    let mut state = (nb_bits_out << 16).wrapping_sub(t.delta_nb_bits);
    state = ctable.state_table[(state >> nb_bits_out) as usize + t.delta_find_state as usize] as u32;

    // collected in chronological computation order, reversed before pushing
    let mut chunks: Vec<(u32, u32)> = Vec::with_capacity(symbols.len());
    for &sym in symbols[..symbols.len() - 1].iter().rev() {
        let t = &ctable.transforms[sym as usize];
        let nb_bits_out = (state.wrapping_add(t.delta_nb_bits)) >> 16;
        let mask = if nb_bits_out == 0 {
            0
        } else {
            (1u32 << nb_bits_out) - 1
        };
        chunks.push((state & mask, nb_bits_out));
        let idx = (state >> nb_bits_out) as i32 + t.delta_find_state;
        state = ctable.state_table[idx as usize] as u32;
    }

    writer.push(state - ctable.table_size, ctable.table_log);
    for &(value, n) in chunks.iter().rev() {
        writer.push(value, n);
    }
    writer.finish()
}

/// Steppable encoder counterpart to [`FseDecoder`]: exposes one state
/// transition at a time instead of encoding a whole symbol run into a
/// standalone buffer, so a caller can interleave several FSE streams (plus
/// other bitstream content) into one shared [`BitWriter`] — used by the
/// sequences section's single interleaved bitstream (§3.1.1.3.2.2), which
/// carries the literal-length, match-length and offset FSE states and their
/// extra bits together rather than as separate per-component blobs.
pub(crate) struct FseEncoder<'a> {
    ctable: &'a FseCTable,
    state: u32,
}

impl<'a> FseEncoder<'a> {
    /// Initializes from the *last* symbol of the sequence being encoded —
    /// tANS encoding always runs backward from the end — producing no bits
    /// yet; the state this leaves behind is what [`flush`](Self::flush)
    /// later reports.
    pub fn new(ctable: &'a FseCTable, last_symbol: u8) -> Self {
        let t = &ctable.transforms[last_symbol as usize];
        let nb_bits_out = (t.delta_nb_bits.wrapping_add(1 << 15)) >> 16;
        let mut state = (nb_bits_out << 16).wrapping_sub(t.delta_nb_bits);
        state = ctable.state_table[(state >> nb_bits_out) as usize + t.delta_find_state as usize] as u32;
        FseEncoder { ctable, state }
    }

    /// Transitions to the symbol one step earlier in the original sequence,
    /// returning the `(value, nb_bits)` chunk the caller must push to the
    /// shared bitstream (in the same relative position a standalone
    /// [`encode_symbols`] call would push it).
    pub fn step(&mut self, symbol: u8) -> (u32, u32) {
        let t = &self.ctable.transforms[symbol as usize];
        let nb_bits_out = (self.state.wrapping_add(t.delta_nb_bits)) >> 16;
        let mask = if nb_bits_out == 0 { 0 } else { (1u32 << nb_bits_out) - 1 };
        let value = self.state & mask;
        let idx = (self.state >> nb_bits_out) as i32 + t.delta_find_state;
        self.state = self.ctable.state_table[idx as usize] as u32;
        (value, nb_bits_out)
    }

    /// The final flushed state to embed as this stream's leading
    /// `table_log` bits, once every earlier symbol has been
    /// [`step`](Self::step)ped through in original-sequence order (last to
    /// first).
    pub fn flush(&self) -> (u32, u32) {
        (self.state - self.ctable.table_size, self.ctable.table_log)
    }
}

/// Builds a one-symbol encode table for an Rle-mode sequence stream,
/// mirroring [`rle_dtable`] on the decode side: every occurrence of
/// `symbol` costs zero bits.
pub(crate) fn rle_ctable(symbol: u8) -> Res<FseCTable> {
    let mut counts = vec![0i32; symbol as usize + 1];
    counts[symbol as usize] = 1;
    build_ctable(&counts, 0)
}

/// Decodes exactly `count` symbols from `reader`, the inverse of
/// [`encode_symbols`].
pub(crate) fn decode_symbols(table: &FseDTable, reader: &mut BitReader, count: usize) -> Res<Vec<u8>> {
    let mut out = Vec::with_capacity(count);
    if count == 0 {
        return Ok(out);
    }
    let mut decoder = FseDecoder::new(table, reader)?;
    out.push(decoder.symbol());
    for _ in 1..count {
        decoder.advance(reader)?;
        out.push(decoder.symbol());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_for(symbols: &[u8], table_log: u32) -> Vec<i32> {
        let max_symbol = *symbols.iter().max().unwrap() as usize;
        let mut raw = vec![0u32; max_symbol + 1];
        for &s in symbols {
            raw[s as usize] += 1;
        }
        crate::sequence::normalize_counts(&raw, symbols.len() as u32, table_log)
    }

    #[test_log::test]
    fn roundtrip_symbol_stream() {
        let symbols: Vec<u8> = (0..200).map(|i| (i % 5) as u8).collect();
        let counts = counts_for(&symbols, 7);
        let ctable = build_ctable(&counts, 7).unwrap();
        let dtable = build_dtable(&counts, 7).unwrap();

        let bytes = encode_symbols(&ctable, &symbols);
        let mut reader = BitReader::new(&bytes, 0, bytes.len()).unwrap();
        let decoded = decode_symbols(&dtable, &mut reader, symbols.len()).unwrap();
        assert_eq!(decoded, symbols);
    }

    #[test_log::test]
    fn ncount_roundtrip() {
        let symbols: Vec<u8> = vec![0, 0, 0, 1, 1, 2, 3, 3, 3, 3];
        let max_symbol = 3usize;
        let mut raw = vec![0u32; max_symbol + 1];
        for &s in &symbols {
            raw[s as usize] += 1;
        }
        let table_log = 6;
        let counts = crate::sequence::normalize_counts(&raw, symbols.len() as u32, table_log);
        let header = write_ncount(&counts, table_log);
        let (decoded_counts, decoded_log, _) = read_ncount(&header, max_symbol, 9).unwrap();
        assert_eq!(decoded_log, table_log);
        assert_eq!(decoded_counts, counts);
    }

    #[test_log::test]
    fn single_symbol_rle_roundtrips() {
        let table = rle_dtable(42);
        let mut writer = BitWriter::new();
        writer.push(0, 0);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes, 0, bytes.len()).unwrap();
        let decoded = decode_symbols(&table, &mut reader, 5).unwrap();
        assert_eq!(decoded, vec![42, 42, 42, 42, 42]);
    }
}
