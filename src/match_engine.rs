//! The `double-fast` LZ match finder (C5): a short 4-byte hash table and a
//! long 8-byte hash table, probed in a fixed order, plus a repeat-offset
//! check pinned one byte ahead of the cursor — matching the strategy named
//! in RFC 8478 and in `params::Strategy::Dfast`.
//!
//! Grounded on the teacher's general shape for a single-pass compressor
//! loop (`extractor` advancing a cursor over an input slice, consulting
//! small fixed-size lookup tables rather than building a full suffix
//! structure) adapted to LZ77 matching instead of Oodle's quantum framing.
//!
//! Per sequence, the search order is: (1) does `offset_1` still match at
//! `cursor + 1`; if not, (2) does the long table hit at `cursor`; if not,
//! (3) does the short table hit at `cursor`, with an opportunistic look
//! one byte further for a long match before settling for the short one. A
//! miss advances the cursor by `(literalsPending >> SEARCH_STRENGTH) + 1`
//! rather than by one, so the search thins out over long incompressible
//! runs. `offset_1`/`offset_2`/`offset_3` bookkeeping and the `REP_MOVE`
//! (+3) encoding of a fresh offset are both already implemented by
//! [`RepeatOffsets::encode`]; this module just calls it with the real
//! match offset after every sequence, new or repeated.

use crate::params::CompressionParameters;
use crate::sequence::{RepeatOffsets, SequenceStore};

const HASH4_BYTES: usize = 4;
const HASH8_BYTES: usize = 8;
const SEARCH_STRENGTH: usize = 8;

fn hash4(bytes: &[u8], log: u32) -> usize {
    let v = u32::from_le_bytes(bytes[..HASH4_BYTES].try_into().unwrap());
    ((v.wrapping_mul(2654435761u32)) >> (32 - log)) as usize
}

fn hash8(bytes: &[u8], log: u32) -> usize {
    let v = u64::from_le_bytes(bytes[..HASH8_BYTES].try_into().unwrap());
    ((v.wrapping_mul(0x9E3779B185EBCA87u64)) >> (64 - log as u64)) as usize
}

fn read32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
}

fn read64(data: &[u8], pos: usize) -> u64 {
    u64::from_le_bytes(data[pos..pos + 8].try_into().unwrap())
}

fn common_length(data: &[u8], a: usize, b: usize, max: usize) -> usize {
    let mut n = 0;
    while n < max && data[a + n] == data[b + n] {
        n += 1;
    }
    n
}

/// A match found at `match_start` (which may be `cursor` or `cursor + 1`,
/// when the opportunistic one-ahead probe wins) against an earlier
/// position `match_pos`, covering `match_len` bytes.
struct Found {
    match_start: usize,
    match_pos: usize,
    match_len: usize,
}

/// Parses `data` into a [`SequenceStore`] plus any trailing literal bytes
/// not covered by a match (the "last sequence" case block assembly treats
/// specially, per the Design Notes on `executeLastSequence`).
pub(crate) fn find_sequences(data: &[u8], params: &CompressionParameters) -> (SequenceStore, Vec<u8>) {
    let mut store = SequenceStore::new();
    let n = data.len();
    if n <= HASH8_BYTES + 1 {
        return (store, data.to_vec());
    }

    let hash_log = params.hash_log.clamp(6, 27);
    let chain_log = params.chain_log.clamp(6, 27);
    let mut short_table = vec![0u32; 1usize << hash_log];
    let mut long_table = vec![0u32; 1usize << chain_log];
    let mut rep = RepeatOffsets::default();

    let mut anchor = 0usize;
    let mut ip = 0usize;
    // Keeps every 4/8-byte read below, including the one-ahead probes, at
    // least one byte inside `data`.
    let ilimit = n - HASH8_BYTES - 1;

    while ip < ilimit {
        let offset1 = rep.0[0] as usize;
        if offset1 != 0 && offset1 <= ip + 1 && read32(data, ip + 1) == read32(data, ip + 1 - offset1) {
            let match_start = ip + 1;
            let rep_start = match_start - offset1;
            let max = n - (match_start + 4);
            let match_len = 4 + common_length(data, rep_start + 4, match_start + 4, max);
            let lit_len = (match_start - anchor) as u32;

            store.push(&data[anchor..match_start], lit_len, match_len as u32, offset1 as u32);
            rep.encode(offset1 as u32, lit_len);

            ip = match_start + match_len;
            anchor = ip;
            continue;
        }

        let h_short = hash4(&data[ip..], hash_log);
        let h_long = hash8(&data[ip..], chain_log);
        let candidate_s = short_table[h_short];
        let candidate_l = long_table[h_long];
        short_table[h_short] = (ip + 1) as u32;
        long_table[h_long] = (ip + 1) as u32;

        let found = if candidate_l != 0 && read64(data, ip) == read64(data, (candidate_l - 1) as usize) {
            let match_pos = (candidate_l - 1) as usize;
            let max = n - (ip + 8);
            let match_len = 8 + common_length(data, match_pos + 8, ip + 8, max);
            Some(Found { match_start: ip, match_pos, match_len })
        } else if candidate_s != 0 && read32(data, ip) == read32(data, (candidate_s - 1) as usize) {
            // One-ahead look for a long match before settling for the short
            // one at `ip` — the opportunistic swap that lets a longer match
            // one byte later win over a shorter one right here.
            let h_long3 = hash8(&data[ip + 1..], chain_log);
            let candidate_l3 = long_table[h_long3];
            long_table[h_long3] = (ip + 2) as u32;

            if candidate_l3 != 0 && read64(data, ip + 1) == read64(data, (candidate_l3 - 1) as usize) {
                let match_pos = (candidate_l3 - 1) as usize;
                let max = n - (ip + 1 + 8);
                let match_len = 8 + common_length(data, match_pos + 8, ip + 1 + 8, max);
                Some(Found { match_start: ip + 1, match_pos, match_len })
            } else {
                let match_pos = (candidate_s - 1) as usize;
                let max = n - (ip + 4);
                let match_len = 4 + common_length(data, match_pos + 4, ip + 4, max);
                Some(Found { match_start: ip, match_pos, match_len })
            }
        } else {
            None
        };

        match found {
            Some(Found { match_start, match_pos, match_len }) => {
                let offset = (match_start - match_pos) as u32;
                let lit_len = (match_start - anchor) as u32;
                store.push(&data[anchor..match_start], lit_len, match_len as u32, offset);
                rep.encode(offset, lit_len);

                ip = match_start + match_len;
                anchor = ip;
            }
            None => {
                ip += ((ip - anchor) >> SEARCH_STRENGTH) + 1;
            }
        }
    }

    (store, data[anchor..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn reconstruct(store: &SequenceStore, trailing: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut lit_cursor = 0usize;
        for i in 0..store.len() {
            let ll = store.literal_lengths[i] as usize;
            out.extend_from_slice(&store.literals[lit_cursor..lit_cursor + ll]);
            lit_cursor += ll;
            let offset = store.offsets[i] as usize;
            let match_len = store.match_lengths[i] as usize;
            for _ in 0..match_len {
                let b = out[out.len() - offset];
                out.push(b);
            }
        }
        out.extend_from_slice(trailing);
        out
    }

    #[test_log::test]
    fn reconstructs_repetitive_input() {
        let data = b"the quick brown fox the quick brown fox the quick brown fox jumps"
            .repeat(3);
        let params = params::derive(6, data.len());
        let (store, trailing) = find_sequences(&data, &params);
        assert_eq!(reconstruct(&store, &trailing), data);
        assert!(store.len() > 0);
    }

    #[test_log::test]
    fn reconstructs_incompressible_input() {
        let data: Vec<u8> = (0..500u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();
        let params = params::derive(3, data.len());
        let (store, trailing) = find_sequences(&data, &params);
        assert_eq!(reconstruct(&store, &trailing), data);
    }

    #[test_log::test]
    fn short_input_is_all_trailing_literals() {
        let data = b"hi";
        let params = params::derive(3, data.len());
        let (store, trailing) = find_sequences(data, &params);
        assert!(store.is_empty());
        assert_eq!(trailing, data);
    }
}
