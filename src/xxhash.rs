//! XXH64, the 64-bit non-cryptographic hash used for the frame checksum
//! (C2). Implemented directly from the published algorithm description;
//! exposes both a one-shot [`hash64`] and a streaming [`Xxh64`] accumulator
//! for the eventual case of checksumming output incrementally as blocks are
//! produced.

const PRIME1: u64 = 0x9E3779B185EBCA87;
const PRIME2: u64 = 0xC2B2AE3D27D4EB4F;
const PRIME3: u64 = 0x165667B19E3779F9;
const PRIME4: u64 = 0x85EBCA77C2B2AE63;
const PRIME5: u64 = 0x27D4EB2F165667C5;

#[inline]
fn round(acc: u64, input: u64) -> u64 {
    let acc = acc.wrapping_add(input.wrapping_mul(PRIME2));
    let acc = acc.rotate_left(31);
    acc.wrapping_mul(PRIME1)
}

#[inline]
fn merge_round(acc: u64, val: u64) -> u64 {
    let val = round(0, val);
    let acc = acc ^ val;
    acc.wrapping_mul(PRIME1).wrapping_add(PRIME4)
}

#[inline]
fn avalanche(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME3);
    h ^= h >> 32;
    h
}

/// One-shot XXH64 over `data` with the given seed.
pub fn hash64(seed: u64, data: &[u8]) -> u64 {
    let len = data.len();
    let mut h64: u64;
    let mut rest = data;

    if len >= 32 {
        let mut v1 = seed.wrapping_add(PRIME1).wrapping_add(PRIME2);
        let mut v2 = seed.wrapping_add(PRIME2);
        let mut v3 = seed;
        let mut v4 = seed.wrapping_sub(PRIME1);

        while rest.len() >= 32 {
            v1 = round(v1, read_u64(&rest[0..8]));
            v2 = round(v2, read_u64(&rest[8..16]));
            v3 = round(v3, read_u64(&rest[16..24]));
            v4 = round(v4, read_u64(&rest[24..32]));
            rest = &rest[32..];
        }

        h64 = v1
            .rotate_left(1)
            .wrapping_add(v2.rotate_left(7))
            .wrapping_add(v3.rotate_left(12))
            .wrapping_add(v4.rotate_left(18));
        h64 = merge_round(h64, v1);
        h64 = merge_round(h64, v2);
        h64 = merge_round(h64, v3);
        h64 = merge_round(h64, v4);
    } else {
        h64 = seed.wrapping_add(PRIME5);
    }

    h64 = h64.wrapping_add(len as u64);

    while rest.len() >= 8 {
        let k1 = round(0, read_u64(&rest[0..8]));
        h64 ^= k1;
        h64 = h64.rotate_left(27).wrapping_mul(PRIME1).wrapping_add(PRIME4);
        rest = &rest[8..];
    }
    if rest.len() >= 4 {
        h64 ^= (read_u32(&rest[0..4]) as u64).wrapping_mul(PRIME1);
        h64 = h64.rotate_left(23).wrapping_mul(PRIME2).wrapping_add(PRIME3);
        rest = &rest[4..];
    }
    for &byte in rest {
        h64 ^= (byte as u64).wrapping_mul(PRIME5);
        h64 = h64.rotate_left(11).wrapping_mul(PRIME1);
    }

    avalanche(h64)
}

fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes(b.try_into().unwrap())
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes(b.try_into().unwrap())
}

/// Streaming XXH64 accumulator, for checksumming output as it is produced
/// block by block rather than re-hashing the whole buffer at the end.
pub(crate) struct Xxh64 {
    seed: u64,
    v: [u64; 4],
    total_len: u64,
    buf: [u8; 32],
    buf_len: usize,
}

impl Xxh64 {
    pub fn new(seed: u64) -> Self {
        Xxh64 {
            seed,
            v: [
                seed.wrapping_add(PRIME1).wrapping_add(PRIME2),
                seed.wrapping_add(PRIME2),
                seed,
                seed.wrapping_sub(PRIME1),
            ],
            total_len: 0,
            buf: [0; 32],
            buf_len: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.total_len += data.len() as u64;

        if self.buf_len + data.len() < 32 {
            self.buf[self.buf_len..self.buf_len + data.len()].copy_from_slice(data);
            self.buf_len += data.len();
            return;
        }

        if self.buf_len > 0 {
            let need = 32 - self.buf_len;
            self.buf[self.buf_len..32].copy_from_slice(&data[..need]);
            let lanes: Vec<u64> = self.buf.chunks_exact(8).map(read_u64).collect();
            for (i, lane) in lanes.into_iter().enumerate() {
                self.v[i] = round(self.v[i], lane);
            }
            data = &data[need..];
            self.buf_len = 0;
        }

        while data.len() >= 32 {
            for i in 0..4 {
                self.v[i] = round(self.v[i], read_u64(&data[i * 8..i * 8 + 8]));
            }
            data = &data[32..];
        }

        if !data.is_empty() {
            self.buf[..data.len()].copy_from_slice(data);
            self.buf_len = data.len();
        }
    }

    pub fn finish(&self) -> u64 {
        let mut h64: u64;
        if self.total_len >= 32 {
            let [v1, v2, v3, v4] = self.v;
            h64 = v1
                .rotate_left(1)
                .wrapping_add(v2.rotate_left(7))
                .wrapping_add(v3.rotate_left(12))
                .wrapping_add(v4.rotate_left(18));
            h64 = merge_round(h64, v1);
            h64 = merge_round(h64, v2);
            h64 = merge_round(h64, v3);
            h64 = merge_round(h64, v4);
        } else {
            h64 = self.seed.wrapping_add(PRIME5);
        }

        h64 = h64.wrapping_add(self.total_len);

        let mut rest = &self.buf[..self.buf_len];
        while rest.len() >= 8 {
            let k1 = round(0, read_u64(&rest[0..8]));
            h64 ^= k1;
            h64 = h64.rotate_left(27).wrapping_mul(PRIME1).wrapping_add(PRIME4);
            rest = &rest[8..];
        }
        if rest.len() >= 4 {
            h64 ^= (read_u32(&rest[0..4]) as u64).wrapping_mul(PRIME1);
            h64 = h64.rotate_left(23).wrapping_mul(PRIME2).wrapping_add(PRIME3);
            rest = &rest[4..];
        }
        for &byte in rest {
            h64 ^= (byte as u64).wrapping_mul(PRIME5);
            h64 = h64.rotate_left(11).wrapping_mul(PRIME1);
        }

        avalanche(h64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn empty_input_matches_known_vector() {
        // XXH64("", seed=0) == 0xEF46DB3751D8E999
        assert_eq!(hash64(0, b""), 0xEF46DB3751D8E999);
    }

    #[test_log::test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let one_shot = hash64(0, &data);
        let mut streaming = Xxh64::new(0);
        for chunk in data.chunks(7) {
            streaming.update(chunk);
        }
        assert_eq!(streaming.finish(), one_shot);
    }

    #[test_log::test]
    fn streaming_matches_one_shot_small() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let one_shot = hash64(0, data);
        let mut streaming = Xxh64::new(0);
        streaming.update(data);
        assert_eq!(streaming.finish(), one_shot);
    }
}
