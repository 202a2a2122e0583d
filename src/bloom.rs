//! Classic Bloom filter over arbitrary byte strings.
//!
//! Grounded in the original `bloom_filter.h` (`BloomFilter`,
//! `CreateBloomFixedEntries`) for the serialized-bit-array shape; sizing
//! formulas and the `present | not_present | uninitialised` check result
//! are spec'd directly. Hashing uses Kirsch-Mitzenmacher double hashing —
//! two independently-salted `SipHash` runs combined as `h1 + i*h2` — which
//! is a standard substitute for `k` fully independent hash functions and
//! needs no extra dependency beyond `std`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Result, SearchError};
use crate::varint::{decode_varint, encode_varint};

const HASH_SALT_1: u64 = 0x9E3779B97F4A7C15;
const HASH_SALT_2: u64 = 0xC2B2AE3D27D4EB4F;

/// Result of testing an element against a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomCheck {
    Present,
    NotPresent,
    /// The filter was never given any elements (empty bit array).
    Uninitialised,
}

#[derive(Debug, Clone)]
pub struct BloomFilter {
    num_bits: u32,
    num_hashes: u32,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Size a new, empty filter for `expected_entries` elements at target
    /// false-positive rate `ratio`: `m = -n*ln(ratio)/(ln 2)^2`,
    /// `k = (m/n)*ln 2`.
    pub fn new(ratio: f64, expected_entries: usize) -> Self {
        if expected_entries == 0 {
            return BloomFilter {
                num_bits: 0,
                num_hashes: 1,
                bits: Vec::new(),
            };
        }
        let n = expected_entries as f64;
        let m = (-n * ratio.ln() / (std::f64::consts::LN_2.powi(2))).ceil().max(1.0);
        let k = ((m / n) * std::f64::consts::LN_2).round().max(1.0);

        let num_bits = m as u32;
        let num_hashes = k as u32;
        BloomFilter {
            num_bits,
            num_hashes,
            bits: vec![0u8; (num_bits as usize).div_ceil(8)],
        }
    }

    /// Construct directly from precomputed dimensions (used when decoding,
    /// and by the bloom store, which shares one `(num_bits, num_hashes)`
    /// across every case and stores only each case's raw bit array).
    pub fn from_raw_bits(num_bits: u32, num_hashes: u32, bits: Vec<u8>) -> Self {
        BloomFilter {
            num_bits,
            num_hashes,
            bits,
        }
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Raw bit array bytes, for callers (the bloom store) that serialize
    /// `(num_bits, num_hashes)` once per store rather than once per case.
    pub fn raw_bits(&self) -> &[u8] {
        &self.bits
    }

    fn indices(&self, elem: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let h1 = hash_with_salt(HASH_SALT_1, elem);
        let h2 = hash_with_salt(HASH_SALT_2, elem);
        let m = self.num_bits as u64;
        (0..self.num_hashes).map(move |i| {
            let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
            (combined % m.max(1)) as usize
        })
    }

    pub fn add(&mut self, elem: &[u8]) {
        if self.num_bits == 0 {
            return;
        }
        for idx in self.indices(elem).collect::<Vec<_>>() {
            set_bit(&mut self.bits, idx);
        }
    }

    pub fn check(&self, elem: &[u8]) -> BloomCheck {
        if self.is_empty() {
            return BloomCheck::Uninitialised;
        }
        if self.indices(elem).all(|idx| get_bit(&self.bits, idx)) {
            BloomCheck::Present
        } else {
            BloomCheck::NotPresent
        }
    }

    /// True iff no element has ever been added (all bits clear, or a
    /// zero-capacity filter).
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0 || self.bits.iter().all(|&b| b == 0)
    }

    /// `[num_bits varint][num_hashes varint][byte_len varint][bytes...]`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_varint(self.num_bits, out);
        encode_varint(self.num_hashes, out);
        encode_varint(self.bits.len() as u32, out);
        out.extend_from_slice(&self.bits);
    }

    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0;
        let (num_bits, used) = decode_varint(&bytes[pos..])?;
        pos += used;
        let (num_hashes, used) = decode_varint(&bytes[pos..])?;
        pos += used;
        let (byte_len, used) = decode_varint(&bytes[pos..])?;
        pos += used;
        let byte_len = byte_len as usize;
        if pos + byte_len > bytes.len() {
            return Err(SearchError::corrupt("bloom filter: truncated bit array"));
        }
        let bits = bytes[pos..pos + byte_len].to_vec();
        pos += byte_len;
        Ok((BloomFilter::from_raw_bits(num_bits, num_hashes, bits), pos))
    }
}

fn hash_with_salt(salt: u64, elem: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    salt.hash(&mut hasher);
    elem.hash(&mut hasher);
    hasher.finish()
}

fn set_bit(bits: &mut [u8], idx: usize) {
    bits[idx / 8] |= 1 << (idx % 8);
}

fn get_bit(bits: &[u8], idx: usize) -> bool {
    bits[idx / 8] & (1 << (idx % 8)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialised_before_any_add() {
        let f = BloomFilter::new(0.01, 100);
        assert_eq!(f.check(b"anything"), BloomCheck::Uninitialised);
    }

    #[test]
    fn present_after_add() {
        let mut f = BloomFilter::new(0.01, 100);
        f.add(b"hello");
        assert_eq!(f.check(b"hello"), BloomCheck::Present);
    }

    #[test]
    fn zero_entries_is_always_uninitialised() {
        let f = BloomFilter::new(0.01, 0);
        assert_eq!(f.check(b"x"), BloomCheck::Uninitialised);
    }

    #[test]
    fn false_positive_rate_stays_bounded() {
        let ratio = 0.01;
        let n = 2000;
        let mut f = BloomFilter::new(ratio, n);
        for i in 0..n {
            f.add(format!("member-{i}").as_bytes());
        }
        let mut false_positives = 0;
        let trials = 20_000;
        for i in 0..trials {
            if f.check(format!("nonmember-{i}").as_bytes()) == BloomCheck::Present {
                false_positives += 1;
            }
        }
        let observed = false_positives as f64 / trials as f64;
        assert!(observed <= 2.0 * ratio, "observed FP rate {observed} too high");
    }

    #[test]
    fn roundtrip_through_bytes() {
        let mut f = BloomFilter::new(0.05, 50);
        f.add(b"alpha");
        f.add(b"beta");
        let mut buf = Vec::new();
        f.encode(&mut buf);
        let (decoded, used) = BloomFilter::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(decoded.check(b"alpha"), BloomCheck::Present);
        assert_eq!(decoded.check(b"beta"), BloomCheck::Present);
    }
}
