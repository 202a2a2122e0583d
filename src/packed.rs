//! Fixed-width bit-packing for 128-value blocks ("PackedInts").
//!
//! Ported from the original `packed_value.h`'s `LittlePackedIntsWriter` /
//! `PackedInts` (see `examples/original_source/`), reimplemented as a safe
//! Rust codec: pick the smallest bit width that holds every value in the
//! block, pack them little-endian, prefix with one byte storing that width.
//!
//! Random access to element `i` is O(1): `i * bit_width` gives a bit offset,
//! which spans at most two adjacent u64 words, read with a shift + mask.

use crate::error::{Result, SearchError};

/// Values per packed block.
pub const BLOCK_SIZE: usize = 128;

/// Number of bits needed to represent `value` (0 needs 0 bits: a block of
/// all zeros packs to zero width).
fn bits_needed(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// A single 128-value packed block: one width byte + packed payload.
#[derive(Debug, Clone)]
pub struct PackedBlock {
    bit_width: u8,
    bytes: Vec<u8>,
}

impl PackedBlock {
    /// Pack exactly [`BLOCK_SIZE`] values into the minimum bit width.
    pub fn pack(values: &[u32; BLOCK_SIZE]) -> Self {
        let max = values.iter().copied().max().unwrap_or(0);
        let bit_width = bits_needed(max);
        let n_bytes = (BLOCK_SIZE * bit_width as usize).div_ceil(8);
        let mut bytes = vec![0u8; n_bytes];

        if bit_width > 0 {
            let mut bit_pos: usize = 0;
            for &v in values.iter() {
                write_bits(&mut bytes, bit_pos, bit_width, v);
                bit_pos += bit_width as usize;
            }
        }

        PackedBlock {
            bit_width: bit_width as u8,
            bytes,
        }
    }

    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    /// Serialized form: `[bit_width: u8][packed bytes]`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.bit_width);
        out.extend_from_slice(&self.bytes);
    }

    /// Byte length of the serialized block (header byte + payload).
    pub fn encoded_len(&self) -> usize {
        1 + self.bytes.len()
    }

    /// Decode a block from `bytes`, returning `(block, bytes_consumed)`.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.is_empty() {
            return Err(SearchError::corrupt("empty buffer for packed block"));
        }
        let bit_width = bytes[0];
        if bit_width > 32 {
            return Err(SearchError::corrupt(format!(
                "packed-ints bit width {} exceeds 32",
                bit_width
            )));
        }
        let n_bytes = (BLOCK_SIZE * bit_width as usize).div_ceil(8);
        if 1 + n_bytes > bytes.len() {
            return Err(SearchError::corrupt("truncated packed block"));
        }
        let payload = bytes[1..1 + n_bytes].to_vec();
        Ok((
            PackedBlock {
                bit_width,
                bytes: payload,
            },
            1 + n_bytes,
        ))
    }

    /// Random access to element `i` (`i < BLOCK_SIZE`) in O(1).
    pub fn get(&self, i: usize) -> u32 {
        debug_assert!(i < BLOCK_SIZE);
        if self.bit_width == 0 {
            return 0;
        }
        read_bits(&self.bytes, i * self.bit_width as usize, self.bit_width)
    }

    /// Unpack the entire block.
    pub fn unpack_all(&self) -> [u32; BLOCK_SIZE] {
        let mut out = [0u32; BLOCK_SIZE];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.get(i);
        }
        out
    }
}

/// Write a `width`-bit value at bit offset `bit_pos`, little-endian within
/// the byte stream (bit 0 of the value is the low bit of byte `bit_pos/8`).
fn write_bits(bytes: &mut [u8], bit_pos: usize, width: u8, value: u32) {
    let mut remaining = width;
    let mut v = value;
    let mut pos = bit_pos;
    while remaining > 0 {
        let byte_idx = pos / 8;
        let bit_off = pos % 8;
        let avail = 8 - bit_off;
        let take = remaining.min(avail as u8);
        let mask = ((1u32 << take) - 1) as u8;
        bytes[byte_idx] |= ((v as u8) & mask) << bit_off;
        v >>= take;
        remaining -= take;
        pos += take as usize;
    }
}

/// Read a `width`-bit value at bit offset `bit_pos`, spanning at most two
/// adjacent words via shift + mask.
fn read_bits(bytes: &[u8], bit_pos: usize, width: u8) -> u32 {
    let mut result: u32 = 0;
    let mut remaining = width;
    let mut pos = bit_pos;
    let mut shift = 0u32;
    while remaining > 0 {
        let byte_idx = pos / 8;
        let bit_off = pos % 8;
        let avail = 8 - bit_off;
        let take = remaining.min(avail as u8);
        let mask = ((1u32 << take) - 1) as u8;
        let bits = (bytes[byte_idx] >> bit_off) & mask;
        result |= (bits as u32) << shift;
        shift += take as u32;
        remaining -= take;
        pos += take as usize;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(values: [u32; BLOCK_SIZE]) -> PackedBlock {
        PackedBlock::pack(&values)
    }

    #[test]
    fn all_zero_packs_to_zero_width() {
        let block = block_of([0; BLOCK_SIZE]);
        assert_eq!(block.bit_width(), 0);
        for i in 0..BLOCK_SIZE {
            assert_eq!(block.get(i), 0);
        }
    }

    #[test]
    fn random_access_matches_values() {
        let mut values = [0u32; BLOCK_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            *v = (i as u32 * 7919) % 1_000_003;
        }
        let block = block_of(values);
        for i in 0..BLOCK_SIZE {
            assert_eq!(block.get(i), values[i], "mismatch at {i}");
        }
    }

    #[test]
    fn roundtrip_through_bytes() {
        let mut values = [0u32; BLOCK_SIZE];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as u32 * 3;
        }
        let block = block_of(values);
        let mut buf = Vec::new();
        block.encode(&mut buf);
        assert_eq!(buf.len(), block.encoded_len());
        let (decoded, consumed) = PackedBlock::decode(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.unpack_all(), values);
    }

    #[test]
    fn max_value_needs_32_bits() {
        let mut values = [0u32; BLOCK_SIZE];
        values[5] = u32::MAX;
        let block = block_of(values);
        assert_eq!(block.bit_width(), 32);
        assert_eq!(block.get(5), u32::MAX);
    }

    #[test]
    fn invalid_bit_width_is_corrupt() {
        let bytes = [33u8, 0, 0];
        assert!(PackedBlock::decode(&bytes).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_roundtrip(values in proptest::collection::vec(0u32..=u32::MAX, BLOCK_SIZE)) {
            let mut arr = [0u32; BLOCK_SIZE];
            arr.copy_from_slice(&values);
            let block = PackedBlock::pack(&arr);
            let mut buf = Vec::new();
            block.encode(&mut buf);
            let (decoded, consumed) = PackedBlock::decode(&buf).unwrap();
            proptest::prop_assert_eq!(consumed, buf.len());
            proptest::prop_assert_eq!(decoded.unpack_all().to_vec(), arr.to_vec());
        }
    }
}
