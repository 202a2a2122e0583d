//! The "cozy box" layout: a sequence of values stored as fixed-size packed
//! blocks plus a varint-encoded tail for the remainder.
//!
//! Ported from the original `CozyBoxWriter` (`flash_engine_dumper.h`),
//! reachable there via `GeneralTermEntry::GetCozyBoxWriter`. Values arrive in
//! order; every full [`BLOCK_SIZE`] of them becomes one [`PackedBlock`],
//! and whatever's left over at the end is varint-encoded rather than padded
//! into a partial block.

use crate::error::{Result, SearchError};
use crate::packed::{PackedBlock, BLOCK_SIZE};
use crate::varint::{decode_varint, encode_varint};

/// Accumulates values and produces the on-disk cozy box layout.
#[derive(Debug, Default)]
pub struct CozyBoxWriter {
    pending: Vec<u32>,
    blocks: Vec<PackedBlock>,
}

impl CozyBoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to the sequence, flushing a full block when ready.
    pub fn push(&mut self, value: u32) {
        self.pending.push(value);
        if self.pending.len() == BLOCK_SIZE {
            let mut arr = [0u32; BLOCK_SIZE];
            arr.copy_from_slice(&self.pending);
            self.blocks.push(PackedBlock::pack(&arr));
            self.pending.clear();
        }
    }

    pub fn push_all(&mut self, values: impl IntoIterator<Item = u32>) {
        for v in values {
            self.push(v);
        }
    }

    /// Number of values appended so far.
    pub fn len(&self) -> usize {
        self.blocks.len() * BLOCK_SIZE + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize: `[n_blocks: varint][n_tail: varint][block...][tail varints...]`.
    /// Records the file offset each block starts at, relative to `out`'s
    /// length at entry, for per-block random access.
    pub fn encode(&self, out: &mut Vec<u8>) -> Vec<u64> {
        let base = out.len() as u64;
        encode_varint(self.blocks.len() as u32, out);
        encode_varint(self.pending.len() as u32, out);

        let mut block_offsets = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            block_offsets.push(out.len() as u64 - base);
            block.encode(out);
        }
        for &v in &self.pending {
            encode_varint(v, out);
        }
        block_offsets
    }
}

/// Read-only view over a decoded cozy box.
#[derive(Debug, Clone)]
pub struct CozyBox {
    blocks: Vec<PackedBlock>,
    tail: Vec<u32>,
}

impl CozyBox {
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0;
        let (n_blocks, used) = decode_varint(&bytes[pos..])?;
        pos += used;
        let (n_tail, used) = decode_varint(&bytes[pos..])?;
        pos += used;

        let mut blocks = Vec::with_capacity(n_blocks as usize);
        for _ in 0..n_blocks {
            let (block, used) = PackedBlock::decode(&bytes[pos..])?;
            pos += used;
            blocks.push(block);
        }

        let mut tail = Vec::with_capacity(n_tail as usize);
        for _ in 0..n_tail {
            let (v, used) = decode_varint(&bytes[pos..])?;
            pos += used;
            tail.push(v);
        }

        Ok((CozyBox { blocks, tail }, pos))
    }

    pub fn len(&self) -> usize {
        self.blocks.len() * BLOCK_SIZE + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Random access to element `i`. O(1) within a block, O(1) for the tail.
    pub fn get(&self, i: usize) -> Result<u32> {
        let block_capacity = self.blocks.len() * BLOCK_SIZE;
        if i < block_capacity {
            Ok(self.blocks[i / BLOCK_SIZE].get(i % BLOCK_SIZE))
        } else {
            self.tail
                .get(i - block_capacity)
                .copied()
                .ok_or_else(|| SearchError::corrupt(format!("cozy box index {i} out of range")))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.unpack_all().into_iter())
            .take(self.blocks.len() * BLOCK_SIZE)
            .chain(self.tail.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_roundtrips() {
        let w = CozyBoxWriter::new();
        let mut buf = Vec::new();
        w.encode(&mut buf);
        let (box_, used) = CozyBox::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(box_.len(), 0);
    }

    #[test]
    fn tail_only_roundtrips() {
        let mut w = CozyBoxWriter::new();
        w.push_all([1, 2, 3, 4, 5]);
        let mut buf = Vec::new();
        let offsets = w.encode(&mut buf);
        assert!(offsets.is_empty());
        let (box_, _) = CozyBox::decode(&buf).unwrap();
        assert_eq!(box_.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn mixed_blocks_and_tail() {
        let mut w = CozyBoxWriter::new();
        let values: Vec<u32> = (0..300).collect();
        w.push_all(values.iter().copied());
        let mut buf = Vec::new();
        let offsets = w.encode(&mut buf);
        assert_eq!(offsets.len(), 2); // 300 = 2 full blocks (256) + 44 tail
        let (box_, used) = CozyBox::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(box_.len(), 300);
        assert_eq!(box_.iter().collect::<Vec<_>>(), values);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(box_.get(i).unwrap(), v);
        }
    }

    #[test]
    fn out_of_range_get_is_corrupt() {
        let mut w = CozyBoxWriter::new();
        w.push_all([1, 2, 3]);
        let mut buf = Vec::new();
        w.encode(&mut buf);
        let (box_, _) = CozyBox::decode(&buf).unwrap();
        assert!(box_.get(3).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_roundtrip(values in proptest::collection::vec(0u32..=1_000_000, 0..600)) {
            let mut w = CozyBoxWriter::new();
            w.push_all(values.iter().copied());
            let mut buf = Vec::new();
            w.encode(&mut buf);
            let (box_, used) = CozyBox::decode(&buf).unwrap();
            proptest::prop_assert_eq!(used, buf.len());
            proptest::prop_assert_eq!(box_.iter().collect::<Vec<_>>(), values);
        }
    }
}
