//! One stream (doc-id, term-frequency, position, or offset) of a term's
//! posting list, accumulated bag by bag.
//!
//! Ported from the original `GeneralTermEntry` (`flash_engine_dumper.h`).
//! A `GeneralTermEntry` doesn't know which of the four streams it holds —
//! it just accumulates already-encoded values (delta encoding, where it
//! applies, is the caller's job per spec §4.2) one posting bag at a time
//! and remembers where each bag started in the flattened stream, so the
//! skip list can later translate "posting ordinal" into a (blob index,
//! in-blob index) pair for O(1) seeking.

use crate::cozy::CozyBoxWriter;
use crate::packed::BLOCK_SIZE;

/// Accumulates one stream's values, bag by bag.
#[derive(Debug, Default)]
pub struct GeneralTermEntry {
    writer: CozyBoxWriter,
    /// `bag_starts[i]` is the stream-ordinal (index into the flattened
    /// value sequence) at which posting bag `i` begins.
    bag_starts: Vec<u32>,
}

impl GeneralTermEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one posting bag's values (already delta-encoded if this
    /// stream uses delta encoding) and remember where it started.
    pub fn push_bag(&mut self, values: &[u32]) {
        self.bag_starts.push(self.writer.len() as u32);
        self.writer.push_all(values.iter().copied());
    }

    /// Number of bags pushed so far.
    pub fn num_bags(&self) -> usize {
        self.bag_starts.len()
    }

    /// Translate posting (bag) ordinal `i` into `(blob_index, in_blob_index)`
    /// within the eventual cozy box — the mapping `GeneralTermEntry`
    /// produces alongside its cozy box.
    pub fn blob_index_of(&self, bag_ordinal: usize) -> (u32, u32) {
        let ordinal = self.bag_starts[bag_ordinal];
        (ordinal / BLOCK_SIZE as u32, ordinal % BLOCK_SIZE as u32)
    }

    /// Consume this entry, returning its cozy-box writer and the
    /// per-bag stream-ordinal table (from which `blob_index_of` was
    /// computed, kept for callers that need it after the entry is gone).
    pub fn finish(self) -> (CozyBoxWriter, Vec<u32>) {
        (self.writer, self.bag_starts)
    }
}

/// Delta-encode `values` against a running previous value, resetting at
/// the start of each call (used for positions and offsets, which restart
/// from zero at the beginning of each document's bag).
pub fn delta_encode_bag(values: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev = 0u32;
    for &v in values {
        out.push(v - prev);
        prev = v;
    }
    out
}

/// Delta-encode a single value against a carried-over running previous
/// value (used for doc-ids, whose delta runs across the whole posting
/// list rather than resetting per bag).
pub fn delta_encode_running(value: u32, prev: &mut u32) -> u32 {
    let d = value - *prev;
    *prev = value;
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_starts_track_stream_ordinals() {
        let mut entry = GeneralTermEntry::new();
        entry.push_bag(&[1, 2, 3]); // bag 0: ordinals 0,1,2
        entry.push_bag(&[4, 5]); // bag 1: ordinals 3,4
        entry.push_bag(&[6]); // bag 2: ordinal 5
        assert_eq!(entry.num_bags(), 3);
        assert_eq!(entry.blob_index_of(0), (0, 0));
        assert_eq!(entry.blob_index_of(1), (0, 3));
        assert_eq!(entry.blob_index_of(2), (0, 5));
    }

    #[test]
    fn blob_index_crosses_block_boundary() {
        let mut entry = GeneralTermEntry::new();
        for _ in 0..130 {
            entry.push_bag(&[0]);
        }
        assert_eq!(entry.blob_index_of(127), (0, 127));
        assert_eq!(entry.blob_index_of(128), (1, 0));
        assert_eq!(entry.blob_index_of(129), (1, 1));
    }

    #[test]
    fn delta_encode_bag_resets_each_call() {
        assert_eq!(delta_encode_bag(&[5, 8, 12]), vec![5, 3, 4]);
        assert_eq!(delta_encode_bag(&[100]), vec![100]);
    }

    #[test]
    fn delta_encode_running_carries_state() {
        let mut prev = 0u32;
        assert_eq!(delta_encode_running(10, &mut prev), 10);
        assert_eq!(delta_encode_running(15, &mut prev), 5);
        assert_eq!(delta_encode_running(15, &mut prev), 0);
    }
}
