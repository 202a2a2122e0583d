//! Flat, single-level skip list: one entry per [`SKIP_INTERVAL`] postings.
//!
//! Simplified from `sorex`'s multi-level `SkipList` down to the original
//! `wiser` design's single level (`flash_engine_dumper.h`'s `SkipListPreRow`),
//! keeping `sorex`'s magic-byte-prefixed, `encode`/`decode` split and its
//! `SearchError::Corrupt`-flavored validation.
//!
//! On write, every field of every entry is delta-coded against the same
//! field of the previous entry (zero for entry 0) and varint-concatenated.
//! Deltas use wrapping arithmetic so the codec round-trips exactly even
//! where a field (like an in-block index that resets at a block boundary)
//! isn't monotonic.

use crate::error::{Result, SearchError};
use crate::packed::BLOCK_SIZE;
use crate::varint::{decode_varint, encode_varint};

/// One skip entry per this many postings.
pub const SKIP_INTERVAL: usize = BLOCK_SIZE;

pub const SKIP_LIST_MAGIC: u8 = 0xA3;

/// One row of the skip list: file offsets (and, for the variable-width
/// position/offset streams, in-block indices) letting `advance_to` jump
/// straight to the block containing posting `i * SKIP_INTERVAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipEntry {
    /// Doc-id of posting `i * SKIP_INTERVAL - 1` (0 for the first entry).
    pub prev_doc_id: u32,
    pub docid_blob_offset: u32,
    pub tf_blob_offset: u32,
    pub pos_blob_offset: u32,
    pub pos_in_blob_idx: u32,
    pub off_blob_offset: u32,
    pub off_in_blob_idx: u32,
}

impl SkipEntry {
    fn fields(&self) -> [u32; 7] {
        [
            self.prev_doc_id,
            self.docid_blob_offset,
            self.tf_blob_offset,
            self.pos_blob_offset,
            self.pos_in_blob_idx,
            self.off_blob_offset,
            self.off_in_blob_idx,
        ]
    }

    fn from_fields(f: [u32; 7]) -> Self {
        SkipEntry {
            prev_doc_id: f[0],
            docid_blob_offset: f[1],
            tf_blob_offset: f[2],
            pos_blob_offset: f[3],
            pos_in_blob_idx: f[4],
            off_blob_offset: f[5],
            off_in_blob_idx: f[6],
        }
    }
}

/// Accumulates skip entries during a posting list dump.
#[derive(Debug, Default)]
pub struct SkipListWriter {
    entries: Vec<SkipEntry>,
}

impl SkipListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SkipEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `[magic 0xA3][varint num_entries][delta-coded varint fields...]`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(SKIP_LIST_MAGIC);
        encode_varint(self.entries.len() as u32, out);

        let mut prev = [0u32; 7];
        for entry in &self.entries {
            let fields = entry.fields();
            for i in 0..7 {
                let delta = fields[i].wrapping_sub(prev[i]);
                encode_varint(delta, out);
            }
            prev = fields;
        }
    }
}

/// Read-only decoded skip list.
#[derive(Debug, Clone)]
pub struct SkipList {
    entries: Vec<SkipEntry>,
}

impl SkipList {
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.is_empty() || bytes[0] != SKIP_LIST_MAGIC {
            return Err(SearchError::corrupt("skip list: bad magic byte"));
        }
        let mut pos = 1;
        let (num_entries, used) = decode_varint(&bytes[pos..])?;
        pos += used;

        let mut entries = Vec::with_capacity(num_entries as usize);
        let mut prev = [0u32; 7];
        for _ in 0..num_entries {
            let mut fields = [0u32; 7];
            for (i, slot) in fields.iter_mut().enumerate() {
                let (delta, used) = decode_varint(&bytes[pos..])?;
                pos += used;
                *slot = prev[i].wrapping_add(delta);
            }
            prev = fields;
            entries.push(SkipEntry::from_fields(fields));
        }
        Ok((SkipList { entries }, pos))
    }

    pub fn entries(&self) -> &[SkipEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the greatest entry with `prev_doc_id < target`, i.e. the latest
    /// skip point known to be strictly before `target`. Returns `None` if
    /// even the first entry's `prev_doc_id >= target` (no skip helps; start
    /// from the beginning of the posting list).
    pub fn find_for(&self, target_doc_id: u32) -> Option<&SkipEntry> {
        self.find_index_for(target_doc_id).map(|i| &self.entries[i])
    }

    /// Same as [`Self::find_for`] but returns the entry's index `i`. The
    /// target posting is guaranteed to lie in the block of postings
    /// starting at ordinal `i * SKIP_INTERVAL` (the next entry, if any,
    /// already has `prev_doc_id >= target`).
    pub fn find_index_for(&self, target_doc_id: u32) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.prev_doc_id < target_doc_id)
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<SkipEntry> {
        vec![
            SkipEntry {
                prev_doc_id: 0,
                docid_blob_offset: 10,
                tf_blob_offset: 20,
                pos_blob_offset: 30,
                pos_in_blob_idx: 0,
                off_blob_offset: 40,
                off_in_blob_idx: 0,
            },
            SkipEntry {
                prev_doc_id: 200,
                docid_blob_offset: 50,
                tf_blob_offset: 60,
                pos_blob_offset: 20, // regresses: new block started earlier in a fresh region
                pos_in_blob_idx: 5,
                off_blob_offset: 90,
                off_in_blob_idx: 3,
            },
            SkipEntry {
                prev_doc_id: 450,
                docid_blob_offset: 90,
                tf_blob_offset: 100,
                pos_blob_offset: 130,
                pos_in_blob_idx: 0, // wraps back to 0 at a block boundary
                off_blob_offset: 200,
                off_in_blob_idx: 0,
            },
        ]
    }

    #[test]
    fn roundtrip_entries() {
        let mut w = SkipListWriter::new();
        for e in sample_entries() {
            w.push(e);
        }
        let mut buf = Vec::new();
        w.encode(&mut buf);
        let (list, used) = SkipList::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(list.entries(), sample_entries().as_slice());
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let bytes = [0x00u8, 0x00];
        assert!(SkipList::decode(&bytes).is_err());
    }

    #[test]
    fn find_for_picks_latest_strictly_before_target() {
        let mut w = SkipListWriter::new();
        for e in sample_entries() {
            w.push(e);
        }
        let mut buf = Vec::new();
        w.encode(&mut buf);
        let (list, _) = SkipList::decode(&buf).unwrap();

        assert!(list.find_for(0).is_none());
        assert_eq!(list.find_for(1).unwrap().prev_doc_id, 0);
        assert_eq!(list.find_for(201).unwrap().prev_doc_id, 200);
        assert_eq!(list.find_for(1000).unwrap().prev_doc_id, 450);
    }

    #[test]
    fn empty_skip_list_roundtrips() {
        let w = SkipListWriter::new();
        let mut buf = Vec::new();
        w.encode(&mut buf);
        let (list, used) = SkipList::decode(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert!(list.is_empty());
    }
}
