//! Serializes one term's posting list: magic byte, doc-frequency, skip
//! list, then the four cozy boxes (doc-ids, term frequencies, positions,
//! offsets).
//!
//! Grounded in the original `PostingListDumper` / `FakePostingListDumper`
//! (`flash_engine_dumper.h`). The skip list's serialized length depends on
//! file offsets that aren't known until the four cozy boxes are written,
//! so the real write happens in two passes: a "fake" dry run computes an
//! upper-bound reservation, the real dumper writes a gap that size, writes
//! the four boxes, then seeks back and fills the gap with the real skip
//! list. It's a fatal error if the real skip list doesn't fit.

use crate::cozy::CozyBoxWriter;
use crate::error::{Result, SearchError};
use crate::packed::BLOCK_SIZE;
use crate::skiplist::{SkipEntry, SkipListWriter, SKIP_INTERVAL};
use crate::term_entry::{delta_encode_bag, delta_encode_running, GeneralTermEntry};
use crate::varint::{encode_varint, MAX_VARINT_BYTES};

pub const POSTING_LIST_MAGIC: u8 = 0xF4;

/// One posting bag as produced by the indexing pipeline, already grouped
/// by term: `doc_id`, and the positions/offsets for this term's
/// occurrences in that document (offsets as `(start, end)` pairs, empty
/// when the index is built without offsets).
#[derive(Debug, Clone)]
pub struct PostingBag {
    pub doc_id: u32,
    pub positions: Vec<u32>,
    pub offsets: Vec<(u32, u32)>,
}

impl PostingBag {
    pub fn term_freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Accumulates posting bags for one term in ascending doc-id order and
/// produces the on-disk posting list layout.
#[derive(Debug, Default)]
pub struct PostingListDumper {
    docid_entry: GeneralTermEntry,
    tf_entry: GeneralTermEntry,
    pos_entry: GeneralTermEntry,
    off_entry: GeneralTermEntry,
    doc_ids: Vec<u32>,
    running_doc_id: u32,
}

impl PostingListDumper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one posting bag. `bag.doc_id` must be strictly greater than
    /// the previous bag's doc-id (caller's responsibility — this is a
    /// batch, single-pass dumper with no reordering).
    pub fn add_bag(&mut self, bag: &PostingBag) {
        let doc_delta = delta_encode_running(bag.doc_id, &mut self.running_doc_id);
        self.docid_entry.push_bag(&[doc_delta]);
        self.tf_entry.push_bag(&[bag.term_freq()]);
        self.pos_entry.push_bag(&delta_encode_bag(&bag.positions));

        let mut flat_offsets = Vec::with_capacity(bag.offsets.len() * 2);
        let mut prev_start = 0u32;
        for &(start, end) in &bag.offsets {
            flat_offsets.push(start - prev_start);
            flat_offsets.push(end - start);
            prev_start = start;
        }
        self.off_entry.push_bag(&flat_offsets);

        self.doc_ids.push(bag.doc_id);
    }

    pub fn doc_freq(&self) -> u32 {
        self.doc_ids.len() as u32
    }

    /// Encode this term's posting list, appending it to `out`. Returns the
    /// file offset (relative to the start of `out` at entry) the posting
    /// list begins at, for the caller to record in the term index.
    pub fn encode(self, out: &mut Vec<u8>) -> Result<u64> {
        let list_offset = out.len() as u64;
        let doc_freq = self.doc_freq();
        out.push(POSTING_LIST_MAGIC);
        encode_varint(doc_freq, out);

        let reservation = fake_skip_list_len(doc_freq as usize);
        let skip_gap_start = out.len();
        out.resize(skip_gap_start + reservation, 0);
        let boxes_start = out.len();

        let (docid_writer, docid_bag_starts) = self.docid_entry.finish();
        let (tf_writer, tf_bag_starts) = self.tf_entry.finish();
        let (pos_writer, pos_bag_starts) = self.pos_entry.finish();
        let (off_writer, off_bag_starts) = self.off_entry.finish();

        let docid_block_offsets = encode_box(&docid_writer, out);
        let tf_block_offsets = encode_box(&tf_writer, out);
        let pos_block_offsets = encode_box(&pos_writer, out);
        let off_block_offsets = encode_box(&off_writer, out);

        let skip = build_skip_list(
            doc_freq as usize,
            &self.doc_ids,
            &docid_bag_starts,
            &tf_bag_starts,
            &pos_bag_starts,
            &off_bag_starts,
            &docid_block_offsets,
            &tf_block_offsets,
            &pos_block_offsets,
            &off_block_offsets,
        );

        let mut skip_bytes = Vec::new();
        skip.encode(&mut skip_bytes);
        if skip_bytes.len() > reservation {
            return Err(SearchError::corrupt(format!(
                "skip list for posting list at offset {list_offset} overran its reservation: \
                 needed {} bytes, reserved {}",
                skip_bytes.len(),
                reservation
            )));
        }
        out[skip_gap_start..skip_gap_start + skip_bytes.len()].copy_from_slice(&skip_bytes);
        for b in out[skip_gap_start + skip_bytes.len()..boxes_start].iter_mut() {
            *b = 0;
        }

        Ok(list_offset)
    }
}

/// Write `writer`'s cozy box to `out`, returning each block's absolute
/// file offset.
fn encode_box(writer: &CozyBoxWriter, out: &mut Vec<u8>) -> Vec<u64> {
    let base = out.len() as u64;
    writer
        .encode(out)
        .into_iter()
        .map(|rel| base + rel)
        .collect()
}

/// Upper bound on the serialized skip list's byte length for a posting
/// list with `doc_freq` postings: one entry per [`SKIP_INTERVAL`], seven
/// fields each needing at most [`MAX_VARINT_BYTES`], plus the magic byte
/// and the entry-count varint.
fn fake_skip_list_len(doc_freq: usize) -> usize {
    let num_entries = doc_freq.div_ceil(SKIP_INTERVAL);
    1 + MAX_VARINT_BYTES + num_entries * 7 * MAX_VARINT_BYTES
}

#[allow(clippy::too_many_arguments)]
fn build_skip_list(
    doc_freq: usize,
    doc_ids: &[u32],
    docid_bag_starts: &[u32],
    tf_bag_starts: &[u32],
    pos_bag_starts: &[u32],
    off_bag_starts: &[u32],
    docid_block_offsets: &[u64],
    tf_block_offsets: &[u64],
    pos_block_offsets: &[u64],
    off_block_offsets: &[u64],
) -> SkipListWriter {
    let mut writer = SkipListWriter::new();
    let num_entries = doc_freq.div_ceil(SKIP_INTERVAL);

    for i in 0..num_entries {
        let boundary = i * SKIP_INTERVAL;
        let prev_doc_id = if boundary == 0 { 0 } else { doc_ids[boundary - 1] };

        let docid_blob = (docid_bag_starts[boundary] / BLOCK_SIZE as u32) as usize;
        let tf_blob = (tf_bag_starts[boundary] / BLOCK_SIZE as u32) as usize;
        let pos_ord = pos_bag_starts[boundary];
        let off_ord = off_bag_starts[boundary];

        writer.push(SkipEntry {
            prev_doc_id,
            docid_blob_offset: docid_block_offsets.get(docid_blob).copied().unwrap_or(0) as u32,
            tf_blob_offset: tf_block_offsets.get(tf_blob).copied().unwrap_or(0) as u32,
            pos_blob_offset: pos_block_offsets
                .get((pos_ord / BLOCK_SIZE as u32) as usize)
                .copied()
                .unwrap_or(0) as u32,
            pos_in_blob_idx: pos_ord % BLOCK_SIZE as u32,
            off_blob_offset: off_block_offsets
                .get((off_ord / BLOCK_SIZE as u32) as usize)
                .copied()
                .unwrap_or(0) as u32,
            off_in_blob_idx: off_ord % BLOCK_SIZE as u32,
        });
    }

    writer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varint::decode_varint;

    fn bag(doc_id: u32, positions: &[u32]) -> PostingBag {
        PostingBag {
            doc_id,
            positions: positions.to_vec(),
            offsets: vec![],
        }
    }

    #[test]
    fn encodes_magic_and_doc_freq_header() {
        let mut dumper = PostingListDumper::new();
        dumper.add_bag(&bag(0, &[0]));
        dumper.add_bag(&bag(5, &[2, 9]));

        let mut out = Vec::new();
        let offset = dumper.encode(&mut out).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(out[0], POSTING_LIST_MAGIC);
        let (doc_freq, _) = decode_varint(&out[1..]).unwrap();
        assert_eq!(doc_freq, 2);
    }

    #[test]
    fn large_posting_list_skip_list_fits_reservation() {
        let mut dumper = PostingListDumper::new();
        for doc_id in 0..10_000u32 {
            dumper.add_bag(&bag(doc_id, &[doc_id % 50]));
        }
        let mut out = Vec::new();
        // Must not error: the fake reservation must cover the real skip list.
        dumper.encode(&mut out).unwrap();
    }

    #[test]
    fn multiple_terms_append_at_distinct_offsets() {
        let mut out = Vec::new();

        let mut first = PostingListDumper::new();
        first.add_bag(&bag(0, &[0]));
        let offset_a = first.encode(&mut out).unwrap();

        let mut second = PostingListDumper::new();
        second.add_bag(&bag(1, &[0]));
        let offset_b = second.encode(&mut out).unwrap();

        assert_eq!(offset_a, 0);
        assert!(offset_b > offset_a);
        assert_eq!(out[offset_b as usize], POSTING_LIST_MAGIC);
    }
}
