//! Stateful cursor over one on-disk posting list.
//!
//! Reads the `[magic][doc_freq][skip_list][docid cozy][tf cozy][pos cozy]
//! [off cozy]` layout `posting_dumper` writes and exposes the cursor
//! contract from spec: `doc_id`/`term_freq`/`positions`/`offsets` read the
//! current posting, `advance`/`advance_to` move the cursor.
//!
//! Position/offset sub-iterators borrow `&self` rather than carrying a
//! runtime generation counter: Rust's borrow checker already forbids
//! calling `advance`/`advance_to` (which need `&mut self`) while one of
//! those iterators is alive, which is exactly the "invalid once the
//! parent advances" invariant spec asks for, at compile time instead of
//! at run time.

use crate::cozy::CozyBox;
use crate::error::{Result, SearchError};
use crate::posting_dumper::POSTING_LIST_MAGIC;
use crate::skiplist::{SkipList, SKIP_INTERVAL};
use crate::varint::decode_varint;

/// A decoded posting list, ready to be iterated. Cheap to construct
/// multiple independent iterators from (each gets private cursor state),
/// matching the read-only, shared-nothing query model.
pub struct PostingList {
    doc_freq: u32,
    skip_list: SkipList,
    doc_ids: Vec<u32>,
    term_freqs: Vec<u32>,
    pos_box: CozyBox,
    off_box: CozyBox,
    /// `pos_bag_starts[i]` = ordinal in `pos_box` where posting `i`'s
    /// positions begin; has `doc_freq + 1` entries (trailing sentinel).
    pos_bag_starts: Vec<u32>,
    off_bag_starts: Vec<u32>,
    has_offsets: bool,
}

impl PostingList {
    /// Parse a posting list starting at `bytes[0]`. Returns the list and
    /// the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.is_empty() || bytes[0] != POSTING_LIST_MAGIC {
            return Err(SearchError::corrupt("posting list: bad magic byte"));
        }
        let mut pos = 1;
        let (doc_freq, used) = decode_varint(&bytes[pos..])?;
        pos += used;

        let (skip_list, used) = SkipList::decode(&bytes[pos..])?;
        pos += used;

        let (docid_box, used) = CozyBox::decode(&bytes[pos..])?;
        pos += used;
        let (tf_box, used) = CozyBox::decode(&bytes[pos..])?;
        pos += used;
        let (pos_box, used) = CozyBox::decode(&bytes[pos..])?;
        pos += used;
        let (off_box, used) = CozyBox::decode(&bytes[pos..])?;
        pos += used;

        if docid_box.len() != doc_freq as usize || tf_box.len() != doc_freq as usize {
            return Err(SearchError::corrupt(
                "posting list: doc_freq does not match decoded posting count",
            ));
        }

        let mut doc_ids = Vec::with_capacity(doc_freq as usize);
        let mut running = 0u32;
        for i in 0..doc_freq as usize {
            running = running.wrapping_add(docid_box.get(i)?);
            doc_ids.push(running);
            if i > 0 && doc_ids[i] <= doc_ids[i - 1] {
                return Err(SearchError::corrupt(
                    "posting list: doc-ids are not strictly ascending",
                ));
            }
        }

        let mut term_freqs = Vec::with_capacity(doc_freq as usize);
        for i in 0..doc_freq as usize {
            term_freqs.push(tf_box.get(i)?);
        }

        let mut pos_bag_starts = Vec::with_capacity(doc_freq as usize + 1);
        let mut off_bag_starts = Vec::with_capacity(doc_freq as usize + 1);
        let mut pos_acc = 0u32;
        let mut off_acc = 0u32;
        for &tf in &term_freqs {
            pos_bag_starts.push(pos_acc);
            off_bag_starts.push(off_acc);
            pos_acc += tf;
            off_acc += tf * 2;
        }
        pos_bag_starts.push(pos_acc);
        off_bag_starts.push(off_acc);

        let has_offsets = !off_box.is_empty();

        Ok((
            PostingList {
                doc_freq,
                skip_list,
                doc_ids,
                term_freqs,
                pos_box,
                off_box,
                pos_bag_starts,
                off_bag_starts,
                has_offsets,
            },
            pos,
        ))
    }

    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    pub fn iter(&self) -> PostingListIterator<'_> {
        PostingListIterator {
            list: self,
            posting_idx: 0,
        }
    }
}

/// Cursor over a [`PostingList`]. See module docs for the sub-iterator
/// borrowing contract.
pub struct PostingListIterator<'a> {
    list: &'a PostingList,
    posting_idx: usize,
}

impl<'a> PostingListIterator<'a> {
    pub fn is_end(&self) -> bool {
        self.posting_idx >= self.list.doc_freq as usize
    }

    pub fn size(&self) -> u32 {
        self.list.doc_freq
    }

    pub fn doc_id(&self) -> Result<u32> {
        self.require_not_end()?;
        Ok(self.list.doc_ids[self.posting_idx])
    }

    pub fn term_freq(&self) -> Result<u32> {
        self.require_not_end()?;
        Ok(self.list.term_freqs[self.posting_idx])
    }

    /// Decoded absolute positions for the current posting.
    pub fn positions(&self) -> Result<impl Iterator<Item = u32> + '_> {
        self.require_not_end()?;
        let start = self.list.pos_bag_starts[self.posting_idx] as usize;
        let end = self.list.pos_bag_starts[self.posting_idx + 1] as usize;
        let mut running = 0u32;
        Ok((start..end).map(move |i| {
            let delta = self.list.pos_box.get(i).expect("position within bag range");
            running = running.wrapping_add(delta);
            running
        }))
    }

    /// Decoded `(start, end)` byte-offset pairs for the current posting.
    /// Empty if the index was built without offsets.
    pub fn offsets(&self) -> Result<impl Iterator<Item = (u32, u32)> + '_> {
        self.require_not_end()?;
        if !self.list.has_offsets {
            return Ok(OffsetsIter {
                list: self.list,
                idx: 0,
                end: 0,
                running_start: 0,
            });
        }
        let start = self.list.off_bag_starts[self.posting_idx] as usize;
        let end = self.list.off_bag_starts[self.posting_idx + 1] as usize;
        Ok(OffsetsIter {
            list: self.list,
            idx: start,
            end,
            running_start: 0,
        })
    }

    pub fn advance(&mut self) {
        if !self.is_end() {
            self.posting_idx += 1;
        }
    }

    /// Move to the first posting with `doc_id >= target`, using the skip
    /// list to jump near the target before scanning linearly (at most
    /// `SKIP_INTERVAL` postings within the chosen block).
    pub fn advance_to(&mut self, target: u32) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        if self.doc_id()? >= target {
            return Ok(());
        }

        let block_start = match self.list.skip_list.find_index_for(target) {
            Some(i) => i * SKIP_INTERVAL,
            None => 0,
        };
        let mut idx = self.posting_idx.max(block_start);
        while idx < self.list.doc_freq as usize && self.list.doc_ids[idx] < target {
            idx += 1;
        }
        self.posting_idx = idx;
        Ok(())
    }

    fn require_not_end(&self) -> Result<()> {
        if self.is_end() {
            Err(SearchError::usage("posting list iterator is at end"))
        } else {
            Ok(())
        }
    }
}

struct OffsetsIter<'a> {
    list: &'a PostingList,
    idx: usize,
    end: usize,
    running_start: u32,
}

impl<'a> Iterator for OffsetsIter<'a> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.end {
            return None;
        }
        let delta_start = self.list.off_box.get(self.idx).ok()?;
        let length = self.list.off_box.get(self.idx + 1).ok()?;
        self.idx += 2;
        let start = self.running_start.wrapping_add(delta_start);
        self.running_start = start;
        Some((start, start + length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting_dumper::{PostingBag, PostingListDumper};

    fn build_list(bags: &[(u32, &[u32])]) -> (Vec<u8>, u32) {
        let mut dumper = PostingListDumper::new();
        for &(doc_id, positions) in bags {
            dumper.add_bag(&PostingBag {
                doc_id,
                positions: positions.to_vec(),
                offsets: vec![],
            });
        }
        let mut out = Vec::new();
        let doc_freq = bags.len() as u32;
        dumper.encode(&mut out).unwrap();
        (out, doc_freq)
    }

    #[test]
    fn iterates_doc_ids_in_order() {
        let (bytes, doc_freq) = build_list(&[(0, &[1, 2]), (5, &[0]), (9, &[3, 4, 5])]);
        let (list, used) = PostingList::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(list.doc_freq(), doc_freq);

        let mut it = list.iter();
        assert_eq!(it.doc_id().unwrap(), 0);
        assert_eq!(it.term_freq().unwrap(), 2);
        assert_eq!(it.positions().unwrap().collect::<Vec<_>>(), vec![1, 2]);

        it.advance();
        assert_eq!(it.doc_id().unwrap(), 5);

        it.advance();
        assert_eq!(it.doc_id().unwrap(), 9);
        assert_eq!(
            it.positions().unwrap().collect::<Vec<_>>(),
            vec![3, 4, 5]
        );

        it.advance();
        assert!(it.is_end());
    }

    #[test]
    fn advance_to_seeks_forward() {
        let bags: Vec<(u32, Vec<u32>)> = (0..500u32).map(|i| (i, vec![i])).collect();
        let borrowed: Vec<(u32, &[u32])> = bags.iter().map(|(d, p)| (*d, p.as_slice())).collect();
        let (bytes, _) = build_list(&borrowed);
        let (list, _) = PostingList::decode(&bytes).unwrap();

        let mut it = list.iter();
        it.advance_to(499).unwrap();
        assert_eq!(it.doc_id().unwrap(), 499);

        let mut it2 = list.iter();
        it2.advance_to(250).unwrap();
        assert_eq!(it2.doc_id().unwrap(), 250);
    }

    #[test]
    fn advance_to_past_end_reaches_end() {
        let (bytes, _) = build_list(&[(0, &[0]), (1, &[0])]);
        let (list, _) = PostingList::decode(&bytes).unwrap();
        let mut it = list.iter();
        it.advance_to(1000).unwrap();
        assert!(it.is_end());
    }

    #[test]
    fn empty_posting_list_is_immediately_at_end() {
        let (bytes, _) = build_list(&[]);
        let (list, _) = PostingList::decode(&bytes).unwrap();
        let it = list.iter();
        assert!(it.is_end());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = [0x00u8, 0x01];
        assert!(PostingList::decode(&bytes).is_err());
    }
}
