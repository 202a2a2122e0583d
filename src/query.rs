//! Multi-term intersection, BM25 ranking, and phrase pruning.
//!
//! The merge loop is the original `intersect.cc`'s: sort iterators by
//! increasing size, repeatedly `advance_to` the candidate and restart from
//! iterator 0 whenever one lands past it, until every iterator agrees.
//! BM25 constants are `ranking.cc`'s (`k1 = 1.2`, `b = 0.75`), kept as
//! named constants here rather than inlined.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bloom_store::BloomStore;
use crate::doc_length::DocLengthTable;
use crate::error::Result;
use crate::posting_iterator::PostingListIterator;

pub const BM25_K1: f64 = 1.2;
pub const BM25_B: f64 = 0.75;

pub fn idf(total_docs: u32, doc_freq: u32) -> f64 {
    let n = total_docs as f64;
    let df = doc_freq as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

pub fn tfnorm(tf: u32, doc_len: u32, avg_len: f64) -> f64 {
    let tf = tf as f64;
    let l = doc_len as f64;
    tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * l / avg_len.max(1e-9)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u32,
    pub score: f64,
}

/// Result of a (possibly cancelled) query.
#[derive(Debug, Clone, Default)]
pub struct PartialResult {
    /// Score-descending, doc-id-ascending-on-ties.
    pub hits: Vec<ScoredDoc>,
    pub cancelled: bool,
}

/// Min-ordered-by-quality wrapper: `Ord` treats the *worst* entry (lowest
/// score, then highest doc-id) as the greatest, so a plain `BinaryHeap`'s
/// `pop()` evicts the worst entry when the heap overflows `top_k`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry(ScoredDoc);

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.0.score.partial_cmp(&self.0.score).unwrap_or(Ordering::Equal) {
            Ordering::Equal => self.0.doc_id.cmp(&other.0.doc_id),
            ord => ord,
        }
    }
}

struct TopKHeap {
    capacity: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl TopKHeap {
    fn new(capacity: usize) -> Self {
        TopKHeap {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
        }
    }

    fn push(&mut self, doc: ScoredDoc) {
        if self.capacity == 0 {
            return;
        }
        self.heap.push(HeapEntry(doc));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    /// Drain into score-descending, doc-id-ascending-on-ties order.
    fn into_sorted(self) -> Vec<ScoredDoc> {
        let mut docs: Vec<ScoredDoc> = self.heap.into_iter().map(|e| e.0).collect();
        docs.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        docs
    }
}

/// One query term's state: its iterator and term bytes (for bloom-store
/// lookups), plus its position in the original query order. `intersect`
/// reorders its `terms` slice by iterator size for merge efficiency, so
/// anything that depends on phrase adjacency (position 0 next to position
/// 1, etc.) must recover the original order via `orig_index` rather than
/// assuming slice order matches query order.
pub struct QueryTerm<'a> {
    pub term: Vec<u8>,
    pub iter: PostingListIterator<'a>,
    pub orig_index: usize,
}

/// Find the doc-ids matching a conjunctive (AND) query, per spec §4.7
/// steps 1-4: sort by size, skip-to-candidate with restart-from-0.
///
/// `on_match` is called once per matching doc-id with every term's
/// iterator positioned on that doc; it returns `false` to stop early.
/// `is_cancelled` is polled between advances; when it returns `true` the
/// loop stops and the caller should report a cancelled partial result.
fn intersect<'a>(
    terms: &mut [QueryTerm<'a>],
    mut is_cancelled: impl FnMut() -> bool,
    mut on_match: impl FnMut(&mut [QueryTerm<'a>], u32) -> bool,
) -> Result<bool> {
    if terms.is_empty() {
        return Ok(false);
    }
    terms.sort_by_key(|t| t.iter.size());

    loop {
        if is_cancelled() {
            return Ok(true);
        }
        if terms[0].iter.is_end() {
            return Ok(false);
        }
        let mut candidate = terms[0].iter.doc_id()?;

        'agree: loop {
            for t in terms.iter_mut() {
                t.iter.advance_to(candidate)?;
                if t.iter.is_end() {
                    return Ok(false);
                }
                let d = t.iter.doc_id()?;
                if d > candidate {
                    candidate = d;
                    continue 'agree;
                }
            }
            break;
        }

        if !on_match(terms, candidate) {
            return Ok(false);
        }
        for t in terms.iter_mut() {
            t.iter.advance();
        }
    }
}

/// Execute a ranked conjunctive query over `terms`, returning the top
/// `top_k` documents by BM25 score.
pub fn search_and(
    mut terms: Vec<QueryTerm<'_>>,
    total_docs: u32,
    doc_lengths: &DocLengthTable,
    top_k: usize,
    is_cancelled: impl FnMut() -> bool,
) -> Result<PartialResult> {
    let mut heap = TopKHeap::new(top_k);

    // `intersect` reorders `terms` in place (sorts by iterator size), so
    // each term's doc_freq is read fresh from its own iterator here rather
    // than from a vector captured before the reorder.
    let cancelled = intersect(&mut terms, is_cancelled, |matched, doc_id| {
        let doc_len = match doc_lengths.length(doc_id) {
            Ok(l) => l,
            Err(_) => return true, // skip malformed entries rather than aborting the whole query
        };
        let avg_len = doc_lengths.average();
        let mut score = 0.0;
        for t in matched.iter() {
            let df = t.iter.size();
            let tf = t.iter.term_freq().unwrap_or(0);
            score += idf(total_docs, df) * tfnorm(tf, doc_len, avg_len);
        }
        heap.push(ScoredDoc { doc_id, score });
        true
    })?;

    Ok(PartialResult {
        hits: heap.into_sorted(),
        cancelled,
    })
}

/// Execute a phrase query: an ordered conjunction of terms where a match
/// also requires adjacent positions (`p` in termᵢ, `p+1` in termᵢ₊₁, ...).
///
/// When `bloom` is supplied, each AND-match is first checked against the
/// bloom filter for `(terms[0], doc_id)` testing `terms[1]`'s bytes before
/// paying for the full positional check; a filter miss skips the doc
/// without touching its positions. `bloom_skips` is incremented once per
/// doc pruned this way (an injected counter, per spec §8 scenario 2, so
/// tests can observe that the positional check was actually skipped).
pub fn search_phrase(
    mut terms: Vec<QueryTerm<'_>>,
    total_docs: u32,
    doc_lengths: &DocLengthTable,
    top_k: usize,
    bloom: Option<&BloomStore<'_>>,
    bloom_skips: &mut u64,
    mut is_cancelled: impl FnMut() -> bool,
) -> Result<PartialResult> {
    let term_bytes: Vec<Vec<u8>> = terms.iter().map(|t| t.term.clone()).collect();
    let mut heap = TopKHeap::new(top_k);

    let cancelled = intersect(
        &mut terms,
        &mut is_cancelled,
        |matched, doc_id| {
            if let Some(store) = bloom {
                if term_bytes.len() >= 2 {
                    let pruned = store
                        .lookup(&term_bytes[0], doc_id)
                        .ok()
                        .flatten()
                        .map(|filter| {
                            matches!(
                                filter.check(&term_bytes[1]),
                                crate::bloom::BloomCheck::NotPresent
                            )
                        })
                        .unwrap_or(false);
                    if pruned {
                        *bloom_skips += 1;
                        return true;
                    }
                }
            }

            // Positional adjacency depends on phrase order, not the
            // size-sorted order `intersect` uses for its merge.
            matched.sort_by_key(|t| t.orig_index);
            if !positional_phrase_match(matched) {
                return true;
            }

            let doc_len = match doc_lengths.length(doc_id) {
                Ok(l) => l,
                Err(_) => return true,
            };
            let avg_len = doc_lengths.average();
            let mut score = 0.0;
            for t in matched.iter() {
                let df = t.iter.size();
                let tf = t.iter.term_freq().unwrap_or(0);
                score += idf(total_docs, df) * tfnorm(tf, doc_len, avg_len);
            }
            heap.push(ScoredDoc { doc_id, score });
            true
        },
    )?;

    Ok(PartialResult {
        hits: heap.into_sorted(),
        cancelled,
    })
}

/// True iff there is a position `p` in `terms[0]`, `p+1` in `terms[1]`,
/// `p+2` in `terms[2]`, ... for every adjacent pair — the generalisation
/// of the two-term phrase check to arbitrary phrase length.
fn positional_phrase_match(terms: &mut [QueryTerm<'_>]) -> bool {
    if terms.len() < 2 {
        return true;
    }
    let first: Vec<u32> = match terms[0].iter.positions() {
        Ok(p) => p.collect(),
        Err(_) => return false,
    };
    let mut candidates = first;

    for t in terms.iter_mut().skip(1) {
        let positions: Vec<u32> = match t.iter.positions() {
            Ok(p) => p.collect(),
            Err(_) => return false,
        };
        let next: Vec<u32> = candidates
            .iter()
            .filter(|&&p| positions.binary_search(&(p + 1)).is_ok())
            .map(|&p| p + 1)
            .collect();
        if next.is_empty() {
            return false;
        }
        candidates = next;
    }
    !candidates.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_decreases_with_higher_doc_freq() {
        let rare = idf(1000, 1);
        let common = idf(1000, 500);
        assert!(rare > common);
    }

    #[test]
    fn tfnorm_rewards_shorter_documents() {
        let short = tfnorm(1, 2, 10.0);
        let long = tfnorm(1, 50, 10.0);
        assert!(short > long);
    }

    #[test]
    fn heap_keeps_only_top_k_by_score_then_doc_id() {
        let mut heap = TopKHeap::new(2);
        heap.push(ScoredDoc { doc_id: 0, score: 1.0 });
        heap.push(ScoredDoc { doc_id: 1, score: 3.0 });
        heap.push(ScoredDoc { doc_id: 2, score: 2.0 });
        let sorted = heap.into_sorted();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].doc_id, 1);
        assert_eq!(sorted[1].doc_id, 2);
    }

    #[test]
    fn heap_breaks_ties_by_lower_doc_id() {
        let mut heap = TopKHeap::new(1);
        heap.push(ScoredDoc { doc_id: 5, score: 1.0 });
        heap.push(ScoredDoc { doc_id: 2, score: 1.0 });
        let sorted = heap.into_sorted();
        assert_eq!(sorted[0].doc_id, 2);
    }
}
