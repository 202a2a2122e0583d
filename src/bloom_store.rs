//! Per-(term, document) Bloom filters over the "phrase begins"/"phrase
//! ends" tokens adjacent to each occurrence of the term, used to prune
//! candidate documents before a positional phrase check runs.
//!
//! Grounded in the original `bloom_filter.h`'s bloom-store shape and
//! spec's wire layout: one entry per term, each holding a list of
//! `BloomCase(doc_id, filter)` in ascending doc-id order. Every filter in
//! a store shares the same `(num_bits, num_hashes)` dimensions (sized
//! once from the store's configured `ratio`/`expected_entries`, recorded
//! in the store's `.meta` file), so a case only needs to carry its raw bit
//! array, not a repeated header.

use crate::bloom::BloomFilter;
use crate::error::{Result, SearchError};
use crate::term_index::{TermIndex, TermIndexWriter};
use crate::varint::{decode_varint, encode_varint};

/// Magic byte at the start of a `.meta` file.
pub const BLOOM_META_MAGIC: u8 = 0xB1;

/// One (doc-id, filter) pair within a term's bloom case list.
#[derive(Debug, Clone)]
pub struct BloomCase {
    pub doc_id: u32,
    pub filter: BloomFilter,
}

/// Sizing parameters shared by every filter in a store, persisted as the
/// store's `.meta` file: `[magic 0xB1][ratio: f32 LE][expected_entries: i32 LE]`.
#[derive(Debug, Clone, Copy)]
pub struct BloomMeta {
    pub ratio: f32,
    pub expected_entries: i32,
}

impl BloomMeta {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(BLOOM_META_MAGIC);
        out.extend_from_slice(&self.ratio.to_le_bytes());
        out.extend_from_slice(&self.expected_entries.to_le_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 9 || bytes[0] != BLOOM_META_MAGIC {
            return Err(SearchError::corrupt("bloom meta: bad magic or length"));
        }
        let ratio = f32::from_le_bytes(bytes[1..5].try_into().unwrap());
        let expected_entries = i32::from_le_bytes(bytes[5..9].try_into().unwrap());
        Ok(BloomMeta {
            ratio,
            expected_entries,
        })
    }
}

/// Accumulates bloom cases term by term and serializes the store's main
/// data file plus a companion `TermIndexWriter` for its index file.
#[derive(Debug, Default)]
pub struct BloomStoreWriter {
    index: TermIndexWriter,
    bytes: Vec<u8>,
}

impl BloomStoreWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one term's case list (already sorted by doc-id) to the store,
    /// recording its offset in the accompanying term index.
    ///
    /// Wire shape: `[term-len varint][term bytes][case-block-len varint]
    /// [case-block]`, where `case-block` is `[num_cases varint][per case:
    /// doc_id varint, case-size varint, bit-array-len varint, bit-array bytes]`.
    pub fn push_term(&mut self, term: &[u8], cases: &[BloomCase]) {
        let offset = self.bytes.len() as i64;

        encode_varint(term.len() as u32, &mut self.bytes);
        self.bytes.extend_from_slice(term);

        let mut case_block = Vec::new();
        encode_varint(cases.len() as u32, &mut case_block);
        for case in cases {
            let mut case_bytes = Vec::new();
            encode_varint(case.doc_id, &mut case_bytes);
            let bits = case.filter.raw_bits();
            encode_varint(bits.len() as u32, &mut case_bytes);
            case_bytes.extend_from_slice(bits);

            encode_varint(case_bytes.len() as u32, &mut case_block);
            case_block.extend_from_slice(&case_bytes);
        }

        encode_varint(case_block.len() as u32, &mut self.bytes);
        self.bytes.extend_from_slice(&case_block);

        self.index.push(term, offset);
    }

    pub fn finish(self) -> (Vec<u8>, TermIndexWriter) {
        (self.bytes, self.index)
    }
}

/// Read-only bloom store, opened from its `.store` data and `.index` files.
pub struct BloomStore<'a> {
    data: &'a [u8],
    index: TermIndex,
    num_bits: u32,
    num_hashes: u32,
}

impl<'a> BloomStore<'a> {
    pub fn open(data: &'a [u8], index_bytes: &[u8], meta: BloomMeta, num_hashes_hint: u32) -> Result<Self> {
        let index = TermIndex::decode(index_bytes)?;
        let n = meta.expected_entries.max(1) as f64;
        let m = (-n * (meta.ratio as f64).ln() / std::f64::consts::LN_2.powi(2))
            .ceil()
            .max(1.0);
        let num_bits = m as u32;
        let num_hashes = if num_hashes_hint > 0 {
            num_hashes_hint
        } else {
            (((m / n) * std::f64::consts::LN_2).round().max(1.0)) as u32
        };
        Ok(BloomStore {
            data,
            index,
            num_bits,
            num_hashes,
        })
    }

    /// Look up the bloom case for `(term, doc_id)`. `None` if the term
    /// isn't in the store, or if the doc has no case recorded for it.
    pub fn lookup(&self, term: &[u8], doc_id: u32) -> Result<Option<BloomFilter>> {
        let Some(offset) = self.index.lookup(term) else {
            return Ok(None);
        };
        if offset < 0 || offset as usize >= self.data.len() {
            return Err(SearchError::corrupt("bloom store: term offset out of range"));
        }
        let mut pos = offset as usize;
        let (term_len, used) = decode_varint(&self.data[pos..])?;
        pos += used;
        pos = checked_advance(pos, term_len as usize, self.data.len())?;

        let (case_block_len, used) = decode_varint(&self.data[pos..])?;
        pos += used;
        let case_block = checked_slice(self.data, pos, case_block_len as usize)?;

        let mut cpos = 0;
        let (num_cases, used) = decode_varint(&case_block[cpos..])?;
        cpos += used;
        for _ in 0..num_cases {
            let (case_size, used) = decode_varint(&case_block[cpos..])?;
            cpos += used;
            let case_bytes = checked_slice(case_block, cpos, case_size as usize)?;
            cpos = checked_advance(cpos, case_size as usize, case_block.len())?;

            let mut ip = 0;
            let (case_doc_id, used) = decode_varint(&case_bytes[ip..])?;
            ip += used;
            let (bit_len, used) = decode_varint(&case_bytes[ip..])?;
            ip += used;
            let bits = checked_slice(case_bytes, ip, bit_len as usize)?.to_vec();

            if case_doc_id == doc_id {
                return Ok(Some(BloomFilter::from_raw_bits(
                    self.num_bits,
                    self.num_hashes,
                    bits,
                )));
            }
        }
        Ok(None)
    }
}

/// `&data[start..start + len]`, bounds-checked against a corrupt on-disk
/// length rather than trusting it to slice.
fn checked_slice(data: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    if start > data.len() || len > data.len() - start {
        return Err(SearchError::corrupt("bloom store: record length out of range"));
    }
    Ok(&data[start..start + len])
}

/// `start + len`, bounds-checked against `limit` rather than trusting a
/// corrupt on-disk length to stay in range.
fn checked_advance(start: usize, len: usize, limit: usize) -> Result<usize> {
    if start > limit || len > limit - start {
        return Err(SearchError::corrupt("bloom store: record length out of range"));
    }
    Ok(start + len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::BloomCheck;

    fn filter_with(ratio: f64, n: usize, members: &[&[u8]]) -> BloomFilter {
        let mut f = BloomFilter::new(ratio, n);
        for m in members {
            f.add(m);
        }
        f
    }

    #[test]
    fn roundtrip_lookup() {
        let ratio = 0.02;
        let n = 10;
        let meta = BloomMeta {
            ratio: ratio as f32,
            expected_entries: n as i32,
        };

        let mut writer = BloomStoreWriter::new();
        writer.push_term(
            b"hello",
            &[
                BloomCase {
                    doc_id: 0,
                    filter: filter_with(ratio, n, &[b"world"]),
                },
                BloomCase {
                    doc_id: 5,
                    filter: filter_with(ratio, n, &[b"there"]),
                },
            ],
        );
        writer.push_term(
            b"zzz",
            &[BloomCase {
                doc_id: 2,
                filter: filter_with(ratio, n, &[b"top"]),
            }],
        );

        let (data, index_writer) = writer.finish();
        let mut index_bytes = Vec::new();
        index_writer.encode(&mut index_bytes);

        let store = BloomStore::open(&data, &index_bytes, meta, 0).unwrap();

        let found = store.lookup(b"hello", 0).unwrap().unwrap();
        assert_eq!(found.check(b"world"), BloomCheck::Present);
        assert_eq!(found.check(b"nope"), BloomCheck::NotPresent);

        let found2 = store.lookup(b"hello", 5).unwrap().unwrap();
        assert_eq!(found2.check(b"there"), BloomCheck::Present);

        assert!(store.lookup(b"hello", 99).unwrap().is_none());
        assert!(store.lookup(b"missing-term", 0).unwrap().is_none());
    }

    #[test]
    fn empty_filter_case_roundtrips() {
        let ratio = 0.02;
        let n = 10;
        let meta = BloomMeta {
            ratio: ratio as f32,
            expected_entries: n as i32,
        };
        let mut writer = BloomStoreWriter::new();
        writer.push_term(
            b"solo",
            &[BloomCase {
                doc_id: 0,
                filter: BloomFilter::new(ratio, 0),
            }],
        );
        let (data, index_writer) = writer.finish();
        let mut index_bytes = Vec::new();
        index_writer.encode(&mut index_bytes);
        let store = BloomStore::open(&data, &index_bytes, meta, 0).unwrap();
        let found = store.lookup(b"solo", 0).unwrap().unwrap();
        assert_eq!(found.check(b"x"), BloomCheck::Uninitialised);
    }

    #[test]
    fn truncated_case_block_is_corrupt_not_a_panic() {
        let ratio = 0.02;
        let n = 10;
        let meta = BloomMeta {
            ratio: ratio as f32,
            expected_entries: n as i32,
        };
        let mut writer = BloomStoreWriter::new();
        writer.push_term(
            b"hello",
            &[BloomCase {
                doc_id: 0,
                filter: filter_with(ratio, n, &[b"world"]),
            }],
        );
        let (mut data, index_writer) = writer.finish();
        let mut index_bytes = Vec::new();
        index_writer.encode(&mut index_bytes);

        data.truncate(data.len() - 1);
        let store = BloomStore::open(&data, &index_bytes, meta, 0).unwrap();
        assert!(matches!(store.lookup(b"hello", 0), Err(SearchError::Corrupt(_))));
    }

    #[test]
    fn meta_roundtrip() {
        let meta = BloomMeta {
            ratio: 0.01,
            expected_entries: 12345,
        };
        let mut buf = Vec::new();
        meta.encode(&mut buf);
        let decoded = BloomMeta::decode(&buf).unwrap();
        assert_eq!(decoded.ratio, meta.ratio);
        assert_eq!(decoded.expected_entries, meta.expected_entries);
    }
}
