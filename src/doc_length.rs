//! `my.doc_length`: one `(doc_id: u32, length: u32)` record per document,
//! read via memory-mapping at open time. The average length BM25 needs is
//! computed once at load rather than recomputed per query.

use crate::error::{Result, SearchError};

const RECORD_SIZE: usize = 8;

/// Accumulates document lengths during indexing, in doc-id order.
#[derive(Debug, Default)]
pub struct DocLengthWriter {
    lengths: Vec<u32>,
}

impl DocLengthWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the next document's length. Doc-ids are assigned densely and
    /// in order, so this is simply "append."
    pub fn push(&mut self, length: u32) -> u32 {
        let doc_id = self.lengths.len() as u32;
        self.lengths.push(length);
        doc_id
    }

    /// `[doc_id: u32 LE][length: u32 LE]` per record, concatenated.
    pub fn encode(&self, out: &mut Vec<u8>) {
        for (doc_id, &length) in self.lengths.iter().enumerate() {
            out.extend_from_slice(&(doc_id as u32).to_le_bytes());
            out.extend_from_slice(&length.to_le_bytes());
        }
    }
}

/// Read-only, loaded once from a decoded `my.doc_length` byte slice.
#[derive(Debug, Clone)]
pub struct DocLengthTable {
    lengths: Vec<u32>,
    average: f64,
}

impl DocLengthTable {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(SearchError::corrupt(
                "doc length table: size is not a multiple of the record size",
            ));
        }
        let num_docs = bytes.len() / RECORD_SIZE;
        let mut lengths = Vec::with_capacity(num_docs);
        let mut total: u64 = 0;

        for (expected_doc_id, chunk) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
            let doc_id = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let length = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            if doc_id as usize != expected_doc_id {
                return Err(SearchError::corrupt(format!(
                    "doc length table: expected dense doc-id {expected_doc_id}, found {doc_id}"
                )));
            }
            lengths.push(length);
            total += length as u64;
        }

        let average = if num_docs == 0 {
            0.0
        } else {
            total as f64 / num_docs as f64
        };

        Ok(DocLengthTable { lengths, average })
    }

    pub fn length(&self, doc_id: u32) -> Result<u32> {
        self.lengths
            .get(doc_id as usize)
            .copied()
            .ok_or_else(|| SearchError::corrupt(format!("doc length table: no entry for doc {doc_id}")))
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn num_docs(&self) -> u32 {
        self.lengths.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_average() {
        let mut w = DocLengthWriter::new();
        assert_eq!(w.push(10), 0);
        assert_eq!(w.push(20), 1);
        assert_eq!(w.push(30), 2);

        let mut buf = Vec::new();
        w.encode(&mut buf);

        let table = DocLengthTable::decode(&buf).unwrap();
        assert_eq!(table.num_docs(), 3);
        assert_eq!(table.length(0).unwrap(), 10);
        assert_eq!(table.length(1).unwrap(), 20);
        assert_eq!(table.length(2).unwrap(), 30);
        assert!((table.average() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_table_has_zero_average() {
        let table = DocLengthTable::decode(&[]).unwrap();
        assert_eq!(table.num_docs(), 0);
        assert_eq!(table.average(), 0.0);
    }

    #[test]
    fn non_dense_doc_ids_are_corrupt() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u32.to_le_bytes()); // should be 0
        buf.extend_from_slice(&10u32.to_le_bytes());
        assert!(DocLengthTable::decode(&buf).is_err());
    }

    #[test]
    fn misaligned_size_is_corrupt() {
        let buf = vec![0u8; 7];
        assert!(DocLengthTable::decode(&buf).is_err());
    }
}
