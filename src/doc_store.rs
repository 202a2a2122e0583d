//! Document store: `my.fdx` (fixed-record index) + `my.fdt` (concatenated
//! bodies), used only to fetch the original text for snippet generation —
//! never consulted during scoring.

use crate::error::{Result, SearchError};

const INDEX_RECORD_SIZE: usize = 12; // offset: u64 LE, length: u32 LE

/// Accumulates document bodies and produces the `fdx`/`fdt` pair.
#[derive(Debug, Default)]
pub struct DocStoreWriter {
    index: Vec<(u64, u32)>,
    data: Vec<u8>,
}

impl DocStoreWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one document's body, returning its assigned doc-id.
    pub fn push(&mut self, body: &[u8]) -> u32 {
        let doc_id = self.index.len() as u32;
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(body);
        self.index.push((offset, body.len() as u32));
        doc_id
    }

    /// Returns `(fdx bytes, fdt bytes)`.
    pub fn finish(self) -> (Vec<u8>, Vec<u8>) {
        let mut fdx = Vec::with_capacity(self.index.len() * INDEX_RECORD_SIZE);
        for (offset, length) in &self.index {
            fdx.extend_from_slice(&offset.to_le_bytes());
            fdx.extend_from_slice(&length.to_le_bytes());
        }
        (fdx, self.data)
    }
}

/// Read-only document store opened from memory-mapped `fdx`/`fdt` bytes.
pub struct DocStore<'a> {
    index: Vec<(u64, u32)>,
    data: &'a [u8],
}

impl<'a> DocStore<'a> {
    pub fn open(fdx_bytes: &[u8], fdt_bytes: &'a [u8]) -> Result<Self> {
        if fdx_bytes.len() % INDEX_RECORD_SIZE != 0 {
            return Err(SearchError::corrupt(
                "document store index: size is not a multiple of the record size",
            ));
        }
        let mut index = Vec::with_capacity(fdx_bytes.len() / INDEX_RECORD_SIZE);
        for chunk in fdx_bytes.chunks_exact(INDEX_RECORD_SIZE) {
            let offset = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let length = u32::from_le_bytes(chunk[8..12].try_into().unwrap());
            if offset as usize + length as usize > fdt_bytes.len() {
                return Err(SearchError::corrupt(
                    "document store: record references bytes past end of data file",
                ));
            }
            index.push((offset, length));
        }
        Ok(DocStore {
            index,
            data: fdt_bytes,
        })
    }

    pub fn body(&self, doc_id: u32) -> Result<&'a [u8]> {
        let &(offset, length) = self
            .index
            .get(doc_id as usize)
            .ok_or_else(|| SearchError::corrupt(format!("document store: no entry for doc {doc_id}")))?;
        Ok(&self.data[offset as usize..offset as usize + length as usize])
    }

    pub fn num_docs(&self) -> u32 {
        self.index.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bodies() {
        let mut w = DocStoreWriter::new();
        assert_eq!(w.push(b"hello world"), 0);
        assert_eq!(w.push(b"second doc"), 1);
        assert_eq!(w.push(b""), 2);

        let (fdx, fdt) = w.finish();
        let store = DocStore::open(&fdx, &fdt).unwrap();
        assert_eq!(store.num_docs(), 3);
        assert_eq!(store.body(0).unwrap(), b"hello world");
        assert_eq!(store.body(1).unwrap(), b"second doc");
        assert_eq!(store.body(2).unwrap(), b"");
    }

    #[test]
    fn out_of_range_doc_id_is_corrupt() {
        let mut w = DocStoreWriter::new();
        w.push(b"only doc");
        let (fdx, fdt) = w.finish();
        let store = DocStore::open(&fdx, &fdt).unwrap();
        assert!(store.body(1).is_err());
    }

    #[test]
    fn truncated_data_file_is_corrupt() {
        let mut w = DocStoreWriter::new();
        w.push(b"hello world");
        let (fdx, fdt) = w.finish();
        assert!(DocStore::open(&fdx, &fdt[..3]).is_err());
    }
}
