//! Top-level build/query state machine: `IndexBuilder` (empty → building →
//! sealed) feeds a finished directory of files that `Index` (sealed →
//! queryable → closed) opens read-only via memory-mapping.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use memmap2::Mmap;

use crate::bloom_store::{BloomMeta, BloomStore};
use crate::doc_length::{DocLengthTable, DocLengthWriter};
use crate::doc_store::{DocStore, DocStoreWriter};
use crate::error::{Result, SearchError};
use crate::posting_dumper::{PostingBag, PostingListDumper};
use crate::query::{self, PartialResult, QueryTerm};
use crate::term_index::{TermIndex, TermIndexWriter};

pub const VACUUM_FILE: &str = "my.vacuum";
pub const TIP_FILE: &str = "my.tip";
pub const DOC_LENGTH_FILE: &str = "my.doc_length";
pub const FDX_FILE: &str = "my.fdx";
pub const FDT_FILE: &str = "my.fdt";
pub const CRC_FILE: &str = "my.crc32";

/// Files checksummed in `my.crc32`, in the fixed order their CRCs are
/// written and read back.
const CHECKSUMMED_FILES: [&str; 5] = [VACUUM_FILE, TIP_FILE, DOC_LENGTH_FILE, FDX_FILE, FDT_FILE];

/// One document handed to [`IndexBuilder::add_document`]: its body (for
/// the document store) and its tokens, each occurrence carrying a
/// position and — when the index is built `WITH_OFFSETS` — a byte-offset
/// pair. `positions`/`offsets` are parallel to `terms`.
#[derive(Debug, Clone, Default)]
pub struct DocInfo {
    pub body: Vec<u8>,
    pub terms: Vec<Vec<u8>>,
    pub positions: Vec<u32>,
    pub offsets: Vec<(u32, u32)>,
}

/// Source of documents to index — the (out-of-scope) line-doc loader and
/// tokenizer implement this; the core only consumes it.
pub trait DocSource {
    fn next_doc(&mut self) -> Result<Option<DocInfo>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Empty,
    Building,
    Sealed,
}

/// Accumulates documents and produces a sealed, on-disk index directory.
pub struct IndexBuilder {
    state: BuilderState,
    terms: BTreeMap<Vec<u8>, PostingListDumper>,
    doc_lengths: DocLengthWriter,
    doc_store: DocStoreWriter,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        IndexBuilder {
            state: BuilderState::Empty,
            terms: BTreeMap::new(),
            doc_lengths: DocLengthWriter::new(),
            doc_store: DocStoreWriter::new(),
        }
    }

    /// Add one document. Doc-ids are assigned densely, in call order.
    /// Fatal usage error once the builder has been sealed.
    pub fn add_document(&mut self, doc: DocInfo) -> Result<u32> {
        if self.state == BuilderState::Sealed {
            return Err(SearchError::usage(
                "add_document called on a sealed index builder",
            ));
        }
        self.state = BuilderState::Building;

        let doc_id = self.doc_store.push(&doc.body);
        self.doc_lengths.push(doc.terms.len() as u32);

        let has_offsets = !doc.offsets.is_empty();
        let mut per_term: BTreeMap<&[u8], (Vec<u32>, Vec<(u32, u32)>)> = BTreeMap::new();
        for (i, term) in doc.terms.iter().enumerate() {
            let entry = per_term.entry(term.as_slice()).or_default();
            entry.0.push(doc.positions[i]);
            if has_offsets {
                entry.1.push(doc.offsets[i]);
            }
        }

        for (term, (positions, offsets)) in per_term {
            let dumper = self
                .terms
                .entry(term.to_vec())
                .or_insert_with(PostingListDumper::new);
            dumper.add_bag(&PostingBag {
                doc_id,
                positions,
                offsets,
            });
        }

        Ok(doc_id)
    }

    /// Seal the builder, writing the finished index to `dir` (created if
    /// missing). No transitions back to `building` after this.
    pub fn dump(self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut vacuum = Vec::new();
        let mut tip = TermIndexWriter::new();
        for (term, dumper) in self.terms {
            let offset = dumper.encode(&mut vacuum)?;
            tip.push(&term, offset as i64);
        }
        let mut tip_bytes = Vec::new();
        tip.encode(&mut tip_bytes);

        let mut doc_length_bytes = Vec::new();
        self.doc_lengths.encode(&mut doc_length_bytes);

        let (fdx, fdt) = self.doc_store.finish();

        let mut crc_bytes = Vec::with_capacity(CHECKSUMMED_FILES.len() * 4);
        for buf in [&vacuum, &tip_bytes, &doc_length_bytes, &fdx, &fdt] {
            crc_bytes.extend_from_slice(&crc32fast::hash(buf).to_le_bytes());
        }

        fs::write(dir.join(VACUUM_FILE), vacuum)?;
        fs::write(dir.join(TIP_FILE), tip_bytes)?;
        fs::write(dir.join(DOC_LENGTH_FILE), doc_length_bytes)?;
        fs::write(dir.join(FDX_FILE), fdx)?;
        fs::write(dir.join(FDT_FILE), fdt)?;
        fs::write(dir.join(CRC_FILE), crc_bytes)?;
        Ok(())
    }
}

/// An opened bloom store's backing files, kept alive for the `Index`'s
/// lifetime.
struct BloomMmaps {
    meta: BloomMeta,
    _index_mmap: Mmap,
    _store_mmap: Mmap,
}

/// A finished, memory-mapped index, open for concurrent read-only queries.
pub struct Index {
    vacuum_mmap: Option<Mmap>,
    fdx_mmap: Option<Mmap>,
    fdt_mmap: Option<Mmap>,
    term_index: TermIndex,
    doc_lengths: DocLengthTable,
    bloom_begin: Option<BloomMmaps>,
    bloom_end: Option<BloomMmaps>,
    closed: bool,
}

impl Index {
    pub fn open(dir: &Path) -> Result<Self> {
        let vacuum_mmap = map_file(&dir.join(VACUUM_FILE))?;
        let tip_bytes = fs::read(dir.join(TIP_FILE))?;
        let doc_length_bytes = fs::read(dir.join(DOC_LENGTH_FILE))?;
        let fdx_mmap = map_file(&dir.join(FDX_FILE))?;
        let fdt_mmap = map_file(&dir.join(FDT_FILE))?;

        verify_checksums(
            dir,
            &[&vacuum_mmap[..], &tip_bytes, &doc_length_bytes, &fdx_mmap[..], &fdt_mmap[..]],
        )?;

        let term_index = TermIndex::decode(&tip_bytes)?;
        let doc_lengths = DocLengthTable::decode(&doc_length_bytes)?;

        let bloom_begin = open_bloom(dir, "bloom_begin")?;
        let bloom_end = open_bloom(dir, "bloom_end")?;

        Ok(Index {
            vacuum_mmap: Some(vacuum_mmap),
            fdx_mmap: Some(fdx_mmap),
            fdt_mmap: Some(fdt_mmap),
            term_index,
            doc_lengths,
            bloom_begin,
            bloom_end,
            closed: false,
        })
    }

    /// Release the memory maps. Queries after this return `Usage` errors.
    pub fn close(&mut self) {
        self.closed = true;
        self.vacuum_mmap = None;
        self.fdx_mmap = None;
        self.fdt_mmap = None;
        self.bloom_begin = None;
        self.bloom_end = None;
    }

    pub fn total_docs(&self) -> u32 {
        self.doc_lengths.num_docs()
    }

    pub fn doc_store(&self) -> Result<DocStore<'_>> {
        self.require_open()?;
        DocStore::open(
            self.fdx_mmap.as_deref().unwrap(),
            self.fdt_mmap.as_deref().unwrap(),
        )
    }

    /// Conjunctive (AND) query, ranked by BM25.
    pub fn query_and(
        &self,
        terms: &[Vec<u8>],
        top_k: usize,
        is_cancelled: impl FnMut() -> bool,
    ) -> Result<PartialResult> {
        self.require_open()?;
        if terms.is_empty() {
            return Err(SearchError::usage("query requires at least one term"));
        }
        let Some(lists) = self.decode_posting_lists(terms)? else {
            return Ok(PartialResult::default());
        };
        let query_terms = build_query_terms(terms, &lists);
        query::search_and(query_terms, self.total_docs(), &self.doc_lengths, top_k, is_cancelled)
    }

    /// Phrase query: `terms` in adjacent-position order. For each AND
    /// match, tests the phrase's second term against the first term's
    /// `bloom_end` entry (the bloom store keyed on the word *following*
    /// each occurrence) to prune candidates before the positional check,
    /// if that store was built.
    pub fn query_phrase(
        &self,
        terms: &[Vec<u8>],
        top_k: usize,
        bloom_skips: &mut u64,
        is_cancelled: impl FnMut() -> bool,
    ) -> Result<PartialResult> {
        self.require_open()?;
        if terms.len() < 2 {
            return Err(SearchError::usage("phrase query requires at least two terms"));
        }
        let Some(lists) = self.decode_posting_lists(terms)? else {
            return Ok(PartialResult::default());
        };
        let query_terms = build_query_terms(terms, &lists);
        let store = self.bloom_store_view(BloomSide::End)?;
        query::search_phrase(
            query_terms,
            self.total_docs(),
            &self.doc_lengths,
            top_k,
            store.as_ref(),
            bloom_skips,
            is_cancelled,
        )
    }

    /// Decode each requested term's posting list to an owned
    /// [`crate::posting_iterator::PostingList`]. Fully materialized from
    /// the mmap bytes (no borrow of the mmap survives this call), so the
    /// returned `Vec` — not the `Index` — is what query-term iterators end
    /// up borrowing from.
    ///
    /// Returns `Ok(None)` if any term is absent from the index entirely:
    /// an AND or phrase query containing an unknown term can never match
    /// a document, so the caller should short-circuit to an empty result
    /// rather than erroring (an unknown term is a legitimate empty-result
    /// query, not caller misuse).
    fn decode_posting_lists(
        &self,
        terms: &[Vec<u8>],
    ) -> Result<Option<Vec<crate::posting_iterator::PostingList>>> {
        let vacuum = self.vacuum_mmap.as_deref().unwrap();
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            let Some(offset) = self.term_index.lookup(term) else {
                return Ok(None);
            };
            if offset < 0 || offset as usize >= vacuum.len() {
                return Err(SearchError::corrupt("term index: offset out of range"));
            }
            let (list, _) = crate::posting_iterator::PostingList::decode(&vacuum[offset as usize..])?;
            out.push(list);
        }
        Ok(Some(out))
    }

    fn bloom_store_view(&self, side: BloomSide) -> Result<Option<BloomStore<'_>>> {
        let mmaps = match side {
            BloomSide::Begin => &self.bloom_begin,
            BloomSide::End => &self.bloom_end,
        };
        let Some(mmaps) = mmaps else {
            return Ok(None);
        };
        let store = BloomStore::open(&mmaps._store_mmap, &mmaps._index_mmap, mmaps.meta, 0)?;
        Ok(Some(store))
    }

    fn require_open(&self) -> Result<()> {
        if self.closed {
            Err(SearchError::usage("query on a closed index"))
        } else {
            Ok(())
        }
    }
}

enum BloomSide {
    Begin,
    End,
}

/// Pair each requested term with its decoded posting list, in original
/// query order (`orig_index` lets `search_phrase` recover that order
/// after `intersect` reorders its working slice by iterator size).
fn build_query_terms<'a>(
    terms: &[Vec<u8>],
    lists: &'a [crate::posting_iterator::PostingList],
) -> Vec<QueryTerm<'a>> {
    terms
        .iter()
        .zip(lists.iter())
        .enumerate()
        .map(|(orig_index, (term, list))| QueryTerm {
            term: term.clone(),
            iter: list.iter(),
            orig_index,
        })
        .collect()
}

/// Check each file's CRC32 against `my.crc32`, in [`CHECKSUMMED_FILES`]
/// order. Catches silent on-disk corruption that the format's own magic
/// bytes and length checks wouldn't (a byte flipped deep inside a cozy
/// box's packed payload, say) before any of it is trusted to decode.
fn verify_checksums(dir: &Path, bufs: &[&[u8]]) -> Result<()> {
    let crc_bytes = fs::read(dir.join(CRC_FILE))?;
    if crc_bytes.len() != CHECKSUMMED_FILES.len() * 4 {
        return Err(SearchError::corrupt("checksum file: unexpected size"));
    }
    for (i, (name, buf)) in CHECKSUMMED_FILES.iter().zip(bufs.iter()).enumerate() {
        let expected = u32::from_le_bytes(crc_bytes[i * 4..i * 4 + 4].try_into().unwrap());
        let actual = crc32fast::hash(buf);
        if actual != expected {
            return Err(SearchError::corrupt(format!(
                "{name}: checksum mismatch (expected {expected:#x}, got {actual:#x})"
            )));
        }
    }
    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = fs::File::open(path)?;
    // SAFETY: the index owns the file exclusively for its lifetime and
    // never truncates it; nothing else in this process writes to it.
    unsafe { Mmap::map(&file).map_err(SearchError::from) }
}

fn open_bloom(dir: &Path, prefix: &str) -> Result<Option<BloomMmaps>> {
    let meta_path = dir.join(format!("{prefix}.meta"));
    if !meta_path.exists() {
        return Ok(None);
    }
    let meta_bytes = fs::read(&meta_path)?;
    let meta = BloomMeta::decode(&meta_bytes)?;
    let index_mmap = map_file(&dir.join(format!("{prefix}.index")))?;
    let store_mmap = map_file(&dir.join(format!("{prefix}.store")))?;
    Ok(Some(BloomMmaps {
        meta,
        _index_mmap: index_mmap,
        _store_mmap: store_mmap,
    }))
}
