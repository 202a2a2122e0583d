//! Persistent inverted-index search engine: BM25-ranked conjunctive and
//! phrase queries over a batch-built, memory-mapped on-disk format.
//!
//! Module layout mirrors the on-disk pipeline, low-level codecs first:
//!
//! - [`varint`] / [`packed`] / [`cozy`]: byte-level codecs (LEB128 varints,
//!   fixed-width bit-packed blocks, the block-plus-tail "cozy box" layout).
//! - [`term_entry`] / [`skiplist`] / [`posting_dumper`] /
//!   [`posting_iterator`]: the posting-list format and its write/read
//!   halves, including the flat skip list used to seek within a list.
//! - [`term_index`]: term → file offset lookup (`my.tip`).
//! - [`bloom`] / [`bloom_store`]: per-(term, document) Bloom filters used
//!   to prune phrase-query candidates before a positional check.
//! - [`doc_length`] / [`doc_store`]: per-document length (for BM25) and
//!   body storage (for snippet retrieval).
//! - [`query`]: multi-term intersection, BM25 scoring, phrase pruning.
//! - [`index`]: the top-level `IndexBuilder`/`Index` state machine tying
//!   every other module together.
//! - [`error`]: the crate-wide error taxonomy and CLI exit-code mapping.

pub mod bloom;
pub mod bloom_store;
pub mod cozy;
pub mod doc_length;
pub mod doc_store;
pub mod error;
pub mod index;
pub mod packed;
pub mod posting_dumper;
pub mod posting_iterator;
pub mod query;
pub mod skiplist;
pub mod term_entry;
pub mod term_index;
pub mod varint;

pub use error::{Result, SearchError};
pub use index::{DocInfo, DocSource, Index, IndexBuilder};
pub use query::{PartialResult, ScoredDoc};
