//! Crate-wide error taxonomy.
//!
//! Four kinds of failure, matching the policy table: corruption and I/O are
//! always fatal (never silently swallowed), usage errors are the caller's
//! fault and are reported rather than panicking, and resource exhaustion is
//! fatal because there's nothing sensible to do about it. Cancellation is
//! *not* an error — see [`crate::query::PartialResult`].

use std::io;

/// Everything that can go wrong opening, building, or querying an index.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Bad magic byte, a skip list that overran its reservation, a packed-ints
    /// bit width above 32, an unterminated varint, an out-of-range file
    /// offset — anything that means the bytes on disk don't match the format
    /// this crate writes.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// Propagated from the filesystem: open/read/mmap failure, short write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Caller error: querying a closed engine, calling `add_document` on a
    /// sealed builder, an empty query term list.
    #[error("usage error: {0}")]
    Usage(String),

    /// Out of memory or out of disk space, surfaced from an allocation or
    /// write that the OS refused.
    #[error("resource exhausted: {0}")]
    Resource(String),
}

impl SearchError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        SearchError::Corrupt(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        SearchError::Usage(msg.into())
    }

    /// Process exit code per the CLI contract: 0 success, 2 bad usage,
    /// 3 corrupt index, 4 I/O error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SearchError::Usage(_) => 2,
            SearchError::Corrupt(_) => 3,
            SearchError::Io(_) => 4,
            SearchError::Resource(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
