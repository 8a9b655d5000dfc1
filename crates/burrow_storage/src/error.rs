//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the byte-store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A positioned read extended beyond the end of the store.
    ///
    /// The journal treats this as the signature of a torn tail: a write
    /// that was interrupted before it completed.
    #[error("short read: offset {offset}, len {len}, size {size}")]
    ShortRead {
        /// Requested read offset.
        offset: u64,
        /// Requested read length.
        len: usize,
        /// Current store size.
        size: u64,
    },

    /// Truncation was requested beyond the current size.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    TruncateBeyondEnd {
        /// Requested new size.
        requested: u64,
        /// Current store size.
        size: u64,
    },
}
