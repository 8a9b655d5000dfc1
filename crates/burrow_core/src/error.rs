//! Error types for the journal.

use crate::fault::CrashPoint;
use crate::types::TransactionId;
use std::io;
use thiserror::Error;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors surfaced by the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Byte-store backend error.
    #[error("storage error: {0}")]
    Storage(#[from] burrow_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal contains bytes that cannot be interpreted.
    ///
    /// Unlike a torn tail (which is the expected crash signature and is
    /// tolerated), this indicates real corruption and aborts recovery.
    #[error("journal corruption: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// A payload could not be compressed or decompressed.
    #[error("compression error: {message}")]
    Compression {
        /// Description of the failure.
        message: String,
    },

    /// A key was not found.
    ///
    /// Engine collaborators report this from
    /// [`RecoveryDatabase::erase`](crate::RecoveryDatabase::erase); replay
    /// treats it as success because the key may already have been removed
    /// by a physically redone page.
    #[error("key not found")]
    KeyNotFound,

    /// An operation referenced a transaction the journal never saw begin.
    #[error("transaction {0} was not journaled")]
    UnknownTransaction(TransactionId),

    /// An engine collaborator failed during replay.
    #[error("engine error: {message}")]
    Engine {
        /// Description of the failure.
        message: String,
    },

    /// A deterministic fault was injected at a crash checkpoint.
    #[error("injected fault at {0:?}")]
    InjectedFault(CrashPoint),
}

impl JournalError {
    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates a compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression {
            message: message.into(),
        }
    }

    /// Creates an engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}
