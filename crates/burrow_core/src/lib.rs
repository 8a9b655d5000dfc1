//! # BurrowDB Core
//!
//! The write-ahead journal of the BurrowDB embedded key-value engine.
//!
//! This crate provides:
//! - the [`Journal`]: two append-only log files with rotation, buffered
//!   appends, and a commit/changeset durability boundary
//! - the binary entry codec with optional per-payload compression
//! - two-pass crash recovery: physical changeset redo followed by
//!   logical operation replay
//! - the narrow traits recovery drives the engine through
//!   ([`PageDevice`], [`TransactionManager`], [`DatabaseRegistry`])
//!
//! The journal assumes a single logical writer serialized by the engine
//! above it and holds no internal locks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compress;
mod config;
mod engine;
mod error;
mod fault;
mod journal;
mod types;

pub use compress::{Compressor, Lz4Compressor};
pub use config::{
    CompressionKind, JournalConfig, DEFAULT_BUFFER_WATERMARK, DEFAULT_PAGE_SIZE,
    DEFAULT_SWITCH_THRESHOLD,
};
pub use engine::{DatabaseRegistry, PageDevice, RecoveryDatabase, TransactionManager};
pub use error::{JournalError, JournalResult};
pub use fault::CrashPoint;
pub use journal::{
    ChangesetHeader, ChangesetPage, EntryHeader, EntryKind, EraseHeader, EraseView, InsertHeader,
    InsertView, Journal, JournalCursor, JournalMetrics, PageHeader, RawEntry,
    CHANGESET_HEADER_SIZE, ERASE_HEADER_SIZE, HEADER_SIZE, INSERT_HEADER_SIZE, PAGE_HEADER_SIZE,
};
pub use types::{DbNameId, Lsn, TransactionId};
