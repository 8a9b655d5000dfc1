//! Write-ahead journal with two-file rotation.
//!
//! Every logical mutation (transaction begin/abort/commit, insert, erase)
//! and every physical page changeset is appended to one of two log files
//! before the database file itself is touched. After a crash the journal
//! is replayed to reconstruct committed state.
//!
//! ## Entry Format
//!
//! ```text
//! | lsn (8) | txn_id (8) | followup_size (4) | dbname (2) | kind (1) | reserved (9) |
//! | followup_size bytes of kind-specific payload ...                               |
//! ```
//!
//! All integers are little-endian. There is no file header, footer, or
//! checksum: robustness comes from the per-entry size fields and the
//! abort-on-failed-read policy during recovery.
//!
//! ## Two-File Discipline
//!
//! Writes go to the current file; once it has seen enough transactions,
//! the other file is truncated and takes over - but only when none of its
//! transactions are still open. Journal data that might be needed for
//! replay is therefore never erased.
//!
//! ## Recovery Policy
//!
//! - **Torn tail** (a read off the end of a file): tolerated, ends the
//!   replay. This is the expected signature of a crash mid-write.
//! - **Unknown entry kind**: fatal, the journal is corrupt.
//! - **Undecompressible payload**: fatal.
//! - **Key not found while replaying an erase**: tolerated - the key may
//!   already have been removed by a physically redone page.
//!
//! Durability points are `append_txn_commit` and `append_changeset`
//! (hard flush, fsync when configured). All other appends are advisory
//! and may be lost with their uncommitted transaction.

mod entry;
mod iterator;
mod recovery;
mod writer;

pub use entry::{
    ChangesetHeader, EntryHeader, EntryKind, EraseHeader, EraseView, InsertHeader, InsertView,
    PageHeader, CHANGESET_HEADER_SIZE, ERASE_HEADER_SIZE, HEADER_SIZE, INSERT_HEADER_SIZE,
    PAGE_HEADER_SIZE,
};
pub use iterator::{JournalCursor, RawEntry};
pub use writer::{ChangesetPage, Journal, JournalMetrics};
