//! Interfaces the journal consumes from the surrounding engine.
//!
//! The journal never touches the B-tree, the page store, or the real
//! transaction manager directly. During recovery it drives them through
//! the narrow traits below; outside recovery it only appends. Tests
//! provide mock implementations.

use crate::error::JournalResult;
use crate::types::{DbNameId, TransactionId};

/// A page-addressable device - the main database file.
///
/// Physical redo writes the pages captured in changesets back through
/// this interface.
pub trait PageDevice {
    /// Size of one page in bytes.
    fn page_size(&self) -> usize;

    /// Current size of the device file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn file_size(&self) -> JournalResult<u64>;

    /// Resizes the device file to `new_size` bytes, growing or shrinking
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the resize fails.
    fn truncate(&mut self, new_size: u64) -> JournalResult<()>;

    /// Appends a fresh page at the end of the device and returns its
    /// address.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocation fails.
    fn alloc_page(&mut self) -> JournalResult<u64>;

    /// Overwrites the page at `address` with `data` and flushes it.
    ///
    /// `data` is always exactly [`page_size`](Self::page_size) bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_page(&mut self, address: u64, data: &[u8]) -> JournalResult<()>;

    /// Records the address of the last blob page.
    ///
    /// This is page-manager state carried in every changeset; redo hands
    /// it back so the blob manager resumes where it left off.
    fn set_last_blob_page(&mut self, page_id: u64);
}

/// The engine's transaction manager, as seen by recovery.
pub trait TransactionManager {
    /// Begins a transaction and returns the id the engine assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    fn begin(&mut self, name: Option<&str>) -> JournalResult<TransactionId>;

    /// Replaces the engine-assigned id of a freshly begun transaction
    /// with the journaled one, and advances the manager's id watermark so
    /// later transactions never reuse it.
    ///
    /// # Errors
    ///
    /// Returns an error if `assigned` does not name a live transaction.
    fn adopt_txn_id(
        &mut self,
        assigned: TransactionId,
        journaled: TransactionId,
    ) -> JournalResult<()>;

    /// Aborts the live transaction `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` does not name a live transaction or the
    /// abort fails.
    fn abort(&mut self, id: TransactionId) -> JournalResult<()>;

    /// Commits the live transaction `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` does not name a live transaction or the
    /// commit fails.
    fn commit(&mut self, id: TransactionId) -> JournalResult<()>;

    /// Ids of transactions that have begun but neither committed nor
    /// aborted, oldest first.
    fn live_transactions(&self) -> Vec<TransactionId>;

    /// Asks the engine to flush all committed-but-unflushed transactions
    /// to the page store.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush_committed(&mut self) -> JournalResult<()>;
}

/// Opens databases by name id on behalf of recovery.
///
/// The journal caches the returned handles for the duration of a
/// `recover` call and closes them before it returns.
pub trait DatabaseRegistry {
    /// Opens the database registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no such database exists or it cannot be opened.
    fn open_database(&mut self, name: DbNameId) -> JournalResult<Box<dyn RecoveryDatabase>>;
}

/// A database handle used only while replaying logical entries.
pub trait RecoveryDatabase {
    /// Re-applies a journaled insert.
    ///
    /// `flags` is the opaque flag word recorded at append time.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails; any error is fatal for
    /// recovery.
    fn insert(
        &mut self,
        txn: Option<TransactionId>,
        key: &[u8],
        record: &[u8],
        flags: u32,
    ) -> JournalResult<()>;

    /// Re-applies a journaled erase.
    ///
    /// # Errors
    ///
    /// Returns an error if the erase fails.
    /// [`JournalError::KeyNotFound`](crate::JournalError::KeyNotFound) is
    /// treated as success by the caller: the key may already have been
    /// removed by a physically redone page.
    fn erase(
        &mut self,
        txn: Option<TransactionId>,
        key: &[u8],
        duplicate_index: i32,
        flags: u32,
    ) -> JournalResult<()>;

    /// Closes the handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the close fails.
    fn close(&mut self) -> JournalResult<()>;
}
