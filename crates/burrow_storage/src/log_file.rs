//! Log file trait definition.

use crate::error::StorageResult;

/// An append-oriented byte store.
///
/// Backends are opaque: they hold bytes at offsets and make no attempt to
/// interpret them. `burrow_core` layers the journal entry format on top.
///
/// # Invariants
///
/// - `append` writes at the current end and returns the offset it wrote to
/// - `read_at` returns exactly the bytes previously written at that offset,
///   or [`StorageError::ShortRead`](crate::StorageError::ShortRead) if the
///   range is not fully populated
/// - after `sync` returns, all appended bytes survive process termination
/// - `truncate` discards every byte at or after the new size
pub trait LogFile: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ShortRead`](crate::StorageError::ShortRead)
    /// when the requested range extends past the end of the store, or an
    /// I/O error from the underlying medium.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` at the end of the store and returns the offset it
    /// was written to.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Forces all data and metadata to durable storage.
    ///
    /// Stronger than [`flush`](Self::flush): after this returns, the bytes
    /// survive a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`StorageError::TruncateBeyondEnd`](crate::StorageError::TruncateBeyondEnd)
    /// if `new_size` exceeds the current size, or an I/O error if the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
