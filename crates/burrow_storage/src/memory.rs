//! In-memory log store for tests.

use crate::error::{StorageError, StorageResult};
use crate::log_file::LogFile;
use parking_lot::Mutex;

/// A volatile log store holding its bytes in memory.
///
/// Used by unit tests and crash-recovery fixtures: a test can write a
/// journal, copy out the raw bytes with [`data`](Self::data), mutilate the
/// tail, and rebuild a "crashed" journal with [`with_data`](Self::with_data).
///
/// A plain mutex suffices here - the journal is single-writer, and tests
/// never contend on the store.
#[derive(Debug, Default)]
pub struct MemoryLog {
    data: Mutex<Vec<u8>>,
}

impl MemoryLog {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `data`, as if it had been written
    /// before a crash.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl LogFile for MemoryLog {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.lock();
        let start = offset as usize;
        // slice::get rejects both an out-of-range start and an
        // overhanging end in one go
        match start.checked_add(len).and_then(|end| data.get(start..end)) {
            Some(range) => Ok(range.to_vec()),
            None => Err(StorageError::ShortRead {
                offset,
                len,
                size: data.len() as u64,
            }),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.lock();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // nothing is buffered
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        // memory is as durable as this store gets
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.lock();
        match usize::try_from(new_size) {
            Ok(n) if n <= data.len() => {
                data.truncate(n);
                Ok(())
            }
            _ => Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: data.len() as u64,
            }),
        }
    }
}
