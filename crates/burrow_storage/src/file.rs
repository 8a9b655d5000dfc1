//! File-backed log store.

use crate::error::{StorageError, StorageResult};
use crate::log_file::LogFile;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A persistent log store backed by an OS file.
///
/// Opening never truncates; an existing file is picked up as-is so that a
/// journal written before a crash can be read back during recovery.
///
/// The file handle and its cached length live behind one mutex, so the
/// length can never drift from what was actually written. The journal is
/// single-writer, so there is nothing to gain from finer locking.
///
/// # Durability
///
/// - [`flush`](LogFile::flush) pushes buffered writes to the OS
/// - [`sync`](LogFile::sync) calls `File::sync_all`, after which the data
///   survives a crash
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    len: u64,
}

impl FileLog {
    /// Opens the file at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created, or its
    /// length cannot be determined.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = File::options()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        // seeking to the end doubles as length discovery
        let len = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner { file, len }),
        })
    }

    /// Opens the file at `path`, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent)?;
            }
            _ => {}
        }
        Self::open(path)
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogFile for FileLog {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let end = offset
            .checked_add(len as u64)
            .filter(|end| *end <= inner.len)
            .ok_or(StorageError::ShortRead {
                offset,
                len,
                size: inner.len,
            })?;
        if offset == end {
            return Ok(Vec::new());
        }

        inner.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        inner.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.len;
        if !data.is_empty() {
            inner.file.seek(SeekFrom::End(0))?;
            inner.file.write_all(data)?;
            inner.len += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if new_size > inner.len {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: inner.len,
            });
        }
        inner.file.set_len(new_size)?;
        // the shorter length must stick even if the process dies now
        inner.file.sync_all()?;
        inner.len = new_size;
        Ok(())
    }
}
