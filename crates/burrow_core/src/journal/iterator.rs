//! Seek-based iteration over both log files in chronological order.
//!
//! Recovery walks the file pair oldest-first: the cursor starts on the
//! retired file and switches to the current file at end-of-file. A read
//! that fails ends iteration instead of propagating - a torn tail is the
//! expected signature of a crash, and everything before it is intact.
//! An unknown entry kind, by contrast, is real corruption and aborts
//! recovery.

use crate::error::JournalResult;
use crate::journal::entry::{EntryHeader, HEADER_SIZE};
use crate::journal::writer::Journal;
use tracing::warn;

/// A cursor over the log file pair.
///
/// Create with [`JournalCursor::new`] and feed to
/// [`Journal::read_entry`]; the first read positions it on the
/// chronologically older file.
#[derive(Debug, Default)]
pub struct JournalCursor {
    fd_start: usize,
    fd_current: usize,
    offset: u64,
    started: bool,
}

impl JournalCursor {
    /// Creates a cursor positioned before the oldest entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the file the cursor is currently reading.
    #[must_use]
    pub fn file_index(&self) -> usize {
        self.fd_current
    }
}

/// One entry read back from the log: its fixed header plus the raw
/// payload bytes.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// The decoded fixed header.
    pub header: EntryHeader,
    /// The `followup_size` payload bytes; empty for abort and commit.
    pub payload: Vec<u8>,
}

impl Journal {
    /// Reads the next entry in chronological order across both files.
    ///
    /// Returns `Ok(None)` at the end of the log - including when a read
    /// fails mid-entry, which recovery treats as the torn tail left by a
    /// crash.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if an entry carries an unknown kind.
    pub fn read_entry(&self, cursor: &mut JournalCursor) -> JournalResult<Option<RawEntry>> {
        // A fresh cursor starts on the retired file: the one NOT current,
        // which is chronologically older.
        if !cursor.started {
            cursor.started = true;
            cursor.fd_start = 1 - self.current;
            cursor.fd_current = cursor.fd_start;
            cursor.offset = 0;
        }

        let mut filesize = match self.files[cursor.fd_current].size() {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "failed to size journal file, ending recovery scan");
                return Ok(None);
            }
        };

        // At EOF, move on to the second file once; after that we are done.
        if cursor.offset == filesize {
            if cursor.fd_start == cursor.fd_current {
                cursor.fd_current = 1 - cursor.fd_current;
                cursor.offset = 0;
                filesize = match self.files[cursor.fd_current].size() {
                    Ok(size) => size,
                    Err(e) => {
                        warn!(error = %e, "failed to size journal file, ending recovery scan");
                        return Ok(None);
                    }
                };
            } else {
                return Ok(None);
            }
        }
        if cursor.offset == filesize {
            return Ok(None);
        }

        let header_bytes = match self.files[cursor.fd_current].read_at(cursor.offset, HEADER_SIZE)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, offset = cursor.offset, "torn entry header, ending recovery scan");
                return Ok(None);
            }
        };

        // A zeroed region reads as LSN zero: end of the written log.
        if EntryHeader::peek_lsn(&header_bytes) == 0 {
            return Ok(None);
        }
        let header = EntryHeader::decode(&header_bytes)?;
        cursor.offset += HEADER_SIZE as u64;

        let payload = if header.followup_size > 0 {
            match self.files[cursor.fd_current]
                .read_at(cursor.offset, header.followup_size as usize)
            {
                Ok(bytes) => {
                    cursor.offset += u64::from(header.followup_size);
                    bytes
                }
                Err(e) => {
                    warn!(error = %e, offset = cursor.offset, "torn entry payload, ending recovery scan");
                    return Ok(None);
                }
            }
        } else {
            Vec::new()
        };

        Ok(Some(RawEntry { header, payload }))
    }
}
