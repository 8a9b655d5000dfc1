//! The journal writer: two-file rotation, buffered appends, and the
//! flush/fsync policy.

use crate::config::JournalConfig;
use crate::error::{JournalError, JournalResult};
use crate::fault::{CrashPoint, FaultInjector};
use crate::journal::entry::{
    ChangesetHeader, EntryHeader, EntryKind, EraseHeader, InsertHeader, PageHeader,
    CHANGESET_HEADER_SIZE, ERASE_HEADER_SIZE, HEADER_SIZE, INSERT_HEADER_SIZE, PAGE_HEADER_SIZE,
};
use crate::types::{DbNameId, Lsn, TransactionId};
use crate::Compressor;
use burrow_storage::{FileLog, LogFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Running byte counters kept by the journal.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalMetrics {
    /// Bytes written out of the buffers to the log files.
    pub bytes_flushed: u64,
    /// Payload bytes offered to the compressor.
    pub bytes_before_compression: u64,
    /// Payload bytes actually stored for those offers.
    pub bytes_after_compression: u64,
}

/// One modified page handed to [`Journal::append_changeset`].
#[derive(Debug, Clone, Copy)]
pub struct ChangesetPage<'a> {
    /// Address of the page in the page device.
    pub address: u64,
    /// Raw page bytes; must be exactly the configured page size.
    pub data: &'a [u8],
}

/// The write-ahead journal of a database environment.
///
/// Owns two append-only log files (`<stem>.jrn0` / `<stem>.jrn1`), a write
/// buffer per file, and the transaction counters that drive rotation. All
/// mutating calls assume a single logical writer; the journal holds no
/// internal locks.
///
/// # Rotation
///
/// Writes go to the current file until it has seen `switch_threshold`
/// transactions. The other file is then recycled - truncated to zero and
/// made current - but only once none of its transactions are still open.
/// A file whose transactions might still need replay is never erased.
///
/// # Durability
///
/// Commit and changeset appends are the only durability points: with
/// [`fsync`](JournalConfig::fsync) configured they flush their file and
/// sync it before returning. All other appends stay in the buffer until
/// it crosses the watermark and may be lost in a crash, which is
/// harmless because their transaction cannot have committed.
pub struct Journal {
    pub(super) files: [Box<dyn LogFile>; 2],
    pub(super) buffers: [Vec<u8>; 2],
    /// Index of the file receiving writes.
    pub(super) current: usize,
    /// Transactions begun on each file and not yet closed.
    pub(super) open_txns: [u32; 2],
    /// Transactions that reached a terminal state on each file.
    pub(super) closed_txns: [u32; 2],
    /// Which file each live transaction was begun on.
    pub(super) txn_files: HashMap<TransactionId, usize>,
    pub(super) threshold: u32,
    pub(super) fsync: bool,
    pub(super) page_size: usize,
    pub(super) buffer_watermark: usize,
    pub(super) compressor: Option<Box<dyn Compressor>>,
    /// Suppresses appends while recovery replays the log.
    pub(super) disable_logging: bool,
    pub(super) metrics: JournalMetrics,
    pub(super) faults: FaultInjector,
}

impl Journal {
    /// Creates the journal for a new database: both files are opened and
    /// truncated to length zero.
    ///
    /// # Errors
    ///
    /// Returns an error if a log file cannot be created or truncated.
    pub fn create(db_path: &Path, config: JournalConfig) -> JournalResult<Self> {
        let mut journal = Self::open(db_path, config)?;
        journal.clear()?;
        Ok(journal)
    }

    /// Opens the journal of an existing database without truncating, so
    /// entries written before a crash remain available for recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if a log file cannot be opened.
    pub fn open(db_path: &Path, config: JournalConfig) -> JournalResult<Self> {
        let [path0, path1] = journal_paths(db_path, config.log_directory.as_deref());
        let file0 = FileLog::open_with_create_dirs(&path0)?;
        let file1 = FileLog::open_with_create_dirs(&path1)?;
        Ok(Self::with_files([Box::new(file0), Box::new(file1)], config))
    }

    /// Builds a journal over a caller-supplied pair of log files.
    ///
    /// Used by tests to journal into memory-backed stores.
    #[must_use]
    pub fn with_files(files: [Box<dyn LogFile>; 2], config: JournalConfig) -> Self {
        Self {
            files,
            buffers: [Vec::new(), Vec::new()],
            current: 0,
            open_txns: [0, 0],
            closed_txns: [0, 0],
            txn_files: HashMap::new(),
            threshold: config.switch_threshold,
            fsync: config.fsync,
            page_size: config.page_size,
            buffer_watermark: config.buffer_watermark,
            compressor: config.compression.build(),
            disable_logging: false,
            metrics: JournalMetrics::default(),
            faults: FaultInjector::default(),
        }
    }

    /// Records the start of a transaction, with an optional name.
    ///
    /// Soft flush: an interrupted begin is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be written out.
    pub fn append_txn_begin(
        &mut self,
        txn: TransactionId,
        name: Option<&str>,
        lsn: Lsn,
    ) -> JournalResult<()> {
        if self.disable_logging {
            return Ok(());
        }
        debug_assert!(!txn.is_temporary());

        let fd = self.switch_files_maybe()?;
        let header = EntryHeader {
            lsn,
            txn_id: txn,
            followup_size: name.map_or(0, |n| n.len() as u32 + 1),
            dbname: DbNameId::new(0),
            kind: EntryKind::TxnBegin,
        };
        let encoded = header.encode();
        match name {
            Some(name) => self.append_chunks(fd, &[&encoded, name.as_bytes(), &[0]]),
            None => self.append_chunks(fd, &[&encoded]),
        }
        self.maybe_flush(fd)?;

        self.txn_files.insert(txn, fd);
        self.open_txns[fd] += 1;
        self.current = fd;
        Ok(())
    }

    /// Records a transaction abort and closes the transaction on its file.
    ///
    /// Soft flush: an incomplete abort record changes nothing, since the
    /// transaction would be aborted by recovery anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if `txn` was never begun on this journal, or if
    /// the buffer cannot be written out.
    pub fn append_txn_abort(&mut self, txn: TransactionId, lsn: Lsn) -> JournalResult<()> {
        if self.disable_logging {
            return Ok(());
        }
        let fd = self
            .txn_files
            .remove(&txn)
            .ok_or(JournalError::UnknownTransaction(txn))?;
        self.open_txns[fd] -= 1;
        self.closed_txns[fd] += 1;

        let header = EntryHeader {
            lsn,
            txn_id: txn,
            followup_size: 0,
            dbname: DbNameId::new(0),
            kind: EntryKind::TxnAbort,
        };
        let encoded = header.encode();
        self.append_chunks(fd, &[&encoded]);
        self.maybe_flush(fd)
    }

    /// Records a transaction commit.
    ///
    /// With [`fsync`](JournalConfig::fsync) configured this is a hard
    /// flush plus fsync - the caller's durability boundary. Without it,
    /// the commit stays in the buffer like any other entry; the caller
    /// has opted out of commit durability.
    ///
    /// The transaction counters are not touched here - a committed
    /// transaction stays open on its file until
    /// [`transaction_flushed`](Self::transaction_flushed) reports that its
    /// mutations were captured on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if `txn` was never begun on this journal, or if
    /// the flush fails.
    pub fn append_txn_commit(&mut self, txn: TransactionId, lsn: Lsn) -> JournalResult<()> {
        if self.disable_logging {
            return Ok(());
        }
        let fd = *self
            .txn_files
            .get(&txn)
            .ok_or(JournalError::UnknownTransaction(txn))?;

        let header = EntryHeader {
            lsn,
            txn_id: txn,
            followup_size: 0,
            dbname: DbNameId::new(0),
            kind: EntryKind::TxnCommit,
        };
        let encoded = header.encode();
        self.append_chunks(fd, &[&encoded]);
        if self.fsync {
            self.flush_file(fd, true)
        } else {
            self.maybe_flush(fd)
        }
    }

    /// Records a key insertion, compressing the key and record when that
    /// pays off.
    ///
    /// `txn` is `None` for a temporary (auto-committed) operation. Soft
    /// flush.
    ///
    /// # Errors
    ///
    /// Returns an error if a given `txn` was never begun on this journal,
    /// if compression fails, or if the buffer cannot be written out.
    pub fn append_insert(
        &mut self,
        db: DbNameId,
        txn: Option<TransactionId>,
        key: &[u8],
        record: &[u8],
        flags: u32,
        lsn: Lsn,
    ) -> JournalResult<()> {
        if self.disable_logging {
            return Ok(());
        }
        let (txn_id, fd) = self.slot_for(txn)?;

        let mut header = EntryHeader {
            lsn,
            txn_id,
            followup_size: INSERT_HEADER_SIZE as u32,
            dbname: db,
            kind: EntryKind::Insert,
        };
        let mut insert = InsertHeader {
            key_size: key.len() as u32,
            record_size: record.len() as u32,
            compressed_key_size: 0,
            compressed_record_size: 0,
            insert_flags: flags,
        };

        // The final followup size depends on how well the payloads
        // compress, so write placeholders and patch them afterwards. The
        // buffer is never flushed between the placeholder and the patch.
        let entry_position = self.buffers[fd].len();
        let encoded_header = header.encode();
        let encoded_insert = insert.encode();
        self.append_chunks(fd, &[&encoded_header, &encoded_insert]);

        match self.compress_payload(key)? {
            Some(compressed) => {
                insert.compressed_key_size = compressed.len() as u32;
                header.followup_size += compressed.len() as u32;
                self.buffers[fd].extend_from_slice(&compressed);
            }
            None => {
                header.followup_size += key.len() as u32;
                self.buffers[fd].extend_from_slice(key);
            }
        }
        match self.compress_payload(record)? {
            Some(compressed) => {
                insert.compressed_record_size = compressed.len() as u32;
                header.followup_size += compressed.len() as u32;
                self.buffers[fd].extend_from_slice(&compressed);
            }
            None => {
                header.followup_size += record.len() as u32;
                self.buffers[fd].extend_from_slice(record);
            }
        }

        let subheader_at = entry_position + HEADER_SIZE;
        self.buffers[fd][entry_position..subheader_at].copy_from_slice(&header.encode());
        self.buffers[fd][subheader_at..subheader_at + INSERT_HEADER_SIZE]
            .copy_from_slice(&insert.encode());

        self.maybe_flush(fd)
    }

    /// Records a key erasure.
    ///
    /// `txn` is `None` for a temporary (auto-committed) operation. Soft
    /// flush.
    ///
    /// # Errors
    ///
    /// Returns an error if a given `txn` was never begun on this journal,
    /// if compression fails, or if the buffer cannot be written out.
    pub fn append_erase(
        &mut self,
        db: DbNameId,
        txn: Option<TransactionId>,
        key: &[u8],
        duplicate_index: i32,
        flags: u32,
        lsn: Lsn,
    ) -> JournalResult<()> {
        if self.disable_logging {
            return Ok(());
        }

        // Only one variable payload, so compress up front and no header
        // patch is needed.
        let stored = self.compress_payload(key)?;
        let payload: &[u8] = stored.as_deref().unwrap_or(key);
        let erase = EraseHeader {
            key_size: key.len() as u32,
            compressed_key_size: stored.as_ref().map_or(0, |c| c.len() as u32),
            erase_flags: flags,
            duplicate_index,
        };

        let (txn_id, fd) = self.slot_for(txn)?;
        let header = EntryHeader {
            lsn,
            txn_id,
            followup_size: (ERASE_HEADER_SIZE + payload.len()) as u32,
            dbname: db,
            kind: EntryKind::Erase,
        };
        let encoded_header = header.encode();
        let encoded_erase = erase.encode();
        self.append_chunks(fd, &[&encoded_header, &encoded_erase, payload]);
        self.maybe_flush(fd)
    }

    /// Records a changeset: the unit of physical durability.
    ///
    /// Hard flush with fsync when configured. The changeset is accounted
    /// as a pseudo-transaction on the current file; it stays open until
    /// [`changeset_flushed`](Self::changeset_flushed) confirms that the
    /// dirty pages reached the page device.
    ///
    /// Returns the index of the file the changeset was written to, for
    /// the later `changeset_flushed` call, or `None` while logging is
    /// disabled during recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or the flush fails, or if an armed
    /// crash point fires.
    pub fn append_changeset(
        &mut self,
        pages: &[ChangesetPage<'_>],
        last_blob_page: u64,
        lsn: Lsn,
    ) -> JournalResult<Option<usize>> {
        debug_assert!(!pages.is_empty());

        if self.disable_logging {
            return Ok(None);
        }
        let fd = self.switch_files_maybe()?;

        let mut header = EntryHeader {
            lsn,
            txn_id: TransactionId::new(0),
            followup_size: CHANGESET_HEADER_SIZE as u32,
            dbname: DbNameId::new(0),
            kind: EntryKind::Changeset,
        };
        let changeset = ChangesetHeader {
            num_pages: pages.len() as u32,
            last_blob_page,
        };

        // Placeholder header; the page bodies may compress, so the true
        // followup size is patched in below.
        let entry_position = self.buffers[fd].len();
        let encoded_header = header.encode();
        let encoded_changeset = changeset.encode();
        self.append_chunks(fd, &[&encoded_header, &encoded_changeset]);

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                self.faults.hit(CrashPoint::BetweenPageWrites)?;
            }
            debug_assert_eq!(page.data.len(), self.page_size);
            header.followup_size += self.append_changeset_page(fd, page)?;
        }

        self.faults.hit(CrashPoint::BeforeHeaderPatch)?;
        self.buffers[fd][entry_position..entry_position + HEADER_SIZE]
            .copy_from_slice(&header.encode());

        self.flush_file(fd, self.fsync)?;
        self.faults.hit(CrashPoint::AfterFlush)?;

        self.open_txns[fd] += 1;
        Ok(Some(fd))
    }

    fn append_changeset_page(
        &mut self,
        fd: usize,
        page: &ChangesetPage<'_>,
    ) -> JournalResult<u32> {
        let stored = self.compress_payload(page.data)?;
        let page_header = PageHeader {
            address: page.address,
            compressed_size: stored.as_ref().map_or(0, |c| c.len() as u32),
        };
        let body: &[u8] = stored.as_deref().unwrap_or(page.data);
        let encoded = page_header.encode();
        self.append_chunks(fd, &[&encoded, body]);
        Ok((PAGE_HEADER_SIZE + body.len()) as u32)
    }

    /// Marks a changeset as captured on disk, closing its
    /// pseudo-transaction so the file becomes eligible for recycling.
    pub fn changeset_flushed(&mut self, fd: usize) {
        debug_assert!(self.open_txns[fd] > 0);
        self.open_txns[fd] -= 1;
        self.closed_txns[fd] += 1;
    }

    /// Marks a committed transaction as captured on disk, closing it on
    /// its file.
    ///
    /// # Errors
    ///
    /// Returns an error if `txn` was never begun on this journal.
    pub fn transaction_flushed(&mut self, txn: TransactionId) -> JournalResult<()> {
        if self.disable_logging {
            return Ok(());
        }
        let fd = self
            .txn_files
            .remove(&txn)
            .ok_or(JournalError::UnknownTransaction(txn))?;
        debug_assert!(self.open_txns[fd] > 0);
        self.open_txns[fd] -= 1;
        self.closed_txns[fd] += 1;
        Ok(())
    }

    /// Flushes both buffers and, unless `noclear` is set, truncates both
    /// files.
    ///
    /// `noclear` is used by tests that want to read the raw files back
    /// after closing.
    ///
    /// # Errors
    ///
    /// Returns an error if a flush or truncation fails.
    pub fn close(&mut self, noclear: bool) -> JournalResult<()> {
        if noclear {
            self.flush_file(0, false)?;
            self.flush_file(1, false)?;
        } else {
            self.clear()?;
        }
        Ok(())
    }

    /// Truncates both files and resets all counters and buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if a truncation fails.
    pub fn clear(&mut self) -> JournalResult<()> {
        self.clear_file(0)?;
        self.clear_file(1)
    }

    /// Returns `true` when neither file holds any transaction, open or
    /// closed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open_txns == [0, 0] && self.closed_txns == [0, 0]
    }

    /// Returns the running byte counters.
    #[must_use]
    pub fn metrics(&self) -> JournalMetrics {
        self.metrics
    }

    /// Arms a deterministic fault at a crash checkpoint; it fires after
    /// `skip` passes and disarms itself.
    ///
    /// Recovery tests use this to interrupt
    /// [`append_changeset`](Self::append_changeset) at a precise point.
    pub fn arm_crash_point(&mut self, point: CrashPoint, skip: u32) {
        self.faults.arm(point, skip);
    }

    /// Disarms any armed crash point.
    pub fn disarm_crash_points(&mut self) {
        self.faults.disarm();
    }

    /// Decides which file the next transaction-scope entry goes to.
    ///
    /// The current file is kept while it is below the threshold. Once
    /// full, the other file is recycled - but only if none of its
    /// transactions are still open; otherwise the current file simply
    /// keeps growing.
    pub(super) fn switch_files_maybe(&mut self) -> JournalResult<usize> {
        let other = 1 - self.current;

        if self.open_txns[self.current] + self.closed_txns[self.current] < self.threshold {
            return Ok(self.current);
        }

        if self.open_txns[other] == 0 {
            self.clear_file(other)?;
            debug!(from = self.current, to = other, "rotating journal files");
            self.current = other;
        }

        Ok(self.current)
    }

    fn slot_for(&mut self, txn: Option<TransactionId>) -> JournalResult<(TransactionId, usize)> {
        match txn {
            Some(id) => {
                let fd = *self
                    .txn_files
                    .get(&id)
                    .ok_or(JournalError::UnknownTransaction(id))?;
                Ok((id, fd))
            }
            None => {
                // A temporary operation begins and ends with this single
                // entry, so it counts as closed immediately.
                let fd = self.switch_files_maybe()?;
                self.closed_txns[fd] += 1;
                Ok((TransactionId::new(0), fd))
            }
        }
    }

    /// Offers `payload` to the compressor. Returns the compressed bytes
    /// when they are strictly smaller, `None` to store raw.
    fn compress_payload(&mut self, payload: &[u8]) -> JournalResult<Option<Vec<u8>>> {
        let Some(compressor) = self.compressor.as_mut() else {
            return Ok(None);
        };
        self.metrics.bytes_before_compression += payload.len() as u64;
        let compressed = compressor.compress(payload)?;
        if compressed.len() < payload.len() {
            self.metrics.bytes_after_compression += compressed.len() as u64;
            Ok(Some(compressed))
        } else {
            self.metrics.bytes_after_compression += payload.len() as u64;
            Ok(None)
        }
    }

    fn append_chunks(&mut self, fd: usize, chunks: &[&[u8]]) {
        for chunk in chunks {
            self.buffers[fd].extend_from_slice(chunk);
        }
    }

    fn maybe_flush(&mut self, fd: usize) -> JournalResult<()> {
        if self.buffers[fd].len() >= self.buffer_watermark {
            self.flush_file(fd, false)?;
        }
        Ok(())
    }

    pub(super) fn flush_file(&mut self, fd: usize, fsync: bool) -> JournalResult<()> {
        if !self.buffers[fd].is_empty() {
            self.files[fd].append(&self.buffers[fd])?;
            self.metrics.bytes_flushed += self.buffers[fd].len() as u64;
            self.buffers[fd].clear();
            self.files[fd].flush()?;
        }
        if fsync {
            self.files[fd].sync()?;
        }
        Ok(())
    }

    pub(super) fn clear_file(&mut self, fd: usize) -> JournalResult<()> {
        if self.files[fd].size()? > 0 {
            self.files[fd].truncate(0)?;
        }
        self.open_txns[fd] = 0;
        self.closed_txns[fd] = 0;
        self.buffers[fd].clear();
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("current", &self.current)
            .field("open_txns", &self.open_txns)
            .field("closed_txns", &self.closed_txns)
            .field("threshold", &self.threshold)
            .field("fsync", &self.fsync)
            .field("disable_logging", &self.disable_logging)
            .finish_non_exhaustive()
    }
}

/// Builds the paths of the two log files for a database at `db_path`.
///
/// The files live beside the database file, or under `log_directory`
/// when one is configured, keeping the database's file name.
fn journal_paths(db_path: &Path, log_directory: Option<&Path>) -> [PathBuf; 2] {
    let base = match log_directory {
        Some(dir) => dir.join(db_path.file_name().unwrap_or(db_path.as_os_str())),
        None => db_path.to_path_buf(),
    };
    let with_suffix = |suffix: &str| {
        let mut name = base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [with_suffix(".jrn0"), with_suffix(".jrn1")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionKind;
    use burrow_storage::MemoryLog;
    use tempfile::tempdir;

    fn memory_journal(config: JournalConfig) -> Journal {
        Journal::with_files(
            [Box::new(MemoryLog::new()), Box::new(MemoryLog::new())],
            config,
        )
    }

    #[test]
    fn paths_sit_beside_the_database() {
        let [p0, p1] = journal_paths(Path::new("/data/store.db"), None);
        assert_eq!(p0, Path::new("/data/store.db.jrn0"));
        assert_eq!(p1, Path::new("/data/store.db.jrn1"));
    }

    #[test]
    fn paths_honor_log_directory() {
        let [p0, p1] = journal_paths(Path::new("/data/store.db"), Some(Path::new("/logs")));
        assert_eq!(p0, Path::new("/logs/store.db.jrn0"));
        assert_eq!(p1, Path::new("/logs/store.db.jrn1"));
    }

    #[test]
    fn create_truncates_both_files() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("test.db");

        {
            let mut journal = Journal::create(&db, JournalConfig::default()).unwrap();
            journal
                .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
                .unwrap();
            journal.close(true).unwrap();
        }
        assert!(std::fs::metadata(dir.path().join("test.db.jrn0")).unwrap().len() > 0);

        let journal = Journal::create(&db, JournalConfig::default()).unwrap();
        assert_eq!(
            std::fs::metadata(dir.path().join("test.db.jrn0")).unwrap().len(),
            0
        );
        drop(journal);
    }

    #[test]
    fn begin_tracks_counters_and_file() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();

        assert_eq!(journal.open_txns, [1, 0]);
        assert_eq!(journal.closed_txns, [0, 0]);
        assert_eq!(journal.txn_files[&TransactionId::new(1)], 0);
    }

    #[test]
    fn abort_closes_immediately() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_txn_abort(TransactionId::new(1), Lsn::new(2))
            .unwrap();

        assert_eq!(journal.open_txns, [0, 0]);
        assert_eq!(journal.closed_txns, [1, 0]);
        assert!(!journal.txn_files.contains_key(&TransactionId::new(1)));
    }

    #[test]
    fn commit_keeps_txn_open_until_flushed() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_txn_commit(TransactionId::new(1), Lsn::new(2))
            .unwrap();

        assert_eq!(journal.open_txns, [1, 0]);
        assert_eq!(journal.closed_txns, [0, 0]);

        journal.transaction_flushed(TransactionId::new(1)).unwrap();
        assert_eq!(journal.open_txns, [0, 0]);
        assert_eq!(journal.closed_txns, [1, 0]);
    }

    #[test]
    fn commit_flushes_the_buffer() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        // begin is a soft flush; nothing reaches the file yet
        assert_eq!(journal.files[0].size().unwrap(), 0);

        journal
            .append_txn_commit(TransactionId::new(1), Lsn::new(2))
            .unwrap();
        assert_eq!(journal.files[0].size().unwrap(), 2 * HEADER_SIZE as u64);
        assert!(journal.buffers[0].is_empty());
        assert_eq!(journal.metrics().bytes_flushed, 2 * HEADER_SIZE as u64);
    }

    #[test]
    fn watermark_triggers_soft_flush() {
        let config = JournalConfig::default().buffer_watermark(64);
        let mut journal = memory_journal(config);
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_insert(
                DbNameId::new(1),
                Some(TransactionId::new(1)),
                b"key",
                b"record",
                0,
                Lsn::new(2),
            )
            .unwrap();

        // 32 (begin) + 32 + 20 + 9 exceeds the 64-byte watermark
        assert!(journal.buffers[0].is_empty());
        assert!(journal.files[0].size().unwrap() > 0);
    }

    #[test]
    fn rotation_recycles_the_other_file() {
        let config = JournalConfig::default().switch_threshold(1);
        let mut journal = memory_journal(config);

        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_txn_commit(TransactionId::new(1), Lsn::new(2))
            .unwrap();
        journal.transaction_flushed(TransactionId::new(1)).unwrap();
        assert_eq!(journal.current, 0);

        journal
            .append_txn_begin(TransactionId::new(2), None, Lsn::new(3))
            .unwrap();
        assert_eq!(journal.current, 1);
        assert_eq!(journal.closed_txns[1], 0);
    }

    #[test]
    fn rotation_blocked_by_open_txn_on_other_file() {
        let config = JournalConfig::default().switch_threshold(1);
        let mut journal = memory_journal(config);

        // T1 stays open on file 0; T2 rotates to file 1
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_txn_begin(TransactionId::new(2), None, Lsn::new(2))
            .unwrap();
        assert_eq!(journal.current, 1);

        // T3 cannot rotate back: T1 is still open on file 0
        journal
            .append_txn_begin(TransactionId::new(3), None, Lsn::new(3))
            .unwrap();
        assert_eq!(journal.current, 1);
        assert_eq!(journal.txn_files[&TransactionId::new(3)], 1);
    }

    #[test]
    fn rotation_never_truncates_a_file_with_open_txns() {
        let config = JournalConfig::default().switch_threshold(1);
        let mut journal = memory_journal(config);

        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_txn_commit(TransactionId::new(1), Lsn::new(2))
            .unwrap();
        // T1 committed but not flushed: still open on file 0
        let size_before = journal.files[0].size().unwrap();
        assert!(size_before > 0);

        journal
            .append_txn_begin(TransactionId::new(2), None, Lsn::new(3))
            .unwrap();
        // rotation recycled the empty file 1; file 0 keeps T1's entries
        assert_eq!(journal.current, 1);
        assert_eq!(journal.files[0].size().unwrap(), size_before);
        assert_eq!(journal.open_txns[0], 1);
    }

    #[test]
    fn temporary_operations_count_as_closed() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_insert(DbNameId::new(1), None, b"k", b"v", 0, Lsn::new(1))
            .unwrap();
        journal
            .append_erase(DbNameId::new(1), None, b"k", 0, 0, Lsn::new(2))
            .unwrap();

        assert_eq!(journal.open_txns, [0, 0]);
        assert_eq!(journal.closed_txns, [2, 0]);
    }

    #[test]
    fn changeset_accounts_as_pseudo_txn() {
        let config = JournalConfig::default().page_size(64);
        let mut journal = memory_journal(config);
        let page = vec![0xAA; 64];

        let fd = journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &page,
                }],
                0,
                Lsn::new(5),
            )
            .unwrap()
            .expect("logging enabled");

        assert_eq!(fd, 0);
        assert_eq!(journal.open_txns, [1, 0]);
        // hard flush happened
        assert!(journal.buffers[0].is_empty());
        assert!(journal.files[0].size().unwrap() > 0);

        journal.changeset_flushed(fd);
        assert_eq!(journal.open_txns, [0, 0]);
        assert_eq!(journal.closed_txns, [1, 0]);
    }

    #[test]
    fn unknown_txn_is_rejected() {
        let mut journal = memory_journal(JournalConfig::default());
        let err = journal
            .append_txn_commit(TransactionId::new(9), Lsn::new(1))
            .unwrap_err();
        assert!(matches!(err, JournalError::UnknownTransaction(_)));
    }

    #[test]
    fn disabled_logging_suppresses_appends() {
        let mut journal = memory_journal(JournalConfig::default());
        journal.disable_logging = true;

        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_insert(DbNameId::new(1), None, b"k", b"v", 0, Lsn::new(2))
            .unwrap();
        let fd = journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &[0u8; DEFAULT_TEST_PAGE],
                }],
                0,
                Lsn::new(3),
            )
            .unwrap();

        assert!(fd.is_none());
        assert!(journal.is_empty());
        assert!(journal.buffers[0].is_empty());
    }

    const DEFAULT_TEST_PAGE: usize = crate::config::DEFAULT_PAGE_SIZE;

    #[test]
    fn compression_updates_metrics() {
        let config = JournalConfig::default().compression(CompressionKind::Lz4);
        let mut journal = memory_journal(config);

        let compressible = vec![0x42u8; 512];
        journal
            .append_insert(
                DbNameId::new(1),
                None,
                &compressible,
                &compressible,
                0,
                Lsn::new(1),
            )
            .unwrap();

        let metrics = journal.metrics();
        assert_eq!(metrics.bytes_before_compression, 1024);
        assert!(metrics.bytes_after_compression < metrics.bytes_before_compression);
    }

    #[test]
    fn incompressible_payloads_are_stored_raw() {
        let config = JournalConfig::default().compression(CompressionKind::Lz4);
        let mut journal = memory_journal(config);

        // single bytes cannot shrink under LZ4
        journal
            .append_erase(DbNameId::new(1), None, b"k", 0, 0, Lsn::new(1))
            .unwrap();

        let metrics = journal.metrics();
        assert_eq!(metrics.bytes_before_compression, 1);
        assert_eq!(metrics.bytes_after_compression, 1);
    }

    #[test]
    fn clear_resets_everything() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_txn_begin(TransactionId::new(1), None, Lsn::new(1))
            .unwrap();
        journal
            .append_txn_commit(TransactionId::new(1), Lsn::new(2))
            .unwrap();

        journal.clear().unwrap();
        assert!(journal.is_empty());
        assert_eq!(journal.files[0].size().unwrap(), 0);
        assert!(journal.buffers[0].is_empty());
    }
}
