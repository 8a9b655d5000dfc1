//! Two-pass crash recovery.
//!
//! Pass one (physical redo) restores the page device from changeset
//! entries: both files are scanned for their oldest changeset, the file
//! holding the older one is replayed first, and the highest changeset LSN
//! applied becomes the watermark. Pass two (logical redo) walks both
//! files chronologically and re-applies transaction begins, aborts,
//! commits, inserts, and erases - skipping inserts and erases at or below
//! the watermark, because the pages already carry them. Transactions with
//! no terminal record are aborted at the end, and both files are cleared.

use crate::engine::{DatabaseRegistry, PageDevice, RecoveryDatabase, TransactionManager};
use crate::error::{JournalError, JournalResult};
use crate::journal::entry::{
    ChangesetHeader, EntryHeader, EntryKind, EraseHeader, InsertHeader, PageHeader,
    CHANGESET_HEADER_SIZE, HEADER_SIZE, PAGE_HEADER_SIZE,
};
use crate::journal::iterator::JournalCursor;
use crate::journal::writer::Journal;
use crate::types::{DbNameId, TransactionId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

impl Journal {
    /// Recovers the database from the journal after a crash.
    ///
    /// Runs physical redo against `device`, then logical redo against
    /// `txn_manager` and `databases`, and finally clears both log files.
    /// Appending is suppressed for the duration, so engine callbacks
    /// triggered by replay do not journal themselves.
    ///
    /// Running recovery on an already-recovered (cleared) journal is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error on real corruption (unknown entry kind,
    /// undecompressible payload) or when an engine collaborator fails.
    /// Torn tails are not errors; they simply end the replay.
    pub fn recover(
        &mut self,
        device: &mut dyn PageDevice,
        txn_manager: &mut dyn TransactionManager,
        databases: &mut dyn DatabaseRegistry,
    ) -> JournalResult<()> {
        debug!("starting journal recovery");
        let start_lsn = self.recover_changesets(device)?;
        debug!(start_lsn, "physical redo complete");

        self.replay_journal(txn_manager, databases, start_lsn)?;
        debug!("logical redo complete");

        self.clear()
    }

    /// Physical redo: replays every changeset in both files onto the
    /// page device, chronologically older file first.
    ///
    /// Returns the highest changeset LSN applied - the watermark below
    /// which logical redo skips inserts and erases.
    fn recover_changesets(&mut self, device: &mut dyn PageDevice) -> JournalResult<u64> {
        let lsn0 = self.scan_for_oldest_changeset(0)?;
        let lsn1 = self.scan_for_oldest_changeset(1)?;

        // neither file holds a changeset - nothing to redo
        if lsn0 == 0 && lsn1 == 0 {
            return Ok(0);
        }

        let first = if lsn1 == 0 || (lsn0 != 0 && lsn0 < lsn1) {
            0
        } else {
            1
        };
        let max_first = self.redo_changesets_in(first, device)?;
        let max_second = self.redo_changesets_in(1 - first, device)?;

        // Reconstruct the current-file index: the file replayed first is
        // the chronologically older (retired) one, so the logical-redo
        // cursor, which starts on the retired file, visits it first.
        self.current = 1 - first;

        Ok(max_first.max(max_second))
    }

    /// Scans one file for its first changeset entry and returns that
    /// entry's LSN, or zero if the file contains none.
    fn scan_for_oldest_changeset(&self, fd: usize) -> JournalResult<u64> {
        let filesize = match self.files[fd].size() {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, fd, "failed to size journal file during changeset scan");
                return Ok(0);
            }
        };

        let mut offset = 0u64;
        while offset < filesize {
            let header_bytes = match self.files[fd].read_at(offset, HEADER_SIZE) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, fd, offset, "torn entry during changeset scan");
                    break;
                }
            };
            if EntryHeader::peek_lsn(&header_bytes) == 0 {
                break;
            }
            let header = EntryHeader::decode(&header_bytes)?;
            if header.kind == EntryKind::Changeset {
                return Ok(header.lsn.as_u64());
            }
            offset += (HEADER_SIZE as u64) + u64::from(header.followup_size);
        }

        Ok(0)
    }

    /// Replays all changesets of one file onto the page device and
    /// returns the highest LSN applied.
    fn redo_changesets_in(&mut self, fd: usize, device: &mut dyn PageDevice) -> JournalResult<u64> {
        let filesize = match self.files[fd].size() {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, fd, "failed to size journal file during physical redo");
                return Ok(0);
            }
        };

        let page_size = self.page_size;
        let mut device_size = device.file_size()?;
        let mut max_lsn = 0u64;
        let mut offset = 0u64;

        while offset < filesize {
            let header_bytes = match self.files[fd].read_at(offset, HEADER_SIZE) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, fd, offset, "torn entry during physical redo");
                    break;
                }
            };
            if EntryHeader::peek_lsn(&header_bytes) == 0 {
                break;
            }
            let header = EntryHeader::decode(&header_bytes)?;

            if header.kind != EntryKind::Changeset {
                offset += (HEADER_SIZE as u64) + u64::from(header.followup_size);
                continue;
            }

            let payload = match self.files[fd]
                .read_at(offset + HEADER_SIZE as u64, header.followup_size as usize)
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    // the changeset never finished flushing - it does not apply
                    warn!(error = %e, fd, offset, "torn changeset, ending physical redo");
                    break;
                }
            };

            let changeset = ChangesetHeader::decode(&payload)?;
            device.set_last_blob_page(changeset.last_blob_page);

            let mut pos = CHANGESET_HEADER_SIZE;
            for _ in 0..changeset.num_pages {
                let page_header = PageHeader::decode(
                    payload
                        .get(pos..)
                        .ok_or_else(|| JournalError::corrupt("changeset shorter than its page count"))?,
                )?;
                pos += PAGE_HEADER_SIZE;

                let stored_len = if page_header.compressed_size > 0 {
                    page_header.compressed_size as usize
                } else {
                    page_size
                };
                let body = payload
                    .get(pos..pos + stored_len)
                    .ok_or_else(|| JournalError::corrupt("changeset page body out of bounds"))?;
                pos += stored_len;

                let data = if page_header.compressed_size > 0 {
                    let compressor = self.compressor.as_mut().ok_or_else(|| {
                        JournalError::compression("compressed page but no compressor configured")
                    })?;
                    compressor.decompress(body, page_size)?
                } else {
                    body.to_vec()
                };

                if page_header.address == device_size {
                    // the page sits exactly at the end: a fresh allocation
                    let address = device.alloc_page()?;
                    debug_assert_eq!(address, page_header.address);
                    device_size += page_size as u64;
                    device.write_page(page_header.address, &data)?;
                } else if page_header.address > device_size {
                    device_size = page_header.address + page_size as u64;
                    device.truncate(device_size)?;
                    device.write_page(page_header.address, &data)?;
                } else {
                    device.write_page(page_header.address, &data)?;
                }
            }

            max_lsn = header.lsn.as_u64();
            offset += (HEADER_SIZE as u64) + u64::from(header.followup_size);
        }

        Ok(max_lsn)
    }

    /// Logical redo: replays every journaled operation past the
    /// changeset watermark, then aborts transactions that never reached
    /// a terminal record.
    fn replay_journal(
        &mut self,
        txn_manager: &mut dyn TransactionManager,
        databases: &mut dyn DatabaseRegistry,
        start_lsn: u64,
    ) -> JournalResult<()> {
        debug_assert!(txn_manager.live_transactions().is_empty());

        self.disable_logging = true;
        let mut cache: HashMap<DbNameId, Box<dyn RecoveryDatabase>> = HashMap::new();

        let replayed = self.replay_entries(txn_manager, databases, &mut cache, start_lsn);

        // Teardown runs regardless of the replay outcome: open txns must
        // not become visible, and the recovery handles must not leak.
        let teardown = (|| -> JournalResult<()> {
            for id in txn_manager.live_transactions() {
                txn_manager.abort(id)?;
            }
            for (name, mut db) in cache.drain() {
                if let Err(e) = db.close() {
                    warn!(error = %e, %name, "failed to close database after recovery");
                    return Err(e);
                }
            }
            Ok(())
        })();

        let flushed = if replayed.is_ok() && teardown.is_ok() {
            txn_manager.flush_committed()
        } else {
            Ok(())
        };

        self.disable_logging = false;
        replayed.and(teardown).and(flushed)
    }

    fn replay_entries(
        &mut self,
        txn_manager: &mut dyn TransactionManager,
        databases: &mut dyn DatabaseRegistry,
        cache: &mut HashMap<DbNameId, Box<dyn RecoveryDatabase>>,
        start_lsn: u64,
    ) -> JournalResult<()> {
        let mut cursor = JournalCursor::new();

        while let Some(entry) = self.read_entry(&mut cursor)? {
            match entry.header.kind {
                EntryKind::TxnBegin => {
                    let name = parse_txn_name(&entry.payload)?;
                    let assigned = txn_manager.begin(name)?;
                    txn_manager.adopt_txn_id(assigned, entry.header.txn_id)?;
                }
                EntryKind::TxnAbort => {
                    txn_manager.abort(entry.header.txn_id)?;
                }
                EntryKind::TxnCommit => {
                    txn_manager.commit(entry.header.txn_id)?;
                }
                EntryKind::Insert => {
                    // already captured by a redone changeset
                    if entry.header.lsn.as_u64() <= start_lsn {
                        continue;
                    }
                    let view = InsertHeader::parse(&entry.payload)?;
                    let key = self.maybe_decompress(
                        view.key,
                        view.header.compressed_key_size,
                        view.header.key_size,
                    )?;
                    let record = self.maybe_decompress(
                        view.record,
                        view.header.compressed_record_size,
                        view.header.record_size,
                    )?;
                    let txn = replayed_txn(entry.header.txn_id);
                    let db = cached_database(cache, databases, entry.header.dbname)?;
                    db.insert(txn, &key, &record, view.header.insert_flags)?;
                }
                EntryKind::Erase => {
                    if entry.header.lsn.as_u64() <= start_lsn {
                        continue;
                    }
                    let view = EraseHeader::parse(&entry.payload)?;
                    let key = self.maybe_decompress(
                        view.key,
                        view.header.compressed_key_size,
                        view.header.key_size,
                    )?;
                    let txn = replayed_txn(entry.header.txn_id);
                    let db = cached_database(cache, databases, entry.header.dbname)?;
                    match db.erase(
                        txn,
                        &key,
                        view.header.duplicate_index,
                        view.header.erase_flags,
                    ) {
                        // the key may already be gone from a redone page
                        Err(JournalError::KeyNotFound) => {}
                        result => result?,
                    }
                }
                EntryKind::Changeset => {
                    // applied during physical redo
                }
            }
        }

        Ok(())
    }

    fn maybe_decompress(
        &mut self,
        stored: &[u8],
        compressed_size: u32,
        raw_size: u32,
    ) -> JournalResult<Vec<u8>> {
        if compressed_size == 0 {
            return Ok(stored.to_vec());
        }
        let compressor = self.compressor.as_mut().ok_or_else(|| {
            JournalError::compression("compressed payload but no compressor configured")
        })?;
        compressor.decompress(stored, raw_size as usize)
    }
}

fn replayed_txn(txn_id: TransactionId) -> Option<TransactionId> {
    if txn_id.is_temporary() {
        None
    } else {
        Some(txn_id)
    }
}

fn cached_database<'a>(
    cache: &'a mut HashMap<DbNameId, Box<dyn RecoveryDatabase>>,
    databases: &mut dyn DatabaseRegistry,
    name: DbNameId,
) -> JournalResult<&'a mut Box<dyn RecoveryDatabase>> {
    match cache.entry(name) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => Ok(entry.insert(databases.open_database(name)?)),
    }
}

fn parse_txn_name(payload: &[u8]) -> JournalResult<Option<&str>> {
    let Some((last, name_bytes)) = payload.split_last() else {
        return Ok(None);
    };
    if *last != 0 {
        return Err(JournalError::corrupt("transaction name missing terminator"));
    }
    let name = std::str::from_utf8(name_bytes)
        .map_err(|_| JournalError::corrupt("transaction name is not valid UTF-8"))?;
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressionKind, JournalConfig};
    use crate::journal::writer::ChangesetPage;
    use crate::types::Lsn;
    use burrow_storage::MemoryLog;

    const PAGE_SIZE: usize = 64;

    fn memory_journal(config: JournalConfig) -> Journal {
        Journal::with_files(
            [Box::new(MemoryLog::new()), Box::new(MemoryLog::new())],
            config.page_size(PAGE_SIZE),
        )
    }

    /// Flat-file page device over a byte vector.
    #[derive(Debug, Default)]
    struct MockDevice {
        bytes: Vec<u8>,
        last_blob_page: u64,
    }

    impl PageDevice for MockDevice {
        fn page_size(&self) -> usize {
            PAGE_SIZE
        }

        fn file_size(&self) -> JournalResult<u64> {
            Ok(self.bytes.len() as u64)
        }

        fn truncate(&mut self, new_size: u64) -> JournalResult<()> {
            self.bytes.resize(new_size as usize, 0);
            Ok(())
        }

        fn alloc_page(&mut self) -> JournalResult<u64> {
            let address = self.bytes.len() as u64;
            self.bytes.resize(self.bytes.len() + PAGE_SIZE, 0);
            Ok(address)
        }

        fn write_page(&mut self, address: u64, data: &[u8]) -> JournalResult<()> {
            let start = address as usize;
            self.bytes[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn set_last_blob_page(&mut self, page_id: u64) {
            self.last_blob_page = page_id;
        }
    }

    #[test]
    fn scan_finds_first_changeset_lsn() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_insert(DbNameId::new(1), None, b"k", b"v", 0, Lsn::new(3))
            .unwrap();
        let page = vec![1u8; PAGE_SIZE];
        journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &page,
                }],
                0,
                Lsn::new(4),
            )
            .unwrap();
        journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &page,
                }],
                0,
                Lsn::new(9),
            )
            .unwrap();
        journal.close(true).unwrap();

        assert_eq!(journal.scan_for_oldest_changeset(0).unwrap(), 4);
        assert_eq!(journal.scan_for_oldest_changeset(1).unwrap(), 0);
    }

    #[test]
    fn physical_redo_overwrites_existing_page() {
        let mut journal = memory_journal(JournalConfig::default());
        let page = vec![0xCD; PAGE_SIZE];
        journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &page,
                }],
                7,
                Lsn::new(5),
            )
            .unwrap();
        journal.close(true).unwrap();

        let mut device = MockDevice::default();
        device.truncate(PAGE_SIZE as u64).unwrap();

        let watermark = journal.recover_changesets(&mut device).unwrap();
        assert_eq!(watermark, 5);
        assert_eq!(&device.bytes, &page);
        assert_eq!(device.last_blob_page, 7);
    }

    #[test]
    fn physical_redo_allocates_page_at_end() {
        let mut journal = memory_journal(JournalConfig::default());
        let page = vec![0x11; PAGE_SIZE];
        journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &page,
                }],
                0,
                Lsn::new(2),
            )
            .unwrap();
        journal.close(true).unwrap();

        // empty device: address 0 equals the file size, so a page is allocated
        let mut device = MockDevice::default();
        journal.recover_changesets(&mut device).unwrap();

        assert_eq!(device.bytes.len(), PAGE_SIZE);
        assert_eq!(&device.bytes, &page);
    }

    #[test]
    fn physical_redo_extends_device_for_far_address() {
        let mut journal = memory_journal(JournalConfig::default());
        let page = vec![0x77; PAGE_SIZE];
        let far = (PAGE_SIZE * 3) as u64;
        journal
            .append_changeset(
                &[ChangesetPage {
                    address: far,
                    data: &page,
                }],
                0,
                Lsn::new(2),
            )
            .unwrap();
        journal.close(true).unwrap();

        let mut device = MockDevice::default();
        journal.recover_changesets(&mut device).unwrap();

        assert_eq!(device.bytes.len(), PAGE_SIZE * 4);
        assert_eq!(&device.bytes[PAGE_SIZE * 3..], &page[..]);
        // the gap pages are zero-filled
        assert!(device.bytes[..PAGE_SIZE * 3].iter().all(|&b| b == 0));
    }

    #[test]
    fn physical_redo_restores_compressed_pages() {
        let config = JournalConfig::default().compression(CompressionKind::Lz4);
        let mut journal = memory_journal(config);
        let page = vec![0xEE; PAGE_SIZE];
        journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &page,
                }],
                0,
                Lsn::new(3),
            )
            .unwrap();
        journal.close(true).unwrap();

        // the page is repetitive, so it was stored compressed
        let raw_entry_size = HEADER_SIZE + CHANGESET_HEADER_SIZE + PAGE_HEADER_SIZE + PAGE_SIZE;
        assert!(journal.files[0].size().unwrap() < raw_entry_size as u64);

        let mut device = MockDevice::default();
        journal.recover_changesets(&mut device).unwrap();
        assert_eq!(&device.bytes, &page);
    }

    #[test]
    fn watermark_is_highest_changeset_lsn() {
        let mut journal = memory_journal(JournalConfig::default());
        let page = vec![0u8; PAGE_SIZE];
        for lsn in [2, 4, 6] {
            journal
                .append_changeset(
                    &[ChangesetPage {
                        address: 0,
                        data: &page,
                    }],
                    0,
                    Lsn::new(lsn),
                )
                .unwrap();
        }
        journal.close(true).unwrap();

        let mut device = MockDevice::default();
        let watermark = journal.recover_changesets(&mut device).unwrap();
        assert_eq!(watermark, 6);
    }

    #[test]
    fn no_changesets_means_zero_watermark() {
        let mut journal = memory_journal(JournalConfig::default());
        journal
            .append_insert(DbNameId::new(1), None, b"k", b"v", 0, Lsn::new(1))
            .unwrap();
        journal.close(true).unwrap();

        let mut device = MockDevice::default();
        assert_eq!(journal.recover_changesets(&mut device).unwrap(), 0);
        assert!(device.bytes.is_empty());
    }

    #[test]
    fn older_changeset_file_is_redone_first() {
        let config = JournalConfig::default().switch_threshold(1);
        let mut journal = memory_journal(config);
        let old_page = vec![0xAA; PAGE_SIZE];
        let new_page = vec![0xBB; PAGE_SIZE];

        // changeset at lsn 1 lands in file 0, rotation, lsn 5 in file 1
        let fd = journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &old_page,
                }],
                0,
                Lsn::new(1),
            )
            .unwrap()
            .unwrap();
        journal.changeset_flushed(fd);
        let fd = journal
            .append_changeset(
                &[ChangesetPage {
                    address: 0,
                    data: &new_page,
                }],
                0,
                Lsn::new(5),
            )
            .unwrap()
            .unwrap();
        assert_eq!(fd, 1);
        journal.close(true).unwrap();

        let mut device = MockDevice::default();
        let watermark = journal.recover_changesets(&mut device).unwrap();

        // file 1's page was applied last: it wins
        assert_eq!(watermark, 5);
        assert_eq!(&device.bytes, &new_page);
        // current reconstructed so the logical cursor starts on file 0
        assert_eq!(journal.current, 1);
    }

    #[test]
    fn parse_txn_name_variants() {
        assert_eq!(parse_txn_name(b"").unwrap(), None);
        assert_eq!(parse_txn_name(b"writer\0").unwrap(), Some("writer"));
        assert!(parse_txn_name(b"unterminated").is_err());
        assert!(parse_txn_name(&[0xFF, 0xFE, 0x00]).is_err());
    }
}
