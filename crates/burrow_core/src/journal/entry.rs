//! Journal entry encoding.
//!
//! Every entry starts with a fixed 32-byte little-endian header followed
//! by `followup_size` bytes of kind-specific payload:
//!
//! ```text
//! | lsn (8) | txn_id (8) | followup_size (4) | dbname (2) | kind (1) | reserved (9) |
//! ```
//!
//! Payload layouts per kind:
//!
//! - `TxnBegin` - optional NUL-terminated transaction name
//! - `TxnAbort`, `TxnCommit` - empty
//! - `Insert` - [`InsertHeader`] (20 bytes), key bytes, record bytes
//! - `Erase` - [`EraseHeader`] (16 bytes), key bytes
//! - `Changeset` - [`ChangesetHeader`] (12 bytes), then per page a
//!   [`PageHeader`] (12 bytes) and the page body
//!
//! Key, record, and page bytes are stored compressed when a compressor is
//! configured and the compressed form is strictly smaller; the
//! `compressed_*` sub-header fields record the stored length (zero means
//! raw).

use crate::error::{JournalError, JournalResult};
use crate::types::{DbNameId, Lsn, TransactionId};

/// Size of the fixed entry header.
pub const HEADER_SIZE: usize = 32;

/// Size of the [`InsertHeader`] on disk.
pub const INSERT_HEADER_SIZE: usize = 20;

/// Size of the [`EraseHeader`] on disk.
pub const ERASE_HEADER_SIZE: usize = 16;

/// Size of the [`ChangesetHeader`] on disk.
pub const CHANGESET_HEADER_SIZE: usize = 12;

/// Size of the per-page [`PageHeader`] on disk.
pub const PAGE_HEADER_SIZE: usize = 12;

/// Kind of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// A transaction started.
    TxnBegin = 1,
    /// A transaction aborted.
    TxnAbort = 2,
    /// A transaction committed.
    TxnCommit = 3,
    /// A key was inserted.
    Insert = 4,
    /// A key was erased.
    Erase = 5,
    /// A set of modified pages was captured.
    Changeset = 6,
}

impl EntryKind {
    /// Converts a byte to an entry kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::TxnBegin),
            2 => Some(Self::TxnAbort),
            3 => Some(Self::TxnCommit),
            4 => Some(Self::Insert),
            5 => Some(Self::Erase),
            6 => Some(Self::Changeset),
            _ => None,
        }
    }

    /// Converts the entry kind to its on-disk byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The fixed header carried by every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Log sequence number of the event.
    pub lsn: Lsn,
    /// Transaction the event belongs to; zero for temporary operations
    /// and changesets.
    pub txn_id: TransactionId,
    /// Byte length of the payload that follows the header.
    pub followup_size: u32,
    /// Database the event targets; zero when not applicable.
    pub dbname: DbNameId,
    /// Entry kind.
    pub kind: EntryKind,
}

impl EntryHeader {
    /// Encodes the header into its 32-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.lsn.as_u64().to_le_bytes());
        buf[8..16].copy_from_slice(&self.txn_id.as_u64().to_le_bytes());
        buf[16..20].copy_from_slice(&self.followup_size.to_le_bytes());
        buf[20..22].copy_from_slice(&self.dbname.as_u16().to_le_bytes());
        buf[22] = self.kind.as_byte();
        // byte 23 and 24..32 are reserved, left zero
        buf
    }

    /// Decodes a header from its on-disk form.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if `bytes` is too short or the kind
    /// byte is unknown.
    pub fn decode(bytes: &[u8]) -> JournalResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(JournalError::corrupt("truncated entry header"));
        }
        let kind_byte = bytes[22];
        let kind = EntryKind::from_byte(kind_byte)
            .ok_or_else(|| JournalError::corrupt(format!("unknown entry kind {kind_byte}")))?;
        Ok(Self {
            lsn: Lsn::new(read_u64(bytes, 0)),
            txn_id: TransactionId::new(read_u64(bytes, 8)),
            followup_size: read_u32(bytes, 16),
            dbname: DbNameId::new(read_u16(bytes, 20)),
            kind,
        })
    }

    /// Reads the LSN field without validating the rest of the header.
    ///
    /// Recovery checks this first: an all-zero region reads as LSN zero,
    /// which marks the end of the log.
    #[must_use]
    pub fn peek_lsn(bytes: &[u8]) -> u64 {
        if bytes.len() < 8 {
            return 0;
        }
        read_u64(bytes, 0)
    }
}

/// Sub-header of an [`EntryKind::Insert`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertHeader {
    /// Uncompressed key length.
    pub key_size: u32,
    /// Uncompressed record length.
    pub record_size: u32,
    /// Stored key length when compressed; zero when stored raw.
    pub compressed_key_size: u32,
    /// Stored record length when compressed; zero when stored raw.
    pub compressed_record_size: u32,
    /// Opaque engine flags preserved across replay.
    pub insert_flags: u32,
}

impl InsertHeader {
    /// Encodes the sub-header into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; INSERT_HEADER_SIZE] {
        let mut buf = [0u8; INSERT_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.key_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.record_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compressed_key_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.compressed_record_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.insert_flags.to_le_bytes());
        buf
    }

    /// Splits an insert payload into its sub-header, stored key bytes,
    /// and stored record bytes.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the payload is shorter than the
    /// sizes recorded in the sub-header.
    pub fn parse(payload: &[u8]) -> JournalResult<InsertView<'_>> {
        if payload.len() < INSERT_HEADER_SIZE {
            return Err(JournalError::corrupt("truncated insert sub-header"));
        }
        let header = Self {
            key_size: read_u32(payload, 0),
            record_size: read_u32(payload, 4),
            compressed_key_size: read_u32(payload, 8),
            compressed_record_size: read_u32(payload, 12),
            insert_flags: read_u32(payload, 16),
        };

        let key_len = header.stored_key_len();
        let record_len = header.stored_record_len();
        let key_end = INSERT_HEADER_SIZE + key_len;
        let record_end = key_end + record_len;
        if payload.len() < record_end {
            return Err(JournalError::corrupt("truncated insert payload"));
        }

        Ok(InsertView {
            header,
            key: &payload[INSERT_HEADER_SIZE..key_end],
            record: &payload[key_end..record_end],
        })
    }

    /// Length of the key bytes as stored on disk.
    #[must_use]
    pub fn stored_key_len(&self) -> usize {
        if self.compressed_key_size > 0 {
            self.compressed_key_size as usize
        } else {
            self.key_size as usize
        }
    }

    /// Length of the record bytes as stored on disk.
    #[must_use]
    pub fn stored_record_len(&self) -> usize {
        if self.compressed_record_size > 0 {
            self.compressed_record_size as usize
        } else {
            self.record_size as usize
        }
    }
}

/// A parsed view into an insert payload.
#[derive(Debug)]
pub struct InsertView<'a> {
    /// The decoded sub-header.
    pub header: InsertHeader,
    /// Stored key bytes (compressed or raw).
    pub key: &'a [u8],
    /// Stored record bytes (compressed or raw).
    pub record: &'a [u8],
}

/// Sub-header of an [`EntryKind::Erase`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EraseHeader {
    /// Uncompressed key length.
    pub key_size: u32,
    /// Stored key length when compressed; zero when stored raw.
    pub compressed_key_size: u32,
    /// Opaque engine flags preserved across replay.
    pub erase_flags: u32,
    /// Index of the duplicate to erase; negative values per engine
    /// convention.
    pub duplicate_index: i32,
}

impl EraseHeader {
    /// Encodes the sub-header into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; ERASE_HEADER_SIZE] {
        let mut buf = [0u8; ERASE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.key_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.compressed_key_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.erase_flags.to_le_bytes());
        buf[12..16].copy_from_slice(&self.duplicate_index.to_le_bytes());
        buf
    }

    /// Splits an erase payload into its sub-header and stored key bytes.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the payload is shorter than the
    /// recorded key length.
    pub fn parse(payload: &[u8]) -> JournalResult<EraseView<'_>> {
        if payload.len() < ERASE_HEADER_SIZE {
            return Err(JournalError::corrupt("truncated erase sub-header"));
        }
        let header = Self {
            key_size: read_u32(payload, 0),
            compressed_key_size: read_u32(payload, 4),
            erase_flags: read_u32(payload, 8),
            duplicate_index: read_u32(payload, 12) as i32,
        };

        let key_len = header.stored_key_len();
        let key_end = ERASE_HEADER_SIZE + key_len;
        if payload.len() < key_end {
            return Err(JournalError::corrupt("truncated erase payload"));
        }

        Ok(EraseView {
            header,
            key: &payload[ERASE_HEADER_SIZE..key_end],
        })
    }

    /// Length of the key bytes as stored on disk.
    #[must_use]
    pub fn stored_key_len(&self) -> usize {
        if self.compressed_key_size > 0 {
            self.compressed_key_size as usize
        } else {
            self.key_size as usize
        }
    }
}

/// A parsed view into an erase payload.
#[derive(Debug)]
pub struct EraseView<'a> {
    /// The decoded sub-header.
    pub header: EraseHeader,
    /// Stored key bytes (compressed or raw).
    pub key: &'a [u8],
}

/// Sub-header of an [`EntryKind::Changeset`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangesetHeader {
    /// Number of pages captured in the changeset.
    pub num_pages: u32,
    /// Address of the last blob page at capture time.
    pub last_blob_page: u64,
}

impl ChangesetHeader {
    /// Encodes the sub-header into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; CHANGESET_HEADER_SIZE] {
        let mut buf = [0u8; CHANGESET_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.num_pages.to_le_bytes());
        buf[4..12].copy_from_slice(&self.last_blob_page.to_le_bytes());
        buf
    }

    /// Decodes the sub-header from the start of a changeset payload.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if `bytes` is too short.
    pub fn decode(bytes: &[u8]) -> JournalResult<Self> {
        if bytes.len() < CHANGESET_HEADER_SIZE {
            return Err(JournalError::corrupt("truncated changeset sub-header"));
        }
        Ok(Self {
            num_pages: read_u32(bytes, 0),
            last_blob_page: read_u64(bytes, 4),
        })
    }
}

/// Per-page header inside a changeset payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Address of the page in the page device.
    pub address: u64,
    /// Stored body length when compressed; zero when the body is a raw
    /// page.
    pub compressed_size: u32,
}

impl PageHeader {
    /// Encodes the page header into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.address.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf
    }

    /// Decodes a page header.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if `bytes` is too short.
    pub fn decode(bytes: &[u8]) -> JournalResult<Self> {
        if bytes.len() < PAGE_HEADER_SIZE {
            return Err(JournalError::corrupt("truncated page header"));
        }
        Ok(Self {
            address: read_u64(bytes, 0),
            compressed_size: read_u32(bytes, 8),
        })
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[at..at + 2]);
    u16::from_le_bytes(buf)
}
