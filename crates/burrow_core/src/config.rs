//! Journal configuration.

use crate::compress::{Compressor, Lz4Compressor};
use std::path::PathBuf;

/// Default number of transactions per log file before rotation.
pub const DEFAULT_SWITCH_THRESHOLD: u32 = 32;

/// Default page size of the page device, in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 16 * 1024;

/// Default per-file write buffer watermark, in bytes.
///
/// The watermark only triggers flushes between entries, never inside one,
/// so the in-place header patch of variable-size entries is always applied
/// before the bytes leave the buffer.
pub const DEFAULT_BUFFER_WATERMARK: usize = 1024 * 1024;

/// Compression applied to journaled keys, records, and pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    /// Store all payloads raw.
    #[default]
    None,
    /// LZ4 block compression.
    Lz4,
}

impl CompressionKind {
    pub(crate) fn build(self) -> Option<Box<dyn Compressor>> {
        match self {
            Self::None => None,
            Self::Lz4 => Some(Box::new(Lz4Compressor::new())),
        }
    }
}

/// Configuration for opening a journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Transactions per file before the rotation predicate considers
    /// switching to the other file.
    pub switch_threshold: u32,

    /// Compression applied to entry payloads.
    pub compression: CompressionKind,

    /// Whether commit and changeset flushes also fsync.
    pub fsync: bool,

    /// Directory for the two log files; defaults to the directory of the
    /// database file itself.
    pub log_directory: Option<PathBuf>,

    /// Page size of the page device captured in changesets.
    pub page_size: usize,

    /// Buffer size above which a soft flush writes the buffer out.
    pub buffer_watermark: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            switch_threshold: DEFAULT_SWITCH_THRESHOLD,
            compression: CompressionKind::None,
            fsync: true,
            log_directory: None,
            page_size: DEFAULT_PAGE_SIZE,
            buffer_watermark: DEFAULT_BUFFER_WATERMARK,
        }
    }
}

impl JournalConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rotation threshold (transactions per file).
    #[must_use]
    pub const fn switch_threshold(mut self, threshold: u32) -> Self {
        self.switch_threshold = threshold;
        self
    }

    /// Sets the payload compression.
    #[must_use]
    pub const fn compression(mut self, kind: CompressionKind) -> Self {
        self.compression = kind;
        self
    }

    /// Sets whether commits and changesets fsync.
    #[must_use]
    pub const fn fsync(mut self, value: bool) -> Self {
        self.fsync = value;
        self
    }

    /// Overrides the directory the log files live in.
    #[must_use]
    pub fn log_directory(mut self, dir: PathBuf) -> Self {
        self.log_directory = Some(dir);
        self
    }

    /// Sets the page size of the page device.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the write buffer watermark.
    #[must_use]
    pub const fn buffer_watermark(mut self, size: usize) -> Self {
        self.buffer_watermark = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = JournalConfig::default();
        assert_eq!(config.switch_threshold, DEFAULT_SWITCH_THRESHOLD);
        assert_eq!(config.compression, CompressionKind::None);
        assert!(config.fsync);
        assert!(config.log_directory.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = JournalConfig::new()
            .switch_threshold(4)
            .compression(CompressionKind::Lz4)
            .fsync(false)
            .page_size(1024);

        assert_eq!(config.switch_threshold, 4);
        assert_eq!(config.compression, CompressionKind::Lz4);
        assert!(!config.fsync);
        assert_eq!(config.page_size, 1024);
    }

    #[test]
    fn compression_kind_builds_compressor() {
        assert!(CompressionKind::None.build().is_none());
        assert!(CompressionKind::Lz4.build().is_some());
    }
}
