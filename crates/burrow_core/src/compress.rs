//! Payload compression for journal entries.
//!
//! The journal offers every key, record, and page to a configured
//! [`Compressor`] and stores the compressed form only when it is strictly
//! smaller than the raw bytes; the relevant sub-header field records the
//! compressed size (zero means raw).

use crate::error::{JournalError, JournalResult};

/// Narrow compression interface consumed by the journal.
///
/// Implementations may keep internal scratch state, hence `&mut self`.
pub trait Compressor {
    /// Compresses `src` and returns the compressed bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be compressed.
    fn compress(&mut self, src: &[u8]) -> JournalResult<Vec<u8>>;

    /// Decompresses `src` into exactly `uncompressed_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is not a valid compressed stream or does
    /// not expand to `uncompressed_len` bytes. During recovery this is
    /// fatal: the journal is corrupt.
    fn decompress(&mut self, src: &[u8], uncompressed_len: usize) -> JournalResult<Vec<u8>>;
}

/// LZ4 block compression via `lz4_flex`.
///
/// Sizes are not embedded in the stream; the journal's sub-headers carry
/// both the raw and the compressed length.
#[derive(Debug, Default)]
pub struct Lz4Compressor;

impl Lz4Compressor {
    /// Creates a new LZ4 compressor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Compressor for Lz4Compressor {
    fn compress(&mut self, src: &[u8]) -> JournalResult<Vec<u8>> {
        Ok(lz4_flex::block::compress(src))
    }

    fn decompress(&mut self, src: &[u8], uncompressed_len: usize) -> JournalResult<Vec<u8>> {
        let out = lz4_flex::block::decompress(src, uncompressed_len)
            .map_err(|e| JournalError::compression(e.to_string()))?;
        if out.len() != uncompressed_len {
            return Err(JournalError::compression(format!(
                "expected {uncompressed_len} bytes, got {}",
                out.len()
            )));
        }
        Ok(out)
    }
}
