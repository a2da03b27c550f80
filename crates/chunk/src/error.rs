//! Error and Result types for chunk addressing and decoding.

use crate::chunk::Timestamp;
use std::io;
use std::num::ParseIntError;
use thiserror::Error;

/// A convenience `Result` type for chunk operations.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// The error type for chunk operations.
///
/// Every variant is terminal for the chunk it was raised on; nothing in this
/// crate retries.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// External key does not split into the expected fields.
    #[error("invalid chunk ID {0:?}")]
    InvalidChunkId(String),

    /// A numeric field of an external key failed to parse.
    #[error("invalid chunk ID {key:?}: {source}")]
    InvalidKeyField {
        /// The offending key.
        key: String,
        /// Underlying integer parse failure.
        #[source]
        source: ParseIntError,
    },

    /// Tenant or chunk identity disagrees with what the caller asked for.
    #[error("wrong chunk metadata: expected {expected}, found {found}")]
    WrongMetadata {
        /// Expected tenant ID or external key.
        expected: String,
        /// Tenant ID or external key actually found.
        found: String,
    },

    /// Whole-buffer checksum does not match the expected value.
    #[error("invalid chunk checksum: expected {expected:08x}, got {actual:08x}")]
    InvalidChecksum {
        /// Checksum carried by the external key.
        expected: u32,
        /// Checksum computed over the input buffer.
        actual: u32,
    },

    /// Declared metadata block length disagrees with the bytes consumed.
    #[error("chunk metadata wrong length: declared {declared}, consumed {consumed}")]
    MetadataLength {
        /// Length written in the block header (includes the 4 length bytes).
        declared: usize,
        /// Bytes consumed while deserializing the metadata.
        consumed: usize,
    },

    /// Declared data block length disagrees with the bytes available.
    #[error("chunk data wrong length: declared {declared}, available {available}")]
    DataLength {
        /// Length written in the block header.
        declared: usize,
        /// Bytes remaining after the header.
        available: usize,
    },

    /// No sample codec exists for this encoding tag.
    #[error("unknown chunk encoding: {0}")]
    UnknownEncoding(u8),

    /// Chunk time range is inverted.
    #[error("invalid time range: from {from} > through {through}")]
    InvalidTimeRange {
        /// Start of the range (inclusive).
        from: Timestamp,
        /// End of the range (inclusive).
        through: Timestamp,
    },

    /// Operation needs sample data but the chunk is key-only.
    #[error("chunk has no sample data")]
    MissingData,

    /// Samples could not be compressed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Sample payload is truncated or corrupt.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Metadata block could not be (de)serialized.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ChunkError {
    /// Returns true for errors caused by a malformed external key.
    pub fn is_malformed_key(&self) -> bool {
        matches!(
            self,
            ChunkError::InvalidChunkId(_) | ChunkError::InvalidKeyField { .. }
        )
    }
}
