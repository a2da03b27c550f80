//! The chunk record: identity, time range, and sample payload of one block.
//!
//! A [`Chunk`] is either *key-only* (identity and range known, typically just
//! parsed from an external key) or *fully populated* (labels and data present,
//! either freshly built on the write path or decoded on the read path).

use crate::encoding::{ChunkData, Encoding};
use crate::error::{ChunkError, Result};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Unix timestamp in milliseconds.
pub type Timestamp = i64;

/// Series identifier derived from the label set.
pub type Fingerprint = u64;

/// Metric identity of a series: label name to label value.
pub type LabelSet = BTreeMap<String, String>;

/// A single timestamped value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unix timestamp in milliseconds.
    pub timestamp: Timestamp,
    /// Sample value.
    pub value: f64,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One chunk of a series.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) tenant_id: String,
    pub(crate) from: Timestamp,
    pub(crate) through: Timestamp,
    pub(crate) labels: Option<LabelSet>,
    /// `Some` once a checksum is known, either from the key or from encoding.
    pub(crate) checksum: Option<u32>,
    pub(crate) encoding: Encoding,
    pub(crate) data: Option<ChunkData>,
    pub(crate) metadata_in_index: bool,
    /// Output of the last successful encode, or the input of the last decode.
    pub(crate) encoded: Option<Bytes>,
}

impl Chunk {
    /// Builds a fully populated chunk on the write path.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidTimeRange` if `from > through`.
    pub fn new(
        tenant_id: impl Into<String>,
        fingerprint: Fingerprint,
        labels: LabelSet,
        data: ChunkData,
        from: Timestamp,
        through: Timestamp,
    ) -> Result<Self> {
        check_range(from, through)?;
        Ok(Self {
            fingerprint,
            tenant_id: tenant_id.into(),
            from,
            through,
            labels: Some(labels),
            checksum: None,
            encoding: data.encoding(),
            data: Some(data),
            metadata_in_index: false,
            encoded: None,
        })
    }

    /// Builds a key-only chunk whose metadata lives in an external index.
    ///
    /// Decoding such a chunk treats the whole blob as a double-delta payload.
    pub fn from_index(
        tenant_id: impl Into<String>,
        fingerprint: Fingerprint,
        labels: LabelSet,
        from: Timestamp,
        through: Timestamp,
    ) -> Result<Self> {
        check_range(from, through)?;
        Ok(Self {
            fingerprint,
            tenant_id: tenant_id.into(),
            from,
            through,
            labels: Some(labels),
            checksum: None,
            encoding: Encoding::DoubleDelta,
            data: None,
            metadata_in_index: true,
            encoded: None,
        })
    }

    /// Builds a key-only chunk. Callers validate the range.
    pub(crate) fn key_only(
        tenant_id: String,
        fingerprint: Fingerprint,
        from: Timestamp,
        through: Timestamp,
        checksum: Option<u32>,
    ) -> Self {
        Self {
            fingerprint,
            tenant_id,
            from,
            through,
            labels: None,
            checksum,
            encoding: Encoding::default(),
            data: None,
            metadata_in_index: false,
            encoded: None,
        }
    }

    /// Series fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Owning tenant.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// First timestamp covered (inclusive).
    pub fn from(&self) -> Timestamp {
        self.from
    }

    /// Last timestamp covered (inclusive).
    pub fn through(&self) -> Timestamp {
        self.through
    }

    /// Label set, absent on a key-only chunk.
    pub fn labels(&self) -> Option<&LabelSet> {
        self.labels.as_ref()
    }

    /// CRC32C of the encoded form, if known.
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// Sample encoding of the data block.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Sample payload, absent on a key-only chunk.
    pub fn data(&self) -> Option<&ChunkData> {
        self.data.as_ref()
    }

    /// True if the chunk's metadata is held in an external index.
    pub fn metadata_in_index(&self) -> bool {
        self.metadata_in_index
    }

    /// True until the chunk has been decoded or built with data.
    pub fn is_key_only(&self) -> bool {
        self.data.is_none()
    }

    /// Size of the cached encoded form, if encoded or decoded.
    pub fn encoded_size(&self) -> Option<usize> {
        self.encoded.as_ref().map(Bytes::len)
    }

    /// Compares the fields that make up the external key.
    pub fn equal_by_key(&self, other: &Chunk) -> bool {
        self.tenant_id == other.tenant_id
            && self.fingerprint == other.fingerprint
            && self.from == other.from
            && self.through == other.through
            && self.checksum == other.checksum
    }

    /// Samples with `from <= timestamp <= through`.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::MissingData` on a key-only chunk, or the codec's
    /// error if the payload is corrupt.
    pub fn samples(&self, from: Timestamp, through: Timestamp) -> Result<Vec<Sample>> {
        self.data
            .as_ref()
            .ok_or(ChunkError::MissingData)?
            .range_values(from, through)
    }
}

pub(crate) fn check_range(from: Timestamp, through: Timestamp) -> Result<()> {
    if from > through {
        return Err(ChunkError::InvalidTimeRange { from, through });
    }
    Ok(())
}
