//! Chunk wire format.
//!
//! # Layout
//!
//! ```text
//! Offset  Size    Field
//! ------  ----    -----
//! 0x00    4       metadata_len (u32 BE, includes these 4 bytes)
//! 0x04    N       snappy-framed JSON metadata
//! 0x04+N  4       data_len (u32 BE)
//! 0x08+N  M       sample codec payload
//! ```
//!
//! The CRC32C of the whole buffer is not stored in it. It travels in the
//! external key and is checked against the complete input on decode.

use crate::checksum;
use crate::chunk::{check_range, Chunk, Fingerprint, LabelSet, Timestamp};
use crate::context::DecodeContext;
use crate::encoding::{ChunkData, Encoding};
use crate::error::{ChunkError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snap::write::FrameEncoder;
use std::io::Write;
use tracing::debug;

/// Size of each block length prefix.
const LENGTH_SIZE: usize = 4;

/// Metadata block as written.
#[derive(Serialize)]
struct MetadataRecord<'a> {
    fingerprint: Fingerprint,
    #[serde(rename = "userID")]
    tenant_id: &'a str,
    #[serde(with = "model_time")]
    from: Timestamp,
    #[serde(with = "model_time")]
    through: Timestamp,
    metric: &'a LabelSet,
    encoding: u8,
}

/// Metadata block as read. Old writers may omit any field but the range.
#[derive(Debug, Deserialize)]
struct ChunkMetadata {
    #[serde(default)]
    fingerprint: Option<Fingerprint>,
    #[serde(rename = "userID", default)]
    tenant_id: Option<String>,
    #[serde(with = "model_time")]
    from: Timestamp,
    #[serde(with = "model_time")]
    through: Timestamp,
    #[serde(default)]
    metric: Option<LabelSet>,
    #[serde(default)]
    encoding: u8,
}

/// Millisecond timestamps as JSON seconds with a fractional part.
mod model_time {
    use crate::chunk::Timestamp;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        if ts % 1000 == 0 {
            serializer.serialize_i64(ts / 1000)
        } else {
            serializer.serialize_f64(*ts as f64 / 1000.0)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        deserializer.deserialize_any(SecondsVisitor)
    }

    struct SecondsVisitor;

    impl Visitor<'_> for SecondsVisitor {
        type Value = Timestamp;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("seconds since the epoch")
        }

        fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Timestamp, E> {
            secs.checked_mul(1000)
                .ok_or_else(|| E::custom(format!("timestamp {} out of range", secs)))
        }

        fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Timestamp, E> {
            i64::try_from(secs)
                .ok()
                .and_then(|s| s.checked_mul(1000))
                .ok_or_else(|| E::custom(format!("timestamp {} out of range", secs)))
        }

        fn visit_f64<E: de::Error>(self, secs: f64) -> Result<Timestamp, E> {
            let millis = (secs * 1000.0).round();
            if !millis.is_finite() || millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
                return Err(E::custom(format!("timestamp {} out of range", secs)));
            }
            Ok(millis as Timestamp)
        }
    }
}

fn read_length(buf: &[u8], offset: usize) -> Option<usize> {
    let bytes = buf.get(offset..offset + LENGTH_SIZE)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
}

fn write_length(buf: &mut [u8], offset: usize, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| ChunkError::Compression(format!("block of {} bytes exceeds u32", len)))?;
    buf[offset..offset + LENGTH_SIZE].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

impl Chunk {
    /// Serializes the chunk and records its checksum.
    ///
    /// The first successful call caches the buffer; later calls return the
    /// cached bytes without re-serializing.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::MissingData` on a key-only chunk.
    pub fn encode(&mut self) -> Result<Bytes> {
        if let Some(encoded) = &self.encoded {
            return Ok(encoded.clone());
        }
        let data = self.data.as_ref().ok_or(ChunkError::MissingData)?;
        let empty = LabelSet::new();
        let record = MetadataRecord {
            fingerprint: self.fingerprint,
            tenant_id: &self.tenant_id,
            from: self.from,
            through: self.through,
            metric: self.labels.as_ref().unwrap_or(&empty),
            encoding: data.encoding().as_u8(),
        };

        let mut buf = vec![0u8; LENGTH_SIZE];
        {
            let mut writer = FrameEncoder::new(&mut buf);
            serde_json::to_writer(&mut writer, &record)?;
            writer.flush()?;
        }
        let metadata_len = buf.len();
        write_length(&mut buf, 0, metadata_len)?;

        buf.extend_from_slice(&[0u8; LENGTH_SIZE]);
        data.marshal(&mut buf)?;
        let data_len = buf.len() - metadata_len - LENGTH_SIZE;
        write_length(&mut buf, metadata_len, data_len)?;

        let encoded = Bytes::from(buf);
        self.checksum = Some(checksum::checksum(&encoded));
        self.encoded = Some(encoded.clone());
        Ok(encoded)
    }

    /// Populates this chunk from `input`, the blob stored under its key.
    ///
    /// On success the chunk is replaced wholesale by the decoded record. On
    /// any error it is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - `InvalidChecksum` if the key carried a checksum the input fails
    /// - `MetadataLength` / `DataLength` on framing mismatches
    /// - `WrongMetadata` if the decoded identity differs from the key
    /// - `UnknownEncoding` if no codec exists for the stored tag
    pub fn decode(&mut self, ctx: &mut DecodeContext, input: Bytes) -> Result<()> {
        if self.metadata_in_index {
            return self.decode_index_backed(input);
        }

        if let Some(expected) = self.checksum {
            checksum::verify(&input, expected)?;
        }

        let declared = read_length(&input, 0).ok_or(ChunkError::MetadataLength {
            declared: LENGTH_SIZE,
            consumed: input.len(),
        })?;

        let reader = ctx.reset(input.slice(LENGTH_SIZE..))?;
        let metadata = serde_json::Deserializer::from_reader(reader)
            .into_iter::<ChunkMetadata>()
            .next();
        let consumed = LENGTH_SIZE + ctx.consumed() as usize;
        let metadata = metadata.ok_or(ChunkError::MetadataLength { declared, consumed })??;
        if consumed != declared {
            return Err(ChunkError::MetadataLength { declared, consumed });
        }
        check_range(metadata.from, metadata.through)?;

        let mut scratch = Chunk {
            fingerprint: metadata.fingerprint.unwrap_or(self.fingerprint),
            tenant_id: metadata
                .tenant_id
                .unwrap_or_else(|| self.tenant_id.clone()),
            from: metadata.from,
            through: metadata.through,
            labels: Some(metadata.metric.unwrap_or_default()),
            checksum: None,
            encoding: Encoding::default(),
            data: None,
            metadata_in_index: false,
            encoded: None,
        };

        if let Some(expected) = self.checksum {
            scratch.checksum = Some(expected);
            if !self.equal_by_key(&scratch) {
                return Err(ChunkError::WrongMetadata {
                    expected: self.external_key(),
                    found: scratch.external_key(),
                });
            }
        }
        // Identity errors take precedence over an unknown tag.
        scratch.encoding = Encoding::from_u8(metadata.encoding)?.normalize();

        let mut data = ChunkData::new_for_encoding(scratch.encoding)?;
        let payload_start = declared + LENGTH_SIZE;
        let available = input.len().saturating_sub(payload_start);
        let data_len = read_length(&input, declared).ok_or(ChunkError::DataLength {
            declared: LENGTH_SIZE,
            available: input.len().saturating_sub(declared),
        })?;
        if data_len != available {
            return Err(ChunkError::DataLength {
                declared: data_len,
                available,
            });
        }
        data.unmarshal_from_buf(&input[payload_start..])?;

        scratch.data = Some(data);
        scratch.encoded = Some(input);
        *self = scratch;
        Ok(())
    }

    /// Metadata lives in the index: the blob is a bare double-delta payload.
    fn decode_index_backed(&mut self, input: Bytes) -> Result<()> {
        debug!(
            "Decoding index-backed chunk {} ({} bytes)",
            self.external_key(),
            input.len()
        );
        let mut data = ChunkData::new_for_encoding(Encoding::DoubleDelta)?;
        data.unmarshal_from_buf(&input)?;

        self.encoding = Encoding::DoubleDelta;
        self.data = Some(data);
        self.encoded = Some(input);
        Ok(())
    }
}
