//! Uncompressed sample codec.
//!
//! Payload layout (little-endian):
//!
//! ```text
//! count: u32 | (timestamp: i64, value: f64) * count
//! ```

use crate::chunk::Sample;
use crate::error::{ChunkError, Result};
use std::io::Write;

/// Size of one encoded sample.
const SAMPLE_SIZE: usize = 16;

/// Samples stored as fixed-width pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawChunk {
    samples: Vec<Sample>,
}

impl RawChunk {
    /// Creates an empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chunk from samples, which must be strictly increasing in time.
    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        if let Some(pair) = samples.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(ChunkError::Compression(format!(
                "timestamps must be strictly increasing: {} after {}",
                pair[1].timestamp, pair[0].timestamp
            )));
        }
        Ok(Self {
            samples: samples.to_vec(),
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the chunk holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in timestamp order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Writes the payload.
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        let count = u32::try_from(self.samples.len())
            .map_err(|_| ChunkError::Compression(format!("too many samples: {}", self.samples.len())))?;
        writer.write_all(&count.to_le_bytes())?;
        for sample in &self.samples {
            writer.write_all(&sample.timestamp.to_le_bytes())?;
            writer.write_all(&sample.value.to_bits().to_le_bytes())?;
        }
        Ok(())
    }

    /// Replaces the chunk contents with a marshaled payload.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::Decompression` unless `buf` is exactly the size
    /// its sample count implies and its timestamps strictly increase.
    pub fn unmarshal_from_buf(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() < 4 {
            return Err(ChunkError::Decompression(format!(
                "raw payload too short: {} bytes",
                buf.len()
            )));
        }
        let (header, body) = buf.split_at(4);
        let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if body.len() != count.saturating_mul(SAMPLE_SIZE) {
            return Err(ChunkError::Decompression(format!(
                "raw payload holds {} bytes for {} samples",
                body.len(),
                count
            )));
        }

        let samples: Vec<Sample> = body
            .chunks_exact(SAMPLE_SIZE)
            .map(|pair| {
                let mut ts = [0u8; 8];
                let mut val = [0u8; 8];
                ts.copy_from_slice(&pair[..8]);
                val.copy_from_slice(&pair[8..]);
                Sample::new(i64::from_le_bytes(ts), f64::from_bits(u64::from_le_bytes(val)))
            })
            .collect();
        if let Some(pair) = samples.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(ChunkError::Decompression(format!(
                "raw payload out of order: {} after {}",
                pair[1].timestamp, pair[0].timestamp
            )));
        }
        self.samples = samples;
        Ok(())
    }
}
