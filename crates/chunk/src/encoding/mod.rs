//! Sample codecs selected by a one-byte encoding tag.
//!
//! A chunk's data block is produced by one of the codecs here. The tag is
//! carried in the chunk metadata so a reader can construct the matching codec
//! before unmarshaling.

pub mod gorilla;
pub mod raw;

pub use gorilla::GorillaChunk;
pub use raw::RawChunk;

use crate::chunk::{Sample, Timestamp};
use crate::error::{ChunkError, Result};
use std::io::Write;

/// Sample compression algorithm tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    /// Reserved. Historical writers left the tag unset; read as [`Encoding::DoubleDelta`].
    Delta = 0,
    /// Delta-of-delta timestamps with XOR values.
    #[default]
    DoubleDelta = 1,
    /// Uncompressed sample pairs.
    Raw = 2,
}

impl Encoding {
    /// Maps a wire tag to an encoding.
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Encoding::Delta),
            1 => Ok(Encoding::DoubleDelta),
            2 => Ok(Encoding::Raw),
            other => Err(ChunkError::UnknownEncoding(other)),
        }
    }

    /// Wire tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Resolves the reserved zero tag to the historical default.
    pub fn normalize(self) -> Self {
        match self {
            Encoding::Delta => Encoding::DoubleDelta,
            other => other,
        }
    }
}

/// Compressed sample payload of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    /// Gorilla-compressed samples.
    DoubleDelta(GorillaChunk),
    /// Uncompressed samples.
    Raw(RawChunk),
}

impl ChunkData {
    /// Constructs an empty codec for `encoding`.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::UnknownEncoding` for the reserved zero tag, which
    /// must be normalized first.
    pub fn new_for_encoding(encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::DoubleDelta => Ok(ChunkData::DoubleDelta(GorillaChunk::new())),
            Encoding::Raw => Ok(ChunkData::Raw(RawChunk::new())),
            Encoding::Delta => Err(ChunkError::UnknownEncoding(encoding.as_u8())),
        }
    }

    /// Compresses `samples` with `encoding`.
    pub fn from_samples(encoding: Encoding, samples: &[Sample]) -> Result<Self> {
        match encoding {
            Encoding::DoubleDelta => Ok(ChunkData::DoubleDelta(GorillaChunk::compress(samples)?)),
            Encoding::Raw => Ok(ChunkData::Raw(RawChunk::from_samples(samples)?)),
            Encoding::Delta => Err(ChunkError::UnknownEncoding(encoding.as_u8())),
        }
    }

    /// Encoding tag of this payload.
    pub fn encoding(&self) -> Encoding {
        match self {
            ChunkData::DoubleDelta(_) => Encoding::DoubleDelta,
            ChunkData::Raw(_) => Encoding::Raw,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            ChunkData::DoubleDelta(c) => c.len(),
            ChunkData::Raw(c) => c.len(),
        }
    }

    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the codec payload.
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            ChunkData::DoubleDelta(c) => c.marshal(writer),
            ChunkData::Raw(c) => c.marshal(writer),
        }
    }

    /// Replaces the contents with a marshaled payload of the same encoding.
    pub fn unmarshal_from_buf(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            ChunkData::DoubleDelta(c) => c.unmarshal_from_buf(buf),
            ChunkData::Raw(c) => c.unmarshal_from_buf(buf),
        }
    }

    /// Iterates samples in timestamp order.
    pub fn iter(&self) -> SampleIter<'_> {
        match self {
            ChunkData::DoubleDelta(c) => SampleIter::DoubleDelta(c.iter()),
            ChunkData::Raw(c) => SampleIter::Raw(c.samples().iter()),
        }
    }

    /// Samples with `from <= timestamp <= through`.
    pub fn range_values(&self, from: Timestamp, through: Timestamp) -> Result<Vec<Sample>> {
        let mut out = Vec::new();
        for sample in self.iter() {
            let sample = sample?;
            if sample.timestamp > through {
                break;
            }
            if sample.timestamp >= from {
                out.push(sample);
            }
        }
        Ok(out)
    }
}

/// Iterator over the samples of a [`ChunkData`].
pub enum SampleIter<'a> {
    /// Decoding a Gorilla bit stream.
    DoubleDelta(gorilla::GorillaIter<'a>),
    /// Walking stored pairs.
    Raw(std::slice::Iter<'a, Sample>),
}

impl Iterator for SampleIter<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SampleIter::DoubleDelta(it) => it.next(),
            SampleIter::Raw(it) => it.next().copied().map(Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<Sample> {
        vec![Sample::new(5, 0.5), Sample::new(50, 5.0), Sample::new(150, 15.0)]
    }

    #[test]
    fn test_encoding_tags() {
        assert_eq!(Encoding::from_u8(0).unwrap(), Encoding::Delta);
        assert_eq!(Encoding::from_u8(1).unwrap(), Encoding::DoubleDelta);
        assert_eq!(Encoding::from_u8(2).unwrap(), Encoding::Raw);
        assert!(matches!(Encoding::from_u8(9), Err(ChunkError::UnknownEncoding(9))));
        assert_eq!(Encoding::default(), Encoding::DoubleDelta);
    }

    #[test]
    fn test_normalize_reserved_tag() {
        assert_eq!(Encoding::Delta.normalize(), Encoding::DoubleDelta);
        assert_eq!(Encoding::Raw.normalize(), Encoding::Raw);
    }

    #[test]
    fn test_reserved_tag_has_no_codec() {
        assert!(matches!(
            ChunkData::new_for_encoding(Encoding::Delta),
            Err(ChunkError::UnknownEncoding(0))
        ));
    }

    #[test]
    fn test_range_values_closed_interval() {
        for encoding in [Encoding::DoubleDelta, Encoding::Raw] {
            let data = ChunkData::from_samples(encoding, &series()).unwrap();
            assert_eq!(data.encoding(), encoding);

            let got = data.range_values(10, 100).unwrap();
            assert_eq!(got, vec![Sample::new(50, 5.0)]);

            let got = data.range_values(5, 150).unwrap();
            assert_eq!(got.len(), 3);
        }
    }

    #[test]
    fn test_unmarshal_into_fresh_codec() {
        let data = ChunkData::from_samples(Encoding::Raw, &series()).unwrap();
        let mut buf = Vec::new();
        data.marshal(&mut buf).unwrap();

        let mut fresh = ChunkData::new_for_encoding(Encoding::Raw).unwrap();
        assert!(fresh.is_empty());
        fresh.unmarshal_from_buf(&buf).unwrap();
        assert_eq!(fresh, data);
    }
}
