//! Double-delta sample codec (Gorilla compression).
//!
//! Timestamps and values are compressed into two independent bit streams.
//!
//! # Algorithm Overview
//!
//! ## Timestamp Encoding (Delta-of-Delta)
//!
//! - First value: 64 bits raw
//! - Subsequent values use variable-length encoding based on delta-of-delta:
//!   - `0`: `'0'` (1 bit)
//!   - `[-63, 64]`: `'10'` + 7 bits
//!   - `[-255, 256]`: `'110'` + 9 bits
//!   - `[-2047, 2048]`: `'1110'` + 12 bits
//!   - else: `'1111'` + 32 bits
//!
//! ## Value Encoding (XOR-based)
//!
//! - First value: 64 bits raw (IEEE 754)
//! - Subsequent values:
//!   - XOR = 0: `'0'` (1 bit)
//!   - Same window: `'10'` + meaningful bits
//!   - New window: `'11'` + 5 bits leading + 6 bits length + meaningful bits
//!
//! ## Payload Layout
//!
//! ```text
//! Offset  Size    Field
//! ------  ----    -----
//! 0x00    4       count (u32 LE)
//! 0x04    4       ts_len (u32 LE)
//! 0x08    N       timestamp bits, padded to ts_len bytes
//! 0x08+N  M       value bits, padded to a whole byte
//! ```

use crate::chunk::{Sample, Timestamp};
use crate::error::{ChunkError, Result};
use bitvec::prelude::*;
use std::io::Write;

type Bits = BitVec<u8, Msb0>;

/// Size of the count + timestamp-length header.
const PAYLOAD_HEADER_SIZE: usize = 8;

/// Largest leading-zero count representable in the 5-bit field.
const MAX_LEADING_ZEROS: u32 = 31;

/// Gorilla-compressed samples for one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GorillaChunk {
    timestamps: Bits,
    values: Bits,
    count: u32,
}

impl GorillaChunk {
    /// Creates an empty chunk, ready for [`GorillaChunk::unmarshal_from_buf`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Compresses a sequence of samples into a chunk.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::Compression` if timestamps are not strictly
    /// increasing or a delta-of-delta does not fit in 32 bits.
    pub fn compress(samples: &[Sample]) -> Result<Self> {
        let count = u32::try_from(samples.len())
            .map_err(|_| ChunkError::Compression(format!("too many samples: {}", samples.len())))?;

        let mut ts_output = Bits::new();
        let mut val_output = Bits::new();
        let mut ts_encoder = TimestampEncoder::new();
        let mut val_encoder = ValueEncoder::new();

        for sample in samples {
            ts_encoder.encode(sample.timestamp, &mut ts_output)?;
            val_encoder.encode(sample.value, &mut val_output);
        }
        pad_to_byte(&mut ts_output);
        pad_to_byte(&mut val_output);

        Ok(Self {
            timestamps: ts_output,
            values: val_output,
            count,
        })
    }

    /// Number of samples in the chunk.
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Returns true if the chunk holds no samples.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Writes the payload layout described in the module docs.
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        let ts_bytes = self.timestamps.as_raw_slice();
        let ts_len = u32::try_from(ts_bytes.len())
            .map_err(|_| ChunkError::Compression("timestamp stream too large".to_string()))?;

        writer.write_all(&self.count.to_le_bytes())?;
        writer.write_all(&ts_len.to_le_bytes())?;
        writer.write_all(ts_bytes)?;
        writer.write_all(self.values.as_raw_slice())?;
        Ok(())
    }

    /// Replaces the chunk contents with a payload produced by [`GorillaChunk::marshal`].
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::Decompression` if the header is truncated or the
    /// timestamp section runs past the end of `buf`.
    pub fn unmarshal_from_buf(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() < PAYLOAD_HEADER_SIZE {
            return Err(ChunkError::Decompression(format!(
                "double-delta payload too short: {} bytes",
                buf.len()
            )));
        }
        let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let ts_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

        let body = &buf[PAYLOAD_HEADER_SIZE..];
        if ts_len > body.len() {
            return Err(ChunkError::Decompression(format!(
                "timestamp section of {} bytes exceeds payload of {} bytes",
                ts_len,
                body.len()
            )));
        }

        self.count = count;
        self.timestamps = Bits::from_vec(body[..ts_len].to_vec());
        self.values = Bits::from_vec(body[ts_len..].to_vec());
        Ok(())
    }

    /// Returns a lazy iterator over the decompressed samples.
    pub fn iter(&self) -> GorillaIter<'_> {
        GorillaIter {
            timestamps: TimestampDecoder::new(&self.timestamps),
            values: ValueDecoder::new(&self.values),
            remaining: self.count,
        }
    }
}

/// Iterator over the samples of a [`GorillaChunk`].
pub struct GorillaIter<'a> {
    timestamps: TimestampDecoder<'a>,
    values: ValueDecoder<'a>,
    remaining: u32,
}

impl Iterator for GorillaIter<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match (self.timestamps.decode_next(), self.values.decode_next()) {
            (Some(timestamp), Some(value)) => Some(Ok(Sample::new(timestamp, value))),
            _ => {
                // Stop after the first failure.
                self.remaining = 0;
                Some(Err(ChunkError::Decompression(
                    "truncated double-delta bit stream".to_string(),
                )))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

/// Bounds-checked MSB-first reader over a bit stream.
struct BitCursor<'a> {
    data: &'a BitSlice<u8, Msb0>,
    pos: usize,
}

impl<'a> BitCursor<'a> {
    fn new(data: &'a BitSlice<u8, Msb0>) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Option<bool> {
        let bit = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(bit)
    }

    fn read_bits(&mut self, n: u32) -> Option<u64> {
        if self.pos + n as usize > self.data.len() {
            return None;
        }
        let mut value: u64 = 0;
        for _ in 0..n {
            value = (value << 1) | u64::from(self.data[self.pos]);
            self.pos += 1;
        }
        Some(value)
    }
}

/// Zero-fills to a byte boundary so compressed and unmarshaled chunks agree.
fn pad_to_byte(bits: &mut Bits) {
    let padded = bits.len().div_ceil(8) * 8;
    bits.resize(padded, false);
}

fn push_bits(output: &mut Bits, value: u64, n: u32) {
    for i in (0..n).rev() {
        output.push((value >> i) & 1 == 1);
    }
}

/// Encoder for timestamps using delta-of-delta encoding.
pub struct TimestampEncoder {
    first_ts: Option<Timestamp>,
    prev_ts: Timestamp,
    prev_delta: i64,
}

impl TimestampEncoder {
    /// Creates a new timestamp encoder.
    pub fn new() -> Self {
        Self {
            first_ts: None,
            prev_ts: 0,
            prev_delta: 0,
        }
    }

    /// Encodes a timestamp into the output bit vector.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::Compression` if `timestamp` does not advance past
    /// the previous one or the delta-of-delta overflows 32 bits.
    pub fn encode(&mut self, timestamp: Timestamp, output: &mut Bits) -> Result<()> {
        if self.first_ts.is_none() {
            self.first_ts = Some(timestamp);
            self.prev_ts = timestamp;
            self.prev_delta = 0;
            push_bits(output, timestamp as u64, 64);
            return Ok(());
        }

        if timestamp <= self.prev_ts {
            return Err(ChunkError::Compression(format!(
                "timestamps must be strictly increasing: {} after {}",
                timestamp, self.prev_ts
            )));
        }

        let delta = timestamp
            .checked_sub(self.prev_ts)
            .ok_or_else(|| ChunkError::Compression("timestamp delta overflow".to_string()))?;
        let delta_of_delta = delta
            .checked_sub(self.prev_delta)
            .ok_or_else(|| ChunkError::Compression("delta-of-delta overflow".to_string()))?;

        if delta_of_delta == 0 {
            output.push(false);
        } else if (-63..=64).contains(&delta_of_delta) {
            push_bits(output, 0b10, 2);
            push_bits(output, (delta_of_delta + 63) as u64, 7);
        } else if (-255..=256).contains(&delta_of_delta) {
            push_bits(output, 0b110, 3);
            push_bits(output, (delta_of_delta + 255) as u64, 9);
        } else if (-2047..=2048).contains(&delta_of_delta) {
            push_bits(output, 0b1110, 4);
            push_bits(output, (delta_of_delta + 2047) as u64, 12);
        } else {
            let encoded = i32::try_from(delta_of_delta).map_err(|_| {
                ChunkError::Compression(format!(
                    "delta-of-delta {} does not fit in 32 bits",
                    delta_of_delta
                ))
            })?;
            push_bits(output, 0b1111, 4);
            push_bits(output, u64::from(encoded as u32), 32);
        }

        self.prev_delta = delta;
        self.prev_ts = timestamp;
        Ok(())
    }
}

impl Default for TimestampEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder for delta-of-delta encoded timestamps.
pub struct TimestampDecoder<'a> {
    cursor: BitCursor<'a>,
    started: bool,
    prev_ts: Timestamp,
    prev_delta: i64,
}

impl<'a> TimestampDecoder<'a> {
    /// Creates a new timestamp decoder.
    pub fn new(data: &'a BitSlice<u8, Msb0>) -> Self {
        Self {
            cursor: BitCursor::new(data),
            started: false,
            prev_ts: 0,
            prev_delta: 0,
        }
    }

    /// Decodes the next timestamp, or `None` if the stream is exhausted or truncated.
    pub fn decode_next(&mut self) -> Option<Timestamp> {
        if !self.started {
            let ts = self.cursor.read_bits(64)? as i64;
            self.started = true;
            self.prev_ts = ts;
            self.prev_delta = 0;
            return Some(ts);
        }

        let delta_of_delta = if !self.cursor.read_bit()? {
            0
        } else if !self.cursor.read_bit()? {
            self.cursor.read_bits(7)? as i64 - 63
        } else if !self.cursor.read_bit()? {
            self.cursor.read_bits(9)? as i64 - 255
        } else if !self.cursor.read_bit()? {
            self.cursor.read_bits(12)? as i64 - 2047
        } else {
            i64::from(self.cursor.read_bits(32)? as u32 as i32)
        };

        let delta = self.prev_delta.wrapping_add(delta_of_delta);
        let ts = self.prev_ts.wrapping_add(delta);
        self.prev_delta = delta;
        self.prev_ts = ts;

        Some(ts)
    }
}

/// Encoder for float values using XOR compression.
pub struct ValueEncoder {
    prev_value: Option<u64>,
    /// Leading/trailing zero window of the last new-window block.
    window: Option<(u32, u32)>,
}

impl ValueEncoder {
    /// Creates a new value encoder.
    pub fn new() -> Self {
        Self {
            prev_value: None,
            window: None,
        }
    }

    /// Encodes a float value into the output bit vector.
    pub fn encode(&mut self, value: f64, output: &mut Bits) {
        let bits = value.to_bits();

        let Some(prev) = self.prev_value else {
            self.prev_value = Some(bits);
            push_bits(output, bits, 64);
            return;
        };

        let xor = bits ^ prev;
        if xor == 0 {
            output.push(false);
        } else {
            // Cap before deriving the meaningful length so the decoder,
            // which only sees the capped value, recovers the same trailing count.
            let leading = xor.leading_zeros().min(MAX_LEADING_ZEROS);
            let trailing = xor.trailing_zeros();

            match self.window {
                Some((prev_leading, prev_trailing))
                    if leading >= prev_leading && trailing >= prev_trailing =>
                {
                    output.push(true);
                    output.push(false);
                    let meaningful_bits = 64 - prev_leading - prev_trailing;
                    push_bits(output, xor >> prev_trailing, meaningful_bits);
                }
                _ => {
                    output.push(true);
                    output.push(true);
                    let meaningful_bits = 64 - leading - trailing;
                    push_bits(output, u64::from(leading), 5);
                    // 1-64 stored as 0-63
                    push_bits(output, u64::from(meaningful_bits - 1), 6);
                    push_bits(output, xor >> trailing, meaningful_bits);
                    self.window = Some((leading, trailing));
                }
            }
        }

        self.prev_value = Some(bits);
    }
}

impl Default for ValueEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder for XOR-encoded float values.
pub struct ValueDecoder<'a> {
    cursor: BitCursor<'a>,
    prev_value: Option<u64>,
    window: Option<(u32, u32)>,
}

impl<'a> ValueDecoder<'a> {
    /// Creates a new value decoder.
    pub fn new(data: &'a BitSlice<u8, Msb0>) -> Self {
        Self {
            cursor: BitCursor::new(data),
            prev_value: None,
            window: None,
        }
    }

    /// Decodes the next value, or `None` if the stream is exhausted or corrupt.
    pub fn decode_next(&mut self) -> Option<f64> {
        let Some(prev) = self.prev_value else {
            let bits = self.cursor.read_bits(64)?;
            self.prev_value = Some(bits);
            return Some(f64::from_bits(bits));
        };

        let xor = if !self.cursor.read_bit()? {
            0
        } else if !self.cursor.read_bit()? {
            // A same-window block before any window was opened is corrupt.
            let (leading, trailing) = self.window?;
            let meaningful_bits = 64 - leading - trailing;
            self.cursor.read_bits(meaningful_bits)? << trailing
        } else {
            let leading = self.cursor.read_bits(5)? as u32;
            let meaningful_bits = self.cursor.read_bits(6)? as u32 + 1;
            let trailing = 64u32.checked_sub(leading + meaningful_bits)?;
            self.window = Some((leading, trailing));
            self.cursor.read_bits(meaningful_bits)? << trailing
        };

        let bits = prev ^ xor;
        self.prev_value = Some(bits);
        Some(f64::from_bits(bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(points: &[(i64, f64)]) -> Vec<Sample> {
        points.iter().map(|&(ts, v)| Sample::new(ts, v)).collect()
    }

    fn decode_all(chunk: &GorillaChunk) -> Vec<Sample> {
        chunk.iter().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_chunk_roundtrip() {
        let input = samples(&[(1000, 1.0), (1010, 1.1), (1020, 1.2), (1030, 1.1), (1040, 1.0)]);

        let chunk = GorillaChunk::compress(&input).unwrap();
        assert_eq!(chunk.len(), 5);
        assert_eq!(decode_all(&chunk), input);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = GorillaChunk::compress(&[]).unwrap();
        assert!(chunk.is_empty());
        assert_eq!(chunk.iter().count(), 0);
    }

    #[test]
    fn test_timestamp_roundtrip_all_ranges() {
        // Deltas chosen to hit each delta-of-delta bucket.
        let timestamps = vec![1000_i64, 1010, 1025, 1135, 1400, 3400, 3401, 100_000_000, 100_001_000];

        let mut output = Bits::new();
        let mut encoder = TimestampEncoder::new();
        for &ts in &timestamps {
            encoder.encode(ts, &mut output).unwrap();
        }

        let mut decoder = TimestampDecoder::new(&output);
        for &expected in &timestamps {
            assert_eq!(decoder.decode_next(), Some(expected));
        }
    }

    #[test]
    fn test_timestamp_zero_delta_compresses() {
        let timestamps: Vec<i64> = (0..10).map(|i| 15_000 * i).collect();

        let mut output = Bits::new();
        let mut encoder = TimestampEncoder::new();
        for &ts in &timestamps {
            encoder.encode(ts, &mut output).unwrap();
        }

        // 64 raw + 36 bits for the first delta + 1 bit per regular step
        assert_eq!(output.len(), 64 + 36 + 8);
    }

    #[test]
    fn test_negative_timestamps() {
        let input = samples(&[(-1_000_000, 1.0), (-999_000, 2.0), (-998_000, 3.0), (0, 4.0), (1000, 5.0)]);
        let chunk = GorillaChunk::compress(&input).unwrap();
        assert_eq!(decode_all(&chunk), input);
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let input = samples(&[(1000, 1.0), (1000, 2.0)]);
        assert!(matches!(
            GorillaChunk::compress(&input),
            Err(ChunkError::Compression(_))
        ));

        let input = samples(&[(1000, 1.0), (900, 2.0)]);
        assert!(GorillaChunk::compress(&input).is_err());
    }

    #[test]
    fn test_rejects_oversized_delta_of_delta() {
        let input = samples(&[(0, 1.0), (1, 1.0), (i64::from(i32::MAX) * 4, 1.0)]);
        assert!(matches!(
            GorillaChunk::compress(&input),
            Err(ChunkError::Compression(_))
        ));
    }

    #[test]
    fn test_value_identical_compresses() {
        let values = vec![42.5_f64; 10];

        let mut output = Bits::new();
        let mut encoder = ValueEncoder::new();
        for &val in &values {
            encoder.encode(val, &mut output);
        }

        // 64 raw bits + 1 bit per repeat
        assert_eq!(output.len(), 73);

        let mut decoder = ValueDecoder::new(&output);
        for &expected in &values {
            assert_eq!(decoder.decode_next(), Some(expected));
        }
    }

    #[test]
    fn test_value_many_leading_zeros() {
        // XOR of these values has more than 31 leading zeros.
        let a = f64::from_bits(0x4000_0000_0000_0000);
        let b = f64::from_bits(0x4000_0000_0000_0001);
        let c = f64::from_bits(0x4000_0000_0000_0003);
        let values = vec![a, b, c, a];

        let mut output = Bits::new();
        let mut encoder = ValueEncoder::new();
        for &val in &values {
            encoder.encode(val, &mut output);
        }

        let mut decoder = ValueDecoder::new(&output);
        for &expected in &values {
            assert_eq!(decoder.decode_next().map(f64::to_bits), Some(expected.to_bits()));
        }
    }

    #[test]
    fn test_special_floats() {
        let values = [
            0.0_f64,
            -0.0,
            f64::MIN,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::EPSILON,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
        ];
        let input: Vec<Sample> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(i as i64 * 1000, v))
            .collect();

        let chunk = GorillaChunk::compress(&input).unwrap();
        let decoded = decode_all(&chunk);
        for (original, decoded) in input.iter().zip(decoded.iter()) {
            assert_eq!(original.timestamp, decoded.timestamp);
            assert_eq!(original.value.to_bits(), decoded.value.to_bits());
        }
    }

    #[test]
    fn test_marshal_unmarshal_is_byte_identical() {
        let input: Vec<Sample> = (0..500)
            .map(|i| Sample::new(1_600_000_000_000 + i * 15_000, 50.0 + (i as f64 * 0.1).sin()))
            .collect();
        let chunk = GorillaChunk::compress(&input).unwrap();

        let mut first = Vec::new();
        chunk.marshal(&mut first).unwrap();

        let mut restored = GorillaChunk::new();
        restored.unmarshal_from_buf(&first).unwrap();
        assert_eq!(restored, chunk);

        let mut second = Vec::new();
        restored.marshal(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(decode_all(&restored), input);
    }

    #[test]
    fn test_unmarshaled_chunk_equals_compressed() {
        // Three samples leave both streams short of a byte boundary.
        let input = samples(&[(1000, 1.0), (2000, 2.0), (3000, 3.0)]);
        let chunk = GorillaChunk::compress(&input).unwrap();
        assert_eq!(chunk.timestamps.len() % 8, 0);
        assert_eq!(chunk.values.len() % 8, 0);

        let mut buf = Vec::new();
        chunk.marshal(&mut buf).unwrap();
        let mut restored = GorillaChunk::new();
        restored.unmarshal_from_buf(&buf).unwrap();
        assert_eq!(restored, chunk);
    }

    #[test]
    fn test_unmarshal_rejects_short_header() {
        let mut chunk = GorillaChunk::new();
        assert!(matches!(
            chunk.unmarshal_from_buf(&[1, 0, 0]),
            Err(ChunkError::Decompression(_))
        ));
    }

    #[test]
    fn test_unmarshal_rejects_oversized_timestamp_section() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut chunk = GorillaChunk::new();
        assert!(chunk.unmarshal_from_buf(&buf).is_err());
    }

    #[test]
    fn test_truncated_stream_yields_error() {
        let input = samples(&[(1000, 1.0), (2000, 2.0), (3000, 3.0)]);
        let chunk = GorillaChunk::compress(&input).unwrap();

        let mut buf = Vec::new();
        chunk.marshal(&mut buf).unwrap();
        // Claim more samples than the streams hold.
        buf[0..4].copy_from_slice(&100u32.to_le_bytes());

        let mut corrupt = GorillaChunk::new();
        corrupt.unmarshal_from_buf(&buf).unwrap();
        let results: Vec<_> = corrupt.iter().collect();
        assert!(results.iter().take(3).all(|r| r.is_ok()));
        assert!(matches!(results.last(), Some(Err(ChunkError::Decompression(_)))));
        assert!(results.len() < 100);
    }
}
