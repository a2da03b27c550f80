//! CRC32 (Castagnoli) integrity checks over encoded chunk buffers.
//!
//! The checksum is never stored inside the buffer it covers. It travels in the
//! external key and is verified against the whole input on decode.

use crate::error::{ChunkError, Result};
use crc::{Crc, CRC_32_ISCSI};

/// CRC-32C, the polynomial with hardware support on x86 and ARM.
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Computes the Castagnoli CRC32 of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    CASTAGNOLI.checksum(data)
}

/// Verifies that `data` hashes to `expected`.
///
/// # Errors
///
/// Returns `ChunkError::InvalidChecksum` on mismatch.
pub fn verify(data: &[u8], expected: u32) -> Result<()> {
    let actual = checksum(data);
    if actual != expected {
        return Err(ChunkError::InvalidChecksum { expected, actual });
    }
    Ok(())
}
