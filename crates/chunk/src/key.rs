//! External key codec.
//!
//! Two key generations exist:
//!
//! ```text
//! legacy:  <fingerprint>:<from>:<through>                      (decimal)
//! current: <tenant>/<fingerprint>:<from>:<through>:<checksum>  (hex, from/through signed)
//! ```
//!
//! Legacy keys are always formatted with a `<tenant>/` prefix, and the parser
//! accepts legacy keys with or without it.

use crate::chunk::{check_range, Chunk, Timestamp};
use crate::error::{ChunkError, Result};
use std::num::ParseIntError;

/// Parses an external key into a key-only [`Chunk`] owned by `tenant_id`.
///
/// # Errors
///
/// Returns a malformed-key error (see [`ChunkError::is_malformed_key`]) for a
/// wrong field count, an unparseable field, or an inverted time range, and
/// `ChunkError::WrongMetadata` if a well-formed key names a different tenant.
pub fn parse_external_key(tenant_id: &str, key: &str) -> Result<Chunk> {
    if !key.contains('/') {
        return parse_legacy(tenant_id, key, key);
    }

    let mut parts = key.split('/');
    let (Some(key_tenant), Some(rest), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ChunkError::InvalidChunkId(key.to_string()));
    };

    let chunk = match rest.split(':').count() {
        3 => parse_legacy(tenant_id, rest, key)?,
        _ => parse_current(tenant_id, rest, key)?,
    };
    if key_tenant != tenant_id {
        return Err(ChunkError::WrongMetadata {
            expected: tenant_id.to_string(),
            found: key_tenant.to_string(),
        });
    }
    Ok(chunk)
}

fn parse_legacy(tenant_id: &str, fields: &str, key: &str) -> Result<Chunk> {
    let parts: Vec<&str> = fields.split(':').collect();
    let &[fingerprint, from, through] = parts.as_slice() else {
        return Err(ChunkError::InvalidChunkId(key.to_string()));
    };

    let fingerprint = field(key, fingerprint.parse::<u64>())?;
    let from = field(key, from.parse::<Timestamp>())?;
    let through = field(key, through.parse::<Timestamp>())?;
    valid_range(key, from, through)?;

    Ok(Chunk::key_only(tenant_id.to_string(), fingerprint, from, through, None))
}

fn parse_current(tenant_id: &str, fields: &str, key: &str) -> Result<Chunk> {
    let parts: Vec<&str> = fields.split(':').collect();
    let &[fingerprint, from, through, checksum] = parts.as_slice() else {
        return Err(ChunkError::InvalidChunkId(key.to_string()));
    };

    let fingerprint = field(key, u64::from_str_radix(fingerprint, 16))?;
    let from = field(key, Timestamp::from_str_radix(from, 16))?;
    let through = field(key, Timestamp::from_str_radix(through, 16))?;
    let checksum = field(key, u32::from_str_radix(checksum, 16))?;
    valid_range(key, from, through)?;

    Ok(Chunk::key_only(
        tenant_id.to_string(),
        fingerprint,
        from,
        through,
        Some(checksum),
    ))
}

fn field<T>(key: &str, parsed: std::result::Result<T, ParseIntError>) -> Result<T> {
    parsed.map_err(|source| ChunkError::InvalidKeyField {
        key: key.to_string(),
        source,
    })
}

fn valid_range(key: &str, from: Timestamp, through: Timestamp) -> Result<()> {
    check_range(from, through).map_err(|_| ChunkError::InvalidChunkId(key.to_string()))
}

/// Lowercase hex with a leading minus for negative values.
fn signed_hex(value: i64) -> String {
    if value < 0 {
        format!("-{:x}", value.unsigned_abs())
    } else {
        format!("{:x}", value)
    }
}

impl Chunk {
    /// Formats the external key for this chunk.
    ///
    /// Chunks with a known checksum use the current hex format; others use
    /// the tenant-prefixed legacy decimal format.
    pub fn external_key(&self) -> String {
        match self.checksum {
            Some(checksum) => format!(
                "{}/{:x}:{}:{}:{:x}",
                self.tenant_id,
                self.fingerprint,
                signed_hex(self.from),
                signed_hex(self.through),
                checksum
            ),
            None => format!(
                "{}/{}:{}:{}",
                self.tenant_id, self.fingerprint, self.from, self.through
            ),
        }
    }
}
