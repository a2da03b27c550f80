//! Batch decoding with a single decode context.

use crate::chunk::Chunk;
use crate::context::DecodeContext;
use crate::error::Result;
use bytes::Bytes;
use tracing::warn;

/// What a batch does when one chunk fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop and return the first error.
    #[default]
    Abort,
    /// Log the failing chunk and leave it out of the result.
    Skip,
}

/// Configuration for [`decode_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Per-chunk failure handling. Default: [`FailurePolicy::Abort`].
    pub failure_policy: FailurePolicy,
}

impl BatchConfig {
    /// Creates a new configuration with a custom failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Decodes each `(chunk, blob)` pair, reusing `ctx` across the batch.
///
/// Results keep the input order. Under [`FailurePolicy::Skip`] failed chunks
/// are dropped; under [`FailurePolicy::Abort`] the first failure is returned.
pub fn decode_batch(
    ctx: &mut DecodeContext,
    requests: Vec<(Chunk, Bytes)>,
    config: &BatchConfig,
) -> Result<Vec<Chunk>> {
    let mut decoded = Vec::with_capacity(requests.len());

    for (mut chunk, input) in requests {
        match chunk.decode(ctx, input) {
            Ok(()) => decoded.push(chunk),
            Err(e) => match config.failure_policy {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::Skip => {
                    warn!("Skipping chunk {}: {}", chunk.external_key(), e);
                }
            },
        }
    }

    Ok(decoded)
}
