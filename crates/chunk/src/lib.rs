//! Alopex Chunk - chunk addressing and serialization for the Alopex time series engine.
//!
//! A chunk is a time-bounded, compressed block of samples for one series. This
//! crate names chunks with external keys, frames them into self-describing
//! blobs for an object store, verifies them on read, and merges decoded chunks
//! into per-series sample streams.
//!
//! # Components
//!
//! - [`parse_external_key`] / [`Chunk::external_key`]: key codec for legacy and checksummed keys
//! - [`Chunk::encode`] / [`Chunk::decode`]: length-prefixed wire format with CRC32C verification
//! - [`DecodeContext`] / [`DecodeContextPool`]: reusable decompression state
//! - [`decode_batch`]: decoding many blobs with one context
//! - [`chunks_to_matrix`]: k-way merge of decoded chunks per series
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_chunk::{parse_external_key, chunks_to_matrix, DecodeContext};
//!
//! let mut ctx = DecodeContext::new();
//! let mut chunk = parse_external_key("tenant", &key)?;
//! chunk.decode(&mut ctx, blob_store.get(&chunk.external_key())?)?;
//!
//! let matrix = chunks_to_matrix(&[chunk], from, through)?;
//! ```

#![deny(missing_docs)]

pub mod batch;
pub mod checksum;
pub mod chunk;
pub mod context;
pub mod encoding;
pub mod error;
pub mod key;
pub mod merge;
mod wire;

pub use batch::{decode_batch, BatchConfig, FailurePolicy};
pub use chunk::{Chunk, Fingerprint, LabelSet, Sample, Timestamp};
pub use context::{DecodeContext, DecodeContextPool, PooledDecodeContext};
pub use encoding::{ChunkData, Encoding};
pub use error::{ChunkError, Result};
pub use key::parse_external_key;
pub use merge::{chunks_to_matrix, merge_sample_sets, Matrix, SampleStream};
