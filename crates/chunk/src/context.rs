//! Reusable decode scratch state.
//!
//! A [`DecodeContext`] owns one snappy stream decompressor. Each decode
//! re-points it at a new input instead of allocating fresh buffers, so a
//! batch of chunks costs one decompressor. Contexts are not `Sync`-shared:
//! use one per worker, or borrow one from a [`DecodeContextPool`].

use crate::error::Result;
use bytes::Bytes;
use snap::read::FrameDecoder;
use std::io::{self, Cursor};
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use tracing::debug;

/// Default number of idle contexts a pool retains.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

type MetadataReader = FrameDecoder<Cursor<Bytes>>;

/// Scratch state for decoding chunks.
#[derive(Default)]
pub struct DecodeContext {
    /// Created on first use.
    reader: Option<MetadataReader>,
}

impl DecodeContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the decompressor at `source` and returns it.
    ///
    /// Bytes left buffered by a previous decode are discarded first.
    pub(crate) fn reset(&mut self, source: Bytes) -> Result<&mut MetadataReader> {
        let reader = self
            .reader
            .get_or_insert_with(|| FrameDecoder::new(Cursor::new(Bytes::new())));

        *reader.get_mut() = Cursor::new(Bytes::new());
        io::copy(&mut *reader, &mut io::sink())?;
        *reader.get_mut() = Cursor::new(source);

        Ok(reader)
    }

    /// Compressed bytes consumed from the current source.
    pub(crate) fn consumed(&self) -> u64 {
        self.reader
            .as_ref()
            .map_or(0, |reader| reader.get_ref().position())
    }
}

impl std::fmt::Debug for DecodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("initialized", &self.reader.is_some())
            .field("consumed", &self.consumed())
            .finish()
    }
}

/// A shared pool of decode contexts.
#[derive(Debug)]
pub struct DecodeContextPool {
    idle: Mutex<Vec<DecodeContext>>,
    max_idle: usize,
}

impl DecodeContextPool {
    /// Creates a pool retaining up to [`DEFAULT_POOL_CAPACITY`] idle contexts.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Creates a pool retaining up to `max_idle` idle contexts.
    pub fn with_capacity(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Borrows a context exclusively until the guard is dropped.
    pub fn acquire(&self) -> PooledDecodeContext<'_> {
        let ctx = self
            .idle
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .pop()
            .unwrap_or_default();
        PooledDecodeContext { pool: self, ctx }
    }

    /// Number of contexts currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(|err| err.into_inner()).len()
    }

    fn release(&self, ctx: DecodeContext) {
        let mut idle = self.idle.lock().unwrap_or_else(|err| err.into_inner());
        if idle.len() < self.max_idle {
            idle.push(ctx);
        } else {
            debug!("Decode context pool full ({} idle), dropping context", idle.len());
        }
    }
}

impl Default for DecodeContextPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A context borrowed from a [`DecodeContextPool`], returned on drop.
pub struct PooledDecodeContext<'a> {
    pool: &'a DecodeContextPool,
    ctx: DecodeContext,
}

impl Deref for PooledDecodeContext<'_> {
    type Target = DecodeContext;

    fn deref(&self) -> &DecodeContext {
        &self.ctx
    }
}

impl DerefMut for PooledDecodeContext<'_> {
    fn deref_mut(&mut self) -> &mut DecodeContext {
        &mut self.ctx
    }
}

impl Drop for PooledDecodeContext<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.ctx));
    }
}
