//! Merging decoded chunks into per-series sample streams.

use crate::chunk::{Chunk, Fingerprint, LabelSet, Sample, Timestamp};
use crate::error::Result;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

/// Merged samples of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStream {
    /// Series labels.
    pub labels: LabelSet,
    /// Samples in strictly ascending timestamp order.
    pub values: Vec<Sample>,
}

/// Query result: one stream per series.
pub type Matrix = HashMap<Fingerprint, SampleStream>;

/// K-way merges time-ordered sample sets into one duplicate-free sequence.
///
/// When several sets hold the same timestamp, the sample from the set that
/// comes first in `sets` is kept.
pub fn merge_sample_sets(sets: Vec<Vec<Sample>>) -> Vec<Sample> {
    merge_counting(sets).0
}

/// Returns the merged samples and the number of duplicates dropped.
fn merge_counting(sets: Vec<Vec<Sample>>) -> (Vec<Sample>, usize) {
    let total: usize = sets.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut duplicates = 0;

    let mut iters: Vec<_> = sets.into_iter().map(Vec::into_iter).collect();
    // (timestamp, set index) orders ties by input position.
    let mut heap: BinaryHeap<Reverse<(Timestamp, usize)>> = BinaryHeap::with_capacity(iters.len());
    let mut heads: Vec<Option<Sample>> = Vec::with_capacity(iters.len());

    for (idx, iter) in iters.iter_mut().enumerate() {
        let head = iter.next();
        if let Some(sample) = head {
            heap.push(Reverse((sample.timestamp, idx)));
        }
        heads.push(head);
    }

    while let Some(Reverse((_, idx))) = heap.pop() {
        let Some(sample) = heads[idx].take() else {
            continue;
        };

        if merged
            .last()
            .is_some_and(|last: &Sample| last.timestamp >= sample.timestamp)
        {
            duplicates += 1;
        } else {
            merged.push(sample);
        }

        if let Some(next) = iters[idx].next() {
            heap.push(Reverse((next.timestamp, idx)));
            heads[idx] = Some(next);
        }
    }

    (merged, duplicates)
}

/// Extracts `[from, through]` from every chunk and merges them per series.
///
/// A series' labels come from the first of its chunks that has any.
///
/// # Errors
///
/// Fails as a whole if any chunk is key-only or its payload is corrupt.
pub fn chunks_to_matrix(chunks: &[Chunk], from: Timestamp, through: Timestamp) -> Result<Matrix> {
    let mut grouped: HashMap<Fingerprint, (LabelSet, Vec<Vec<Sample>>)> = HashMap::new();

    for chunk in chunks {
        let samples = chunk.samples(from, through)?;
        let (labels, sets) = grouped
            .entry(chunk.fingerprint())
            .or_insert_with(|| (LabelSet::new(), Vec::new()));
        if labels.is_empty() {
            if let Some(chunk_labels) = chunk.labels() {
                labels.clone_from(chunk_labels);
            }
        }
        sets.push(samples);
    }

    let series = grouped.len();
    let mut duplicates = 0;
    let matrix: Matrix = grouped
        .into_iter()
        .map(|(fingerprint, (labels, sets))| {
            let (values, dropped) = merge_counting(sets);
            duplicates += dropped;
            (fingerprint, SampleStream { labels, values })
        })
        .collect();

    debug!(
        "Merged {} chunks into {} series ({} duplicate samples dropped)",
        chunks.len(),
        series,
        duplicates
    );

    Ok(matrix)
}
