/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bounded top-k selection.

use crate::exec::ConsistencyError;
use crate::record::NodeId;
use crate::store::{part_files, RecordReader};
use anyhow::{Context, Result};
use dsi_progress_logger::ConcurrentProgressLog;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Private struct ordering entries by how soon they should be evicted.
///
/// The max-heap of [`TopK`] holds at its top the entry with the lowest
/// score; among entries with the same score, the one that arrived last.
struct Entry<K> {
    score: f32,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.seq.cmp(&other.seq))
    }
}

/// A container keeping the `capacity` entries with the highest scores.
///
/// When an insertion makes the size exceed the capacity, the entry with the
/// lowest score is evicted; among entries with the same score, the one that
/// arrived first is kept.
///
/// ```
/// use schimmy_rank::top_k::TopK;
///
/// let mut top = TopK::new(3);
/// for (key, score) in [("a", 5.0), ("b", 4.0), ("c", 6.0), ("d", 1.0)] {
///     top.add(key, score);
/// }
/// assert_eq!(top.into_sorted_vec(), vec![("c", 6.0), ("a", 5.0), ("b", 4.0)]);
/// ```
pub struct TopK<K> {
    capacity: usize,
    heap: dary_heap::QuaternaryHeap<Entry<K>>,
    seq: u64,
}

impl<K> TopK<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: dary_heap::QuaternaryHeap::with_capacity(capacity.saturating_add(1).min(1 << 20)),
            seq: 0,
        }
    }

    pub fn add(&mut self, key: K, score: f32) {
        self.heap.push(Entry {
            score,
            seq: self.seq,
            key,
        });
        self.seq += 1;
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the entries by decreasing score; entries with the same score
    /// are returned in arrival order.
    pub fn into_sorted_vec(self) -> Vec<(K, f32)> {
        // the heap order is the eviction order, so ascending means best first
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| (entry.key, entry.score))
            .collect()
    }
}

/// Merges worker-local top-k lists into a global one.
///
/// A key appearing in more than one list is a
/// [`ConsistencyError::DuplicateTopKEntry`].
pub fn merge_top_k(capacity: usize, lists: Vec<Vec<(NodeId, f32)>>) -> Result<Vec<(NodeId, f32)>> {
    let mut seen = HashSet::new();
    let mut top = TopK::new(capacity);
    for list in lists {
        for (node, score) in list {
            if !seen.insert(node) {
                return Err(ConsistencyError::DuplicateTopKEntry { node }.into());
            }
            top.add(node, score);
        }
    }
    Ok(top.into_sorted_vec())
}

fn local_top_k<K>(
    capacity: usize,
    entries: impl IntoIterator<Item = Result<(K, f32)>>,
) -> Result<TopK<K>> {
    let mut top = TopK::new(capacity);
    for entry in entries {
        let (key, score) = entry?;
        top.add(key, score);
    }
    Ok(top)
}

/// Extracts the `n` nodes with the highest rank from a generation.
///
/// Each part file is scanned in parallel into a local top-`n` list, and the
/// local lists are then merged. The result is written to `output` as
/// `id<TAB>probability` lines by decreasing probability, and returned as
/// pairs of node ids and log-ranks.
pub fn extract_top_k(
    generation: impl AsRef<Path>,
    output: impl AsRef<Path>,
    n: usize,
    pl: &mut impl ConcurrentProgressLog,
) -> Result<Vec<(NodeId, f32)>> {
    let generation = generation.as_ref();
    let output = output.as_ref();
    let parts = part_files(generation)?;

    pl.item_name("node");
    pl.expected_updates(None);
    pl.start(format!("Extracting top {n} nodes..."));

    let lists = parts
        .par_iter()
        .map_with(pl.clone(), |pl, path| -> Result<Vec<(NodeId, f32)>> {
            let entries = RecordReader::open(path)?.filter_map(|record| {
                pl.light_update();
                match record {
                    Ok(record) => record.rank().map(|rank| Ok((record.id(), rank))),
                    Err(e) => Some(Err(e)),
                }
            });
            Ok(local_top_k(n, entries)?.into_sorted_vec())
        })
        .collect::<Result<Vec<_>>>()?;
    pl.done();

    let top = merge_top_k(n, lists)?;

    let file =
        File::create(output).with_context(|| format!("Could not create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    for &(node, rank) in &top {
        writeln!(out, "{}\t{}", node, rank.exp())?;
    }
    out.flush()
        .with_context(|| format!("Could not flush {}", output.display()))?;
    log::info!(
        "Wrote the top {} nodes of {} to {}",
        top.len(),
        generation.display(),
        output.display()
    );
    Ok(top)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties() {
        let mut top = TopK::new(2);
        top.add(1, 3.0);
        top.add(2, 3.0);
        top.add(3, 3.0);
        top.add(4, 1.0);
        assert_eq!(top.len(), 2);
        assert_eq!(top.into_sorted_vec(), vec![(1, 3.0), (2, 3.0)]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut top = TopK::new(0);
        top.add(1, 3.0);
        assert!(top.is_empty());
        assert!(top.into_sorted_vec().is_empty());
    }

    #[test]
    fn test_neg_infinity() {
        let mut top = TopK::new(2);
        top.add(1, f32::NEG_INFINITY);
        top.add(2, -5.0);
        top.add(3, f32::NEG_INFINITY);
        assert_eq!(
            top.into_sorted_vec(),
            vec![(2, -5.0), (1, f32::NEG_INFINITY)]
        );
    }

    #[test]
    fn test_merge() -> Result<()> {
        let merged = merge_top_k(
            3,
            vec![vec![(1, -1.0), (2, -3.0)], vec![(5, -2.0), (6, -4.0)], vec![]],
        )?;
        assert_eq!(merged, vec![(1, -1.0), (5, -2.0), (2, -3.0)]);

        let err = merge_top_k(3, vec![vec![(1, -1.0)], vec![(1, -1.0)]]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConsistencyError>(),
            Some(&ConsistencyError::DuplicateTopKEntry { node: 1 })
        );
        Ok(())
    }
}
