/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External sorting of the records emitted by map tasks.
#![allow(clippy::non_canonical_partial_ord_impl)]

use super::{Combiner, ConsistencyError, Emit};
use crate::partition::Partitioner;
use crate::record::{NodeId, NodeRecord};
use crate::store::RecordWriter;
use anyhow::{ensure, Context, Result};
use dary_heap::PeekMut;
use itertools::Itertools;
use log::debug;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// The map side of the shuffle.
///
/// Records are bucketed by partition. When the buffer of a partition reaches
/// the batch size it is sorted by key (stably, so the values of a key keep
/// their emission order), optionally combined, and spilled to a run file.
pub struct ShuffleWriter<'a> {
    tmp_dir: &'a Path,
    task: usize,
    partitioner: &'a dyn Partitioner,
    combiner: Option<&'a dyn Combiner>,
    batch_size: usize,
    buffers: Vec<Vec<NodeRecord>>,
    runs: Vec<Vec<PathBuf>>,
}

impl<'a> ShuffleWriter<'a> {
    pub fn new(
        tmp_dir: &'a Path,
        task: usize,
        partitioner: &'a dyn Partitioner,
        combiner: Option<&'a dyn Combiner>,
        batch_size: usize,
    ) -> Self {
        let num_partitions = partitioner.num_partitions();
        Self {
            tmp_dir,
            task,
            partitioner,
            combiner,
            batch_size: batch_size.max(1),
            buffers: (0..num_partitions).map(|_| Vec::new()).collect(),
            runs: (0..num_partitions).map(|_| Vec::new()).collect(),
        }
    }

    fn spill(&mut self, partition: usize) -> Result<()> {
        let mut batch = std::mem::take(&mut self.buffers[partition]);
        if batch.is_empty() {
            return Ok(());
        }
        let start = std::time::Instant::now();
        batch.par_sort_by_key(NodeRecord::id);

        let batch = match self.combiner {
            None => batch,
            Some(combiner) => {
                let len = batch.len();
                let mut combined = Vec::with_capacity(len);
                let groups = batch.into_iter().chunk_by(NodeRecord::id);
                for (key, values) in &groups {
                    combiner.combine(key, values.collect(), &mut combined)?;
                }
                debug!("Combined {} records into {}", len, combined.len());
                combined
            }
        };

        let path = self.tmp_dir.join(format!(
            "run_{}_{}_{}",
            self.task,
            partition,
            self.runs[partition].len()
        ));
        ensure!(
            !path.exists(),
            "Can't create temporary file {}, it already exists",
            path.display()
        );
        let mut writer = RecordWriter::create(&path)?;
        for record in &batch {
            writer.write(record)?;
        }
        writer
            .finish()
            .with_context(|| format!("Could not write sorted run to {}", path.display()))?;
        debug!(
            "Spilled {} records of partition {} in {:?}",
            batch.len(),
            partition,
            start.elapsed()
        );
        self.runs[partition].push(path);
        Ok(())
    }

    /// Spills all remaining buffers and returns, for each partition, the list
    /// of its sorted runs.
    pub fn finish(mut self) -> Result<Vec<Vec<PathBuf>>> {
        for partition in 0..self.buffers.len() {
            self.spill(partition)?;
        }
        Ok(self.runs)
    }
}

impl Emit for ShuffleWriter<'_> {
    fn emit(&mut self, record: NodeRecord) -> Result<()> {
        let partition = self.partitioner.partition(record.id());
        ensure!(
            partition < self.buffers.len(),
            "Partition {partition} of node {} out of range",
            record.id()
        );
        let buffer = &mut self.buffers[partition];
        buffer.push(record);
        if buffer.len() >= self.batch_size {
            self.spill(partition)?;
        }
        Ok(())
    }
}

/// Private struct ordering sorted runs by their current head.
///
/// The order is reversed, so that the max-heap of [`KMergeRuns`] returns the
/// smallest key; ties are broken by run index, so the values of a key are
/// returned in run order.
struct HeadTail<I> {
    head: NodeRecord,
    run: usize,
    tail: I,
}

impl<I> HeadTail<I> {
    #[inline(always)]
    fn key(&self) -> (NodeId, usize) {
        (self.head.id(), self.run)
    }
}

impl<I> PartialEq for HeadTail<I> {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<I> Eq for HeadTail<I> {}

impl<I> PartialOrd for HeadTail<I> {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(other.key().cmp(&self.key()))
    }
}

impl<I> Ord for HeadTail<I> {
    #[inline(always)]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.key().cmp(&self.key())
    }
}

/// Merges sorted runs of records using a
/// [quaternary heap](dary_heap::QuaternaryHeap).
///
/// The runs must be sorted by node id; the merge returns all their records
/// sorted by node id.
pub struct KMergeRuns<I: Iterator<Item = Result<NodeRecord>>> {
    heap: dary_heap::QuaternaryHeap<HeadTail<I>>,
    pending_error: Option<anyhow::Error>,
}

impl<I: Iterator<Item = Result<NodeRecord>>> KMergeRuns<I> {
    pub fn new(runs: impl IntoIterator<Item = I>) -> Self {
        let runs = runs.into_iter();
        let mut heap = dary_heap::QuaternaryHeap::with_capacity(runs.size_hint().0);
        let mut pending_error = None;
        for (run, mut tail) in runs.enumerate() {
            match tail.next() {
                None => {}
                Some(Ok(head)) => heap.push(HeadTail { head, run, tail }),
                Some(Err(e)) => {
                    pending_error.get_or_insert(e);
                }
            }
        }
        Self {
            heap,
            pending_error,
        }
    }
}

impl<I: Iterator<Item = Result<NodeRecord>>> Iterator for KMergeRuns<I> {
    type Item = Result<NodeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        let mut head_tail = self.heap.peek_mut()?;

        match head_tail.tail.next() {
            None => Some(Ok(PeekMut::pop(head_tail).head)),
            Some(Ok(record)) => Some(Ok(std::mem::replace(&mut head_tail.head, record))),
            Some(Err(e)) => {
                // the run is unusable from here on
                PeekMut::pop(head_tail);
                Some(Err(e))
            }
        }
    }
}

/// Groups a key-sorted stream of records by node id.
///
/// Returns an error if the keys of the stream are not sorted.
pub struct KeyGroups<I: Iterator<Item = Result<NodeRecord>>> {
    records: I,
    pending: Option<NodeRecord>,
    last_key: Option<NodeId>,
}

impl<I: Iterator<Item = Result<NodeRecord>>> KeyGroups<I> {
    pub fn new(records: I) -> Self {
        Self {
            records,
            pending: None,
            last_key: None,
        }
    }
}

impl<I: Iterator<Item = Result<NodeRecord>>> Iterator for KeyGroups<I> {
    type Item = Result<(NodeId, Vec<NodeRecord>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.pending.take() {
            Some(record) => record,
            None => match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            },
        };
        let key = first.id();
        if let Some(previous) = self.last_key {
            if key <= previous {
                return Some(Err(ConsistencyError::UnsortedKeys {
                    previous,
                    next: key,
                }
                .into()));
            }
        }
        self.last_key = Some(key);

        let mut values = vec![first];
        loop {
            match self.records.next() {
                None => break,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(record)) if record.id() == key => values.push(record),
                Some(Ok(record)) => {
                    self.pending = Some(record);
                    break;
                }
            }
        }
        Some(Ok((key, values)))
    }
}
