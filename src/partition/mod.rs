/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Node-id → partition-index functions.
//!
//! The same [`Partitioner`] decides both where a shuffle sends the messages
//! addressed to a node and which part file holds the node's structure. The
//! Schimmy merge-join relies on the two agreeing: a generation laid out by one
//! partitioner must be propagated with exactly the same partitioner and
//! number of partitions, or nodes are silently dropped.

use crate::record::NodeId;
use anyhow::{ensure, Result};

mod graph;
pub use graph::*;

mod mapping;
pub use mapping::*;

/// A deterministic assignment of node ids to partitions.
pub trait Partitioner: Send + Sync {
    /// Returns the partition of `node`, which is always smaller than
    /// [`num_partitions`](Partitioner::num_partitions).
    fn partition(&self, node: NodeId) -> usize;

    fn num_partitions(&self) -> usize;
}

/// Returns ⌊`node` / `num_nodes` · `num_partitions`⌋ mod `num_partitions`.
///
/// For `node` < `num_nodes` the modulo has no effect; it maps ids beyond the
/// declared number of nodes back into range. The computation is performed in
/// double precision.
///
/// # Panics
///
/// Panics if `num_nodes` or `num_partitions` is zero.
#[inline]
pub fn range_partition(node: NodeId, num_nodes: usize, num_partitions: usize) -> usize {
    assert!(num_nodes > 0, "The number of nodes must be positive");
    assert!(num_partitions > 0, "The number of partitions must be positive");
    let p = (node as f64 / num_nodes as f64 * num_partitions as f64).floor();
    p as usize % num_partitions
}

/// Assigns contiguous ranges of node ids to partitions.
///
/// Partition indices are monotone in the node id, so concatenating the part
/// files of a generation in partition order yields the nodes sorted by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePartitioner {
    num_nodes: usize,
    num_partitions: usize,
}

impl RangePartitioner {
    pub fn new(num_nodes: usize, num_partitions: usize) -> Result<Self> {
        ensure!(num_nodes > 0, "The number of nodes must be positive");
        ensure!(
            num_partitions > 0,
            "The number of partitions must be positive"
        );
        Ok(Self {
            num_nodes,
            num_partitions,
        })
    }
}

impl Partitioner for RangePartitioner {
    #[inline]
    fn partition(&self, node: NodeId) -> usize {
        range_partition(node, self.num_nodes, self.num_partitions)
    }

    fn num_partitions(&self) -> usize {
        self.num_partitions
    }
}

/// Assigns node ids to partitions by residue class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPartitioner {
    num_partitions: usize,
}

impl HashPartitioner {
    pub fn new(num_partitions: usize) -> Result<Self> {
        ensure!(
            num_partitions > 0,
            "The number of partitions must be positive"
        );
        Ok(Self { num_partitions })
    }
}

impl Partitioner for HashPartitioner {
    #[inline]
    fn partition(&self, node: NodeId) -> usize {
        (node & 0x7fff_ffff) as usize % self.num_partitions
    }

    fn num_partitions(&self) -> usize {
        self.num_partitions
    }
}

/// The partitioners available to the shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum PartitionerKind {
    /// [`HashPartitioner`].
    #[default]
    Hash,
    /// [`RangePartitioner`].
    Range,
}

impl PartitionerKind {
    /// Builds the partitioner of this kind.
    pub fn build(self, num_nodes: usize, num_partitions: usize) -> Result<Box<dyn Partitioner>> {
        Ok(match self {
            PartitionerKind::Hash => Box::new(HashPartitioner::new(num_partitions)?),
            PartitionerKind::Range => Box::new(RangePartitioner::new(num_nodes, num_partitions)?),
        })
    }
}

impl std::fmt::Display for PartitionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionerKind::Hash => f.write_str("hash"),
            PartitionerKind::Range => f.write_str("range"),
        }
    }
}
