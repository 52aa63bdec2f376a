/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::PartitionerKind;
use crate::exec::{ConsistencyError, Emit, Job, JobStats, Mapper, Reducer};
use crate::record::{NodeId, NodeRecord};
use crate::utils::Counters;
use anyhow::Result;
use dsi_progress_logger::ConcurrentProgressLog;
use std::path::Path;

struct Identity;

impl Mapper for Identity {
    fn map<E: Emit>(&mut self, record: NodeRecord, out: &mut E) -> Result<()> {
        out.emit(record)
    }
}

struct Unique;

impl Reducer for Unique {
    fn reduce<E: Emit>(&mut self, key: NodeId, values: Vec<NodeRecord>, out: &mut E) -> Result<()> {
        let mut values = values.into_iter();
        if let Some(record) = values.next() {
            if values.next().is_some() {
                return Err(ConsistencyError::DuplicateStructure { node: key }.into());
            }
            out.emit(record)?;
        }
        Ok(())
    }
}

/// Lays out the records of `input` in `output` using the given partitioner.
///
/// The output contains one key-sorted part file per partition, which is the
/// layout the Schimmy strategy expects of its starting generation. A node id
/// occurring more than once is an error.
pub fn partition_graph(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    kind: PartitionerKind,
    num_nodes: usize,
    num_partitions: usize,
    pl: &mut impl ConcurrentProgressLog,
) -> Result<JobStats> {
    let partitioner = kind.build(num_nodes, num_partitions)?;
    let counters = Counters::new();
    log::info!(
        "Partitioning {} into {} {} partitions",
        input.as_ref().display(),
        num_partitions,
        kind
    );
    Job::new("partition", input, output, &counters).run_map_reduce(
        &*partitioner,
        |_| Ok(Identity),
        |_| Ok(Unique),
        pl,
    )
}
