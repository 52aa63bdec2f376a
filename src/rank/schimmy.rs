/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::exec::{ConsistencyError, Emit, Reducer, TaskContext};
use crate::record::{NodeId, NodeRecord};
use crate::store::RecordReader;
use crate::utils::{log_sum_exp, Counter};
use anyhow::{bail, Context, Result};

/// The result of [`MergeJoin::join`].
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The key was found in the structure stream; the record carries the
    /// joined mass and the structure of the node.
    Joined(NodeRecord),
    /// The key is not in the structure stream.
    Missing,
}

/// A sorted merge-join between a stream of keys carrying mass and a stream
/// of structure records.
///
/// Both streams must be sorted by node id, and [`join`](MergeJoin::join) must
/// be called with strictly increasing keys. Structure records whose node
/// receives no mass are emitted with log-rank −∞ as the cursor passes them,
/// and by [`finish`](MergeJoin::finish) for the records left at the end.
///
/// The rank of the structure records is ignored, so a previous generation of
/// [`Complete`](NodeRecord::Complete) records can be used as structure stream.
pub struct MergeJoin<I: Iterator<Item = Result<NodeRecord>>> {
    structure: I,
    pending: Option<NodeRecord>,
    exhausted: bool,
    last_id: Option<NodeId>,
}

impl<I: Iterator<Item = Result<NodeRecord>>> MergeJoin<I> {
    pub fn new(structure: I) -> Self {
        Self {
            structure,
            pending: None,
            exhausted: false,
            last_id: None,
        }
    }

    /// Returns the record under the cursor, reading a new one if the previous
    /// one was consumed.
    fn peek(&mut self) -> Result<Option<&NodeRecord>> {
        if self.pending.is_none() && !self.exhausted {
            match self.structure.next() {
                None => self.exhausted = true,
                Some(record) => {
                    let record = record.context("Could not read structure record")?;
                    if let Some(previous) = self.last_id {
                        if record.id() <= previous {
                            return Err(ConsistencyError::UnsortedKeys {
                                previous,
                                next: record.id(),
                            }
                            .into());
                        }
                    }
                    self.last_id = Some(record.id());
                    self.pending = Some(record);
                }
            }
        }
        Ok(self.pending.as_ref())
    }

    /// Joins `mass` with the structure of `key`.
    ///
    /// Structure records preceding `key` are emitted to `out` with log-rank
    /// −∞. If the cursor overtakes `key`, or the structure stream ends, the
    /// key is missing and the cursor is left where it is.
    pub fn join<E: Emit>(&mut self, key: NodeId, mass: f32, out: &mut E) -> Result<JoinOutcome> {
        loop {
            let Some(current) = self.peek()?.map(NodeRecord::id) else {
                return Ok(JoinOutcome::Missing);
            };
            if current > key {
                return Ok(JoinOutcome::Missing);
            }
            let Some(record) = self.pending.take() else {
                return Ok(JoinOutcome::Missing);
            };
            if current == key {
                return Ok(JoinOutcome::Joined(with_rank(record, mass)?));
            }
            out.emit(with_rank(record, f32::NEG_INFINITY)?)?;
        }
    }

    /// Emits all remaining structure records with log-rank −∞, returning
    /// their number.
    pub fn finish<E: Emit>(&mut self, out: &mut E) -> Result<u64> {
        let mut flushed = 0;
        while self.peek()?.is_some() {
            if let Some(record) = self.pending.take() {
                out.emit(with_rank(record, f32::NEG_INFINITY)?)?;
                flushed += 1;
            }
        }
        Ok(flushed)
    }
}

fn with_rank(record: NodeRecord, rank: f32) -> Result<NodeRecord> {
    match record {
        NodeRecord::Complete { id, adjacency, .. } | NodeRecord::Structure { id, adjacency } => {
            Ok(NodeRecord::Complete {
                id,
                rank,
                adjacency,
            })
        }
        NodeRecord::Mass { id, .. } => bail!("Mass record for node {id} in a structure stream"),
    }
}

/// The structure stream of a reduce task: the part file of its partition, or
/// nothing if no part file holds the partition.
pub type StructureStream = std::iter::Flatten<std::option::IntoIter<RecordReader>>;

/// The reducer of the Schimmy strategy.
///
/// The reducer of partition _p_ looks up in the
/// [partition mapping](crate::partition::PartitionMapping) stored in the
/// side channel the part file of the input generation holding _p_, and
/// merge-joins it with the incoming mass. Like
/// [`BasicReducer`](super::BasicReducer), it stores the log-space total of the
/// ranks it emits in the side channel when it finishes.
pub struct SchimmyReducer<'a> {
    ctx: TaskContext<'a>,
    join: MergeJoin<StructureStream>,
    total: f32,
}

impl<'a> SchimmyReducer<'a> {
    pub fn new(ctx: TaskContext<'a>) -> Result<Self> {
        let side_channel = ctx
            .side_channel
            .context("The Schimmy reducer needs a side channel")?;
        let mapping = side_channel
            .get_partition_mapping()?
            .context("No partition mapping in the side channel")?;
        let reader = match mapping.resolve(ctx.input, ctx.task) {
            Some(path) => {
                log::debug!("Partition {} joins with {}", ctx.task, path.display());
                Some(RecordReader::open(path)?)
            }
            None => {
                log::debug!(
                    "No structure file for partition {}: all its mass will be dropped",
                    ctx.task
                );
                None
            }
        };
        Ok(Self::with_structure(ctx, reader.into_iter().flatten()))
    }

    /// Creates a reducer joining with the given structure stream.
    pub fn with_structure(ctx: TaskContext<'a>, structure: StructureStream) -> Self {
        Self {
            ctx,
            join: MergeJoin::new(structure),
            total: f32::NEG_INFINITY,
        }
    }
}

impl Reducer for SchimmyReducer<'_> {
    fn reduce<E: Emit>(&mut self, key: NodeId, values: Vec<NodeRecord>, out: &mut E) -> Result<()> {
        let mut mass = f32::NEG_INFINITY;
        let received = values.len() as u64;
        for value in values {
            match value {
                NodeRecord::Mass { rank, .. } => mass = log_sum_exp(mass, rank),
                other => bail!(
                    "Unexpected {} record for node {} in the shuffle",
                    other.variant(),
                    key
                ),
            }
        }
        self.ctx
            .counters
            .incr(Counter::MassMessagesReceived, received);

        match self.join.join(key, mass, out)? {
            JoinOutcome::Joined(record) => {
                self.total = log_sum_exp(self.total, mass);
                out.emit(record)
            }
            JoinOutcome::Missing => {
                self.ctx.counters.incr(Counter::MissingStructure, 1);
                log::debug!("Dropping mass {} sent to nonexistent node {}", mass, key);
                Ok(())
            }
        }
    }

    fn finish<E: Emit>(&mut self, out: &mut E) -> Result<()> {
        let flushed = self.join.finish(out)?;
        log::debug!(
            "Partition {}: {} nodes received no mass at the end of the join",
            self.ctx.task,
            flushed
        );
        if let Some(side_channel) = self.ctx.side_channel {
            side_channel.put_mass(self.ctx.task, self.total)?;
        }
        Ok(())
    }
}
