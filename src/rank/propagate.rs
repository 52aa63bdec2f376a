/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::exec::{Combiner, Emit, Mapper};
use crate::record::{NodeId, NodeRecord};
use crate::utils::{log_sum_exp, Counter, Counters};
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Worker-local partial sums of outgoing mass.
///
/// Owned by a single map task and drained once, in increasing order of node
/// id, when the task's input is exhausted.
#[derive(Debug, Default)]
pub struct MassAccumulator {
    masses: BTreeMap<NodeId, f32>,
}

impl MassAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `mass` to the partial sum of `node`; returns true if the node
    /// already had a partial sum.
    pub fn add(&mut self, node: NodeId, mass: f32) -> bool {
        match self.masses.get_mut(&node) {
            Some(sum) => {
                *sum = log_sum_exp(*sum, mass);
                true
            }
            None => {
                self.masses.insert(node, mass);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Emits one [`Mass`](NodeRecord::Mass) record per node and empties the
    /// accumulator, returning the number of records emitted.
    pub fn drain<E: Emit>(&mut self, out: &mut E) -> Result<u64> {
        let masses = std::mem::take(&mut self.masses);
        let count = masses.len() as u64;
        for (id, rank) in masses {
            out.emit(NodeRecord::Mass { id, rank })?;
        }
        Ok(count)
    }
}

/// The map function of the propagation phase.
///
/// A node with log-rank _r_ and _k_ > 0 successors sends _r_ − ln _k_ to each
/// successor (to each occurrence, if a successor is repeated). Nodes without
/// successors send nothing: their mass is recovered by the dangling-mass
/// correction. With structure re-emission on, the mapper also emits the
/// node's [`Structure`](NodeRecord::Structure) record.
pub struct MassMapper<'a> {
    counters: &'a Counters,
    emit_structure: bool,
    accumulator: Option<MassAccumulator>,
}

impl<'a> MassMapper<'a> {
    pub fn new(counters: &'a Counters, emit_structure: bool, in_mapper_combiner: bool) -> Self {
        Self {
            counters,
            emit_structure,
            accumulator: in_mapper_combiner.then(MassAccumulator::new),
        }
    }
}

impl Mapper for MassMapper<'_> {
    fn map<E: Emit>(&mut self, record: NodeRecord, out: &mut E) -> Result<()> {
        let (id, rank, adjacency) = match record {
            NodeRecord::Complete {
                id,
                rank,
                adjacency,
            } => (id, rank, adjacency),
            other => bail!(
                "Expected a complete record, found a {} record for node {}",
                other.variant(),
                other.id()
            ),
        };

        if !adjacency.is_empty() {
            let share = rank - (adjacency.len() as f32).ln();
            match &mut self.accumulator {
                Some(accumulator) => {
                    let mut saved = 0;
                    for &succ in &adjacency {
                        if accumulator.add(succ, share) {
                            saved += 1;
                        }
                    }
                    self.counters.incr(Counter::MassMessagesSaved, saved);
                }
                None => {
                    for &succ in &adjacency {
                        out.emit(NodeRecord::Mass {
                            id: succ,
                            rank: share,
                        })?;
                    }
                    self.counters
                        .incr(Counter::MassMessages, adjacency.len() as u64);
                }
            }
        }

        if self.emit_structure {
            out.emit(NodeRecord::Structure { id, adjacency })?;
        }
        Ok(())
    }

    fn finish<E: Emit>(&mut self, out: &mut E) -> Result<()> {
        if let Some(accumulator) = &mut self.accumulator {
            let emitted = accumulator.drain(out)?;
            self.counters.incr(Counter::MassMessages, emitted);
        }
        Ok(())
    }
}

/// Sums the [`Mass`](NodeRecord::Mass) values of a key into a single message
/// before the shuffle.
///
/// Other records are passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassCombiner;

impl Combiner for MassCombiner {
    fn combine(&self, key: NodeId, values: Vec<NodeRecord>, out: &mut Vec<NodeRecord>) -> Result<()> {
        let mut mass = None;
        for value in values {
            match value {
                NodeRecord::Mass { rank, .. } => {
                    mass = Some(mass.map_or(rank, |sum| log_sum_exp(sum, rank)));
                }
                other => out.push(other),
            }
        }
        if let Some(rank) = mass {
            out.push(NodeRecord::Mass { id: key, rank });
        }
        Ok(())
    }
}
