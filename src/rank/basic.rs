/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::exec::{ConsistencyError, Emit, Reducer, TaskContext};
use crate::record::{NodeId, NodeRecord};
use crate::utils::{log_sum_exp, Counter, Counters};
use anyhow::{bail, Result};

/// Aggregates the values shuffled to `key` by the basic strategy.
///
/// The [`Mass`](NodeRecord::Mass) values are summed and joined with the
/// unique [`Structure`](NodeRecord::Structure) value into a
/// [`Complete`](NodeRecord::Complete) record; a node that received no mass
/// gets log-rank −∞. If there is no structure the mass was sent to a
/// nonexistent node: it is dropped and
/// [`MissingStructure`](Counter::MissingStructure) is incremented. More than
/// one structure is a [`ConsistencyError::DuplicateStructure`].
pub fn aggregate(
    key: NodeId,
    values: Vec<NodeRecord>,
    counters: &Counters,
) -> Result<Option<NodeRecord>> {
    let mut mass = f32::NEG_INFINITY;
    let mut received = 0;
    let mut structure = None;
    for value in values {
        match value {
            NodeRecord::Mass { rank, .. } => {
                mass = log_sum_exp(mass, rank);
                received += 1;
            }
            NodeRecord::Structure { adjacency, .. } => {
                if structure.replace(adjacency).is_some() {
                    return Err(ConsistencyError::DuplicateStructure { node: key }.into());
                }
            }
            NodeRecord::Complete { .. } => {
                bail!("Unexpected complete record for node {key} in the shuffle")
            }
        }
    }
    counters.incr(Counter::MassMessagesReceived, received);

    match structure {
        Some(adjacency) => Ok(Some(NodeRecord::Complete {
            id: key,
            rank: mass,
            adjacency,
        })),
        None => {
            counters.incr(Counter::MissingStructure, 1);
            log::debug!("Dropping mass {} sent to nonexistent node {}", mass, key);
            Ok(None)
        }
    }
}

/// The reducer of the basic strategy.
///
/// Keeps the log-space total of the ranks it emits and stores it in the side
/// channel, under its task index, when it finishes.
pub struct BasicReducer<'a> {
    ctx: TaskContext<'a>,
    total: f32,
}

impl<'a> BasicReducer<'a> {
    pub fn new(ctx: TaskContext<'a>) -> Self {
        Self {
            ctx,
            total: f32::NEG_INFINITY,
        }
    }

    /// Returns the log-space total of the ranks emitted so far.
    pub fn total(&self) -> f32 {
        self.total
    }
}

impl Reducer for BasicReducer<'_> {
    fn reduce<E: Emit>(&mut self, key: NodeId, values: Vec<NodeRecord>, out: &mut E) -> Result<()> {
        if let Some(record) = aggregate(key, values, self.ctx.counters)? {
            if let Some(rank) = record.rank() {
                self.total = log_sum_exp(self.total, rank);
            }
            out.emit(record)?;
        }
        Ok(())
    }

    fn finish<E: Emit>(&mut self, _out: &mut E) -> Result<()> {
        if let Some(side_channel) = self.ctx.side_channel {
            side_channel.put_mass(self.ctx.task, self.total)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::SideChannel;

    fn mass(id: NodeId, p: f32) -> NodeRecord {
        NodeRecord::Mass { id, rank: p.ln() }
    }

    #[test]
    fn test_aggregate() -> Result<()> {
        let counters = Counters::new();
        let record = aggregate(
            5,
            vec![
                mass(5, 0.1),
                NodeRecord::Structure {
                    id: 5,
                    adjacency: vec![1, 2],
                },
                mass(5, 0.3),
            ],
            &counters,
        )?
        .unwrap();
        assert_eq!(record.id(), 5);
        assert_eq!(record.adjacency(), Some(&[1, 2][..]));
        assert!((record.rank().unwrap().exp() - 0.4).abs() < 1E-6);
        assert_eq!(counters.get(Counter::MassMessagesReceived), 2);

        // no mass
        let record = aggregate(
            6,
            vec![NodeRecord::Structure {
                id: 6,
                adjacency: vec![],
            }],
            &counters,
        )?
        .unwrap();
        assert_eq!(record.rank(), Some(f32::NEG_INFINITY));
        Ok(())
    }

    #[test]
    fn test_missing_structure() -> Result<()> {
        let counters = Counters::new();
        assert_eq!(aggregate(9, vec![mass(9, 0.5)], &counters)?, None);
        assert_eq!(counters.get(Counter::MissingStructure), 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_structure() {
        let structure = NodeRecord::Structure {
            id: 2,
            adjacency: vec![0],
        };
        let err = aggregate(2, vec![structure.clone(), structure], &Counters::new()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConsistencyError>(),
            Some(&ConsistencyError::DuplicateStructure { node: 2 })
        );
    }

    #[test]
    fn test_reducer_total() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let side_channel = SideChannel::create(dir.path())?;
        let counters = Counters::new();
        let mut reducer = BasicReducer::new(TaskContext {
            task: 3,
            input: dir.path(),
            counters: &counters,
            side_channel: Some(&side_channel),
        });
        let mut out = Vec::new();
        for (id, p) in [(0, 0.25), (1, 0.5)] {
            reducer.reduce(
                id,
                vec![
                    mass(id, p),
                    NodeRecord::Structure {
                        id,
                        adjacency: vec![],
                    },
                ],
                &mut out,
            )?;
        }
        // dropped mass is not counted
        reducer.reduce(7, vec![mass(7, 0.1)], &mut out)?;
        reducer.finish(&mut out)?;
        assert_eq!(out.len(), 2);
        let (total, count) = side_channel.total_mass()?;
        assert_eq!(count, 1);
        assert!((total.exp() - 0.75).abs() < 1E-6);
        assert!(side_channel.get("mass-00003")?.is_some());
        Ok(())
    }
}
