/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Named counters shared by all the tasks of a job.

use std::sync::atomic::{AtomicU64, Ordering};

/// The counters incremented by the stages of the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Nodes read by ingestion.
    NumNodes,
    /// Arcs read by ingestion.
    NumEdges,
    /// Nodes with at least one successor.
    NumActiveNodes,
    /// Mass messages sent to the shuffle.
    MassMessages,
    /// Mass contributions merged by in-mapper combining instead of being sent.
    MassMessagesSaved,
    /// Mass messages seen by the aggregation stage.
    MassMessagesReceived,
    /// Keys that received mass but have no structure.
    MissingStructure,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::NumNodes,
        Counter::NumEdges,
        Counter::NumActiveNodes,
        Counter::MassMessages,
        Counter::MassMessagesSaved,
        Counter::MassMessagesReceived,
        Counter::MissingStructure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::NumNodes => "numNodes",
            Counter::NumEdges => "numEdges",
            Counter::NumActiveNodes => "numActiveNodes",
            Counter::MassMessages => "massMessages",
            Counter::MassMessagesSaved => "massMessagesSaved",
            Counter::MassMessagesReceived => "massMessagesReceived",
            Counter::MissingStructure => "missingStructure",
        }
    }

    #[inline(always)]
    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of atomic counters.
///
/// Counters are only ever incremented by tasks; they are shared by reference,
/// so no synchronization beyond the atomics is needed.
#[derive(Debug, Default)]
pub struct Counters {
    values: [AtomicU64; Counter::ALL.len()],
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(&self, counter: Counter, by: u64) {
        self.values[counter.index()].fetch_add(by, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    /// Returns a copy of the current values.
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut values = [0; Counter::ALL.len()];
        for counter in Counter::ALL {
            values[counter.index()] = self.get(counter);
        }
        CounterSnapshot { values }
    }

    /// Logs the nonzero counters at info level.
    pub fn log(&self, job: &str) {
        for counter in Counter::ALL {
            let value = self.get(counter);
            if value != 0 {
                log::info!("[{job}] {counter} = {value}");
            }
        }
    }
}

/// The values of a [`Counters`] at a given time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    values: [u64; Counter::ALL.len()],
}

impl CounterSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let counters = Counters::new();
        counters.incr(Counter::MassMessages, 3);
        counters.incr(Counter::MassMessages, 4);
        counters.incr(Counter::MissingStructure, 1);
        assert_eq!(counters.get(Counter::MassMessages), 7);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.get(Counter::MissingStructure), 1);
        assert_eq!(snapshot.get(Counter::NumNodes), 0);
        assert_eq!(Counter::MassMessagesSaved.to_string(), "massMessagesSaved");
    }
}
