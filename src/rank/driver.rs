/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{
    missing_mass, BasicReducer, DanglingCorrection, DanglingMapper, MassCombiner, MassMapper,
    SchimmyReducer, Strategy, DEFAULT_ALPHA,
};
use crate::exec::{Combiner, Job, SideChannel};
use crate::partition::{discover_partition_mapping, Partitioner, PartitionerKind};
use crate::store::generation_dir;
use crate::utils::{CounterSnapshot, Counters};
use anyhow::{ensure, Context, Result};
use dsi_progress_logger::{no_logging, ConcurrentProgressLog, ProgressLog};
use std::path::{Path, PathBuf};

/// What happened during an iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats {
    /// The index of the iteration, which reads generation `iteration` and
    /// writes generation `iteration + 1`.
    pub iteration: usize,
    /// The log-space total of the ranks after propagation.
    pub total_mass: f32,
    /// The probability lost at dangling nodes (and at nonexistent nodes).
    pub missing_mass: f32,
    pub counters: CounterSnapshot,
}

/// Runs PageRank iterations over the generations stored in a base directory.
///
/// Iteration _i_ reads `iter`_i_ and writes `iter`_i_+1 (four zero-padded
/// digits); the intermediate directories `iter`_i_+1`-pre` (ranks after
/// propagation) and `iter`_i_+1`-mass` (the side channel of the iteration)
/// are removed when the iteration completes.
///
/// The struct is configured via setters and then executed via
/// [`run`](Self::run).
///
/// # Examples
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use schimmy_rank::prelude::*;
///
/// let mut pr = PageRank::new("/tmp/graph", 1_000_000)?;
/// pr.strategy(Strategy::Schimmy)
///     .partitioner(PartitionerKind::Range)
///     .num_partitions(16)
///     .in_mapper_combiner(true);
/// let stats = pr.run(1, 11)?;
/// assert_eq!(stats.len(), 10);
/// #     Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PageRank {
    base: PathBuf,
    num_nodes: usize,
    alpha: f32,
    strategy: Strategy,
    partitioner: PartitionerKind,
    num_partitions: usize,
    combiner: bool,
    in_mapper_combiner: bool,
    batch_size: usize,
}

impl PageRank {
    /// Creates a new computation on the generations in `base` for a graph
    /// with `num_nodes` nodes.
    pub fn new(base: impl AsRef<Path>, num_nodes: usize) -> Result<Self> {
        ensure!(num_nodes > 0, "The number of nodes must be positive");
        Ok(Self {
            base: base.as_ref().to_owned(),
            num_nodes,
            alpha: DEFAULT_ALPHA,
            strategy: Strategy::default(),
            partitioner: PartitionerKind::default(),
            num_partitions: num_cpus::get(),
            combiner: false,
            in_mapper_combiner: false,
            batch_size: Job::DEFAULT_BATCH_SIZE,
        })
    }

    /// Sets the random-jump probability α, which must be in (0 . . 1).
    pub fn alpha(&mut self, alpha: f32) -> &mut Self {
        self.alpha = alpha;
        self
    }

    pub fn strategy(&mut self, strategy: Strategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Sets the partitioner of the shuffle.
    ///
    /// With the [Schimmy](Strategy::Schimmy) strategy the starting generation
    /// must have been laid out by the same partitioner with the same number
    /// of partitions (see [`partition_graph`](crate::partition::partition_graph)).
    pub fn partitioner(&mut self, partitioner: PartitionerKind) -> &mut Self {
        self.partitioner = partitioner;
        self
    }

    pub fn num_partitions(&mut self, num_partitions: usize) -> &mut Self {
        self.num_partitions = num_partitions;
        self
    }

    /// Enables the [combiner](MassCombiner) applied to sorted runs.
    pub fn combiner(&mut self, combiner: bool) -> &mut Self {
        self.combiner = combiner;
        self
    }

    /// Enables summing messages within each map task before the shuffle.
    pub fn in_mapper_combiner(&mut self, in_mapper_combiner: bool) -> &mut Self {
        self.in_mapper_combiner = in_mapper_combiner;
        self
    }

    /// Sets the number of records per partition buffered by a map task before
    /// a sorted run is spilled to disk.
    pub fn batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Runs iterations `start`, `start` + 1, …, `end` − 1.
    pub fn run(&self, start: usize, end: usize) -> Result<Vec<IterationStats>> {
        self.run_with_logging(start, end, no_logging![], no_logging![])
    }

    /// Runs iterations `start`, `start` + 1, …, `end` − 1, logging progress.
    ///
    /// `pl` counts iterations; `cpl` is cloned into the tasks of each phase.
    pub fn run_with_logging(
        &self,
        start: usize,
        end: usize,
        pl: &mut impl ProgressLog,
        cpl: &mut impl ConcurrentProgressLog,
    ) -> Result<Vec<IterationStats>> {
        ensure!(
            start < end,
            "The start iteration ({start}) must be smaller than the end iteration ({end})"
        );
        self.check()?;

        log::info!("Strategy: {}", self.strategy);
        log::info!("Alpha: {}", self.alpha);
        log::info!(
            "Partitions: {} ({})",
            self.num_partitions,
            self.partitioner
        );
        log::info!(
            "Combiner: {}, in-mapper combiner: {}",
            self.combiner,
            self.in_mapper_combiner
        );

        pl.item_name("iteration");
        pl.expected_updates(Some(end - start));
        pl.start(format!("Running iterations {start}..{end}..."));
        let mut stats = Vec::with_capacity(end - start);
        for iteration in start..end {
            stats.push(self.iterate(iteration, cpl)?);
            pl.update();
        }
        pl.done();
        Ok(stats)
    }

    fn check(&self) -> Result<()> {
        ensure!(
            self.alpha > 0.0 && self.alpha < 1.0,
            "The random-jump probability must be in (0 . . 1), got {}",
            self.alpha
        );
        ensure!(
            self.num_partitions > 0,
            "The number of partitions must be positive"
        );
        Ok(())
    }

    /// Runs a single iteration, reading generation `iteration` and writing
    /// generation `iteration + 1`.
    pub fn iterate(
        &self,
        iteration: usize,
        cpl: &mut impl ConcurrentProgressLog,
    ) -> Result<IterationStats> {
        self.check()?;
        let next = iteration + 1;
        let input = generation_dir(&self.base, iteration);
        let pre = self.base.join(format!("iter{next:04}-pre"));
        let mass = self.base.join(format!("iter{next:04}-mass"));
        let output = generation_dir(&self.base, next);
        ensure!(
            input.is_dir(),
            "Generation {} does not exist",
            input.display()
        );
        for dir in [&pre, &mass, &output] {
            remove_stale(dir)?;
        }

        let counters = Counters::new();
        let side_channel = SideChannel::create(&mass)?;
        let partitioner = self
            .partitioner
            .build(self.num_nodes, self.num_partitions)?;

        let total_mass = self.propagate(
            iteration,
            &input,
            &pre,
            &*partitioner,
            &counters,
            &side_channel,
            cpl,
        )?;
        let missing_mass = missing_mass(total_mass);
        log::info!(
            "Iteration {}: total mass {}, missing mass {}",
            iteration,
            total_mass.exp(),
            missing_mass
        );

        let correction = DanglingCorrection::new(self.alpha, self.num_nodes, missing_mass)?;
        Job::new(format!("iter{next:04}-dangling"), &pre, &output, &counters)
            .run_map_only(|_| Ok(DanglingMapper::new(correction)), cpl)?;

        for dir in [&pre, &mass] {
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Could not remove {}", dir.display()))?;
        }

        Ok(IterationStats {
            iteration,
            total_mass,
            missing_mass,
            counters: counters.snapshot(),
        })
    }

    /// Runs the propagation phase, returning the log-space total of the
    /// aggregated ranks.
    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        iteration: usize,
        input: &Path,
        output: &Path,
        partitioner: &dyn Partitioner,
        counters: &Counters,
        side_channel: &SideChannel,
        cpl: &mut impl ConcurrentProgressLog,
    ) -> Result<f32> {
        let combiner: Option<&dyn Combiner> = if self.combiner {
            Some(&MassCombiner)
        } else {
            None
        };
        let in_mapper_combiner = self.in_mapper_combiner;
        let job = Job::new(
            format!("iter{:04}-{}", iteration + 1, self.strategy),
            input,
            output,
            counters,
        )
        .side_channel(side_channel)
        .combiner(combiner)
        .batch_size(self.batch_size);

        match self.strategy {
            Strategy::Basic => job.run_map_reduce(
                partitioner,
                |ctx| Ok(MassMapper::new(ctx.counters, true, in_mapper_combiner)),
                |ctx| Ok(BasicReducer::new(ctx)),
                cpl,
            )?,
            Strategy::Schimmy => {
                let mapping = discover_partition_mapping(input, partitioner)?;
                side_channel.put_partition_mapping(&mapping)?;
                job.run_map_reduce(
                    partitioner,
                    |ctx| Ok(MassMapper::new(ctx.counters, false, in_mapper_combiner)),
                    SchimmyReducer::new,
                    cpl,
                )?
            }
        };

        let (total_mass, tasks) = side_channel.total_mass()?;
        ensure!(
            tasks == partitioner.num_partitions(),
            "Found {} mass totals in {}, expected {}",
            tasks,
            side_channel.dir().display(),
            partitioner.num_partitions()
        );
        Ok(total_mass)
    }
}

/// Removes the leftovers of a failed attempt at an iteration.
fn remove_stale(dir: &Path) -> Result<()> {
    if dir.exists() {
        log::warn!("Removing stale directory {}", dir.display());
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Could not remove {}", dir.display()))?;
    }
    Ok(())
}
