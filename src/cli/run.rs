/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{
    get_thread_pool, progress_loggers, GlobalArgs, NumNodesArg, NumPartitionsArg, NumThreadsArg,
};
use crate::exec::Job;
use crate::rank::{PageRank, Strategy, DEFAULT_ALPHA};
use crate::utils::Counter;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    about = "Runs PageRank iterations. Iteration i reads BASE/iterNNNN (i with four digits) and writes the generation of iteration i + 1.",
    long_about = None
)]
pub struct CliArgs {
    /// The base directory containing the generations.
    pub base: PathBuf,

    #[clap(flatten)]
    pub num_nodes: NumNodesArg,

    #[arg(short, long)]
    /// The first iteration to run.
    pub start: usize,

    #[arg(short, long)]
    /// The iteration at which to stop (exclusive).
    pub end: usize,

    #[arg(long, value_enum, default_value_t = Strategy::Basic)]
    /// How graph structure reaches the aggregation stage.
    pub strategy: Strategy,

    #[arg(long)]
    /// Sum messages to the same node in each sorted run before the shuffle.
    pub combiner: bool,

    #[arg(long)]
    /// Sum messages to the same node within each map task before the shuffle.
    pub in_mapper_combiner: bool,

    #[arg(short, long, default_value_t = DEFAULT_ALPHA)]
    /// The random-jump probability (must be in the interval (0 . . 1)).
    pub alpha: f32,

    #[arg(long, default_value_t = Job::DEFAULT_BATCH_SIZE)]
    /// The number of records per partition a map task buffers before
    /// spilling a sorted run.
    pub batch_size: usize,

    #[clap(flatten)]
    pub partitions: NumPartitionsArg,

    #[clap(flatten)]
    pub num_threads: NumThreadsArg,
}

pub fn main(global_args: GlobalArgs, args: CliArgs) -> Result<()> {
    let (mut pl, mut cpl) = progress_loggers(&global_args);
    let thread_pool = get_thread_pool(args.num_threads.num_threads)?;

    let mut pr = PageRank::new(&args.base, args.num_nodes.num_nodes)?;
    pr.strategy(args.strategy)
        .alpha(args.alpha)
        .partitioner(args.partitions.partitioner_kind())
        .num_partitions(args.partitions.num_partitions)
        .combiner(args.combiner)
        .in_mapper_combiner(args.in_mapper_combiner)
        .batch_size(args.batch_size);

    let stats =
        thread_pool.install(|| pr.run_with_logging(args.start, args.end, &mut pl, &mut cpl))?;

    for s in &stats {
        log::info!(
            "Iteration {}: missing mass {}, {} messages ({} saved), {} nodes without structure",
            s.iteration,
            s.missing_mass,
            s.counters.get(Counter::MassMessages),
            s.counters.get(Counter::MassMessagesSaved),
            s.counters.get(Counter::MissingStructure)
        );
    }
    Ok(())
}
