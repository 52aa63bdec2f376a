/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{
    get_thread_pool, progress_loggers, GlobalArgs, NumNodesArg, NumPartitionsArg, NumThreadsArg,
};
use crate::partition::partition_graph;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    about = "Lays out a generation so that each part file holds exactly one partition, sorted by node id. This is required by the Schimmy strategy, which must then be run with the same partitioning options.",
    long_about = None
)]
pub struct CliArgs {
    /// The directory of the generation to partition.
    pub input: PathBuf,
    /// The directory of the partitioned generation.
    pub output: PathBuf,

    #[clap(flatten)]
    pub num_nodes: NumNodesArg,

    #[clap(flatten)]
    pub partitions: NumPartitionsArg,

    #[clap(flatten)]
    pub num_threads: NumThreadsArg,
}

pub fn main(global_args: GlobalArgs, args: CliArgs) -> Result<()> {
    let (_, mut cpl) = progress_loggers(&global_args);
    let thread_pool = get_thread_pool(args.num_threads.num_threads)?;
    thread_pool.install(|| {
        partition_graph(
            &args.input,
            &args.output,
            args.partitions.partitioner_kind(),
            args.num_nodes.num_nodes,
            args.partitions.num_partitions,
            &mut cpl,
        )
    })?;
    Ok(())
}
