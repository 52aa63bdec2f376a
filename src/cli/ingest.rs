/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{get_thread_pool, progress_loggers, GlobalArgs, NumNodesArg, NumThreadsArg};
use crate::ingest::build_records;
use crate::utils::Counters;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    about = "Builds the initial generation of records from adjacency lists. Each line contains a source node followed by its successors, separated by whitespace; blank lines and lines starting with # are ignored.",
    long_about = None
)]
pub struct CliArgs {
    /// A text file, or a directory of text files, of adjacency lists.
    pub input: PathBuf,
    /// The directory of the generation to create (e.g., BASE/iter0000).
    pub output: PathBuf,

    #[clap(flatten)]
    pub num_nodes: NumNodesArg,

    #[clap(flatten)]
    pub num_threads: NumThreadsArg,
}

pub fn main(global_args: GlobalArgs, args: CliArgs) -> Result<()> {
    let (_, mut cpl) = progress_loggers(&global_args);
    let thread_pool = get_thread_pool(args.num_threads.num_threads)?;
    let counters = Counters::new();
    let written = thread_pool.install(|| {
        build_records(
            &args.input,
            &args.output,
            args.num_nodes.num_nodes,
            &counters,
            &mut cpl,
        )
    })?;
    log::info!("Wrote {} records to {}", written, args.output.display());
    Ok(())
}
