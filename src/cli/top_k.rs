/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{get_thread_pool, progress_loggers, GlobalArgs, NumThreadsArg};
use crate::top_k::extract_top_k;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    about = "Writes the nodes with the highest rank in a generation as lines containing a node id and its probability, separated by a TAB, by decreasing probability.",
    long_about = None
)]
pub struct CliArgs {
    /// The directory of the generation.
    pub input: PathBuf,
    /// The output file.
    pub output: PathBuf,

    #[arg(short = 'k', long, default_value_t = 100)]
    /// The number of nodes to extract.
    pub top: usize,

    #[clap(flatten)]
    pub num_threads: NumThreadsArg,
}

pub fn main(global_args: GlobalArgs, args: CliArgs) -> Result<()> {
    let (_, mut cpl) = progress_loggers(&global_args);
    let thread_pool = get_thread_pool(args.num_threads.num_threads)?;
    thread_pool.install(|| extract_top_k(&args.input, &args.output, args.top, &mut cpl))?;
    Ok(())
}
