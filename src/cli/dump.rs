/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::GlobalArgs;
use crate::store::dump;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    about = "Writes the records of a generation as text: node id, variant, probability and successors, separated by TABs.",
    long_about = None
)]
pub struct CliArgs {
    /// The directory of the generation.
    pub input: PathBuf,
    /// The output file.
    pub output: PathBuf,
}

pub fn main(_global_args: GlobalArgs, args: CliArgs) -> Result<()> {
    dump(&args.input, &args.output)?;
    Ok(())
}
