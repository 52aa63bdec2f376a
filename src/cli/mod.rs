/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Command-line interface.
//!
//! Each subcommand lives in its own module, providing a `CliArgs` struct and
//! a `main` function taking the [global arguments](GlobalArgs) and the
//! subcommand arguments.

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use dsi_progress_logger::{concurrent_progress_logger, progress_logger, ProgressLog};
use std::io::Write;
use std::time::{Duration, SystemTime};

pub mod dump;
pub mod ingest;
pub mod partition;
pub mod run;
pub mod top_k;

/// Parses a positive number of threads (a clap `value_parser`).
pub fn num_threads_parser(arg: &str) -> Result<usize> {
    let num_threads = arg.parse::<usize>()?;
    ensure!(num_threads > 0, "Number of threads must be greater than 0");
    Ok(num_threads)
}

/// Shared CLI arguments for commands that specify a number of threads.
#[derive(Args, Debug)]
pub struct NumThreadsArg {
    #[arg(short = 'j', long, default_value_t = rayon::current_num_threads().max(1), value_parser = num_threads_parser)]
    /// The number of threads to use.
    pub num_threads: usize,
}

/// Shared CLI arguments for commands that need the number of nodes.
#[derive(Args, Debug)]
pub struct NumNodesArg {
    #[arg(short = 'n', long)]
    /// The number of nodes of the graph (must be positive).
    pub num_nodes: usize,
}

/// Shared CLI arguments for commands that specify a number of partitions.
#[derive(Args, Debug)]
pub struct NumPartitionsArg {
    #[arg(short = 'p', long, default_value_t = num_cpus::get())]
    /// The number of partitions of the shuffle.
    pub num_partitions: usize,

    #[arg(long)]
    /// Use range partitioning instead of hash partitioning.
    pub range: bool,
}

impl NumPartitionsArg {
    pub fn partitioner_kind(&self) -> crate::partition::PartitionerKind {
        if self.range {
            crate::partition::PartitionerKind::Range
        } else {
            crate::partition::PartitionerKind::Hash
        }
    }
}

/// Creates a thread pool with the given number of threads.
pub fn get_thread_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .context("Failed to create thread pool")?;
    log::info!("Using {} threads", thread_pool.current_num_threads());
    Ok(thread_pool)
}

/// Returns a sequential and a concurrent progress logger configured with the
/// global arguments.
pub fn progress_loggers(
    global_args: &GlobalArgs,
) -> (impl ProgressLog, impl dsi_progress_logger::ConcurrentProgressLog) {
    let mut pl = progress_logger![];
    pl.display_memory(true);
    let mut cpl = concurrent_progress_logger![];
    cpl.display_memory(true);
    if let Some(log_interval) = global_args.log_interval {
        pl.log_interval(log_interval);
        cpl.log_interval(log_interval);
    }
    (pl, cpl)
}

/// Formats an elapsed time as hours, minutes and seconds, omitting leading
/// zero units.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes) = (secs / 3600, secs / 60 % 60);
    let seconds = (secs % 60) as f64 + f64::from(elapsed.subsec_millis()) / 1000.0;
    match (hours, minutes) {
        (0, 0) => format!("{seconds:.3}s"),
        (0, _) => format!("{minutes}m {seconds:.3}s"),
        _ => format!("{hours}h {minutes}m {seconds:.3}s"),
    }
}

/// Parses a log interval: numbers followed by `h`, `m` or `s`, optionally
/// ending with a number of milliseconds without unit (e.g., `1m30s` or
/// `500`).
fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    ensure!(!value.is_empty(), "Empty duration (use 0 to log continuously)");
    let mut millis = 0u64;
    let mut rest = value;
    while !rest.is_empty() {
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        ensure!(len > 0, "Missing number in duration {value:?}");
        let amount = rest[..len].parse::<u64>()?;
        rest = &rest[len..];
        let unit = match rest.chars().next() {
            None => 1,
            Some('s') => 1000,
            Some('m') => 60 * 1000,
            Some('h') => 60 * 60 * 1000,
            Some(c) => bail!("Invalid unit {c:?} in duration {value:?}"),
        };
        if !rest.is_empty() {
            rest = &rest[1..];
        }
        millis = amount
            .checked_mul(unit)
            .and_then(|m| m.checked_add(millis))
            .with_context(|| format!("Duration {value:?} is too long"))?;
    }
    Ok(Duration::from_millis(millis))
}

/// Installs an [`env_logger`] logger printing timestamps and elapsed time.
///
/// The default filter is `info`; use `RUST_LOG` to change it.
pub fn init_env_logger() -> Result<()> {
    use jiff::fmt::friendly::{Designator, Spacing, SpanPrinter};
    use jiff::SpanRound;

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    let start = std::time::Instant::now();
    let printer = SpanPrinter::new()
        .spacing(Spacing::None)
        .designator(Designator::Compact);
    let span_round = SpanRound::new()
        .largest(jiff::Unit::Hour)
        .smallest(jiff::Unit::Millisecond);

    builder.format(move |buf, record| {
        let Ok(ts) = jiff::Timestamp::try_from(SystemTime::now()) else {
            return Err(std::io::Error::other("Failed to get timestamp"));
        };
        let style = buf.default_level_style(record.level());
        let elapsed = start.elapsed();
        let span = jiff::Span::new()
            .seconds(elapsed.as_secs() as i64)
            .milliseconds(elapsed.subsec_millis() as i64);
        let span = span.round(span_round).map_err(std::io::Error::other)?;
        writeln!(
            buf,
            "{} {} {style}{}{style:#} [{:?}] {} - {}",
            ts.strftime("%F %T%.3f"),
            printer.span_to_string(&span),
            record.level(),
            std::thread::current().id(),
            record.target(),
            record.args()
        )
    });
    builder.try_init()?;
    Ok(())
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    #[arg(long, value_parser = parse_duration, global=true, display_order = 1000)]
    /// The interval between progress log lines (default 10s), written as
    /// numbers with the units "h", "m" or "s"; a trailing number without unit
    /// counts milliseconds, so "1m30s250" is ninety seconds and a quarter.
    pub log_interval: Option<Duration>,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    Ingest(ingest::CliArgs),
    Partition(partition::CliArgs),
    Run(run::CliArgs),
    #[clap(name = "top-k")]
    TopK(top_k::CliArgs),
    Dump(dump::CliArgs),
}

#[derive(Parser, Debug)]
#[command(name = "schimmy-rank", version)]
/// Partitioned PageRank in log space.
///
/// Typical usage: `ingest` an adjacency-list file into `BASE/iter0000`,
/// optionally `partition` it (required by the Schimmy strategy), `run`
/// iterations, and extract the `top-k` nodes of the last generation.
///
/// Noteworthy environment variables:
///
/// - RUST_LOG: configuration for env_logger
///   <https://docs.rs/env_logger/latest/env_logger/>
///
/// - RAYON_NUM_THREADS: the default number of threads of the thread pool
pub struct Cli {
    #[command(subcommand)]
    pub command: SubCommands,
    #[clap(flatten)]
    pub args: GlobalArgs,
}

/// The entry point of the command-line interface.
pub fn cli_main<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let start = std::time::Instant::now();
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => {
            e.print()?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    match cli.command {
        SubCommands::Ingest(args) => {
            ingest::main(cli.args, args)?;
        }
        SubCommands::Partition(args) => {
            partition::main(cli.args, args)?;
        }
        SubCommands::Run(args) => {
            run::main(cli.args, args)?;
        }
        SubCommands::TopK(args) => {
            top_k::main(cli.args, args)?;
        }
        SubCommands::Dump(args) => {
            dump::main(cli.args, args)?;
        }
    }

    log::info!(
        "The command took {}",
        format_elapsed(start.elapsed())
    );

    Ok(())
}
