/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Conversion of textual adjacency lists into the initial generation.
//!
//! Each input line contains whitespace-separated node ids: the first one is
//! the source, the remaining ones its successors, in order (duplicates are
//! kept). A line with a single id denotes a node without successors. Blank
//! lines and lines starting with `#` are ignored.

use crate::record::{NodeId, NodeRecord};
use crate::store::{map_part_name, part_files, RecordWriter};
use crate::utils::{uniform_rank, Counter, Counters};
use anyhow::{ensure, Context, Result};
use dsi_progress_logger::ConcurrentProgressLog;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Parses an adjacency-list line, returning `None` for blank and comment
/// lines.
pub fn parse_line(line: &str) -> Result<Option<(NodeId, Vec<NodeId>)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace().map(|token| {
        token
            .parse::<NodeId>()
            .with_context(|| format!("Invalid node id {token:?}"))
    });
    // the line is not empty, so there is at least one token
    let source = match tokens.next() {
        Some(source) => source?,
        None => return Ok(None),
    };
    let successors = tokens.collect::<Result<Vec<_>>>()?;
    Ok(Some((source, successors)))
}

/// Lists the input files: `input` itself if it is a file, its visible regular
/// files in lexicographical order if it is a directory.
fn input_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_owned()]);
    }
    let mut files = Vec::new();
    for entry in
        std::fs::read_dir(input).with_context(|| format!("Could not list {}", input.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with('.') && !name.starts_with('_') && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Builds the initial generation from textual adjacency lists.
///
/// Every node gets the uniform log-probability −ln(`num_nodes`). Each input
/// file is converted in parallel into a part file of `output`, preserving the
/// order of its lines. Increments [`NumNodes`](Counter::NumNodes),
/// [`NumEdges`](Counter::NumEdges) and
/// [`NumActiveNodes`](Counter::NumActiveNodes).
///
/// `output` must not already contain part files.
pub fn build_records(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    num_nodes: usize,
    counters: &Counters,
    pl: &mut impl ConcurrentProgressLog,
) -> Result<u64> {
    ensure!(num_nodes > 0, "The number of nodes must be positive");
    let input = input.as_ref();
    let output = output.as_ref();
    let files = input_files(input)?;
    ensure!(!files.is_empty(), "No input files in {}", input.display());
    std::fs::create_dir_all(output)
        .with_context(|| format!("Could not create {}", output.display()))?;
    ensure!(
        part_files(output)?.is_empty(),
        "Output directory {} already contains part files",
        output.display()
    );

    let rank = uniform_rank(num_nodes);
    log::info!(
        "Building records for {} nodes from {} files (initial log-rank {})",
        num_nodes,
        files.len(),
        rank
    );

    pl.item_name("node");
    pl.expected_updates(Some(num_nodes));
    pl.start("Building records...");

    let written = files
        .par_iter()
        .enumerate()
        .map_with(pl.clone(), |pl, (task, path)| -> Result<u64> {
            let file =
                File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
            let mut writer = RecordWriter::create(output.join(map_part_name(task)))?;
            for (line_num, line) in BufReader::new(file).lines().enumerate() {
                let line = line
                    .with_context(|| format!("Could not read line {} of {}", line_num + 1, path.display()))?;
                let Some((id, adjacency)) = parse_line(&line)
                    .with_context(|| format!("Line {} of {}", line_num + 1, path.display()))?
                else {
                    continue;
                };
                counters.incr(Counter::NumNodes, 1);
                counters.incr(Counter::NumEdges, adjacency.len() as u64);
                if !adjacency.is_empty() {
                    counters.incr(Counter::NumActiveNodes, 1);
                }
                writer.write(&NodeRecord::Complete {
                    id,
                    rank,
                    adjacency,
                })?;
                pl.light_update();
            }
            writer.finish()
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    pl.done();
    counters.log("ingest");
    let found = counters.get(Counter::NumNodes);
    if found != num_nodes as u64 {
        log::warn!(
            "Found {} nodes, but the number of nodes was declared as {}",
            found,
            num_nodes
        );
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_generation;
    use dsi_progress_logger::no_logging;

    #[test]
    fn test_parse_line() -> Result<()> {
        assert_eq!(parse_line("0 1 2")?, Some((0, vec![1, 2])));
        assert_eq!(parse_line("  7\t3 3  ")?, Some((7, vec![3, 3])));
        assert_eq!(parse_line("5")?, Some((5, vec![])));
        assert_eq!(parse_line("")?, None);
        assert_eq!(parse_line("   ")?, None);
        assert_eq!(parse_line("# comment")?, None);
        assert!(parse_line("1 -2").is_err());
        assert!(parse_line("x 2").is_err());
        Ok(())
    }

    #[test]
    fn test_build_records() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("graph.txt");
        std::fs::write(&input, "# a triangle and a sink\n0 1\n1 2 3\n\n2 0\n3\n")?;
        let counters = Counters::new();
        let output = dir.path().join("iter0000");
        assert_eq!(build_records(&input, &output, 4, &counters, no_logging![])?, 4);
        assert_eq!(counters.get(Counter::NumNodes), 4);
        assert_eq!(counters.get(Counter::NumEdges), 4);
        assert_eq!(counters.get(Counter::NumActiveNodes), 3);

        let records = read_generation(&output)?;
        let rank = uniform_rank(4);
        assert_eq!(
            records,
            vec![
                NodeRecord::Complete {
                    id: 0,
                    rank,
                    adjacency: vec![1]
                },
                NodeRecord::Complete {
                    id: 1,
                    rank,
                    adjacency: vec![2, 3]
                },
                NodeRecord::Complete {
                    id: 2,
                    rank,
                    adjacency: vec![0]
                },
                NodeRecord::Complete {
                    id: 3,
                    rank,
                    adjacency: vec![]
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_existing_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("lists");
        std::fs::create_dir(&input)?;
        std::fs::write(input.join("a.txt"), "0 1
1 0
")?;
        std::fs::write(input.join("b.txt"), "2 0
")?;
        let output = dir.path().join("iter0000");
        build_records(&input, &output, 3, &Counters::new(), no_logging![])?;
        let before = read_generation(&output)?;
        assert_eq!(before.len(), 3);

        // a smaller input must not overwrite part of the generation
        let single = dir.path().join("single.txt");
        std::fs::write(&single, "0
")?;
        let err = build_records(&single, &output, 1, &Counters::new(), no_logging![]).unwrap_err();
        assert!(err.to_string().contains("already contains part files"), "{err}");
        assert_eq!(read_generation(&output)?, before);
        Ok(())
    }

    #[test]
    fn test_zero_nodes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("graph.txt");
        std::fs::write(&input, "0 1\n")?;
        assert!(build_records(&input, dir.path().join("out"), 0, &Counters::new(), no_logging![]).is_err());
        Ok(())
    }
}
