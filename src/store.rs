/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! On-disk record files and generation directories.
//!
//! A _generation_ is a directory (`iter0000`, `iter0001`, …) containing one or
//! more _part files_ whose names start with `part-`. Each part file is a plain
//! concatenation of [encoded records](crate::record). Part files written by a
//! reduction are sorted by node id, and map-only stages preserve the order of
//! their input, so every part file of a generation produced by the
//! propagation stage is sorted.

use crate::exec::Emit;
use crate::record::{NodeId, NodeRecord, Variant};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Returns the directory of the generation produced by `iteration`.
pub fn generation_dir(base: impl AsRef<Path>, iteration: usize) -> PathBuf {
    base.as_ref().join(format!("iter{iteration:04}"))
}

/// Returns the name of the part file written by map task `task`.
pub fn map_part_name(task: usize) -> String {
    format!("part-m-{task:05}")
}

/// Returns the name of the part file written by reduce task `partition`.
pub fn reduce_part_name(partition: usize) -> String {
    format!("part-r-{partition:05}")
}

/// Lists the part files of a generation in lexicographical order.
pub fn part_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut parts = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Could not list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("Could not list {}", dir.display()))?;
        if entry.file_name().to_string_lossy().starts_with("part-") && entry.file_type()?.is_file() {
            parts.push(entry.path());
        }
    }
    parts.sort();
    Ok(parts)
}

/// Buffered writer of a part file.
pub struct RecordWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl RecordWriter {
    /// Creates (or truncates) the part file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::create(&path)
            .with_context(|| format!("Could not create record file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::with_capacity(1 << 16, file),
            path,
            written: 0,
        })
    }

    pub fn write(&mut self, record: &NodeRecord) -> Result<()> {
        record
            .encode(&mut self.writer)
            .with_context(|| format!("Could not write record to {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the file and returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .with_context(|| format!("Could not flush {}", self.path.display()))?;
        Ok(self.written)
    }
}

impl Emit for RecordWriter {
    fn emit(&mut self, record: NodeRecord) -> Result<()> {
        self.write(&record)
    }
}

/// Sequential reader of a part file.
///
/// The reader is an [`Iterator`] over fallible records; errors carry the path
/// and the index of the offending record.
pub struct RecordReader {
    reader: BufReader<File>,
    path: PathBuf,
    read: u64,
}

impl RecordReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)
            .with_context(|| format!("Could not open record file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::with_capacity(1 << 16, file),
            path,
            read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for RecordReader {
    type Item = Result<NodeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match NodeRecord::decode(&mut self.reader) {
            Ok(None) => None,
            Ok(Some(record)) => {
                self.read += 1;
                Some(Ok(record))
            }
            Err(e) => Some(Err(e).with_context(|| {
                format!(
                    "Could not decode record {} of {}",
                    self.read,
                    self.path.display()
                )
            })),
        }
    }
}

/// Reads all the records of a generation, part file by part file.
pub fn read_generation(dir: impl AsRef<Path>) -> Result<Vec<NodeRecord>> {
    let mut records = Vec::new();
    for path in part_files(dir)? {
        for record in RecordReader::open(path)? {
            records.push(record?);
        }
    }
    Ok(records)
}

/// Writes the records of a generation as text.
///
/// Each line contains the node id, the variant, the probability (the
/// exponential of the rank) and the space-separated successors. Fields that
/// the variant does not carry are left empty.
pub fn dump(generation: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<u64> {
    let output = output.as_ref();
    let file = File::create(output)
        .with_context(|| format!("Could not create {}", output.display()))?;
    let mut out = BufWriter::new(file);
    let mut count = 0;
    for path in part_files(&generation)? {
        for record in RecordReader::open(&path)? {
            let record = record?;
            write!(out, "{}\t{}\t", record.id(), record.variant())?;
            if let Some(rank) = record.rank() {
                write!(out, "{}", rank.exp())?;
            }
            out.write_all(b"\t")?;
            if let Some(adjacency) = record.adjacency() {
                for (i, succ) in adjacency.iter().enumerate() {
                    if i != 0 {
                        out.write_all(b" ")?;
                    }
                    write!(out, "{succ}")?;
                }
            }
            out.write_all(b"\n")?;
            count += 1;
        }
    }
    out.flush()
        .with_context(|| format!("Could not flush {}", output.display()))?;
    log::info!(
        "Dumped {} records of {} to {}",
        count,
        generation.as_ref().display(),
        output.display()
    );
    Ok(count)
}

/// Parses a line written by [`dump`] into id, variant, rank and successors.
pub fn parse_dump_line(line: &str) -> Result<(NodeId, Variant, Option<f32>, Vec<NodeId>)> {
    let mut fields = line.split('\t');
    let mut next = |name: &str| {
        fields
            .next()
            .with_context(|| format!("Missing {name} in dump line {line:?}"))
    };
    let id = next("id")?.parse()?;
    let variant = match next("variant")? {
        "complete" => Variant::Complete,
        "mass" => Variant::Mass,
        "structure" => Variant::Structure,
        other => anyhow::bail!("Unknown variant {other:?} in dump line {line:?}"),
    };
    let prob = next("probability")?;
    let rank = if prob.is_empty() {
        None
    } else {
        Some(prob.parse::<f32>()?.ln())
    };
    let adjacency = next("adjacency")?
        .split_whitespace()
        .map(str::parse::<NodeId>)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((id, variant, rank, adjacency))
}
