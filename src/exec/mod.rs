/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A local, in-process map/shuffle/reduce substrate.
//!
//! The PageRank stages are written as pure [`Mapper`], [`Combiner`] and
//! [`Reducer`] implementations; a [`Job`] runs them over the part files of a
//! generation:
//!
//! - [`run_map_only`](Job::run_map_only) runs one map task per input part
//!   file, writing an output part file with the same name and in the same
//!   order;
//! - [`run_map_reduce`](Job::run_map_reduce) runs one map task per input part
//!   file, buckets the emitted records using a
//!   [`Partitioner`](crate::partition::Partitioner), spills sorted runs to a
//!   temporary directory, and then runs one reduce task per partition, feeding
//!   it the keys of the partition in strictly increasing order, each with all
//!   its values. Reduce task `p` writes `part-r-p`.
//!
//! Map tasks run in parallel, and so do reduce tasks, on the current
//! [rayon](rayon) thread pool. The only synchronization point is the barrier
//! between the two stages: no reduce task starts before every map task has
//! completed.

use crate::partition::Partitioner;
use crate::record::{NodeId, NodeRecord};
use crate::store::{part_files, reduce_part_name, RecordReader, RecordWriter};
use crate::utils::Counters;
use anyhow::{ensure, Context, Result};
use dsi_progress_logger::ConcurrentProgressLog;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod shuffle;
pub use shuffle::*;

mod side_channel;
pub use side_channel::*;

/// A sink for records.
pub trait Emit {
    fn emit(&mut self, record: NodeRecord) -> Result<()>;
}

impl Emit for Vec<NodeRecord> {
    fn emit(&mut self, record: NodeRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// The map function of a job.
///
/// A new instance is created for each task; [`finish`](Mapper::finish) is
/// called exactly once, after the last record of the task's input.
pub trait Mapper {
    fn map<E: Emit>(&mut self, record: NodeRecord, out: &mut E) -> Result<()>;

    fn finish<E: Emit>(&mut self, _out: &mut E) -> Result<()> {
        Ok(())
    }
}

/// The aggregation function of a job.
///
/// A new instance is created for each partition; [`reduce`](Reducer::reduce)
/// is called once per key in strictly increasing key order, and
/// [`finish`](Reducer::finish) exactly once after the last key.
pub trait Reducer {
    fn reduce<E: Emit>(&mut self, key: NodeId, values: Vec<NodeRecord>, out: &mut E)
        -> Result<()>;

    fn finish<E: Emit>(&mut self, _out: &mut E) -> Result<()> {
        Ok(())
    }
}

/// A pre-aggregation hook applied to each sorted run before it is spilled.
///
/// A combiner may be applied any number of times (including zero) to the
/// values of a key, so it must not change the result of the reduction.
pub trait Combiner: Sync {
    fn combine(&self, key: NodeId, values: Vec<NodeRecord>, out: &mut Vec<NodeRecord>)
        -> Result<()>;
}

/// Violations of the invariants of the data flowing through a job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("More than one structure record for node {node}")]
    DuplicateStructure { node: NodeId },
    #[error("Node {node} appears in more than one local top-k list")]
    DuplicateTopKEntry { node: NodeId },
    #[error("Keys are not strictly increasing: {next} after {previous}")]
    UnsortedKeys { previous: NodeId, next: NodeId },
}

/// What a task knows about itself and its job.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    /// The index of the task: the input file index for map tasks, the
    /// partition index for reduce tasks.
    pub task: usize,
    /// The input generation of the job.
    pub input: &'a Path,
    pub counters: &'a Counters,
    pub side_channel: Option<&'a SideChannel>,
}

/// Statistics about a completed job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub records_read: u64,
    pub records_written: u64,
}

/// A phase of the computation: a named transformation of an input generation
/// into an output generation.
pub struct Job<'a> {
    name: String,
    input: PathBuf,
    output: PathBuf,
    counters: &'a Counters,
    side_channel: Option<&'a SideChannel>,
    combiner: Option<&'a dyn Combiner>,
    batch_size: usize,
}

impl<'a> Job<'a> {
    /// The default number of records per partition a map task buffers before
    /// spilling a sorted run.
    pub const DEFAULT_BATCH_SIZE: usize = 1_000_000;

    /// Creates a job reading the part files of `input` and writing to `output`.
    ///
    /// The output directory will be created if necessary, and it must not
    /// contain part files when the job is run.
    pub fn new(
        name: impl Into<String>,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        counters: &'a Counters,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.as_ref().to_owned(),
            output: output.as_ref().to_owned(),
            counters,
            side_channel: None,
            combiner: None,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Makes a side channel available to all tasks.
    pub fn side_channel(self, side_channel: &'a SideChannel) -> Self {
        Self {
            side_channel: Some(side_channel),
            ..self
        }
    }

    /// Sets the combiner applied to spilled runs.
    pub fn combiner(self, combiner: Option<&'a dyn Combiner>) -> Self {
        Self { combiner, ..self }
    }

    /// Sets the number of records per partition a map task buffers before
    /// spilling a sorted run.
    pub fn batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn context(&'a self, task: usize) -> TaskContext<'a> {
        TaskContext {
            task,
            input: &self.input,
            counters: self.counters,
            side_channel: self.side_channel,
        }
    }

    fn prepare(&self) -> Result<Vec<PathBuf>> {
        let inputs = part_files(&self.input)?;
        ensure!(
            !inputs.is_empty(),
            "[{}] No part files in {}",
            self.name,
            self.input.display()
        );
        std::fs::create_dir_all(&self.output)
            .with_context(|| format!("Could not create {}", self.output.display()))?;
        ensure!(
            part_files(&self.output)?.is_empty(),
            "[{}] Output directory {} already contains part files",
            self.name,
            self.output.display()
        );
        Ok(inputs)
    }

    /// Runs a map-only job.
    ///
    /// Each input part file is processed by its own mapper, and the output is
    /// written to a part file with the same name in the output directory.
    pub fn run_map_only<M, F>(&'a self, new_mapper: F, pl: &mut impl ConcurrentProgressLog) -> Result<JobStats>
    where
        M: Mapper,
        F: Fn(TaskContext<'a>) -> Result<M> + Sync,
    {
        let inputs = self.prepare()?;
        log::info!(
            "[{}] Running map-only job on {} part files of {}",
            self.name,
            inputs.len(),
            self.input.display()
        );

        pl.item_name("record");
        pl.expected_updates(None);
        pl.start(format!("[{}] Mapping...", self.name));

        let stats = inputs
            .par_iter()
            .enumerate()
            .map_with(pl.clone(), |pl, (task, path)| -> Result<JobStats> {
                let mut mapper = new_mapper(self.context(task))?;
                let name = path
                    .file_name()
                    .with_context(|| format!("Invalid part file name {}", path.display()))?;
                let mut writer = RecordWriter::create(self.output.join(name))?;
                let mut records_read = 0;
                for record in RecordReader::open(path)? {
                    mapper.map(record?, &mut writer)?;
                    records_read += 1;
                    pl.light_update();
                }
                mapper.finish(&mut writer)?;
                Ok(JobStats {
                    records_read,
                    records_written: writer.finish()?,
                })
            })
            .try_reduce(JobStats::default, |a, b| {
                Ok(JobStats {
                    records_read: a.records_read + b.records_read,
                    records_written: a.records_written + b.records_written,
                })
            })?;

        pl.done();
        self.log(&stats);
        Ok(stats)
    }

    /// Runs a map/reduce job.
    ///
    /// Records emitted by the mappers are routed to partitions by
    /// `partitioner`; reduce task `p` receives the keys of partition `p` in
    /// increasing order and writes `part-r-p`. A reduce task runs, and its
    /// [`finish`](Reducer::finish) method is called, even if its partition
    /// received no records.
    pub fn run_map_reduce<M, R, FM, FR>(
        &'a self,
        partitioner: &dyn Partitioner,
        new_mapper: FM,
        new_reducer: FR,
        pl: &mut impl ConcurrentProgressLog,
    ) -> Result<JobStats>
    where
        M: Mapper,
        R: Reducer,
        FM: Fn(TaskContext<'a>) -> Result<M> + Sync,
        FR: Fn(TaskContext<'a>) -> Result<R> + Sync,
    {
        let inputs = self.prepare()?;
        let num_partitions = partitioner.num_partitions();
        log::info!(
            "[{}] Running map/reduce job on {} part files of {} with {} partitions",
            self.name,
            inputs.len(),
            self.input.display(),
            num_partitions
        );

        let tmp_dir = tempfile::Builder::new()
            .prefix("shuffle_")
            .tempdir()
            .context("Could not create temporary directory")?;

        pl.item_name("record");
        pl.expected_updates(None);
        pl.start(format!("[{}] [1/2] Mapping...", self.name));

        // runs[partition] contains the sorted runs of the partition, in map
        // task order
        let (records_read, runs) = inputs
            .par_iter()
            .enumerate()
            .map_with(
                pl.clone(),
                |pl, (task, path)| -> Result<(u64, Vec<Vec<PathBuf>>)> {
                    let mut mapper = new_mapper(self.context(task))?;
                    let mut shuffle = ShuffleWriter::new(
                        tmp_dir.path(),
                        task,
                        partitioner,
                        self.combiner,
                        self.batch_size,
                    );
                    let mut records_read = 0;
                    for record in RecordReader::open(path)? {
                        mapper.map(record?, &mut shuffle)?;
                        records_read += 1;
                        pl.light_update();
                    }
                    mapper.finish(&mut shuffle)?;
                    Ok((records_read, shuffle.finish()?))
                },
            )
            .try_reduce(
                || (0, vec![Vec::new(); num_partitions]),
                |(read1, mut runs1), (read2, runs2)| {
                    for (partition1, partition2) in runs1.iter_mut().zip(runs2) {
                        partition1.extend(partition2);
                    }
                    Ok((read1 + read2, runs1))
                },
            )?;

        pl.done();

        pl.expected_updates(None);
        pl.start(format!("[{}] [2/2] Reducing...", self.name));

        let records_written = runs
            .into_par_iter()
            .enumerate()
            .map_with(pl.clone(), |pl, (partition, runs)| -> Result<u64> {
                let mut reducer = new_reducer(self.context(partition))?;
                let mut writer = RecordWriter::create(self.output.join(reduce_part_name(partition)))?;
                let merged = KMergeRuns::new(
                    runs.iter()
                        .map(RecordReader::open)
                        .collect::<Result<Vec<_>>>()?,
                );
                for group in KeyGroups::new(merged) {
                    let (key, values) = group.with_context(|| {
                        format!("[{}] Could not group partition {partition}", self.name)
                    })?;
                    pl.update_with_count(values.len());
                    reducer.reduce(key, values, &mut writer)?;
                }
                reducer.finish(&mut writer)?;
                writer.finish()
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))?;

        pl.done();
        // the temporary directory is deleted here, after all readers are gone
        drop(tmp_dir);

        let stats = JobStats {
            records_read,
            records_written,
        };
        self.log(&stats);
        Ok(stats)
    }

    fn log(&self, stats: &JobStats) {
        log::info!(
            "[{}] Read {} records, wrote {} records to {}",
            self.name,
            stats.records_read,
            stats.records_written,
            self.output.display()
        );
        self.counters.log(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{HashPartitioner, RangePartitioner};
    use crate::store::{map_part_name, read_generation, RecordWriter};
    use dsi_progress_logger::no_logging;

    struct Double;

    impl Mapper for Double {
        fn map<E: Emit>(&mut self, record: NodeRecord, out: &mut E) -> Result<()> {
            out.emit(record.clone())?;
            out.emit(record)
        }
    }

    /// Keeps one record per key and counts the values in the rank.
    struct CountValues;

    impl Reducer for CountValues {
        fn reduce<E: Emit>(
            &mut self,
            key: NodeId,
            values: Vec<NodeRecord>,
            out: &mut E,
        ) -> Result<()> {
            out.emit(NodeRecord::Mass {
                id: key,
                rank: values.len() as f32,
            })
        }
    }

    /// Emits a marker record from `finish` to check it is always called.
    struct Marker(NodeId);

    impl Reducer for Marker {
        fn reduce<E: Emit>(&mut self, _: NodeId, _: Vec<NodeRecord>, _: &mut E) -> Result<()> {
            Ok(())
        }

        fn finish<E: Emit>(&mut self, out: &mut E) -> Result<()> {
            out.emit(NodeRecord::Mass {
                id: self.0,
                rank: 0.0,
            })
        }
    }

    fn write_input(dir: &Path, files: &[&[NodeId]]) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        for (i, ids) in files.iter().enumerate() {
            let mut writer = RecordWriter::create(dir.join(map_part_name(i)))?;
            for &id in ids.iter() {
                writer.write(&NodeRecord::Mass { id, rank: -1.0 })?;
            }
            writer.finish()?;
        }
        Ok(())
    }

    #[test]
    fn test_map_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in");
        write_input(&input, &[&[3, 1, 2], &[5]])?;
        let counters = Counters::new();
        let job = Job::new("double", &input, dir.path().join("out"), &counters);
        let stats = job.run_map_only(|_| Ok(Double), no_logging![])?;
        assert_eq!(
            stats,
            JobStats {
                records_read: 4,
                records_written: 8
            }
        );
        let ids = read_generation(dir.path().join("out"))?
            .iter()
            .map(NodeRecord::id)
            .collect::<Vec<_>>();
        // order is preserved
        assert_eq!(ids, vec![3, 3, 1, 1, 2, 2, 5, 5]);
        // running again on the same output is an error
        assert!(job.run_map_only(|_| Ok(Double), no_logging![]).is_err());
        Ok(())
    }

    #[test]
    fn test_map_reduce() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in");
        write_input(&input, &[&[9, 1, 4, 1], &[4, 0, 7], &[2]])?;
        let counters = Counters::new();
        let partitioner = RangePartitioner::new(10, 3)?;
        // a tiny batch size forces several runs per partition
        Job::new("count", &input, dir.path().join("out"), &counters)
            .batch_size(1)
            .run_map_reduce(&partitioner, |_| Ok(Double), |_| Ok(CountValues), no_logging![])?;

        let parts = part_files(dir.path().join("out"))?;
        assert_eq!(parts.len(), 3);
        let mut all = Vec::new();
        for (p, path) in parts.iter().enumerate() {
            let records = RecordReader::open(path)?.collect::<Result<Vec<_>>>()?;
            for w in records.windows(2) {
                assert!(w[0].id() < w[1].id());
            }
            for record in &records {
                assert_eq!(partitioner.partition(record.id()), p);
            }
            all.extend(records);
        }
        let counts = all
            .iter()
            .map(|r| (r.id(), r.rank().unwrap() as usize))
            .collect::<Vec<_>>();
        assert_eq!(
            counts,
            vec![(0, 2), (1, 4), (2, 2), (4, 4), (7, 2), (9, 2)]
        );
        Ok(())
    }

    #[test]
    fn test_finish_on_empty_partitions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("in");
        write_input(&input, &[&[0]])?;
        let counters = Counters::new();
        let partitioner = HashPartitioner::new(4)?;
        Job::new("marker", &input, dir.path().join("out"), &counters).run_map_reduce(
            &partitioner,
            |_| Ok(Double),
            |ctx| Ok(Marker(100 + ctx.task as NodeId)),
            no_logging![],
        )?;
        let ids = read_generation(dir.path().join("out"))?
            .iter()
            .map(NodeRecord::id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![100, 101, 102, 103]);
        Ok(())
    }
}
