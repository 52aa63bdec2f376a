/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::Partitioner;
use crate::store::{part_files, RecordReader};
use anyhow::{bail, ensure, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A map from partition index to the name of the part file, within its
/// generation, holding the nodes of that partition.
///
/// The textual form, used to hand the mapping to reduce tasks through the
/// [side channel](crate::exec::SideChannel), is a `;`-separated list of
/// `index=name` entries. Names are resolved by the reader against the
/// generation directory, so the location of the generation does not appear
/// in the text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionMapping {
    files: BTreeMap<usize, String>,
}

impl PartitionMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates the part file `name` with `partition`, returning the
    /// previous name, if any.
    ///
    /// The name must be a plain file name not containing `;` or `=`.
    pub fn insert(&mut self, partition: usize, name: impl Into<String>) -> Result<Option<String>> {
        let name = name.into();
        ensure!(
            !name.is_empty()
                && !name.contains([';', '=', '/', '\\'])
                && name != "."
                && name != "..",
            "Invalid part-file name {name:?} in partition mapping"
        );
        Ok(self.files.insert(partition, name))
    }

    pub fn get(&self, partition: usize) -> Option<&str> {
        self.files.get(&partition).map(String::as_str)
    }

    /// Returns the path of the part file of `partition` in `generation`.
    pub fn resolve(&self, generation: impl AsRef<Path>, partition: usize) -> Option<PathBuf> {
        self.get(partition).map(|name| generation.as_ref().join(name))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.files.iter().map(|(&p, name)| (p, name.as_str()))
    }
}

impl std::fmt::Display for PartitionMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (partition, name)) in self.files.iter().enumerate() {
            if i != 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", partition, name)?;
        }
        Ok(())
    }
}

impl FromStr for PartitionMapping {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut mapping = Self::new();
        for entry in s.split(';').filter(|entry| !entry.is_empty()) {
            let (partition, name) = entry
                .split_once('=')
                .with_context(|| format!("Malformed partition-mapping entry {entry:?}"))?;
            let partition = partition
                .parse()
                .with_context(|| format!("Malformed partition index in {entry:?}"))?;
            if mapping.insert(partition, name)?.is_some() {
                bail!("Partition {partition} appears twice in the mapping");
            }
        }
        Ok(mapping)
    }
}

/// Discovers which part file of `generation` holds which partition.
///
/// The first record of each part file is run through `partitioner`; the part
/// files must have been laid out by the same partitioner, so the partition of
/// their first record is the partition of all their records. Empty part files
/// are skipped. Two files claiming the same partition is an error.
pub fn discover_partition_mapping(
    generation: impl AsRef<Path>,
    partitioner: &dyn Partitioner,
) -> Result<PartitionMapping> {
    let generation = generation.as_ref();
    let mut mapping = PartitionMapping::new();
    for path in part_files(generation)? {
        let first = match RecordReader::open(&path)?.next() {
            Some(record) => record?,
            None => {
                log::debug!("Skipping empty part file {}", path.display());
                continue;
            }
        };
        let partition = partitioner.partition(first.id());
        log::debug!(
            "Node {} of {} is in partition {}",
            first.id(),
            path.display(),
            partition
        );
        let name = path
            .file_name()
            .with_context(|| format!("Invalid part file name {}", path.display()))?
            .to_str()
            .with_context(|| format!("Part file name {} is not valid UTF-8", path.display()))?;
        if let Some(previous) = mapping.insert(partition, name)? {
            bail!(
                "Both {} and {} of {} hold partition {}: was the generation laid out with a different partitioner?",
                previous,
                name,
                generation.display(),
                partition
            );
        }
    }

    for partition in 0..partitioner.num_partitions() {
        if mapping.get(partition).is_none() {
            log::warn!(
                "No part file of {} holds partition {}",
                generation.display(),
                partition
            );
        }
    }
    log::info!(
        "Discovered {} partitions in {}",
        mapping.len(),
        generation.display()
    );
    Ok(mapping)
}
