/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::partition::PartitionMapping;
use crate::utils::log_sum_exp_all;
use anyhow::{ensure, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A directory of small named values shared between the tasks of a job and
/// the driver.
///
/// Writes are atomic: a value is written to a temporary file in the same
/// directory and then renamed, so readers see either nothing or the whole
/// value. Keys are plain file names and must not start with a dot.
#[derive(Debug, Clone)]
pub struct SideChannel {
    dir: PathBuf,
}

impl SideChannel {
    /// Key of the serialized partition mapping.
    pub const PARTITION_MAPPING: &'static str = "partition-mapping";

    /// Opens (creating it if necessary) the side channel in `dir`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_owned();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Could not create side channel {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_key(key: &str) -> Result<()> {
        ensure!(
            !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\']),
            "Invalid side-channel key {key:?}"
        );
        Ok(())
    }

    /// Atomically stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        Self::check_key(key)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.dir)
            .with_context(|| format!("Could not create temporary file in {}", self.dir.display()))?;
        tmp.write_all(value)?;
        tmp.flush()?;
        let path = self.dir.join(key);
        tmp.persist(&path)
            .with_context(|| format!("Could not persist {}", path.display()))?;
        Ok(())
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Self::check_key(key)?;
        let path = self.dir.join(key);
        match std::fs::read(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Could not read {}", path.display())),
        }
    }

    /// Returns the keys currently stored, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Could not list {}", self.dir.display()))?
        {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Stores the total log-mass held by the nodes of a partition.
    pub fn put_mass(&self, partition: usize, mass: f32) -> Result<()> {
        self.put(&format!("mass-{partition:05}"), &mass.to_bits().to_be_bytes())
    }

    /// Returns the log-space sum of all the masses stored by
    /// [`put_mass`](Self::put_mass), together with the number of masses.
    pub fn total_mass(&self) -> Result<(f32, usize)> {
        let mut masses = Vec::new();
        for key in self.keys()? {
            if !key.starts_with("mass-") {
                continue;
            }
            let value = self.get(&key)?.unwrap_or_default();
            let bytes: [u8; 4] = value
                .as_slice()
                .try_into()
                .with_context(|| format!("Side-channel mass {key} has {} bytes", value.len()))?;
            masses.push(f32::from_bits(u32::from_be_bytes(bytes)));
        }
        Ok((log_sum_exp_all(masses.iter().copied()), masses.len()))
    }

    pub fn put_partition_mapping(&self, mapping: &PartitionMapping) -> Result<()> {
        self.put(Self::PARTITION_MAPPING, mapping.to_string().as_bytes())
    }

    pub fn get_partition_mapping(&self) -> Result<Option<PartitionMapping>> {
        self.get(Self::PARTITION_MAPPING)?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .context("Partition mapping is not valid UTF-8")?
                    .parse()
            })
            .transpose()
    }
}
