/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![doc = include_str!("../README.md")]
#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]
#![allow(clippy::type_complexity)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod exec;
pub mod ingest;
pub mod partition;
pub mod rank;
pub mod record;
pub mod store;
pub mod top_k;
pub mod utils;

pub mod prelude {
    pub use crate::exec::{Combiner, Emit, Job, Mapper, Reducer, SideChannel, TaskContext};
    pub use crate::ingest::build_records;
    pub use crate::partition::{
        discover_partition_mapping, partition_graph, HashPartitioner, PartitionMapping,
        Partitioner, PartitionerKind, RangePartitioner,
    };
    pub use crate::rank::{IterationStats, PageRank, Strategy};
    pub use crate::record::{NodeId, NodeRecord, Variant};
    pub use crate::store::{generation_dir, RecordReader, RecordWriter};
    pub use crate::top_k::{extract_top_k, TopK};
    pub use crate::utils::{log_sum_exp, Counter, Counters};
}
