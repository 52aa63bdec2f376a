/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Partitioned PageRank in log space.
//!
//! Each iteration is made of two phases:
//!
//! 1. _mass propagation_: every node splits its probability evenly among its
//!    successors ([`MassMapper`]); the messages are shuffled and summed per
//!    destination, and the sums are joined with the structure of the
//!    destination to obtain the new generation of records;
//! 2. _dangling-mass correction_: the probability lost at nodes without
//!    successors, together with the random jump, is redistributed uniformly
//!    ([`DanglingCorrection`]).
//!
//! The two [strategies](Strategy) differ in how the structure reaches the
//! aggregation stage. [`Basic`](Strategy::Basic) ships every node's adjacency
//! through the shuffle along with the messages; [`Schimmy`](Strategy::Schimmy)
//! ships only messages, and each reduce task merge-joins them with the part
//! file of the previous generation holding its partition ([`MergeJoin`]).
//! Both produce the same ranks.
//!
//! All probabilities are natural logarithms and are combined with
//! [`log_sum_exp`](crate::utils::log_sum_exp).

pub use crate::exec::ConsistencyError;

mod propagate;
pub use propagate::*;

mod basic;
pub use basic::*;

mod schimmy;
pub use schimmy::*;

mod dangling;
pub use dangling::*;

mod driver;
pub use driver::*;

/// The default random-jump probability.
pub const DEFAULT_ALPHA: f32 = 0.15;

/// How graph structure reaches the aggregation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Strategy {
    /// Structure records are shuffled together with mass messages.
    #[default]
    Basic,
    /// Only mass messages are shuffled; structure is merge-joined from the
    /// previous generation.
    Schimmy,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Basic => f.write_str("basic"),
            Strategy::Schimmy => f.write_str("schimmy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::default().to_string(), "basic");
        assert_eq!(format!("iter0001-{}", Strategy::Schimmy), "iter0001-schimmy");
    }
}
