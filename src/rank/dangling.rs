/*
 * SPDX-FileCopyrightText: 2026 Schimmy-Rank Developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::exec::{Emit, Mapper};
use crate::record::NodeRecord;
use crate::utils::log_sum_exp;
use anyhow::{bail, ensure, Result};

/// Returns the probability lost in an iteration whose aggregated ranks have
/// log-space total `total_mass`, clamped at zero.
pub fn missing_mass(total_mass: f32) -> f32 {
    (1.0 - total_mass.exp()).max(0.0)
}

/// The per-node update of the dangling-mass correction.
///
/// With random-jump probability α, _n_ nodes and missing mass _m_, a node
/// with log-rank _p_ gets
///
/// > ln(α / _n_  +  (1 − α) (e*ᵖ* + _m_ / _n_)),
///
/// computed entirely in log space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DanglingCorrection {
    jump: f32,
    log_link_factor: f32,
    missing_share: f32,
}

impl DanglingCorrection {
    pub fn new(alpha: f32, num_nodes: usize, missing_mass: f32) -> Result<Self> {
        ensure!(
            alpha > 0.0 && alpha < 1.0,
            "The random-jump probability must be in (0 . . 1), got {alpha}"
        );
        ensure!(num_nodes > 0, "The number of nodes must be positive");
        ensure!(
            !missing_mass.is_nan(),
            "The missing mass must be a number"
        );
        let log_n = (num_nodes as f64).ln();
        let missing_mass = missing_mass.max(0.0) as f64;
        Ok(Self {
            jump: ((alpha as f64).ln() - log_n) as f32,
            log_link_factor: (1.0 - alpha as f64).ln() as f32,
            missing_share: (missing_mass.ln() - log_n) as f32,
        })
    }

    /// Returns the corrected log-rank of a node with log-rank `rank`.
    #[inline]
    pub fn apply(&self, rank: f32) -> f32 {
        let link = self.log_link_factor + log_sum_exp(rank, self.missing_share);
        log_sum_exp(self.jump, link)
    }
}

/// The map function of the correction phase.
pub struct DanglingMapper {
    correction: DanglingCorrection,
}

impl DanglingMapper {
    pub fn new(correction: DanglingCorrection) -> Self {
        Self { correction }
    }
}

impl Mapper for DanglingMapper {
    fn map<E: Emit>(&mut self, record: NodeRecord, out: &mut E) -> Result<()> {
        match record {
            NodeRecord::Complete {
                id,
                rank,
                adjacency,
            } => out.emit(NodeRecord::Complete {
                id,
                rank: self.correction.apply(rank),
                adjacency,
            }),
            other => bail!(
                "Expected a complete record, found a {} record for node {}",
                other.variant(),
                other.id()
            ),
        }
    }
}
