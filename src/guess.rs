// src/guess.rs
//
// Seeds for the parallel-tangent solve, tried in priority order.

use crate::params::EPSILON;
use crate::vector_field::{Node, NC, NP};

pub type Fictitious = [[f64; NC]; NP + 1];

pub trait GuessStrategy: Sync {
    fn name(&self) -> &'static str;

    /// Starting fictitious compositions for `node`.
    fn seed(&self, node: &Node) -> Fictitious;
}

/// Reuse whatever the node currently carries; during a sweep that is the
/// previous step's converged solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviousSolution;

impl GuessStrategy for PreviousSolution {
    fn name(&self) -> &'static str {
        "previous"
    }

    fn seed(&self, node: &Node) -> Fictitious {
        node.c
    }
}

/// Coarse line-compound approximations of each phase, valid far from
/// equilibrium: gamma at x_Nb = 1.5 %, delta at x_Ni = 75 %, mu at
/// x_Nb = 52.5 %, Laves at x_Nb = 30 %.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCompound;

impl LineCompound {
    pub const GAMMA_NB: f64 = 0.015;
    pub const DELTA_NI: f64 = 0.75;
    pub const MU_NB: f64 = 0.525;
    pub const LAVES_NB: f64 = 0.30;

    fn fixed_nb(x: [f64; NC], nb: f64) -> [f64; NC] {
        let xcr = x[0];
        let xni = (1.0 - xcr - x[1]).max(EPSILON);
        [xcr / (xcr + nb + xni), nb]
    }

    fn fixed_ni(x: [f64; NC], ni: f64) -> [f64; NC] {
        let sum = x[0] + x[1] + ni;
        [x[0] / sum, x[1] / sum]
    }
}

impl GuessStrategy for LineCompound {
    fn name(&self) -> &'static str {
        "line-compound"
    }

    fn seed(&self, node: &Node) -> Fictitious {
        [
            Self::fixed_nb(node.x, Self::GAMMA_NB),
            Self::fixed_ni(node.x, Self::DELTA_NI),
            Self::fixed_nb(node.x, Self::MU_NB),
            Self::fixed_nb(node.x, Self::LAVES_NB),
        ]
    }
}

/// Used inside the time loop.
pub static UPDATE_CHAIN: [&dyn GuessStrategy; 2] = [&PreviousSolution, &LineCompound];

/// Used when building an initial condition, where no previous solution exists.
pub static INITIAL_CHAIN: [&dyn GuessStrategy; 1] = [&LineCompound];
