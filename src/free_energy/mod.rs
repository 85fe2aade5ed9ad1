// src/free_energy/mod.rs
//
// Free-energy landscapes of the four phases as functions of the (Cr, Nb)
// mole fractions; Ni is the dependent component.
//
// Energies are densities (J/m^3). Every model is pure and shared read-only
// by all worker threads.

pub mod parabolic;
pub mod regular_solution;

pub use parabolic::{Paraboloid, ParabolicModel};
pub use regular_solution::{RegularSolutionModel, SolutionPhase};

/// Crystallographic phases. Gamma is the matrix; the others are the
/// secondary phases carried as order parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Gamma,
    Delta,
    Mu,
    Laves,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Gamma, Phase::Delta, Phase::Mu, Phase::Laves];
    pub const SECONDARY: [Phase; 3] = [Phase::Delta, Phase::Mu, Phase::Laves];

    /// Position in `ALL` (and in the fictitious-composition block of a node).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Phase::Gamma => 0,
            Phase::Delta => 1,
            Phase::Mu => 2,
            Phase::Laves => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Gamma => "gamma",
            Phase::Delta => "delta",
            Phase::Mu => "mu",
            Phase::Laves => "laves",
        }
    }
}

/// Composition-dependent free energy of each phase.
pub trait FreeEnergyModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Free-energy density g(c) of `phase` at composition `c = [x_Cr, x_Nb]`.
    fn g(&self, phase: Phase, c: [f64; 2]) -> f64;

    /// First derivatives (diffusion potentials) [dg/dx_Cr, dg/dx_Nb].
    fn dg_dx(&self, phase: Phase, c: [f64; 2]) -> [f64; 2];

    /// Symmetric Hessian [[CrCr, CrNb], [NbCr, NbNb]].
    fn d2g_dx2(&self, phase: Phase, c: [f64; 2]) -> [[f64; 2]; 2];

    /// Characteristic energy density used to make potential residuals
    /// dimensionless.
    fn energy_scale(&self) -> f64 {
        crate::params::RT / crate::params::VM
    }
}
