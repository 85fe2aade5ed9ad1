// src/params.rs

use serde::{Deserialize, Serialize};

use crate::vector_field::{NC, NP};

/// Numerical zero used for fractions, velocities and clamped compositions.
pub const EPSILON: f64 = 1e-14;

/// Default mesh resolution (m).
pub const MESHRES: f64 = 5.0e-9;

/// Molar gas constant times 870 C aging temperature (J/mol).
pub const RT: f64 = 9504.6886668000006;

/// Molar volume (m^3/mol).
pub const VM: f64 = 1.0e-5;

/// Multi-well height from interfacial energy and a target interface width:
/// omega = 3 * width_factor * sigma / width.
pub fn well_height(sigma: f64, width_factor: f64, width: f64) -> f64 {
    3.0 * width_factor * sigma / width
}

/// Kinetic and energetic coefficients of the phase-field model.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Gradient energy coefficient per secondary phase (J/m).
    pub kappa: [f64; NP],
    /// Allen-Cahn mobility per secondary phase (m^3/(J s)).
    pub mobility: [f64; NP],
    /// Multi-well height per secondary phase (J/m^3).
    pub omega: [f64; NP],
    /// Trijunction penalty coefficient (J/m^3).
    pub alpha: f64,
    /// Interdiffusion matrix acting on the gamma fictitious composition (m^2/s).
    pub diffusivity: [[f64; NC]; NC],
}

impl Material {
    /// Calibrated IN625 constants at 870 C for a given mesh resolution.
    pub fn in625(meshres: f64) -> Self {
        let sigma = 1.01;
        let width_factor = 2.2;
        let width = 10.0 * meshres;
        let omega = well_height(sigma, width_factor, width);
        Self {
            kappa: [1.24e-8; NP],
            mobility: [2.904e-11; NP],
            omega: [omega; NP],
            alpha: 1.07e11,
            diffusivity: [[2.42e-15, 2.47e-15], [0.43e-15, 3.32e-15]],
        }
    }

    /// Linear-stability (von Neumann) limits for an explicit step.
    pub fn stability(&self, dim: usize, dx: f64) -> StabilityLimits {
        let dim = dim.max(1) as f64;
        let lk = self
            .mobility
            .iter()
            .zip(self.kappa.iter())
            .map(|(l, k)| l * k)
            .fold(0.0_f64, f64::max);
        let d = self.diffusivity[0][0].max(self.diffusivity[1][1]);
        StabilityLimits {
            transformation: dx * dx / (2.0 * dim * lk),
            diffusion: dx * dx / (2.0 * dim * d),
        }
    }
}

/// Explicit-step limits: transformation-limited (dtp) and diffusion-limited (dtc).
/// A zero mobility or diffusivity makes the matching limit infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityLimits {
    pub transformation: f64,
    pub diffusion: f64,
}

impl StabilityLimits {
    pub fn min(&self) -> f64 {
        self.transformation.min(self.diffusion)
    }
}

/// Settings of the per-node parallel-tangent solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Euclidean norm of the dimensionless residual counted as converged.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 500,
        }
    }
}

/// Time-integration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Numerics {
    pub meshres: f64,
    /// Fraction of the stability limit used for the initial/fixed timestep.
    pub lin_stab: f64,
    pub solver: SolverSettings,
    pub adaptive: bool,
    /// Maximum interface sweep per step, in units of meshres.
    pub advection_fraction: f64,
    pub scale_up: f64,
    pub scale_down: f64,
    /// Adaptive ceiling as a fraction of min(dtp, dtc).
    pub ceiling_fraction: f64,
}

impl Default for Numerics {
    fn default() -> Self {
        Self {
            meshres: MESHRES,
            lin_stab: 1.0 / 30.12044,
            solver: SolverSettings::default(),
            adaptive: true,
            advection_fraction: 0.125,
            scale_up: 1.1,
            scale_down: 0.8,
            ceiling_fraction: 0.1,
        }
    }
}

impl Numerics {
    pub fn advection_limit(&self) -> f64 {
        self.advection_fraction * self.meshres
    }
}
