// src/stepper.rs
//
// One explicit sweep of the coupled diffusion / Allen-Cahn equations.
//
// Reads only the old buffer (whose halo must already be filled) and writes
// only the interior of the new buffer, so nodes are independent and the
// sweep runs in parallel with one equilibrium solver per worker.

use rayon::prelude::*;

use crate::energy::{h_prime, sign};
use crate::equilibrium::{equilibrate, Equilibration, ParallelTangentSolver};
use crate::free_energy::{FreeEnergyModel, Phase};
use crate::guess::UPDATE_CHAIN;
use crate::params::{Material, SolverSettings};
use crate::vector_field::{Node, Stencil, VectorField, NC, NP};

/// Read-only inputs shared by every node of a sweep.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub model: &'a dyn FreeEnergyModel,
    pub material: &'a Material,
    pub solver: SolverSettings,
}

/// Equilibrium-solver outcomes of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Nodes whose first guess did not converge.
    pub failures: usize,
    /// Nodes where no guess converged.
    pub unresolved: usize,
}

impl SweepStats {
    pub fn merge(self, other: Self) -> Self {
        Self {
            failures: self.failures + other.failures,
            unresolved: self.unresolved + other.unresolved,
        }
    }
}

impl From<Equilibration> for SweepStats {
    fn from(e: Equilibration) -> Self {
        Self {
            failures: usize::from(!e.first_try_converged),
            unresolved: usize::from(!e.resolved),
        }
    }
}

/// Chemical driving force for each secondary phase relative to gamma:
/// P_i = g_gam - g_i - (c_gam - c_i) . mu, with mu the gamma diffusion
/// potential.
pub fn chemical_driving_force(node: &Node, model: &dyn FreeEnergyModel) -> [f64; NP] {
    let c_gam = node.c[0];
    let g_gam = model.g(Phase::Gamma, c_gam);
    let mu = model.dg_dx(Phase::Gamma, c_gam);

    let mut p = [0.0; NP];
    for phase in Phase::SECONDARY {
        let k = phase.index();
        let c = node.c[k];
        let tangent = (c_gam[0] - c[0]) * mu[0] + (c_gam[1] - c[1]) * mu[1];
        p[k - 1] = g_gam - model.g(phase, c) - tangent;
    }
    p
}

/// Variational derivative dF/dphi_i of the free-energy functional.
pub fn variational_derivative(
    node: &Node,
    lap_phi: [f64; NP],
    model: &dyn FreeEnergyModel,
    material: &Material,
) -> [f64; NP] {
    let pressure = chemical_driving_force(node, model);
    let sq = node.phi.map(|p| p * p);
    let sq_total: f64 = sq.iter().sum();

    let mut df = [0.0; NP];
    for i in 0..NP {
        let phi = node.phi[i];
        let a = phi.abs();
        let chemical = -sign(phi) * h_prime(a) * pressure[i];
        let well = 2.0 * material.omega[i] * phi * (1.0 - a) * (1.0 - 2.0 * a);
        let junction = 4.0 * material.alpha * phi * (sq_total - sq[i]);
        let gradient = -material.kappa[i] * lap_phi[i];
        df[i] = chemical + well + junction + gradient;
    }
    df
}

/// Advance one node by `dt` and re-solve its fictitious compositions.
pub fn step_node(
    s: &Stencil<'_>,
    dt: f64,
    ctx: &StepContext<'_>,
    solver: &mut ParallelTangentSolver,
) -> (Node, Equilibration) {
    let old = s.center;
    let mat = ctx.material;

    let lap_c = [s.laplacian(|n| n.c[0][0]), s.laplacian(|n| n.c[0][1])];
    let mut lap_phi = [0.0; NP];
    for (i, l) in lap_phi.iter_mut().enumerate() {
        *l = s.laplacian(|n| n.phi[i]);
    }

    let mut next = *old;
    for i in 0..NC {
        let flux_div: f64 = (0..NC).map(|j| mat.diffusivity[i][j] * lap_c[j]).sum();
        next.x[i] = old.x[i] + dt * flux_div;
    }

    let df = variational_derivative(old, lap_phi, ctx.model, mat);
    for i in 0..NP {
        next.phi[i] = old.phi[i] - dt * mat.mobility[i] * df[i];
    }
    next.v = 0.0;

    // next.c still holds the old compositions: the first guess
    let outcome = equilibrate(&mut next, ctx.model, solver, &UPDATE_CHAIN);
    (next, outcome)
}

/// Sweep every interior node of `old` into `new`. Halo cells of `new` are
/// left untouched.
pub fn sweep(old: &VectorField, new: &mut VectorField, ctx: &StepContext<'_>, dt: f64) -> SweepStats {
    debug_assert_eq!(old.grid, new.grid);
    let grid = old.grid;
    new.data
        .par_iter_mut()
        .enumerate()
        .map_init(
            || ParallelTangentSolver::new(ctx.solver),
            |solver, (k, out)| {
                let Some((i, j)) = grid.interior_coords(k) else {
                    return SweepStats::default();
                };
                let (node, outcome) = step_node(&old.stencil(i, j), dt, ctx, solver);
                *out = node;
                SweepStats::from(outcome)
            },
        )
        .reduce(SweepStats::default, SweepStats::merge)
}
