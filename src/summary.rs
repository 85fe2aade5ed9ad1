// src/summary.rs
//
// Grid-wide diagnostics of an accepted step: mean composition, mean phase
// fractions, total free energy and the fastest interface.

use rayon::prelude::*;

use crate::energy::local_energy;
use crate::stepper::StepContext;
use crate::timestep::node_velocity;
use crate::vector_field::{Node, Stencil, VectorField, NC, NP};

/// Partial sums over a set of nodes. Summaries of disjoint node sets combine
/// with `merge`, in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub nodes: usize,
    pub x_sum: [f64; NC],
    /// Sums of gamma, delta, mu, Laves fractions.
    pub fraction_sum: [f64; NP + 1],
    /// Total free energy (J).
    pub energy: f64,
    /// Maximum interface velocity (m/s).
    pub velocity: f64,
    /// Nodes whose first equilibrium guess failed during the step.
    pub failures: usize,
}

impl Summary {
    fn node(node: &Node, energy: f64, velocity: f64) -> Self {
        Self {
            nodes: 1,
            x_sum: node.x,
            fraction_sum: node.fractions(),
            energy,
            velocity,
            failures: 0,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        let mut x_sum = self.x_sum;
        for (a, b) in x_sum.iter_mut().zip(other.x_sum) {
            *a += b;
        }
        let mut fraction_sum = self.fraction_sum;
        for (a, b) in fraction_sum.iter_mut().zip(other.fraction_sum) {
            *a += b;
        }
        Self {
            nodes: self.nodes + other.nodes,
            x_sum,
            fraction_sum,
            energy: self.energy + other.energy,
            velocity: self.velocity.max(other.velocity),
            failures: self.failures + other.failures,
        }
    }

    pub fn mean_x(&self) -> [f64; NC] {
        let n = self.nodes.max(1) as f64;
        self.x_sum.map(|s| s / n)
    }

    pub fn mean_fractions(&self) -> [f64; NP + 1] {
        let n = self.nodes.max(1) as f64;
        self.fraction_sum.map(|s| s / n)
    }
}

/// Free energy of one node including its forward-face gradient energy (J/m^3).
pub fn node_energy(s: &Stencil<'_>, ctx: &StepContext<'_>) -> f64 {
    let mut e = local_energy(s.center, ctx.model, ctx.material);
    for i in 0..NP {
        e += 0.5 * ctx.material.kappa[i] * s.forward_gradient_sq(|n| n.phi[i]);
    }
    e
}

/// Total free energy of a field whose halo is filled.
pub fn total_energy(field: &VectorField, ctx: &StepContext<'_>) -> f64 {
    let g = field.grid;
    let sum: f64 = (0..g.n_nodes())
        .into_par_iter()
        .map(|k| node_energy(&field.stencil((k % g.nx) as isize, (k / g.nx) as isize), ctx))
        .sum();
    sum * g.dv()
}

/// Summarize the state in `new` after a step of length `dt` from `old`, and
/// store each node's interface velocity in `new`. The halo of `new` must be
/// filled.
pub fn summarize(old: &VectorField, new: &mut VectorField, dt: f64, ctx: &StepContext<'_>) -> Summary {
    let g = new.grid;
    let dv = g.dv();

    let (summary, velocities): (Summary, Vec<f64>) = {
        let new_ref: &VectorField = new;
        let per_node: Vec<(Summary, f64)> = (0..g.n_nodes())
            .into_par_iter()
            .map(|k| {
                let (i, j) = ((k % g.nx) as isize, (k / g.nx) as isize);
                let s = new_ref.stencil(i, j);
                let v = node_velocity(old.at(i, j), &s, dt);
                (Summary::node(s.center, dv * node_energy(&s, ctx), v), v)
            })
            .collect();
        let summary = per_node
            .par_iter()
            .map(|(s, _)| *s)
            .reduce(Summary::default, Summary::merge);
        (summary, per_node.into_iter().map(|(_, v)| v).collect())
    };

    for (k, v) in velocities.into_iter().enumerate() {
        new.at_mut((k % g.nx) as isize, (k / g.nx) as isize).v = v;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_energy::{FreeEnergyModel, ParabolicModel, Phase};
    use crate::grid::{Boundary, Grid};
    use crate::params::{Material, SolverSettings};

    #[test]
    fn merge_is_order_independent() {
        let mut a = Node::default();
        a.x = [0.2, 0.1];
        a.phi = [1.0, 0.0, 0.0];
        let mut b = Node::default();
        b.x = [0.4, 0.0];

        let sa = Summary::node(&a, 2.0, 1e-9);
        let sb = Summary::node(&b, 3.0, 5e-9);
        let ab = sa.merge(sb);
        assert_eq!(ab, sb.merge(sa));
        assert_eq!(ab.nodes, 2);
        assert!((ab.mean_x()[0] - 0.3).abs() < 1e-15);
        assert_eq!(ab.mean_fractions(), [0.5, 0.5, 0.0, 0.0]);
        assert_eq!(ab.energy, 5.0);
        assert_eq!(ab.velocity, 5e-9);
    }

    #[test]
    fn step_profile_energy_counts_each_face_once() {
        let gamma = *ParabolicModel::in625().phase(Phase::Gamma);
        let model = ParabolicModel::new([gamma; 4]);
        let mut mat = Material::in625(1.0);
        mat.omega = [0.0; NP];
        mat.alpha = 0.0;
        mat.kappa = [2.0; NP];
        let ctx = StepContext {
            model: &model,
            material: &mat,
            solver: SolverSettings::default(),
        };

        let mut field = VectorField::new(Grid::line(4, 1.0, Boundary::Neumann));
        let center = gamma.center;
        for i in 0..4 {
            let n = field.at_mut(i, 0);
            n.c = [center; NP + 1];
            n.phi[1] = if i < 2 { 0.0 } else { 1.0 };
        }
        field.fill_halo();

        // one unit jump across one face: kappa / 2 * 1^2
        assert!((total_energy(&field, &ctx) - 1.0).abs() < 1e-12);
        assert_eq!(model.g(Phase::Mu, center), 0.0);
    }

    #[test]
    fn summarize_writes_velocity_slot() {
        let model = ParabolicModel::in625();
        let mat = Material::in625(1.0);
        let ctx = StepContext {
            model: &model,
            material: &mat,
            solver: SolverSettings::default(),
        };
        let grid = Grid::line(5, 1.0, Boundary::Neumann);
        let mut old = VectorField::new(grid);
        let mut new = VectorField::new(grid);
        for i in 0..5 {
            old.at_mut(i, 0).phi[0] = 0.1 * i as f64 + 0.25;
            new.at_mut(i, 0).phi[0] = 0.1 * i as f64 + 0.30;
        }
        new.fill_halo();

        let s = summarize(&old, &mut new, 1.0, &ctx);
        assert_eq!(s.nodes, 5);
        assert!(new.at(2, 0).v > 0.0);
        assert_eq!(new.at(4, 0).v, 0.0);
        assert_eq!(s.velocity, new.interior().map(|n| n.v).fold(0.0, f64::max));
    }
}
