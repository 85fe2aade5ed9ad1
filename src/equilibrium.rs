// src/equilibrium.rs
//
// Per-node parallel-tangent construction.
//
// Given the system composition x and the phase fractions n_p of a node, find
// fictitious compositions c_p (gamma, delta, mu, Laves) such that
//
//   sum_p n_p c_p = x                         (mass balance, 2 rows)
//   dg_gam/dx(c_gam) = dg_p/dx(c_p)           (equal diffusion potentials,
//                                              2 rows per secondary phase)
//
// Potential rows are divided by the model's energy scale so that both row
// families are O(1) and a single Euclidean tolerance applies.

use nalgebra::{SMatrix, SVector};

use crate::free_energy::{FreeEnergyModel, Phase};
use crate::guess::{Fictitious, GuessStrategy, LineCompound};
use crate::params::SolverSettings;
use crate::vector_field::{Node, NC, NP};

const N: usize = NC * (NP + 1);
const MAX_HALVINGS: usize = 30;

type Vec8 = SVector<f64, N>;
type Mat8 = SMatrix<f64, N, N>;

/// Fixed inputs of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraints {
    pub x: [f64; NC],
    /// Interpolated fractions (gamma, delta, mu, Laves).
    pub fractions: [f64; NP + 1],
}

impl Constraints {
    pub fn from_node(node: &Node) -> Self {
        Self {
            x: node.x,
            fractions: node.fractions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub converged: bool,
    /// Euclidean norm of the scaled residual at exit.
    pub residual: f64,
    pub iterations: usize,
}

/// Outcome of `equilibrate` for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Equilibration {
    /// The first guess strategy converged.
    pub first_try_converged: bool,
    /// Some guess strategy converged; otherwise the line-compound estimate
    /// was written.
    pub resolved: bool,
}

/// Damped Newton solver for the 8x8 parallel-tangent system.
///
/// One instance per worker thread; it owns its Jacobian scratch.
#[derive(Debug, Clone)]
pub struct ParallelTangentSolver {
    pub settings: SolverSettings,
    jacobian: Mat8,
}

impl ParallelTangentSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            jacobian: Mat8::zeros(),
        }
    }

    /// Scaled residual vector for the fictitious compositions `c`.
    pub fn residual(
        &self,
        model: &dyn FreeEnergyModel,
        cons: &Constraints,
        c: &Fictitious,
    ) -> [f64; N] {
        let r = residual_vec(model, cons, &pack(c));
        let mut out = [0.0; N];
        out.copy_from_slice(r.as_slice());
        out
    }

    /// Newton iteration from the compositions in `c`. `c` is overwritten only
    /// when the solve converges.
    pub fn solve(
        &mut self,
        model: &dyn FreeEnergyModel,
        cons: &Constraints,
        c: &mut Fictitious,
    ) -> SolveReport {
        let tol = self.settings.tolerance;
        let max_iter = self.settings.max_iterations;

        let mut u = pack(c);
        let mut f = residual_vec(model, cons, &u);
        let mut norm = f.norm();

        for iter in 0..=max_iter {
            if !norm.is_finite() {
                return failed(norm, iter);
            }
            if norm <= tol {
                *c = unpack(&u);
                return SolveReport {
                    converged: true,
                    residual: norm,
                    iterations: iter,
                };
            }
            if iter == max_iter {
                break;
            }

            self.fill_jacobian(model, cons, &u);
            let Some(step) = self.jacobian.lu().solve(&(-f)) else {
                return failed(norm, iter);
            };

            // backtrack until the residual strictly decreases
            let mut lambda = 1.0;
            let mut improved = false;
            for _ in 0..=MAX_HALVINGS {
                let trial = u + step * lambda;
                let ft = residual_vec(model, cons, &trial);
                let nt = ft.norm();
                if nt.is_finite() && nt < norm {
                    u = trial;
                    f = ft;
                    norm = nt;
                    improved = true;
                    break;
                }
                lambda *= 0.5;
            }
            if !improved {
                return failed(norm, iter + 1);
            }
        }
        failed(norm, max_iter)
    }

    fn fill_jacobian(&mut self, model: &dyn FreeEnergyModel, cons: &Constraints, u: &Vec8) {
        let scale = model.energy_scale();
        let jac = &mut self.jacobian;
        jac.fill(0.0);

        // mass rows
        for p in 0..=NP {
            for i in 0..NC {
                jac[(i, NC * p + i)] = -cons.fractions[p];
            }
        }

        let h_gam = model.d2g_dx2(Phase::Gamma, [u[0], u[1]]);
        for phase in Phase::SECONDARY {
            let p = phase.index();
            let h_p = model.d2g_dx2(phase, [u[NC * p], u[NC * p + 1]]);
            for i in 0..NC {
                let row = NC * p + i;
                for j in 0..NC {
                    jac[(row, j)] = h_gam[i][j] / scale;
                    jac[(row, NC * p + j)] = -h_p[i][j] / scale;
                }
            }
        }
    }
}

fn failed(residual: f64, iterations: usize) -> SolveReport {
    SolveReport {
        converged: false,
        residual,
        iterations,
    }
}

#[inline]
fn pack(c: &Fictitious) -> Vec8 {
    Vec8::from_fn(|k, _| c[k / NC][k % NC])
}

#[inline]
fn unpack(u: &Vec8) -> Fictitious {
    let mut c = [[0.0; NC]; NP + 1];
    for (k, v) in u.iter().enumerate() {
        c[k / NC][k % NC] = *v;
    }
    c
}

fn residual_vec(model: &dyn FreeEnergyModel, cons: &Constraints, u: &Vec8) -> Vec8 {
    let scale = model.energy_scale();
    let mut f = Vec8::zeros();

    for i in 0..NC {
        let mut mixed = 0.0;
        for p in 0..=NP {
            mixed += cons.fractions[p] * u[NC * p + i];
        }
        f[i] = cons.x[i] - mixed;
    }

    let mu_gam = model.dg_dx(Phase::Gamma, [u[0], u[1]]);
    for phase in Phase::SECONDARY {
        let p = phase.index();
        let mu_p = model.dg_dx(phase, [u[NC * p], u[NC * p + 1]]);
        for i in 0..NC {
            f[NC * p + i] = (mu_gam[i] - mu_p[i]) / scale;
        }
    }
    f
}

/// Re-solve the fictitious compositions of `node`, trying each strategy of
/// `chain` in order. If none converges the line-compound estimate is written
/// so the node still carries finite values.
pub fn equilibrate(
    node: &mut Node,
    model: &dyn FreeEnergyModel,
    solver: &mut ParallelTangentSolver,
    chain: &[&dyn GuessStrategy],
) -> Equilibration {
    let cons = Constraints::from_node(node);
    for (k, strategy) in chain.iter().enumerate() {
        let mut c = strategy.seed(node);
        if solver.solve(model, &cons, &mut c).converged {
            node.c = c;
            return Equilibration {
                first_try_converged: k == 0,
                resolved: true,
            };
        }
    }
    node.c = LineCompound.seed(node);
    Equilibration {
        first_try_converged: false,
        resolved: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_energy::{ParabolicModel, RegularSolutionModel, SolutionPhase};
    use crate::guess::{PreviousSolution, INITIAL_CHAIN, UPDATE_CHAIN};

    fn interface_node() -> Node {
        let mut node = Node::default();
        node.x = [0.15, 0.15];
        node.phi = [0.5, 0.0, 0.0];
        node
    }

    fn norm(r: &[f64]) -> f64 {
        r.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    #[test]
    fn converged_solution_satisfies_residual() {
        let model = ParabolicModel::in625();
        let mut solver = ParallelTangentSolver::new(SolverSettings::default());
        let mut node = interface_node();

        let out = equilibrate(&mut node, &model, &mut solver, &INITIAL_CHAIN);
        assert!(out.resolved && out.first_try_converged);

        let cons = Constraints::from_node(&node);
        let r = solver.residual(&model, &cons, &node.c);
        assert!(norm(&r) <= solver.settings.tolerance);

        // mass balance in unscaled units
        let n = node.fractions();
        for i in 0..NC {
            let mixed: f64 = (0..=NP).map(|p| n[p] * node.c[p][i]).sum();
            assert!((mixed - node.x[i]).abs() <= 1e-8);
        }
        // equal potentials between gamma and delta
        let mg = model.dg_dx(Phase::Gamma, node.c[0]);
        let md = model.dg_dx(Phase::Delta, node.c[1]);
        for i in 0..NC {
            assert!((mg[i] - md[i]).abs() / model.energy_scale() <= 1e-8);
        }
    }

    #[test]
    fn residual_vanishes_across_compositions_and_fractions() {
        let models: [Box<dyn FreeEnergyModel>; 2] = [
            Box::new(ParabolicModel::in625()),
            Box::new(RegularSolutionModel::in625_sketch()),
        ];
        let compositions = [[0.15, 0.15], [0.30, 0.02], [0.25, 0.10]];
        let fractions = [
            [0.5, 0.0, 0.0],
            [0.3, 0.4, 0.0],
            [0.2, 0.2, 0.2],
            [0.7, 0.0, 0.05],
            [-0.6, 0.0, 0.3],
        ];
        for model in models.iter() {
            let mut solver = ParallelTangentSolver::new(SolverSettings::default());
            for x in compositions {
                for phi in fractions {
                    let mut node = Node::default();
                    node.x = x;
                    node.phi = phi;
                    let out = equilibrate(&mut node, model.as_ref(), &mut solver, &INITIAL_CHAIN);
                    assert!(out.resolved, "{} at x {:?}, phi {:?}", model.name(), x, phi);

                    let r = solver.residual(model.as_ref(), &Constraints::from_node(&node), &node.c);
                    assert!(
                        norm(&r) <= solver.settings.tolerance,
                        "{} at x {:?}, phi {:?}: |r| = {:e}",
                        model.name(),
                        x,
                        phi,
                        norm(&r)
                    );
                }
            }
        }
    }

    #[test]
    fn linear_landscape_converges_in_one_step() {
        let model = ParabolicModel::in625();
        let mut solver = ParallelTangentSolver::new(SolverSettings::default());
        let node = interface_node();
        let mut c = LineCompound.seed(&node);
        let report = solver.solve(&model, &Constraints::from_node(&node), &mut c);
        assert!(report.converged);
        assert!(report.iterations <= 2, "{:?}", report);
    }

    #[test]
    fn identical_phases_share_the_system_composition() {
        let model = RegularSolutionModel::uniform(SolutionPhase {
            reference: [1000.0, -2000.0, 0.0],
            interaction: [0.0; 3],
        });
        let mut solver = ParallelTangentSolver::new(SolverSettings::default());
        let mut node = Node::default();
        node.x = [0.3, 0.2];
        node.phi = [0.6, -0.3, 0.2];
        node.c = [[0.32, 0.19], [0.28, 0.22], [0.31, 0.18], [0.29, 0.21]];

        let out = equilibrate(&mut node, &model, &mut solver, &[&PreviousSolution]);
        assert!(out.resolved);
        for cp in node.c.iter() {
            assert!((cp[0] - 0.3).abs() < 1e-8, "{:?}", node.c);
            assert!((cp[1] - 0.2).abs() < 1e-8, "{:?}", node.c);
        }
    }

    #[test]
    fn bad_previous_solution_falls_through_to_line_compound() {
        let model = ParabolicModel::in625();
        let mut solver = ParallelTangentSolver::new(SolverSettings::default());
        let mut node = interface_node();
        node.c = [[f64::NAN; NC]; NP + 1];

        let out = equilibrate(&mut node, &model, &mut solver, &UPDATE_CHAIN);
        assert!(out.resolved);
        assert!(!out.first_try_converged);
        assert!(node.c.iter().flatten().all(|v| v.is_finite()));
    }

    struct Broken;

    impl FreeEnergyModel for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn g(&self, _: Phase, _: [f64; 2]) -> f64 {
            f64::NAN
        }
        fn dg_dx(&self, _: Phase, _: [f64; 2]) -> [f64; 2] {
            [f64::NAN; 2]
        }
        fn d2g_dx2(&self, _: Phase, _: [f64; 2]) -> [[f64; 2]; 2] {
            [[f64::NAN; 2]; 2]
        }
    }

    #[test]
    fn unsolvable_node_keeps_line_compound_estimate() {
        let mut solver = ParallelTangentSolver::new(SolverSettings::default());
        let mut node = interface_node();
        let mut c = node.c;
        let report = solver.solve(&Broken, &Constraints::from_node(&node), &mut c);
        assert!(!report.converged);
        assert_eq!(c, node.c);

        let out = equilibrate(&mut node, &Broken, &mut solver, &UPDATE_CHAIN);
        assert!(!out.resolved && !out.first_try_converged);
        assert_eq!(node.c, LineCompound.seed(&node));
    }
}
