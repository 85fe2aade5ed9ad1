// src/free_energy/regular_solution.rs
//
// Ternary substitutional regular solution per phase:
//
//   Vm g = sum_i x_i G_i + sum_{i<j} L_ij x_i x_j + RT sum_i x_i ln x_i
//
// with i over (Cr, Nb, Ni) and x_Ni = 1 - x_Cr - x_Nb. Unlike the
// paraboloids the Hessian depends on composition, so the parallel-tangent
// solve needs several Newton iterations.

use super::{FreeEnergyModel, Phase};
use crate::params::{EPSILON, RT, VM};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolutionPhase {
    /// Reference energies of pure Cr, Nb, Ni (J/mol).
    pub reference: [f64; 3],
    /// Interaction parameters L_CrNb, L_CrNi, L_NbNi (J/mol).
    pub interaction: [f64; 3],
}

impl SolutionPhase {
    #[inline]
    fn fractions(c: [f64; 2]) -> [f64; 3] {
        let cr = c[0].max(EPSILON);
        let nb = c[1].max(EPSILON);
        let ni = (1.0 - c[0] - c[1]).max(EPSILON);
        [cr, nb, ni]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegularSolutionModel {
    phases: [SolutionPhase; 4],
    rt: f64,
    vm: f64,
}

impl RegularSolutionModel {
    pub fn new(phases: [SolutionPhase; 4], rt: f64, vm: f64) -> Self {
        Self { phases, rt, vm }
    }

    /// Illustrative parameter set with the qualitative IN625 ordering:
    /// delta Nb-rich and Ni-rich, mu Nb-rich, Laves Cr- and Nb-rich.
    pub fn in625_sketch() -> Self {
        let gamma = SolutionPhase {
            reference: [0.0, 0.0, 0.0],
            interaction: [-5000.0, -10000.0, -30000.0],
        };
        let delta = SolutionPhase {
            reference: [8000.0, -6000.0, 1000.0],
            interaction: [-2000.0, -5000.0, -60000.0],
        };
        let mu = SolutionPhase {
            reference: [6000.0, -9000.0, 4000.0],
            interaction: [-8000.0, -4000.0, -40000.0],
        };
        let laves = SolutionPhase {
            reference: [-2000.0, -7000.0, 5000.0],
            interaction: [-30000.0, -6000.0, -20000.0],
        };
        Self::new([gamma, delta, mu, laves], RT, VM)
    }

    /// The same solution parameters for every phase.
    pub fn uniform(phase: SolutionPhase) -> Self {
        Self::new([phase; 4], RT, VM)
    }
}

impl FreeEnergyModel for RegularSolutionModel {
    fn name(&self) -> &'static str {
        "regular-solution"
    }

    fn g(&self, phase: Phase, c: [f64; 2]) -> f64 {
        let p = &self.phases[phase.index()];
        let x = SolutionPhase::fractions(c);
        let (cr, nb, ni) = (c[0], c[1], 1.0 - c[0] - c[1]);
        let reference = cr * p.reference[0] + nb * p.reference[1] + ni * p.reference[2];
        let excess =
            p.interaction[0] * cr * nb + p.interaction[1] * cr * ni + p.interaction[2] * nb * ni;
        let ideal: f64 = x.iter().map(|xi| xi * xi.ln()).sum();
        (reference + excess + self.rt * ideal) / self.vm
    }

    fn dg_dx(&self, phase: Phase, c: [f64; 2]) -> [f64; 2] {
        let p = &self.phases[phase.index()];
        let x = SolutionPhase::fractions(c);
        let (cr, nb, ni) = (c[0], c[1], 1.0 - c[0] - c[1]);
        let [l_crnb, l_crni, l_nbni] = p.interaction;
        let d_cr = p.reference[0] - p.reference[2] + l_crnb * nb + l_crni * (ni - cr)
            - l_nbni * nb
            + self.rt * (x[0].ln() - x[2].ln());
        let d_nb = p.reference[1] - p.reference[2] + l_crnb * cr - l_crni * cr
            + l_nbni * (ni - nb)
            + self.rt * (x[1].ln() - x[2].ln());
        [d_cr / self.vm, d_nb / self.vm]
    }

    fn d2g_dx2(&self, phase: Phase, c: [f64; 2]) -> [[f64; 2]; 2] {
        let p = &self.phases[phase.index()];
        let x = SolutionPhase::fractions(c);
        let [l_crnb, l_crni, l_nbni] = p.interaction;
        let crcr = (-2.0 * l_crni + self.rt * (1.0 / x[0] + 1.0 / x[2])) / self.vm;
        let crnb = (l_crnb - l_crni - l_nbni + self.rt / x[2]) / self.vm;
        let nbnb = (-2.0 * l_nbni + self.rt * (1.0 / x[1] + 1.0 / x[2])) / self.vm;
        [[crcr, crnb], [crnb, nbnb]]
    }

    fn energy_scale(&self) -> f64 {
        self.rt / self.vm
    }
}
