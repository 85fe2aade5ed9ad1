// src/free_energy/parabolic.rs
//
// Second-order expansions of the CALPHAD Gibbs energies about each phase's
// equilibrium composition at 870 C. Each phase is a paraboloid
//
//   g(c) = 1/2 (c - c0)^T H (c - c0)
//
// with a constant Hessian, so the parallel-tangent system is linear.

use super::{FreeEnergyModel, Phase};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paraboloid {
    /// Composition of the minimum (x_Cr, x_Nb).
    pub center: [f64; 2],
    /// Constant Hessian (J/m^3).
    pub hessian: [[f64; 2]; 2],
}

impl Paraboloid {
    pub fn new(center: [f64; 2], crcr: f64, crnb: f64, nbnb: f64) -> Self {
        Self {
            center,
            hessian: [[crcr, crnb], [crnb, nbnb]],
        }
    }

    #[inline]
    fn delta(&self, c: [f64; 2]) -> [f64; 2] {
        [c[0] - self.center[0], c[1] - self.center[1]]
    }

    #[inline]
    pub fn g(&self, c: [f64; 2]) -> f64 {
        let d = self.delta(c);
        let h = &self.hessian;
        0.5 * h[0][0] * d[0] * d[0] + h[0][1] * d[0] * d[1] + 0.5 * h[1][1] * d[1] * d[1]
    }

    #[inline]
    pub fn dg_dx(&self, c: [f64; 2]) -> [f64; 2] {
        let d = self.delta(c);
        let h = &self.hessian;
        [
            h[0][0] * d[0] + h[0][1] * d[1],
            h[1][0] * d[0] + h[1][1] * d[1],
        ]
    }
}

/// IN625 gamma/delta/mu/Laves paraboloids.
#[derive(Debug, Clone, PartialEq)]
pub struct ParabolicModel {
    phases: [Paraboloid; 4],
}

impl ParabolicModel {
    pub fn new(phases: [Paraboloid; 4]) -> Self {
        Self { phases }
    }

    /// Calibrated landscape. The mu paraboloid is centred on the mu
    /// precipitate composition and borrows the delta curvatures.
    pub fn in625() -> Self {
        let gamma = Paraboloid::new(
            [0.55855269488699388, 0.010717747618334031],
            4011345431.1675563,
            14703563128.545319,
            124863466558.63902,
        );
        let delta = Paraboloid::new(
            [0.031881757028651196, 0.16874796371854489],
            31135971022.979225,
            17972099186.595295,
            26766201831.43877,
        );
        let mu = Paraboloid::new(
            [0.05, 0.45],
            31135971022.979225,
            17972099186.595295,
            26766201831.43877,
        );
        let laves = Paraboloid::new(
            [0.44421217837672827, 0.17170586512707406],
            13795701163.367313,
            57317655210.986305,
            268961362549.74149,
        );
        Self::new([gamma, delta, mu, laves])
    }

    /// Replace one phase, keeping the rest.
    pub fn with_phase(mut self, phase: Phase, p: Paraboloid) -> Self {
        self.phases[phase.index()] = p;
        self
    }

    pub fn phase(&self, phase: Phase) -> &Paraboloid {
        &self.phases[phase.index()]
    }
}

impl Default for ParabolicModel {
    fn default() -> Self {
        Self::in625()
    }
}

impl FreeEnergyModel for ParabolicModel {
    fn name(&self) -> &'static str {
        "parabolic"
    }

    fn g(&self, phase: Phase, c: [f64; 2]) -> f64 {
        self.phases[phase.index()].g(c)
    }

    fn dg_dx(&self, phase: Phase, c: [f64; 2]) -> [f64; 2] {
        self.phases[phase.index()].dg_dx(c)
    }

    fn d2g_dx2(&self, phase: Phase, _c: [f64; 2]) -> [[f64; 2]; 2] {
        self.phases[phase.index()].hessian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_energy::test_support::check_derivatives;

    #[test]
    fn gamma_matches_expanded_polynomial() {
        // Expanded form of the gamma paraboloid as generated from the
        // Taylor series of the CALPHAD database.
        let (xcr, xnb) = (0.3, 0.02);
        let expected = 2005672715.5837781 * (xcr - 0.55855269488699388_f64).powi(2)
            + (14703563128.545319 * xcr - 8212714809.8900261) * (xnb - 0.010717747618334031)
            + 62431733279.319511 * (xnb - 0.010717747618334031_f64).powi(2);
        let model = ParabolicModel::in625();
        let g = model.g(Phase::Gamma, [xcr, xnb]);
        assert!(
            (g - expected).abs() / expected.abs() < 1e-9,
            "g_gam = {}, expected {}",
            g,
            expected
        );

        let mu = model.dg_dx(Phase::Gamma, [xcr, xnb]);
        let mu_cr = 4011345431.1675563 * xcr + 14703563128.545319 * xnb - 2398136879.4032598;
        let mu_nb = 14703563128.545319 * xcr + 124863466558.63902 * xnb - 9550969931.2158108;
        assert!((mu[0] - mu_cr).abs() / mu_cr.abs() < 1e-8);
        assert!((mu[1] - mu_nb).abs() / mu_nb.abs() < 1e-8);
    }

    #[test]
    fn minimum_sits_at_center() {
        let model = ParabolicModel::in625();
        for phase in Phase::ALL {
            let p = model.phase(phase);
            assert_eq!(model.g(phase, p.center), 0.0);
            assert_eq!(model.dg_dx(phase, p.center), [0.0, 0.0]);
        }
    }

    #[test]
    fn derivatives_agree_with_finite_differences() {
        let model = ParabolicModel::in625();
        for phase in Phase::ALL {
            check_derivatives(&model, phase, [0.2, 0.1]);
            check_derivatives(&model, phase, [0.01, 0.3]);
        }
    }

    #[test]
    fn hessians_are_positive_definite() {
        let model = ParabolicModel::in625();
        for phase in Phase::ALL {
            let h = model.d2g_dx2(phase, [0.0, 0.0]);
            let det = h[0][0] * h[1][1] - h[0][1] * h[1][0];
            assert!(h[0][0] > 0.0 && det > 0.0, "{:?} not convex", phase);
        }
    }
}
