// src/energy.rs
//
// Interpolation functions and the local free-energy density of a node.

use crate::free_energy::{FreeEnergyModel, Phase};
use crate::params::Material;
use crate::vector_field::{Node, NP};

/// Smoothstep interpolation p^3 (6p^2 - 15p + 10). The argument is clamped to
/// [0, 1] so an overshooting order parameter still maps to a physical fraction.
#[inline]
pub fn h(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    p * p * p * (6.0 * p * p - 15.0 * p + 10.0)
}

/// Derivative of `h`: 30 p^2 (1 - p)^2, zero outside [0, 1].
#[inline]
pub fn h_prime(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return 0.0;
    }
    30.0 * p * p * (1.0 - p) * (1.0 - p)
}

/// Sign with sign(0) = +1.
#[inline]
pub fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Bulk free-energy density of a node (J/m^3): interpolated phase energies,
/// the multi-well term and the pairwise trijunction penalty. Gradient energy
/// is added by the caller since it needs neighbours.
pub fn local_energy(node: &Node, model: &dyn FreeEnergyModel, material: &Material) -> f64 {
    let n = node.fractions();
    let mut g = 0.0;
    for phase in Phase::ALL {
        let p = phase.index();
        g += n[p] * model.g(phase, node.c[p]);
    }

    let mut sq = [0.0; NP];
    for i in 0..NP {
        let phi = node.phi[i];
        let well = 1.0 - phi.abs();
        sq[i] = phi * phi;
        g += material.omega[i] * sq[i] * well * well;
    }

    for i in 0..NP {
        for j in (i + 1)..NP {
            g += 2.0 * material.alpha * sq[i] * sq[j];
        }
    }
    g
}
