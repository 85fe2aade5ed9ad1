// src/timestep.rs
//
// Interface-velocity estimate and the adaptive timestep controller.
//
// The controller keeps the fastest interface from sweeping more than a fixed
// fraction of a mesh spacing per step. A step is judged after it has been
// computed into the new buffer: accepted steps grow dt, rejected steps shrink
// it and are retried from the untouched old buffer.

use rayon::prelude::*;

use crate::energy::h;
use crate::error::{Result, SimError};
use crate::params::{Numerics, StabilityLimits, EPSILON};
use crate::vector_field::{Node, Stencil, VectorField, NP};

/// Lower/upper phase-fraction bounds of the band in which a node counts as
/// part of an interface.
pub const INTERFACE_BAND: (f64, f64) = (0.3, 0.7);

/// Local interface velocity (m/s) at one node.
///
/// For each secondary phase inside the interface band the sweep speed is
/// |h_new - h_old| / dt / |grad phi_new|. The speeds are weighted by their new
/// fraction and normalised by the total secondary fraction at the node, so a
/// node next to a bulk precipitate is not over-weighted. `s` must be a stencil
/// of the new buffer.
pub fn node_velocity(old: &Node, s: &Stencil<'_>, dt: f64) -> f64 {
    let new = s.center;
    let mut weighted = 0.0;
    let mut total = 0.0;
    for i in 0..NP {
        let h_new = h(new.phi[i].abs());
        total += h_new;
        if h_new <= INTERFACE_BAND.0 || h_new >= INTERFACE_BAND.1 {
            continue;
        }
        let g = s.gradient(|n| n.phi[i]);
        let grad = (g[0] * g[0] + g[1] * g[1]).sqrt();
        if grad <= EPSILON {
            continue;
        }
        let h_old = h(old.phi[i].abs());
        weighted += (h_new - h_old).abs() / dt / grad * h_new;
    }
    if weighted > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Fastest interface in the field. The halo of `new` must be filled.
pub fn interface_velocity(old: &VectorField, new: &VectorField, dt: f64) -> f64 {
    let g = new.grid;
    (0..g.n_nodes())
        .into_par_iter()
        .map(|k| {
            let i = (k % g.nx) as isize;
            let j = (k / g.nx) as isize;
            node_velocity(old.at(i, j), &new.stencil(i, j), dt)
        })
        .reduce(|| 0.0, f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Stable,
    Unstable,
}

/// Verdict on one attempted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecision {
    pub state: StepState,
    /// Grid-wide maximum interface velocity of the attempt.
    pub velocity: f64,
    /// Timestep the attempt was computed with.
    pub dt: f64,
    /// Largest timestep that would have respected the advection limit.
    pub ideal_dt: f64,
    /// Timestep for the next attempt.
    pub next_dt: f64,
}

impl StepDecision {
    pub fn accepted(&self) -> bool {
        self.state == StepState::Stable
    }
}

#[derive(Debug, Clone)]
pub struct TimestepController {
    dt: f64,
    adaptive: bool,
    /// Maximum interface sweep per step (m).
    advection_limit: f64,
    scale_up: f64,
    scale_down: f64,
    /// min(dtp, dtc)
    stability: f64,
    ceiling: f64,
    dx: f64,
    /// dt in force before `clamp_to` shortened it, restored once the
    /// shortened step is accepted.
    planned: Option<f64>,
}

impl TimestepController {
    /// Start from the linear-stability timestep `lin_stab * min(dtp, dtc)`.
    pub fn new(numerics: &Numerics, limits: StabilityLimits, dx: f64) -> Self {
        let stability = limits.min();
        Self {
            dt: numerics.lin_stab * stability,
            adaptive: numerics.adaptive,
            advection_limit: numerics.advection_limit(),
            scale_up: numerics.scale_up,
            scale_down: numerics.scale_down,
            stability,
            ceiling: numerics.ceiling_fraction * stability,
            dx,
            planned: None,
        }
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self.planned = None;
        self
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn adaptive(&self) -> bool {
        self.adaptive
    }

    /// min(dtp, dtc) / dt, the headroom logged per step.
    pub fn stability_ratio(&self) -> f64 {
        self.stability / self.dt
    }

    /// Never step past the end of the run. Only the next accepted attempt is
    /// shortened; afterwards the controller resumes from the dt it had planned.
    pub fn clamp_to(&mut self, remaining: f64) {
        if remaining > 0.0 && remaining < self.dt {
            self.planned.get_or_insert(self.dt);
            self.dt = remaining;
        }
    }

    /// Judge an attempt computed with the current dt and plan the next one.
    ///
    /// In fixed-step mode a rejected step is fatal.
    pub fn evaluate(&mut self, velocity: f64) -> Result<StepDecision> {
        let dt = self.dt;
        let moving = velocity > EPSILON;
        let ideal_dt = if moving {
            self.advection_limit / velocity
        } else {
            2.0 * dt
        };

        let state = if dt < ideal_dt {
            if let Some(planned) = self.planned.take() {
                self.dt = planned;
            } else if self.adaptive && moving {
                self.dt = (self.scale_up * dt).min(self.ceiling);
            }
            StepState::Stable
        } else if self.adaptive {
            self.dt = self.scale_down * ideal_dt;
            self.planned = None;
            StepState::Unstable
        } else {
            return Err(SimError::InterfaceOvershoot {
                sweep: velocity * dt / self.dx,
                limit: self.advection_limit / self.dx,
            });
        };

        Ok(StepDecision {
            state,
            velocity,
            dt,
            ideal_dt,
            next_dt: self.dt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Boundary, Grid};
    use approx::assert_relative_eq;

    fn controller(adaptive: bool) -> TimestepController {
        let numerics = Numerics {
            meshres: 1.0,
            adaptive,
            ..Numerics::default()
        };
        let limits = StabilityLimits {
            transformation: 100.0,
            diffusion: 50.0,
        };
        TimestepController::new(&numerics, limits, 1.0).with_dt(1.0)
    }

    #[test]
    fn still_interface_accepts_without_growth() {
        let mut c = controller(true);
        let d = c.evaluate(0.0).unwrap();
        assert!(d.accepted());
        assert_eq!(d.ideal_dt, 2.0);
        assert_eq!(c.dt(), 1.0);
    }

    #[test]
    fn slow_interface_grows_dt_up_to_ceiling() {
        let mut c = controller(true);
        let d = c.evaluate(0.01).unwrap();
        assert!(d.accepted());
        assert_relative_eq!(c.dt(), 1.1);

        let mut c = controller(true).with_dt(4.9);
        c.evaluate(0.01).unwrap();
        // ceiling = min(100, 50) / 10
        assert_relative_eq!(c.dt(), 5.0);
    }

    #[test]
    fn fast_interface_is_rejected_and_dt_shrinks() {
        let mut c = controller(true);
        let d = c.evaluate(0.5).unwrap();
        assert_eq!(d.state, StepState::Unstable);
        assert_relative_eq!(d.ideal_dt, 0.25);
        assert_relative_eq!(c.dt(), 0.8 * 0.25);
        assert!(c.dt() < d.dt);
    }

    #[test]
    fn fixed_step_overshoot_is_fatal() {
        let mut c = controller(false);
        match c.evaluate(0.5) {
            Err(SimError::InterfaceOvershoot { sweep, limit }) => {
                assert_relative_eq!(sweep, 0.5);
                assert_relative_eq!(limit, 0.125);
            }
            other => panic!("expected overshoot, got {:?}", other),
        }
        // fixed mode never grows dt
        let mut c = controller(false);
        c.evaluate(0.01).unwrap();
        assert_eq!(c.dt(), 1.0);
    }

    #[test]
    fn clamp_respects_remaining_time() {
        let mut c = controller(true);
        c.clamp_to(0.3);
        assert_eq!(c.dt(), 0.3);
        c.clamp_to(5.0);
        assert_eq!(c.dt(), 0.3);
    }

    #[test]
    fn clamped_step_hands_back_the_planned_dt() {
        let mut c = controller(true);
        c.clamp_to(1e-6);
        c.clamp_to(1e-7);
        let d = c.evaluate(0.01).unwrap();
        assert!(d.accepted());
        assert_eq!(d.dt, 1e-7);
        assert_eq!(d.next_dt, 1.0);
        assert_eq!(c.dt(), 1.0);

        // a rejected shortened step plans from the reduced dt instead
        let mut c = controller(true);
        c.clamp_to(0.5);
        let d = c.evaluate(2.0).unwrap();
        assert!(!d.accepted());
        assert_relative_eq!(c.dt(), 0.8 * 0.0625);
        c.evaluate(0.01).unwrap();
        assert_relative_eq!(c.dt(), 1.1 * 0.8 * 0.0625);
    }

    #[test]
    fn velocity_only_counts_interface_band() {
        let grid = Grid::line(5, 1.0, Boundary::Neumann);
        let mut old = VectorField::new(grid);
        let mut new = VectorField::new(grid);
        for i in 0..5 {
            old.at_mut(i, 0).phi[0] = 0.1 * i as f64 + 0.25;
            new.at_mut(i, 0).phi[0] = 0.1 * i as f64 + 0.30;
        }
        new.fill_halo();

        // node 2 sits at phi = 0.5 (h = 0.5); nodes 0 and 4 are outside the band
        let v2 = node_velocity(old.at(2, 0), &new.stencil(2, 0), 1.0);
        let expected = (h(0.5) - h(0.45)) / 0.1;
        assert_relative_eq!(v2, expected, max_relative = 1e-12);
        assert_eq!(node_velocity(old.at(4, 0), &new.stencil(4, 0), 1.0), 0.0);

        let vmax = interface_velocity(&old, &new, 1.0);
        assert!(vmax >= v2);
    }

    #[test]
    fn bulk_precipitate_dilutes_the_weight() {
        let grid = Grid::line(3, 1.0, Boundary::Neumann);
        let mut old = VectorField::new(grid);
        let mut new = VectorField::new(grid);
        for i in 0..3 {
            old.at_mut(i, 0).phi[0] = 0.1 * i as f64 + 0.35;
            new.at_mut(i, 0).phi[0] = 0.1 * i as f64 + 0.40;
        }
        new.fill_halo();
        let alone = node_velocity(old.at(1, 0), &new.stencil(1, 0), 1.0);
        assert!(alone > 0.0);

        // a flat, fully transformed second phase adds weight but no speed
        for i in 0..3 {
            old.at_mut(i, 0).phi[1] = 1.0;
            new.at_mut(i, 0).phi[1] = 1.0;
        }
        new.fill_halo();
        let diluted = node_velocity(old.at(1, 0), &new.stencil(1, 0), 1.0);
        let h0 = h(0.5);
        assert_relative_eq!(diluted, alone * h0 / (h0 + 1.0), max_relative = 1e-12);
    }
}
