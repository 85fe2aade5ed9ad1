// src/simulation.rs
//
// Run driver: owns the decomposed double-buffered grid, the free-energy
// model and the timestep controller, and advances the state in time.
//
// One attempt:
//   exchange old halos -> sweep every partition into new -> exchange new
//   halos -> global max interface velocity -> controller verdict ->
//   (accepted) optional summary + log, swap buffers, advance time
//   (rejected) keep old, retry with the reduced dt

use rayon::prelude::*;

use crate::config::RunConfig;
use crate::diagnostics::{status_line, DiagnosticsLog};
use crate::error::Result;
use crate::free_energy::FreeEnergyModel;
use crate::params::{Material, Numerics, StabilityLimits};
use crate::partition::{Buffer, Domain};
use crate::stepper::{sweep, StepContext, SweepStats};
use crate::summary::{summarize, Summary};
use crate::timestep::{interface_velocity, StepDecision, TimestepController};
use crate::vector_field::VectorField;

/// Counters of one `update` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Equilibrium first-guess failures over accepted steps.
    pub failures: usize,
    /// Nodes left on the line-compound estimate over accepted steps.
    pub unresolved: usize,
    /// Simulation time at the end of the call (s).
    pub time: f64,
}

/// Result of a single attempted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attempt {
    pub decision: StepDecision,
    pub stats: SweepStats,
    /// Present when the step was accepted and a summary was requested.
    pub summary: Option<Summary>,
}

pub struct Simulation {
    domain: Domain,
    model: Box<dyn FreeEnergyModel>,
    material: Material,
    numerics: Numerics,
    limits: StabilityLimits,
    controller: TimestepController,
    time: f64,
    log: Option<DiagnosticsLog>,
    log_every: usize,
}

impl Simulation {
    pub fn new(
        field: VectorField,
        model: Box<dyn FreeEnergyModel>,
        material: Material,
        numerics: Numerics,
        partitions: usize,
    ) -> Result<Self> {
        let grid = field.grid;
        let limits = material.stability(grid.dim, grid.dx);
        let controller = TimestepController::new(&numerics, limits, grid.dx);
        let domain = Domain::decompose(&field, partitions)?;
        Ok(Self {
            domain,
            model,
            material,
            numerics,
            limits,
            controller,
            time: 0.0,
            log: None,
            log_every: 1,
        })
    }

    pub fn from_config(field: VectorField, cfg: &RunConfig) -> Result<Self> {
        let mut sim = Self::new(
            field,
            cfg.model.build(),
            cfg.material(),
            cfg.numerics.clone(),
            cfg.partitions,
        )?;
        sim.log_every = cfg.log_every();
        Ok(sim)
    }

    pub fn with_log(mut self, log: DiagnosticsLog, log_every: usize) -> Self {
        self.log = Some(log);
        self.log_every = log_every.max(1);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.controller.dt()
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.controller = self.controller.clone().with_dt(dt);
    }

    pub fn limits(&self) -> StabilityLimits {
        self.limits
    }

    pub fn numerics(&self) -> &Numerics {
        &self.numerics
    }

    pub fn partitions(&self) -> usize {
        self.domain.parts.len()
    }

    /// Current state assembled over the global grid.
    pub fn field(&self) -> VectorField {
        self.domain.gather(Buffer::Old)
    }

    /// Diagnostics of the current state, without stepping.
    pub fn summary(&mut self) -> Summary {
        let ctx = StepContext {
            model: self.model.as_ref(),
            material: &self.material,
            solver: self.numerics.solver,
        };
        let dt = self.controller.dt();
        self.domain.exchange_halos(Buffer::Old);
        self.domain
            .parts
            .par_iter_mut()
            .map(|p| {
                p.new.clone_from(&p.old);
                summarize(&p.old, &mut p.new, dt, &ctx)
            })
            .reduce(Summary::default, Summary::merge)
    }

    /// Log the initial state: one c.log line and a neutral t.log line.
    pub fn log_initial(&mut self, failures: usize) -> Result<()> {
        if self.log.is_none() {
            return Ok(());
        }
        let mut s = self.summary();
        s.failures = failures;
        let dt = self.controller.dt();
        tracing::info!("{}", status_line(self.time, dt, &s));
        if let Some(log) = self.log.as_mut() {
            log.log_step(dt, &s)?;
            let neutral = StepDecision {
                state: crate::timestep::StepState::Stable,
                velocity: 0.0,
                dt,
                ideal_dt: 2.0 * dt,
                next_dt: dt,
            };
            log.log_decision(&neutral, 1.0)?;
        }
        Ok(())
    }

    /// Compute one step with the current dt and apply the controller verdict.
    pub fn try_step(&mut self, want_summary: bool) -> Result<Attempt> {
        let dt = self.controller.dt();
        let ratio = self.controller.stability_ratio();
        let ctx = StepContext {
            model: self.model.as_ref(),
            material: &self.material,
            solver: self.numerics.solver,
        };

        self.domain.exchange_halos(Buffer::Old);
        let stats = self
            .domain
            .parts
            .par_iter_mut()
            .map(|p| sweep(&p.old, &mut p.new, &ctx, dt))
            .reduce(SweepStats::default, SweepStats::merge);
        self.domain.exchange_halos(Buffer::New);

        let velocity = self
            .domain
            .parts
            .par_iter()
            .map(|p| interface_velocity(&p.old, &p.new, dt))
            .reduce(|| 0.0, f64::max);

        let decision = self.controller.evaluate(velocity)?;
        // every rejection, accepted steps at the summary cadence
        if !decision.accepted() || want_summary {
            if let Some(log) = self.log.as_mut() {
                log.log_decision(&decision, ratio)?;
            }
        }

        if !decision.accepted() {
            tracing::debug!(
                velocity,
                dt,
                next_dt = decision.next_dt,
                "step rejected, interface too fast"
            );
            return Ok(Attempt {
                decision,
                stats,
                summary: None,
            });
        }

        let summary = want_summary.then(|| {
            let mut s = self
                .domain
                .parts
                .par_iter_mut()
                .map(|p| summarize(&p.old, &mut p.new, dt, &ctx))
                .reduce(Summary::default, Summary::merge);
            s.failures = stats.failures;
            s
        });

        self.domain.swap_all();
        self.time += dt;

        Ok(Attempt {
            decision,
            stats,
            summary,
        })
    }

    /// Advance by `steps` multiples of the current timestep. With adaptive
    /// stepping the number of attempts differs from `steps`, but the elapsed
    /// simulation time does not.
    pub fn update(&mut self, steps: usize) -> Result<RunReport> {
        let base_dt = self.controller.dt();
        let run_time = steps as f64 * base_dt;
        let start = self.time;
        let end = start + run_time;
        let mut report = RunReport {
            time: self.time,
            ..RunReport::default()
        };
        if steps == 0 || !(run_time > 0.0) || !run_time.is_finite() {
            return Ok(report);
        }

        tracing::info!(
            steps,
            model = self.model.name(),
            dt = base_dt,
            run_time,
            adaptive = self.controller.adaptive(),
            partitions = self.partitions(),
            "starting update"
        );

        let mut next_tenth = 1;
        while end - self.time > 1e-6 * base_dt {
            if self.controller.adaptive() {
                self.controller.clamp_to(end - self.time);
            }
            let want_summary = (report.accepted + 1) % self.log_every == 0;
            let attempt = self.try_step(want_summary)?;
            if !attempt.decision.accepted() {
                report.rejected += 1;
                continue;
            }

            report.accepted += 1;
            report.failures += attempt.stats.failures;
            report.unresolved += attempt.stats.unresolved;
            if attempt.stats.unresolved > 0 {
                tracing::warn!(
                    nodes = attempt.stats.unresolved,
                    "equilibrium solve failed for every guess; kept line-compound estimates"
                );
            }

            if let Some(s) = attempt.summary {
                tracing::info!("{}", status_line(self.time, attempt.decision.dt, &s));
                if let Some(log) = self.log.as_mut() {
                    log.log_step(attempt.decision.dt, &s)?;
                }
            }

            let progress = (self.time - start) / run_time;
            while next_tenth <= 10 && progress >= next_tenth as f64 / 10.0 - 1e-9 {
                tracing::info!(percent = next_tenth * 10, t = self.time, "progress");
                next_tenth += 1;
            }
        }

        if let Some(log) = self.log.as_mut() {
            log.finish()?;
        }
        report.time = self.time;
        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected,
            failures = report.failures,
            "update finished"
        );
        Ok(report)
    }
}
