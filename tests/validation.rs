// tests/validation.rs
//
// Integration-style validation tests (physics sanity checks).
// Run with: cargo test
// Or only these tests: cargo test --test validation

use alloy625::config::{Layout1D, RunConfig};
use alloy625::diagnostics::{DiagnosticsLog, COMPOSITION_LOG, TIMESTEP_LOG};
use alloy625::free_energy::{FreeEnergyModel, ParabolicModel, Phase};
use alloy625::grid::{Boundary, Grid};
use alloy625::initial_states::{equilibrate_field, generate};
use alloy625::params::{Material, Numerics, SolverSettings, EPSILON, MESHRES};
use alloy625::simulation::Simulation;
use alloy625::vector_field::{VectorField, NC, NP};

/// Every phase shares the gamma landscape, so there is no chemical driving
/// force and only the gradient and well terms move the interface.
fn flat_model() -> ParabolicModel {
    let gamma = *ParabolicModel::in625().phase(Phase::Gamma);
    ParabolicModel::new([gamma; 4])
}

fn no_diffusion(mut m: Material) -> Material {
    m.diffusivity = [[0.0; NC]; NC];
    m
}

fn mean_x(field: &VectorField) -> [f64; NC] {
    let n = field.grid.n_nodes() as f64;
    let mut s = [0.0; NC];
    for node in field.interior() {
        for k in 0..NC {
            s[k] += node.x[k];
        }
    }
    s.map(|v| v / n)
}

/// Linear ramp in phi over 41 nodes with dx = 1 and unit coefficients; the
/// interface sweeps several dx per unit time.
fn ramp_simulation(adaptive: bool) -> Simulation {
    let nx = 41;
    let grid = Grid::line(nx, 1.0, Boundary::Neumann);
    let mut field = VectorField::new(grid);
    for i in 0..nx as isize {
        let node = field.at_mut(i, 0);
        node.x = [0.3, 0.02];
        node.c = [node.x; NP + 1];
        node.phi[0] = i as f64 / 40.0;
    }
    field.fill_halo();

    let material = Material {
        kappa: [0.0; NP],
        mobility: [1.0; NP],
        omega: [1.0; NP],
        alpha: 0.0,
        diffusivity: [[0.0; NC]; NC],
    };
    let numerics = Numerics {
        meshres: 1.0,
        adaptive,
        ..Numerics::default()
    };
    Simulation::new(field, Box::new(flat_model()), material, numerics, 1).unwrap()
}

fn read_energies(path: &std::path::Path) -> Vec<f64> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split('\t').nth(7).unwrap().trim().parse::<f64>().unwrap())
        .collect()
}

#[test]
fn planar_interface_run_completes_and_stays_monotone() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        nodes: [768, 1],
        layout_1d: Layout1D::GammaDelta,
        ..RunConfig::default()
    };
    let model = cfg.model.build();
    let generated = generate(1, &cfg, model.as_ref()).unwrap();
    assert_eq!(generated.failures, 0);
    let before = mean_x(&generated.field);

    let log = DiagnosticsLog::create(dir.path(), true).unwrap();
    let mut sim = Simulation::from_config(generated.field, &cfg)
        .unwrap()
        .with_log(log, 10);
    sim.log_initial(generated.failures).unwrap();

    let dt0 = sim.dt();
    let report = sim.update(200).unwrap();
    assert!(report.accepted > 0);
    assert!((sim.time() - 200.0 * dt0).abs() < 1e-6 * dt0);

    let field = sim.field();
    let after = mean_x(&field);
    for k in 0..NC {
        assert!(
            (after[k] - before[k]).abs() <= 1e-6 * before[k],
            "component {} drifted from {} to {}",
            k,
            before[k],
            after[k]
        );
    }

    // delta on the first third, gamma beyond: phi_delta never rises with x
    let phi: Vec<f64> = field.interior().map(|n| n.phi[0]).collect();
    assert!(phi.iter().all(|p| p.is_finite()));
    for (i, w) in phi.windows(2).enumerate() {
        assert!(w[1] <= w[0] + 1e-9, "oscillation at node {}: {} -> {}", i, w[0], w[1]);
    }
    assert!(phi[0] > 0.9 && phi[767] < 0.1);

    drop(sim);
    let lines = std::fs::read_to_string(dir.path().join(COMPOSITION_LOG)).unwrap();
    assert_eq!(lines.lines().count(), 1 + report.accepted / 10);
}

#[test]
fn isolated_interface_energy_never_increases_without_diffusion() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        nodes: [768, 1],
        layout_1d: Layout1D::GammaDelta,
        ..RunConfig::default()
    };
    let model = cfg.model.build();
    let generated = generate(1, &cfg, model.as_ref()).unwrap();

    let log = DiagnosticsLog::create(dir.path(), true).unwrap();
    let mut sim = Simulation::new(
        generated.field,
        model,
        no_diffusion(cfg.material()),
        cfg.numerics.clone(),
        1,
    )
    .unwrap()
    .with_log(log, 1);
    sim.log_initial(generated.failures).unwrap();
    sim.update(100).unwrap();
    drop(sim);

    let energies = read_energies(&dir.path().join(COMPOSITION_LOG));
    assert!(energies.len() > 2);
    for (k, w) in energies.windows(2).enumerate() {
        assert!(w[1] <= w[0], "energy rose at logged step {}: {} -> {}", k, w[0], w[1]);
    }
}

#[test]
fn sharp_interface_relaxes_monotonically() {
    let grid = Grid::line(64, MESHRES, Boundary::Neumann);
    let mut field = VectorField::new(grid);
    for i in 0..64 {
        let node = field.at_mut(i, 0);
        node.x = [0.3, 0.02];
        node.c = [node.x; NP + 1];
        if i < 32 {
            node.phi[0] = 1.0 - EPSILON;
        }
    }
    // one fraction nudged off the sharp profile
    field.at_mut(31, 0).phi[0] = 0.9;
    field.fill_halo();

    let model = flat_model();
    let mut sim = Simulation::new(
        field,
        Box::new(model),
        no_diffusion(Material::in625(MESHRES)),
        Numerics::default(),
        1,
    )
    .unwrap();

    let mut energy = sim.summary().energy;
    let mut accepted = 0;
    for _ in 0..200 {
        let attempt = sim.try_step(true).unwrap();
        let Some(s) = attempt.summary else {
            continue;
        };
        accepted += 1;
        assert!(
            s.energy <= energy + 1e-12 * energy.abs(),
            "free energy rose from {} to {}",
            energy,
            s.energy
        );
        energy = s.energy;
    }
    assert!(accepted > 0);
}

#[test]
fn neumann_edges_keep_a_symmetric_profile_symmetric() {
    let nx = 60;
    let grid = Grid::line(nx, MESHRES, Boundary::Neumann);
    let mut field = VectorField::new(grid);
    for i in 0..nx as isize {
        let node = field.at_mut(i, 0);
        if (20..40).contains(&i) {
            node.x = [0.0125, 0.25];
            node.phi[0] = 1.0 - EPSILON;
        } else {
            node.x = [0.20, 0.10];
        }
    }
    let model = ParabolicModel::in625();
    equilibrate_field(&mut field, &model, SolverSettings::default());
    field.fill_halo();

    let mut sim = Simulation::new(
        field,
        Box::new(model),
        Material::in625(MESHRES),
        Numerics::default(),
        1,
    )
    .unwrap();
    sim.update(30).unwrap();

    let f = sim.field();
    for i in 0..nx as isize / 2 {
        let a = f.at(i, 0);
        let b = f.at(nx as isize - 1 - i, 0);
        for k in 0..NC {
            assert!((a.x[k] - b.x[k]).abs() < 1e-12, "x[{}] at {} vs mirror", k, i);
        }
        for k in 0..NP {
            assert!((a.phi[k] - b.phi[k]).abs() < 1e-12, "phi[{}] at {} vs mirror", k, i);
        }
    }
}

#[test]
fn oversized_step_is_rejected_without_touching_the_state() {
    let numerics = Numerics {
        meshres: 1.0,
        ..Numerics::default()
    };
    let scale_down = numerics.scale_down;
    let limit = numerics.advection_limit();
    let mut sim = ramp_simulation(true);
    sim.set_dt(1.0);
    let before = sim.field();

    let attempt = sim.try_step(true).unwrap();
    let d = attempt.decision;
    assert!(!d.accepted());
    assert!(d.velocity > 1.0, "velocity {}", d.velocity);
    assert!((d.ideal_dt - limit / d.velocity).abs() < 1e-15);
    assert!((sim.dt() - scale_down * d.ideal_dt).abs() < 1e-15);
    assert!(attempt.summary.is_none());
    assert_eq!(sim.time(), 0.0);
    assert_eq!(sim.field(), before);

    // retries shrink dt until a step is accepted
    let mut accepted = None;
    for _ in 0..20 {
        let retry = sim.try_step(false).unwrap();
        if retry.decision.accepted() {
            accepted = Some(retry.decision.dt);
            break;
        }
    }
    let dt = accepted.expect("no retry was accepted");
    assert!(dt < d.ideal_dt);
    assert_eq!(sim.time(), dt);
}

#[test]
fn fixed_stepping_reports_overshoot() {
    let mut sim = ramp_simulation(false);
    sim.set_dt(1.0);

    let err = sim.try_step(false).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert_eq!(sim.time(), 0.0);
}

#[test]
fn consecutive_updates_keep_the_planned_timestep() {
    let mut sim = ramp_simulation(true);
    sim.set_dt(0.01);

    let first = sim.update(10).unwrap();
    assert!((first.time - 0.1).abs() <= 1e-6 * 0.01, "first update reached {}", first.time);

    // the last step of the first call is shortened to land on its end time;
    // the next call must start from the controller's own dt, not that remainder
    let dt = sim.dt();
    assert!(dt >= 0.01, "update left dt at {:e}", dt);
    let second = sim.update(10).unwrap();
    let advanced = second.time - first.time;
    assert!((advanced - 10.0 * dt).abs() <= 1e-6 * dt, "advanced {:e} with dt {:e}", advanced, dt);
    assert!(advanced >= 0.1 - 1e-6 * dt);
}

#[test]
fn timestep_log_records_rejections_and_sampled_acceptances() {
    let dir = tempfile::tempdir().unwrap();
    let log = DiagnosticsLog::create(dir.path(), true).unwrap();
    let mut sim = ramp_simulation(true).with_log(log, 5);
    // well above the advection limit, so at least the first attempt is rejected
    sim.set_dt(0.05);
    let report = sim.update(20).unwrap();
    assert!(report.rejected > 0);
    drop(sim);

    let t = std::fs::read_to_string(dir.path().join(TIMESTEP_LOG)).unwrap();
    let rejected = t.lines().filter(|l| l.starts_with('\t')).count();
    let accepted = t.lines().count() - rejected;
    assert_eq!(rejected, report.rejected);
    assert_eq!(accepted, report.accepted / 5);

    let c = std::fs::read_to_string(dir.path().join(COMPOSITION_LOG)).unwrap();
    assert_eq!(c.lines().count(), accepted);
}

#[test]
fn partitioned_2d_run_matches_monolithic() {
    let grid = Grid::plane(24, 20, MESHRES, Boundary::Periodic);
    let mut field = VectorField::new(grid);
    for j in 0..20 {
        for i in 0..24 {
            let node = field.at_mut(i, j);
            let r2 = ((i - 12) * (i - 12) + (j - 10) * (j - 10)) as f64;
            if r2 < 25.0 {
                node.x = [0.0125, 0.25];
                node.phi[0] = 1.0 - EPSILON;
            } else {
                node.x = [0.25, 0.10];
            }
        }
    }
    let model = ParabolicModel::in625();
    equilibrate_field(&mut field, &model, SolverSettings::default());
    field.fill_halo();

    let run = |parts: usize| {
        let mut sim = Simulation::new(
            field.clone(),
            Box::new(ParabolicModel::in625()) as Box<dyn FreeEnergyModel>,
            Material::in625(MESHRES),
            Numerics::default(),
            parts,
        )
        .unwrap();
        sim.update(5).unwrap();
        (sim.field(), sim.time())
    };

    let (whole, t_whole) = run(1);
    let (split, t_split) = run(4);
    assert_eq!(t_whole, t_split);
    assert_eq!(whole, split);
}
