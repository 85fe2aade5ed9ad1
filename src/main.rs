// src/main.rs
//
// Command-line driver. Arguments are key=value pairs:
//
//   cargo run --release -- dim=2 out=runs/pairwise
//       -> generate the 2D pairwise microstructure, equilibrate it and write
//          runs/pairwise/{grid.dat, c.log, t.log, config.json}
//
//   cargo run --release -- in=runs/pairwise/grid.dat steps=20000 parts=4 plot
//       -> continue that run for 20000 timesteps over four strips, appending
//          to the logs and overwriting the checkpoint
//
//   cargo run --release -- dim=1 layout=four-phase adaptive=off steps=500 plot
//
// Exit status: 0 on success, 2 unsupported dimension, 3 i/o failure,
// 4 interface overshoot with fixed stepping, 5 bad configuration or grid file.

use std::env;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alloy625::checkpoint::{read_grid, write_grid};
use alloy625::config::{parse_name, Layout1D, Layout2D, ModelKind, RunConfig};
use alloy625::diagnostics::DiagnosticsLog;
use alloy625::error::{Result, SimError};
use alloy625::grid::Boundary;
use alloy625::initial_states::generate;
use alloy625::simulation::Simulation;
use alloy625::visualisation::{save_phase_map, save_profile_plot};

const GRID_FILE: &str = "grid.dat";

fn print_usage() {
    eprintln!(
        r#"Usage:
  alloy625 dim=1|2 [out=DIR] [steps=N] [options]     generate (and optionally run)
  alloy625 in=GRID  [out=DIR] [steps=N] [options]     continue from a checkpoint

Options:
  config=PATH           JSON overrides of the run configuration
  parts=N               strips along the outer axis (default 1)
  adaptive=on|off       adaptive timestepping (default on)
  layout=NAME           1D: gamma-delta|gamma-mu|gamma-laves|delta-laves|four-phase
                        2D: pairwise|particle-row|stripe-row|planar
  boundary=neumann|periodic
  model=parabolic|regular-solution
  nx=N ny=N             generated grid extents (default 768 x 192)
  plot                  write profile.png (and phases.png in 2D) into DIR

Notes:
  - With dim= and no steps= only the initial condition is written.
  - With in= the run starts from the stored time and appends to DIR's logs.
"#
    );
}

#[derive(Debug, Default)]
struct Args {
    dim: Option<usize>,
    input: Option<PathBuf>,
    out: Option<PathBuf>,
    config: Option<PathBuf>,
    steps: Option<usize>,
    parts: Option<usize>,
    adaptive: Option<bool>,
    layout: Option<String>,
    boundary: Option<Boundary>,
    model: Option<ModelKind>,
    nx: Option<usize>,
    ny: Option<usize>,
    plot: bool,
    help: bool,
}

fn parse_switch(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Some(true),
        "off" | "0" | "false" => Some(false),
        _ => None,
    }
}

fn parse_count(key: &str, v: &str) -> Result<usize> {
    v.parse()
        .map_err(|_| SimError::Config(format!("{}= expects a non-negative integer, got '{}'", key, v)))
}

fn parse_args(argv: impl Iterator<Item = String>) -> Result<Args> {
    let mut a = Args::default();
    for arg in argv {
        let arg = arg.trim_start_matches("--");
        if arg == "help" || arg == "h" || arg == "-h" {
            a.help = true;
            continue;
        }
        if arg == "plot" {
            a.plot = true;
            continue;
        }
        let Some((key, value)) = arg.split_once('=') else {
            tracing::warn!("ignoring unknown argument '{}'", arg);
            continue;
        };
        match key {
            "dim" => a.dim = Some(parse_count(key, value)?),
            "in" => a.input = Some(PathBuf::from(value)),
            "out" => a.out = Some(PathBuf::from(value)),
            "config" => a.config = Some(PathBuf::from(value)),
            "steps" => a.steps = Some(parse_count(key, value)?),
            "parts" => a.parts = Some(parse_count(key, value)?),
            "nx" => a.nx = Some(parse_count(key, value)?),
            "ny" => a.ny = Some(parse_count(key, value)?),
            "adaptive" => {
                a.adaptive = Some(parse_switch(value).ok_or_else(|| {
                    SimError::Config(format!("adaptive= expects on|off, got '{}'", value))
                })?)
            }
            "layout" => a.layout = Some(value.to_string()),
            "boundary" => {
                a.boundary = Some(Boundary::from_str(value).ok_or_else(|| {
                    SimError::Config(format!("unknown boundary '{}'", value))
                })?)
            }
            "model" => {
                a.model = Some(
                    parse_name(value)
                        .ok_or_else(|| SimError::Config(format!("unknown model '{}'", value)))?,
                )
            }
            _ => tracing::warn!("ignoring unknown argument '{}'", arg),
        }
    }
    Ok(a)
}

fn configure(args: &Args) -> Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(n) = args.steps {
        cfg.steps = n;
    }
    if let Some(p) = args.parts {
        cfg.partitions = p;
    }
    if let Some(on) = args.adaptive {
        cfg.numerics.adaptive = on;
    }
    if let Some(b) = args.boundary {
        cfg.boundary = b;
    }
    if let Some(m) = args.model {
        cfg.model = m;
    }
    if let Some(nx) = args.nx {
        cfg.nodes[0] = nx;
    }
    if let Some(ny) = args.ny {
        cfg.nodes[1] = ny;
    }
    if let Some(name) = &args.layout {
        if let Some(l) = parse_name::<Layout1D>(name) {
            cfg.layout_1d = l;
        } else if let Some(l) = parse_name::<Layout2D>(name) {
            cfg.layout_2d = l;
        } else {
            return Err(SimError::Config(format!("unknown layout '{}'", name)));
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn write_plots(sim: &Simulation, out_dir: &Path) {
    let field = sim.field();
    let title = format!("t = {:.4e} s", sim.time());
    let profile = out_dir.join("profile.png");
    if let Err(e) = save_profile_plot(&field, &title, &profile.to_string_lossy()) {
        tracing::warn!("could not write {}: {}", profile.display(), e);
    }
    if field.grid.dim == 2 {
        let phases = out_dir.join("phases.png");
        if let Err(e) = save_phase_map(&field, &phases.to_string_lossy()) {
            tracing::warn!("could not write {}: {}", phases.display(), e);
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = configure(&args)?;
    let out_dir = args.out.clone().unwrap_or_else(|| PathBuf::from("runs/alloy625"));
    create_dir_all(&out_dir).map_err(|e| SimError::io(&out_dir, e))?;

    let mut sim = match (args.dim, &args.input) {
        (Some(dim), _) => {
            // generation alone unless a step count was asked for
            cfg.steps = args.steps.unwrap_or(0);
            let model = cfg.model.build();
            let generated = generate(dim, &cfg, model.as_ref())?;
            let log = DiagnosticsLog::create(&out_dir, cfg.numerics.adaptive)?;
            let mut sim =
                Simulation::from_config(generated.field, &cfg)?.with_log(log, cfg.log_every());
            sim.log_initial(generated.failures)?;
            sim
        }
        (None, Some(input)) => {
            let (field, time) = read_grid(input)?;
            tracing::info!(path = %input.display(), time, "loaded checkpoint");
            let log = DiagnosticsLog::append(&out_dir, cfg.numerics.adaptive)?;
            Simulation::from_config(field, &cfg)?
                .with_time(time)
                .with_log(log, cfg.log_every())
        }
        (None, None) => {
            print_usage();
            return Err(SimError::Config("either dim= or in= is required".into()));
        }
    };

    cfg.write_to_dir(&out_dir)?;

    let limits = sim.limits();
    tracing::info!(
        transformation = limits.transformation,
        diffusion = limits.diffusion,
        dt = sim.dt(),
        "stability limits"
    );

    if cfg.steps > 0 {
        let report = sim.update(cfg.steps)?;
        if report.unresolved > 0 {
            tracing::warn!(
                nodes = report.unresolved,
                "some nodes kept line-compound compositions"
            );
        }
    }

    let grid_path = out_dir.join(GRID_FILE);
    write_grid(&grid_path, &sim.field(), sim.time())?;
    tracing::info!(path = %grid_path.display(), t = sim.time(), "wrote checkpoint");

    if args.plot {
        write_plots(&sim, &out_dir);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alloy625=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    if args.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
