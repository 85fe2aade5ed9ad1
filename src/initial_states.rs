// src/initial_states.rs
//
// Initial microstructures.
//
// 1D: a planar interface between a matrix and one precipitate phase, or three
//     separated seeds of delta, mu and Laves.
// 2D: precipitates (particles or stripes) embedded in a gamma matrix whose
//     Cr and Nb are enriched by bell curves about the centreline, then
//     shifted so the grid-wide mean equals the nominal alloy composition.
//
// Conventions:
// - Positions are node coordinates; radii and offsets are in nodes.
// - Precipitates carry |phi| = 1 - eps; the sign picks the variant.
// - Every builder finishes by equilibrating all nodes.

use std::ops::AddAssign;

use rayon::prelude::*;

use crate::config::{Layout1D, Layout2D, RunConfig};
use crate::energy::h;
use crate::equilibrium::{equilibrate, ParallelTangentSolver};
use crate::error::{Result, SimError};
use crate::free_energy::{FreeEnergyModel, Phase};
use crate::grid::Grid;
use crate::guess::INITIAL_CHAIN;
use crate::params::{SolverSettings, EPSILON};
use crate::vector_field::{Node, VectorField, NC, NP};

/// Nominal gamma, then delta, mu, Laves phase-diagram compositions, then the
/// peak excess of the enriched matrix.
pub const X_CR: [f64; NP + 2] = [0.30, 0.0125, 0.04, 0.3875, 0.31 - 0.30];
pub const X_NB: [f64; NP + 2] = [0.02, 0.2500, 0.50, 0.2500, 0.13 - 0.02];

/// Standard deviations of the Cr and Nb segregation profiles (m).
pub const BELL: [f64; NC] = [150.0e-9, 50.0e-9];

/// Smallest thermodynamically stable precipitate radius (m).
pub const MIN_STABLE_RADIUS: f64 = 7.5e-9;

/// Running composition totals of embedded regions. Slots 0..NP are the
/// secondary phases; slot NP collects matrix enrichment, which adds solute
/// without claiming nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Composition {
    pub x: [[f64; NC]; NP + 1],
    pub n: [usize; NP + 1],
}

impl AddAssign for Composition {
    fn add_assign(&mut self, rhs: Self) {
        for j in 0..=NP {
            self.n[j] += rhs.n[j];
            for i in 0..NC {
                self.x[j][i] += rhs.x[j][i];
            }
        }
    }
}

impl Composition {
    fn claim(&mut self, slot: usize, x: [f64; NC]) {
        self.x[slot][0] += x[0];
        self.x[slot][1] += x[1];
        self.n[slot] += 1;
    }

    /// Composition the unclaimed nodes must add so that `total` nodes average
    /// to `target`. None when every node is claimed.
    pub fn matrix_share(&self, target: [f64; NC], total: usize) -> Option<[f64; NC]> {
        let claimed: usize = self.n.iter().sum();
        let free = total.checked_sub(claimed).filter(|&f| f > 0)? as f64;
        let mut share = [0.0; NC];
        for (i, s) in share.iter_mut().enumerate() {
            let embedded: f64 = self.x.iter().map(|xj| xj[i]).sum();
            *s = (target[i] * total as f64 - embedded) / free;
        }
        Some(share)
    }
}

/// Gaussian bell curve exp(-(x - m)^2 / (2 s^2)).
#[inline]
pub fn bell_curve(x: f64, m: f64, s: f64) -> f64 {
    (-(x - m) * (x - m) / (2.0 * s * s)).exp()
}

fn secondary_slot(phase: Phase) -> usize {
    phase.index() - 1
}

fn is_matrix(node: &Node) -> bool {
    node.phi.iter().map(|p| h(p.abs())).sum::<f64>() < EPSILON
}

/// Fill the disk |r - origin| < radius with precipitate `phase`.
pub fn embed_particle(
    field: &mut VectorField,
    origin: (isize, isize),
    phase: Phase,
    radius: f64,
    x: [f64; NC],
    phi: f64,
) -> Composition {
    let g = field.grid;
    let slot = secondary_slot(phase);
    let r = radius as isize;
    let mut comp = Composition::default();
    for j in (origin.1 - r)..=(origin.1 + r) {
        if j < 0 || j >= g.ny as isize {
            continue;
        }
        for i in (origin.0 - r)..=(origin.0 + r) {
            if i < 0 || i >= g.nx as isize {
                continue;
            }
            let (di, dj) = ((i - origin.0) as f64, (j - origin.1) as f64);
            if (di * di + dj * dj).sqrt() < radius {
                let node = field.at_mut(i, j);
                node.x = x;
                node.phi[slot] = phi;
                comp.claim(slot, x);
            }
        }
    }
    comp
}

/// Fill the full-height stripe origin_x - half_width <= i < origin_x + half_width.
pub fn embed_stripe(
    field: &mut VectorField,
    origin_x: isize,
    phase: Phase,
    half_width: usize,
    x: [f64; NC],
    phi: f64,
) -> Composition {
    let g = field.grid;
    let slot = secondary_slot(phase);
    let w = half_width as isize;
    let mut comp = Composition::default();
    for i in (origin_x - w).max(0)..(origin_x + w).min(g.nx as isize) {
        for j in 0..g.ny as isize {
            let node = field.at_mut(i, j);
            node.x = x;
            node.phi[slot] = phi;
            comp.claim(slot, x);
        }
    }
    comp
}

/// Add the segregation profile to every matrix node.
pub fn enrich_matrix(field: &mut VectorField, widths: [f64; NC]) -> Composition {
    let g = field.grid;
    let centre = g.dx * (g.nx / 2) as f64;
    let mut comp = Composition::default();
    for j in 0..g.ny as isize {
        for i in 0..g.nx as isize {
            let node = field.at_mut(i, j);
            if !is_matrix(node) {
                continue;
            }
            let pos = g.dx * i as f64;
            node.x[0] = X_CR[NP + 1] * bell_curve(pos, centre, widths[0]);
            node.x[1] = X_NB[NP + 1] * bell_curve(pos, centre, widths[1]);
            comp.x[NP][0] += node.x[0];
            comp.x[NP][1] += node.x[1];
        }
    }
    comp
}

/// Shift every matrix node so the grid mean composition equals `target`.
pub fn rebalance(field: &mut VectorField, comp: &Composition, target: [f64; NC]) {
    let g = field.grid;
    let Some(share) = comp.matrix_share(target, g.n_nodes()) else {
        tracing::warn!("no matrix nodes left to carry the system composition");
        return;
    };
    for j in 0..g.ny as isize {
        for i in 0..g.nx as isize {
            let node = field.at_mut(i, j);
            if is_matrix(node) {
                node.x[0] += share[0];
                node.x[1] += share[1];
            }
        }
    }
}

/// Solve the parallel tangents of every interior node from line-compound
/// seeds. Returns the number of nodes where the solve failed.
pub fn equilibrate_field(
    field: &mut VectorField,
    model: &dyn FreeEnergyModel,
    settings: SolverSettings,
) -> usize {
    let grid = field.grid;
    field
        .data
        .par_iter_mut()
        .enumerate()
        .map_init(
            || ParallelTangentSolver::new(settings),
            |solver, (k, node)| {
                if grid.interior_coords(k).is_none() {
                    return 0;
                }
                usize::from(!equilibrate(node, model, solver, &INITIAL_CHAIN).resolved)
            },
        )
        .sum()
}

/// Pairs of (system, precipitate) compositions and the phases of a planar
/// 1D layout.
fn planar_pair(layout: Layout1D) -> Option<([f64; NC], [f64; NC], Phase, Phase)> {
    match layout {
        Layout1D::GammaDelta => Some(([0.15, 0.15], [0.0125, 0.25], Phase::Gamma, Phase::Delta)),
        Layout1D::GammaMu => Some(([0.05, 0.35], [0.05, 0.45], Phase::Gamma, Phase::Mu)),
        Layout1D::GammaLaves => Some(([0.3625, 0.1625], [0.3625, 0.275], Phase::Gamma, Phase::Laves)),
        Layout1D::DeltaLaves => Some(([0.25, 0.25], [0.0125, 0.25], Phase::Laves, Phase::Delta)),
        Layout1D::FourPhase => None,
    }
}

/// Precipitate on the first third of the line, matrix elsewhere.
pub fn planar_interface(grid: Grid, layout: Layout1D) -> VectorField {
    let Some((system, precipitate, matrix, phase)) = planar_pair(layout) else {
        return four_phase(grid);
    };
    let mut field = VectorField::new(grid);

    let nx = grid.nx;
    let n_prcp = nx / 3;
    let mut comp = Composition::default();
    for i in 0..n_prcp as isize {
        let node = field.at_mut(i, 0);
        node.x = precipitate;
        node.phi[secondary_slot(phase)] = 1.0 - EPSILON;
        comp.claim(secondary_slot(phase), precipitate);
    }

    let share = comp.matrix_share(system, nx).unwrap_or(system);
    for i in n_prcp as isize..nx as isize {
        let node = field.at_mut(i, 0);
        node.x = share;
        if matrix != Phase::Gamma {
            node.phi[secondary_slot(matrix)] = 1.0 - EPSILON;
        }
    }
    field
}

/// Three seeds of Nx/8 nodes, one per secondary phase, Nx/3 apart.
pub fn four_phase(grid: Grid) -> VectorField {
    const SYSTEM: [f64; NC] = [0.30, 0.1625];
    const SEEDS: [[f64; NC]; NP] = [[0.0125, 0.25], [0.05, 0.45], [0.3625, 0.275]];

    let mut field = VectorField::new(grid);
    let nx = grid.nx;
    let (len, spacing) = (nx / 8, nx / NP);
    let mut comp = Composition::default();
    for (slot, x) in SEEDS.iter().enumerate() {
        let start = slot * spacing;
        for i in start..(start + len).min(nx) {
            let node = field.at_mut(i as isize, 0);
            node.x = *x;
            node.phi[slot] = 1.0 - EPSILON;
            comp.claim(slot, *x);
        }
    }
    rebalance(&mut field, &comp, SYSTEM);
    field
}

/// Embed the 2D precipitate layout and return the accumulated composition.
pub fn embed_layout(field: &mut VectorField, layout: Layout2D, meshres: f64) -> Composition {
    let g = field.grid;
    let (nx, ny) = (g.nx as isize, g.ny as isize);
    let radius = 3.0 * MIN_STABLE_RADIUS / g.dx;
    if radius > (g.ny / 2) as f64 {
        tracing::warn!(
            radius,
            ny = g.ny,
            "domain too small for the precipitates, expand beyond {:.1} nodes",
            2.0 * radius
        );
    }

    let scale = 5.0e-9 / meshres;
    let xoff = (16.0 * scale) as isize;
    let yoff = (32.0 * scale) as isize;
    let pos = 1.0 - EPSILON;
    let neg = -1.0 + EPSILON;
    let at = |k: isize| ny - k * yoff + yoff / 2;
    let seed = |phase: Phase| {
        let k = phase.index();
        [X_CR[k], X_NB[k]]
    };

    let mut comp = Composition::default();
    match layout {
        Layout2D::Pairwise => {
            let placements = [
                (Phase::Delta, nx / 2, at(1), pos),
                (Phase::Delta, nx / 2 + xoff, at(5), pos),
                (Phase::Delta, nx / 2, at(3), neg),
                (Phase::Delta, nx / 2 - xoff, at(6), neg),
                (Phase::Mu, nx / 2, at(2), pos),
                (Phase::Mu, nx / 2 - xoff, at(4), pos),
                (Phase::Mu, nx / 2 + xoff, at(3), neg),
                (Phase::Mu, nx / 2, at(5), neg),
                (Phase::Laves, nx / 2 + xoff, at(1), pos),
                (Phase::Laves, nx / 2, at(4), pos),
                (Phase::Laves, nx / 2 - xoff, at(2), neg),
                (Phase::Laves, nx / 2, at(6), neg),
            ];
            for (phase, i, j, phi) in placements {
                comp += embed_particle(field, (i, j), phase, radius, seed(phase), phi);
            }
        }
        Layout2D::ParticleRow => {
            for (phase, i) in [
                (Phase::Delta, nx / 2),
                (Phase::Mu, nx / 2 - xoff),
                (Phase::Laves, nx / 2 + xoff),
            ] {
                comp += embed_particle(field, (i, ny / 2), phase, radius, seed(phase), pos);
            }
        }
        Layout2D::StripeRow => {
            for (phase, i) in [
                (Phase::Delta, nx / 2),
                (Phase::Mu, nx / 2 - xoff),
                (Phase::Laves, nx / 2 + xoff),
            ] {
                comp += embed_stripe(field, i, phase, radius as usize, seed(phase), pos);
            }
        }
        Layout2D::Planar => {
            comp += embed_stripe(field, nx / 4, Phase::Delta, g.nx / 4, [0.15, 0.15], pos);
        }
    }
    comp
}

/// Grid-wide mean composition a 2D layout is rebalanced to. The planar
/// interface is a dilute gamma/delta couple; the rest use the nominal alloy.
pub fn system_composition(layout: Layout2D) -> [f64; NC] {
    match layout {
        Layout2D::Planar => [0.15, 0.15],
        _ => [X_CR[0], X_NB[0]],
    }
}

/// Build the 2D microstructure (without equilibration).
pub fn microstructure_2d(grid: Grid, layout: Layout2D, meshres: f64) -> VectorField {
    let mut field = VectorField::new(grid);
    let mut comp = embed_layout(&mut field, layout, meshres);
    comp += enrich_matrix(&mut field, BELL);
    rebalance(&mut field, &comp, system_composition(layout));
    field
}

/// A generated initial condition.
pub struct Generated {
    /// Equilibrated field with its halo filled.
    pub field: VectorField,
    /// Nodes whose parallel-tangent solve failed.
    pub failures: usize,
}

/// Build and equilibrate the initial condition for a `dim`-dimensional run.
pub fn generate(dim: usize, cfg: &RunConfig, model: &dyn FreeEnergyModel) -> Result<Generated> {
    let meshres = cfg.numerics.meshres;
    let grid = Grid::new(dim, &cfg.nodes, meshres, cfg.boundary)?;

    let mut field = match dim {
        1 => planar_interface(grid, cfg.layout_1d),
        2 => microstructure_2d(grid, cfg.layout_2d, meshres),
        _ => return Err(SimError::UnsupportedDimension(dim)),
    };

    let failures = equilibrate_field(&mut field, model, cfg.numerics.solver);
    field.fill_halo();
    tracing::info!(
        dim,
        nx = grid.nx,
        ny = grid.ny,
        failures,
        "generated initial condition"
    );
    Ok(Generated { field, failures })
}
