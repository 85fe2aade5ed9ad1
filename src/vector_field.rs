// src/vector_field.rs

use crate::energy::h;
use crate::grid::{Boundary, Grid};

/// Independent components (Cr, Nb); Ni is implicit.
pub const NC: usize = 2;
/// Secondary phases (delta, mu, Laves).
pub const NP: usize = 3;
/// Scalars per node in the persisted layout.
pub const FIELDS: usize = NC + NP + NC * (NP + 1) + 1;

/// State of one grid node.
///
/// Persisted slot order: `x` (0..2), `phi` (2..5), `c` gamma/delta/mu/Laves
/// (5..13), `v` (13).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Node {
    /// System composition (x_Cr, x_Nb).
    pub x: [f64; NC],
    /// Signed order parameters of delta, mu, Laves.
    pub phi: [f64; NP],
    /// Fictitious compositions of gamma, delta, mu, Laves.
    pub c: [[f64; NC]; NP + 1],
    /// Cached local interface velocity (m/s).
    pub v: f64,
}

impl Node {
    /// Interpolated phase fractions (gamma, delta, mu, Laves).
    pub fn fractions(&self) -> [f64; NP + 1] {
        let del = h(self.phi[0].abs());
        let mu = h(self.phi[1].abs());
        let lav = h(self.phi[2].abs());
        [1.0 - del - mu - lav, del, mu, lav]
    }

    pub fn to_array(&self) -> [f64; FIELDS] {
        let mut out = [0.0; FIELDS];
        out[0..NC].copy_from_slice(&self.x);
        out[NC..NC + NP].copy_from_slice(&self.phi);
        for (p, cp) in self.c.iter().enumerate() {
            let k = NC + NP + NC * p;
            out[k..k + NC].copy_from_slice(cp);
        }
        out[FIELDS - 1] = self.v;
        out
    }

    pub fn from_slice(v: &[f64]) -> Option<Self> {
        if v.len() != FIELDS {
            return None;
        }
        let mut n = Node::default();
        n.x.copy_from_slice(&v[0..NC]);
        n.phi.copy_from_slice(&v[NC..NC + NP]);
        for (p, cp) in n.c.iter_mut().enumerate() {
            let k = NC + NP + NC * p;
            cp.copy_from_slice(&v[k..k + NC]);
        }
        n.v = v[FIELDS - 1];
        Some(n)
    }
}

/// Read-only view of a node and its face neighbours.
pub struct Stencil<'a> {
    pub center: &'a Node,
    lo: [&'a Node; 2],
    hi: [&'a Node; 2],
    dim: usize,
    dx: f64,
}

impl<'a> Stencil<'a> {
    /// Five-point (three-point in 1D) Laplacian of a node quantity.
    #[inline]
    pub fn laplacian(&self, f: impl Fn(&Node) -> f64) -> f64 {
        let c = f(self.center);
        let mut sum = 0.0;
        for d in 0..self.dim {
            sum += (f(self.hi[d]) + f(self.lo[d])) - 2.0 * c;
        }
        sum / (self.dx * self.dx)
    }

    /// Central-difference gradient; the y entry is zero in 1D.
    #[inline]
    pub fn gradient(&self, f: impl Fn(&Node) -> f64) -> [f64; 2] {
        let mut g = [0.0; 2];
        for d in 0..self.dim {
            g[d] = (f(self.hi[d]) - f(self.lo[d])) / (2.0 * self.dx);
        }
        g
    }

    /// Squared forward differences toward the upper neighbours. Summed over the
    /// grid this counts every face once, and its variation is -2x the Laplacian.
    #[inline]
    pub fn forward_gradient_sq(&self, f: impl Fn(&Node) -> f64) -> f64 {
        let c = f(self.center);
        let mut sum = 0.0;
        for d in 0..self.dim {
            let g = (f(self.hi[d]) - c) / self.dx;
            sum += g * g;
        }
        sum
    }
}

/// Node field on a padded grid.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    pub grid: Grid,
    pub data: Vec<Node>,
}

impl VectorField {
    pub fn new(grid: Grid) -> Self {
        let (px, py) = grid.padded();
        Self {
            grid,
            data: vec![Node::default(); px * py],
        }
    }

    #[inline]
    pub fn idx(&self, i: isize, j: isize) -> usize {
        self.grid.idx(i, j)
    }

    #[inline]
    pub fn at(&self, i: isize, j: isize) -> &Node {
        &self.data[self.grid.idx(i, j)]
    }

    #[inline]
    pub fn at_mut(&mut self, i: isize, j: isize) -> &mut Node {
        let k = self.grid.idx(i, j);
        &mut self.data[k]
    }

    /// Set every interior node.
    pub fn set_uniform(&mut self, node: Node) {
        for j in 0..self.grid.ny as isize {
            for i in 0..self.grid.nx as isize {
                *self.at_mut(i, j) = node;
            }
        }
    }

    /// Interior nodes in x-fastest order.
    pub fn interior(&self) -> impl Iterator<Item = &Node> + '_ {
        let g = self.grid;
        (0..g.ny as isize)
            .flat_map(move |j| (0..g.nx as isize).map(move |i| (i, j)))
            .map(move |(i, j)| self.at(i, j))
    }

    pub fn stencil(&self, i: isize, j: isize) -> Stencil<'_> {
        let center = self.at(i, j);
        let mut lo = [center; 2];
        let mut hi = [center; 2];
        lo[0] = self.at(i - 1, j);
        hi[0] = self.at(i + 1, j);
        if self.grid.dim == 2 {
            lo[1] = self.at(i, j - 1);
            hi[1] = self.at(i, j + 1);
        }
        Stencil {
            center,
            lo,
            hi,
            dim: self.grid.dim,
            dx: self.grid.dx,
        }
    }

    /// Apply the physical boundary rules to every ghost layer. Sides tagged
    /// `None` are left for halo exchange.
    pub fn fill_halo(&mut self) {
        let g = self.grid;
        let h = g.halo as isize;
        let (px, _) = g.padded();

        // x first over interior rows, then y over full padded rows so that
        // corners see already-filled x ghosts.
        let nx = g.nx as isize;
        for j in 0..g.ny as isize {
            for k in 1..=h {
                if let Some(src) = ghost_source(g.boundary[0][0], -k, nx) {
                    self.data[g.idx(-k, j)] = *self.at(src, j);
                }
                if let Some(src) = ghost_source(g.boundary[0][1], nx - 1 + k, nx) {
                    self.data[g.idx(nx - 1 + k, j)] = *self.at(src, j);
                }
            }
        }

        if g.dim == 2 {
            let ny = g.ny as isize;
            for k in 1..=h {
                for ip in 0..px as isize {
                    let i = ip - h;
                    if let Some(src) = ghost_source(g.boundary[1][0], -k, ny) {
                        self.data[g.idx(i, -k)] = *self.at(i, src);
                    }
                    if let Some(src) = ghost_source(g.boundary[1][1], ny - 1 + k, ny) {
                        self.data[g.idx(i, ny - 1 + k)] = *self.at(i, src);
                    }
                }
            }
        }
    }

    /// Nodes whose coordinate along the outer axis equals `l`, including the
    /// ghost columns of the other axis.
    pub fn outer_layer(&self, l: isize) -> Vec<Node> {
        let g = self.grid;
        if g.dim == 1 {
            vec![*self.at(l, 0)]
        } else {
            let (px, _) = g.padded();
            let start = g.idx(-(g.halo as isize), l);
            self.data[start..start + px].to_vec()
        }
    }

    pub fn set_outer_layer(&mut self, l: isize, nodes: &[Node]) {
        let g = self.grid;
        if g.dim == 1 {
            *self.at_mut(l, 0) = nodes[0];
        } else {
            let (px, _) = g.padded();
            let start = g.idx(-(g.halo as isize), l);
            self.data[start..start + px].copy_from_slice(&nodes[..px]);
        }
    }
}

/// Interior coordinate that fills ghost coordinate `g` along an axis of
/// `n` interior nodes, or None when the side is exchanged.
#[inline]
fn ghost_source(bc: Option<Boundary>, g: isize, n: isize) -> Option<isize> {
    let bc = bc?;
    let below = g < 0;
    Some(match (bc, below) {
        (Boundary::Neumann, true) => -g - 1,
        (Boundary::Neumann, false) => 2 * n - 1 - g,
        (Boundary::Periodic, true) => g + n,
        (Boundary::Periodic, false) => g - n,
    })
}
