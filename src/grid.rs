// src/grid.rs

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Physical boundary condition of one side of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Zero flux: ghost layers mirror the interior.
    Neumann,
    /// Ghost layers wrap around to the opposite side.
    Periodic,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boundary::Neumann => "neumann",
            Boundary::Periodic => "periodic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "neumann" => Some(Boundary::Neumann),
            "periodic" => Some(Boundary::Periodic),
            _ => None,
        }
    }
}

/// Uniform 1D or 2D finite-difference grid with a halo of ghost layers.
///
/// Interior nodes have coordinates `0..nx` (and `0..ny` in 2D); ghost layers
/// sit at `-halo..0` and `n..n+halo`. A 1D grid has `ny == 1` and no halo
/// along y. A side whose boundary is `None` belongs to a partition edge and is
/// filled by halo exchange instead of a boundary rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub dim: usize,
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub halo: usize,
    pub boundary: [[Option<Boundary>; 2]; 2],
}

impl Grid {
    /// Create a grid of dimension 1 or 2 with the same boundary on every side.
    pub fn new(dim: usize, extents: &[usize], dx: f64, boundary: Boundary) -> Result<Self> {
        match (dim, extents) {
            (1, [nx, ..]) => Ok(Self::line(*nx, dx, boundary)),
            (2, [nx, ny, ..]) => Ok(Self::plane(*nx, *ny, dx, boundary)),
            (1 | 2, _) => Err(SimError::Config(format!(
                "{} extents given for a {}D grid",
                extents.len(),
                dim
            ))),
            _ => Err(SimError::UnsupportedDimension(dim)),
        }
    }

    pub fn line(nx: usize, dx: f64, boundary: Boundary) -> Self {
        Self {
            dim: 1,
            nx,
            ny: 1,
            dx,
            halo: 1,
            boundary: [[Some(boundary); 2], [None, None]],
        }
    }

    pub fn plane(nx: usize, ny: usize, dx: f64, boundary: Boundary) -> Self {
        Self {
            dim: 2,
            nx,
            ny,
            dx,
            halo: 1,
            boundary: [[Some(boundary); 2]; 2],
        }
    }

    pub fn with_halo(mut self, halo: usize) -> Self {
        self.halo = halo.max(1);
        self
    }

    /// Number of interior nodes.
    pub fn n_nodes(&self) -> usize {
        self.nx * self.ny
    }

    /// Node volume (dx^dim).
    pub fn dv(&self) -> f64 {
        self.dx.powi(self.dim as i32)
    }

    /// Interior extent along an axis.
    pub fn extent(&self, axis: usize) -> usize {
        if axis == 0 {
            self.nx
        } else {
            self.ny
        }
    }

    /// Axis along which partitions are stacked.
    pub fn outer_axis(&self) -> usize {
        self.dim - 1
    }

    /// Padded extents (including ghost layers).
    #[inline]
    pub fn padded(&self) -> (usize, usize) {
        let px = self.nx + 2 * self.halo;
        let py = if self.dim == 2 {
            self.ny + 2 * self.halo
        } else {
            1
        };
        (px, py)
    }

    #[inline]
    fn y_offset(&self) -> isize {
        if self.dim == 2 {
            self.halo as isize
        } else {
            0
        }
    }

    /// Flat index of (i, j) in the padded array. Ghost coordinates are negative
    /// or beyond the interior extent.
    #[inline]
    pub fn idx(&self, i: isize, j: isize) -> usize {
        let h = self.halo as isize;
        let (px, py) = self.padded();
        let ip = i + h;
        let jp = j + self.y_offset();
        debug_assert!(ip >= 0 && (ip as usize) < px && jp >= 0 && (jp as usize) < py);
        jp as usize * px + ip as usize
    }

    /// Interior coordinates of a padded flat index, or None for ghost cells.
    #[inline]
    pub fn interior_coords(&self, k: usize) -> Option<(isize, isize)> {
        let (px, _) = self.padded();
        let i = (k % px) as isize - self.halo as isize;
        let j = (k / px) as isize - self.y_offset();
        if i >= 0 && (i as usize) < self.nx && j >= 0 && (j as usize) < self.ny {
            Some((i, j))
        } else {
            None
        }
    }
}
