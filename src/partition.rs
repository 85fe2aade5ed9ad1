// src/partition.rs
//
// Strip decomposition of a field along its outermost axis (x in 1D, y in 2D).
//
// Every partition owns a double-buffered `VectorField` covering its strip
// plus a halo. Sides shared with a neighbouring strip carry no boundary tag
// and are filled by `exchange_halos`; with a periodic outer axis the first
// and last strips are neighbours too.

use rayon::prelude::*;

use crate::error::{Result, SimError};
use crate::grid::{Boundary, Grid};
use crate::vector_field::{Node, VectorField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buffer {
    Old,
    New,
}

#[derive(Debug, Clone)]
pub struct Subdomain {
    /// Global outer-axis coordinate of this strip's first interior layer.
    pub offset: usize,
    pub old: VectorField,
    pub new: VectorField,
}

impl Subdomain {
    pub fn field(&self, buffer: Buffer) -> &VectorField {
        match buffer {
            Buffer::Old => &self.old,
            Buffer::New => &self.new,
        }
    }

    pub fn field_mut(&mut self, buffer: Buffer) -> &mut VectorField {
        match buffer {
            Buffer::Old => &mut self.old,
            Buffer::New => &mut self.new,
        }
    }

    fn outer_extent(&self) -> usize {
        let g = self.old.grid;
        g.extent(g.outer_axis())
    }

    /// Make the freshly computed buffer current.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.old, &mut self.new);
    }
}

#[derive(Debug, Clone)]
pub struct Domain {
    /// Global grid.
    pub grid: Grid,
    pub parts: Vec<Subdomain>,
}

impl Domain {
    /// Split `field` into `parts` strips along the outer axis. Both buffers of
    /// every strip start as copies of `field`.
    pub fn decompose(field: &VectorField, parts: usize) -> Result<Self> {
        let grid = field.grid;
        let axis = grid.outer_axis();
        let n = grid.extent(axis);
        if parts == 0 || parts > n {
            return Err(SimError::Config(format!(
                "cannot split {} layers into {} partitions",
                n, parts
            )));
        }
        if parts > 1 && n / parts < grid.halo {
            return Err(SimError::Config(format!(
                "partitions of {} layers are thinner than the halo ({})",
                n / parts,
                grid.halo
            )));
        }

        let periodic = grid.boundary[axis] == [Some(Boundary::Periodic); 2];
        let mut subs = Vec::with_capacity(parts);
        let mut offset = 0;
        for k in 0..parts {
            let len = n / parts + usize::from(k < n % parts);
            let mut g = grid;
            if axis == 0 {
                g.nx = len;
            } else {
                g.ny = len;
            }
            if parts > 1 {
                let first = k == 0;
                let last = k + 1 == parts;
                g.boundary[axis][0] = if first && !periodic { grid.boundary[axis][0] } else { None };
                g.boundary[axis][1] = if last && !periodic { grid.boundary[axis][1] } else { None };
            }

            let mut f = VectorField::new(g);
            for l in 0..len as isize {
                let global = offset as isize + l;
                if axis == 0 {
                    *f.at_mut(l, 0) = *field.at(global, 0);
                } else {
                    for i in 0..g.nx as isize {
                        *f.at_mut(i, l) = *field.at(i, global);
                    }
                }
            }
            subs.push(Subdomain {
                offset,
                old: f.clone(),
                new: f,
            });
            offset += len;
        }
        Ok(Self { grid, parts: subs })
    }

    /// Fill every ghost layer of `buffer`: physical sides by their boundary
    /// rule, shared sides by copying the neighbour's outermost interior layers.
    pub fn exchange_halos(&mut self, buffer: Buffer) {
        self.parts
            .par_iter_mut()
            .for_each(|p| p.field_mut(buffer).fill_halo());

        let n = self.parts.len();
        if n == 1 {
            return;
        }
        let axis = self.grid.outer_axis();
        let halo = self.grid.halo as isize;

        // (target part, target layer, nodes)
        let mut transfers: Vec<(usize, isize, Vec<Node>)> = Vec::new();
        for (k, part) in self.parts.iter().enumerate() {
            let bc = part.old.grid.boundary[axis];
            let len = part.outer_extent() as isize;
            if bc[0].is_none() {
                let lo = &self.parts[(k + n - 1) % n];
                let lo_len = lo.outer_extent() as isize;
                for d in 0..halo {
                    let layer = lo.field(buffer).outer_layer(lo_len - 1 - d);
                    transfers.push((k, -1 - d, layer));
                }
            }
            if bc[1].is_none() {
                let hi = &self.parts[(k + 1) % n];
                for d in 0..halo {
                    transfers.push((k, len + d, hi.field(buffer).outer_layer(d)));
                }
            }
        }
        for (k, l, nodes) in transfers {
            self.parts[k].field_mut(buffer).set_outer_layer(l, &nodes);
        }
    }

    pub fn swap_all(&mut self) {
        for p in self.parts.iter_mut() {
            p.swap();
        }
    }

    /// Reassemble `buffer` into one field over the global grid, halo filled.
    pub fn gather(&self, buffer: Buffer) -> VectorField {
        let mut out = VectorField::new(self.grid);
        let axis = self.grid.outer_axis();
        for p in &self.parts {
            let f = p.field(buffer);
            let g = f.grid;
            for j in 0..g.ny as isize {
                for i in 0..g.nx as isize {
                    let (gi, gj) = if axis == 0 {
                        (i + p.offset as isize, j)
                    } else {
                        (i, j + p.offset as isize)
                    };
                    *out.at_mut(gi, gj) = *f.at(i, j);
                }
            }
        }
        out.fill_halo();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(grid: Grid) -> VectorField {
        let mut f = VectorField::new(grid);
        for j in 0..grid.ny as isize {
            for i in 0..grid.nx as isize {
                f.at_mut(i, j).x = [i as f64, j as f64];
            }
        }
        f
    }

    #[test]
    fn strips_cover_the_grid() {
        let field = numbered(Grid::plane(4, 10, 1.0, Boundary::Neumann));
        let d = Domain::decompose(&field, 3).unwrap();
        let sizes: Vec<usize> = d.parts.iter().map(|p| p.old.grid.ny).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(d.parts[2].offset, 7);
        assert_eq!(d.parts[0].old.grid.boundary[1], [Some(Boundary::Neumann), None]);
        assert_eq!(d.parts[1].old.grid.boundary[1], [None, None]);

        let mut whole = field.clone();
        whole.fill_halo();
        assert_eq!(d.gather(Buffer::Old), whole);
    }

    #[test]
    fn exchange_matches_monolithic_halo() {
        let mut field = numbered(Grid::plane(5, 9, 1.0, Boundary::Periodic));
        let mut d = Domain::decompose(&field, 3).unwrap();
        d.exchange_halos(Buffer::Old);
        field.fill_halo();

        for p in &d.parts {
            let g = p.old.grid;
            let off = p.offset as isize;
            for j in -1..=g.ny as isize {
                for i in -1..=g.nx as isize {
                    assert_eq!(
                        p.old.at(i, j),
                        field.at(i, j + off),
                        "part at {} ghost ({}, {})",
                        off,
                        i,
                        j
                    );
                }
            }
        }
    }

    #[test]
    fn one_dimensional_neumann_exchange() {
        let mut field = numbered(Grid::line(7, 1.0, Boundary::Neumann));
        let mut d = Domain::decompose(&field, 2).unwrap();
        d.exchange_halos(Buffer::Old);
        field.fill_halo();
        assert_eq!(d.parts[0].old.at(4, 0), field.at(4, 0));
        assert_eq!(d.parts[1].old.at(-1, 0), field.at(3, 0));
        assert_eq!(d.parts[0].old.at(-1, 0), field.at(-1, 0));
        assert_eq!(d.parts[1].old.at(3, 0), field.at(7, 0));
    }

    #[test]
    fn too_many_partitions_is_a_config_error() {
        let field = numbered(Grid::line(3, 1.0, Boundary::Neumann));
        assert!(Domain::decompose(&field, 4).is_err());
        assert!(Domain::decompose(&field, 0).is_err());
    }
}
