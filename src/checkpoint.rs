// src/checkpoint.rs
//
// Grid checkpoints: an ASCII header followed by a binary block of
// little-endian f64, in the spirit of OVF 2.0 "Data Binary 8".
//
//   # alloy625 grid v1
//   # dim: 2
//   # nodes: 768 192
//   # fields: 14
//   # spacing: 5e-9
//   # halo: 1
//   # boundary: neumann neumann neumann neumann
//   # time: 1.25e-2
//   # Begin: Data Binary 8
//   <check value 123456789012345.0> <nx*ny*14 values, x fastest>
//   # End: Data Binary 8

use std::fs::{self, create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Result, SimError};
use crate::grid::{Boundary, Grid};
use crate::vector_field::{Node, VectorField, FIELDS};

const MAGIC: &str = "# alloy625 grid v1";
const BEGIN: &str = "# Begin: Data Binary 8";
const END: &str = "# End: Data Binary 8";
const CHECK: f64 = 123456789012345.0;

fn boundary_name(b: Option<Boundary>) -> &'static str {
    b.map_or("none", |b| b.as_str())
}

fn write_inner(path: &Path, field: &VectorField, time: f64) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let g = &field.grid;
    let mut w = BufWriter::new(File::create(path)?);

    writeln!(w, "{}", MAGIC)?;
    writeln!(w, "# dim: {}", g.dim)?;
    writeln!(w, "# nodes: {} {}", g.nx, g.ny)?;
    writeln!(w, "# fields: {}", FIELDS)?;
    writeln!(w, "# spacing: {:.17e}", g.dx)?;
    writeln!(w, "# halo: {}", g.halo)?;
    writeln!(
        w,
        "# boundary: {} {} {} {}",
        boundary_name(g.boundary[0][0]),
        boundary_name(g.boundary[0][1]),
        boundary_name(g.boundary[1][0]),
        boundary_name(g.boundary[1][1])
    )?;
    writeln!(w, "# time: {:.17e}", time)?;
    writeln!(w, "{}", BEGIN)?;

    w.write_all(&CHECK.to_le_bytes())?;
    for node in field.interior() {
        for v in node.to_array() {
            w.write_all(&v.to_le_bytes())?;
        }
    }

    writeln!(w)?;
    writeln!(w, "{}", END)?;
    w.flush()
}

/// Write the interior of `field` at simulation time `time`.
pub fn write_grid(path: &Path, field: &VectorField, time: f64) -> Result<()> {
    write_inner(path, field, time).map_err(|e| SimError::io(path, e))
}

fn format_err(msg: impl Into<String>) -> SimError {
    SimError::Format(msg.into())
}

fn parse_num<T: std::str::FromStr>(key: &str, s: &str) -> Result<T> {
    s.trim()
        .parse()
        .map_err(|_| format_err(format!("bad value for '{}': '{}'", key, s.trim())))
}

#[derive(Default)]
struct Header {
    dim: Option<usize>,
    nodes: Option<(usize, usize)>,
    fields: Option<usize>,
    spacing: Option<f64>,
    halo: Option<usize>,
    boundary: Option<[[Option<Boundary>; 2]; 2]>,
    time: Option<f64>,
}

fn parse_header(text: &str) -> Result<Header> {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some(MAGIC) {
        return Err(format_err("missing alloy625 grid signature"));
    }

    let mut h = Header::default();
    for line in lines {
        let Some(body) = line.strip_prefix('#') else {
            return Err(format_err(format!("unexpected header line '{}'", line)));
        };
        let Some((key, value)) = body.split_once(':') else {
            continue;
        };
        let key = key.trim();
        match key {
            "dim" => h.dim = Some(parse_num(key, value)?),
            "nodes" => {
                let v: Vec<&str> = value.split_whitespace().collect();
                if v.len() != 2 {
                    return Err(format_err("'nodes' needs two counts"));
                }
                h.nodes = Some((parse_num(key, v[0])?, parse_num(key, v[1])?));
            }
            "fields" => h.fields = Some(parse_num(key, value)?),
            "spacing" => h.spacing = Some(parse_num(key, value)?),
            "halo" => h.halo = Some(parse_num(key, value)?),
            "time" => h.time = Some(parse_num(key, value)?),
            "boundary" => {
                let v: Vec<&str> = value.split_whitespace().collect();
                if v.len() != 4 {
                    return Err(format_err("'boundary' needs four sides"));
                }
                let mut b = [[None; 2]; 2];
                for (k, name) in v.iter().enumerate() {
                    b[k / 2][k % 2] = match *name {
                        "none" => None,
                        other => Some(
                            Boundary::from_str(other)
                                .ok_or_else(|| format_err(format!("unknown boundary '{}'", other)))?,
                        ),
                    };
                }
                h.boundary = Some(b);
            }
            _ => {}
        }
    }
    Ok(h)
}

fn missing(key: &str) -> SimError {
    format_err(format!("header lacks '{}'", key))
}

/// Read a checkpoint written by `write_grid`. Returns the field with its halo
/// filled, and the stored simulation time.
pub fn read_grid(path: &Path) -> Result<(VectorField, f64)> {
    let bytes = fs::read(path).map_err(|e| SimError::io(path, e))?;

    let marker = format!("{}\n", BEGIN);
    let start = bytes
        .windows(marker.len())
        .position(|w| w == marker.as_bytes())
        .ok_or_else(|| format_err(format!("no '{}' marker", BEGIN)))?;
    let text = std::str::from_utf8(&bytes[..start])
        .map_err(|_| format_err("header is not UTF-8"))?;
    let h = parse_header(text)?;

    let dim = h.dim.ok_or_else(|| missing("dim"))?;
    let (nx, ny) = h.nodes.ok_or_else(|| missing("nodes"))?;
    let dx = h.spacing.ok_or_else(|| missing("spacing"))?;
    let fields = h.fields.ok_or_else(|| missing("fields"))?;
    if fields != FIELDS {
        return Err(format_err(format!(
            "{} fields per node, expected {}",
            fields, FIELDS
        )));
    }

    if nx == 0 || ny == 0 {
        return Err(format_err(format!("empty grid of {} x {} nodes", nx, ny)));
    }
    let extents: &[usize] = if dim == 1 { &[nx] } else { &[nx, ny] };
    let mut grid = Grid::new(dim, extents, dx, Boundary::Neumann)?;
    if dim == 1 && ny != 1 {
        return Err(format_err("1D grid with more than one row"));
    }
    let halo = h.halo.unwrap_or(1);
    let narrowest = extents.iter().copied().min().unwrap_or(0);
    if halo == 0 || halo > narrowest {
        return Err(format_err(format!(
            "halo of {} layers on a grid {} nodes across",
            halo, narrowest
        )));
    }
    grid = grid.with_halo(halo);
    if let Some(b) = h.boundary {
        grid.boundary = b;
    }

    let data = &bytes[start + marker.len()..];
    let body = nx
        .checked_mul(ny)
        .and_then(|n| n.checked_mul(FIELDS))
        .and_then(|n| n.checked_add(1))
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(|| format_err(format!("{} x {} nodes overflow the data size", nx, ny)))?;
    if data.len() < body {
        return Err(format_err(format!(
            "binary block holds {} bytes, expected {}",
            data.len(),
            body
        )));
    }
    let mut values = data[..body]
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));

    if values.next() != Some(CHECK) {
        return Err(format_err("bad binary check value"));
    }
    let trailer = String::from_utf8_lossy(&data[body..]);
    if trailer.trim() != END {
        return Err(format_err(format!("missing '{}' trailer", END)));
    }

    let mut field = VectorField::new(grid);
    let mut buf = [0.0; FIELDS];
    for j in 0..grid.ny as isize {
        for i in 0..grid.nx as isize {
            for slot in buf.iter_mut() {
                *slot = values.next().ok_or_else(|| format_err("truncated data"))?;
            }
            *field.at_mut(i, j) =
                Node::from_slice(&buf).ok_or_else(|| format_err("bad node record"))?;
        }
    }
    field.fill_halo();

    Ok((field, h.time.unwrap_or(0.0)))
}
