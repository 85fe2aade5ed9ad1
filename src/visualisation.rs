// src/visualisation.rs

use crate::energy::h;
use crate::vector_field::{VectorField, NC, NP};
use plotters::prelude::*;

/// Phase and composition values along one row of the grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    /// Position along x (m).
    pub position: Vec<f64>,
    pub phi: [Vec<f64>; NP],
    pub x: [Vec<f64>; NC],
}

/// Extract the midline row (j = ny/2); in 1D this is the whole line.
pub fn midline_profile(field: &VectorField) -> Profile {
    let g = field.grid;
    let j = (g.ny / 2) as isize;
    let mut p = Profile::default();
    for i in 0..g.nx as isize {
        let n = field.at(i, j);
        p.position.push(g.dx * i as f64);
        for k in 0..NP {
            p.phi[k].push(n.phi[k]);
        }
        for k in 0..NC {
            p.x[k].push(n.x[k]);
        }
    }
    p
}

const PHI_COLOURS: [RGBColor; NP] = [RED, GREEN, BLUE];
const PHI_LABELS: [&str; NP] = ["phi_delta", "phi_mu", "phi_laves"];
const X_COLOURS: [RGBColor; NC] = [MAGENTA, CYAN];
const X_LABELS: [&str; NC] = ["x_Cr", "x_Nb"];

/// Line plot of order parameters and mole fractions along the midline.
pub fn save_profile_plot(
    field: &VectorField,
    title: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let p = midline_profile(field);
    let Some(&x_max) = p.position.last() else {
        return Ok(());
    };
    let x_max = x_max.max(field.grid.dx);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, -1.1..1.1)?;

    chart
        .configure_mesh()
        .x_desc("x (m)")
        .y_desc("order parameter / mole fraction")
        .draw()?;

    for k in 0..NP {
        let colour = PHI_COLOURS[k];
        chart
            .draw_series(LineSeries::new(
                p.position.iter().zip(p.phi[k].iter()).map(|(&x, &v)| (x, v)),
                &colour,
            ))?
            .label(PHI_LABELS[k])
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &colour));
    }
    for k in 0..NC {
        let colour = X_COLOURS[k];
        chart
            .draw_series(LineSeries::new(
                p.position.iter().zip(p.x[k].iter()).map(|(&x, &v)| (x, v)),
                &colour,
            ))?
            .label(X_LABELS[k])
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &colour));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Blend the phase colours by their interpolated fractions; gamma is white.
fn phase_colour(phi: &[f64; NP]) -> RGBColor {
    let w: Vec<f64> = phi.iter().map(|&p| h(p.abs())).collect();
    let gamma = (1.0 - w.iter().sum::<f64>()).clamp(0.0, 1.0);
    let mut rgb = [255.0 * gamma; 3];
    for (k, wk) in w.iter().enumerate() {
        let RGBColor(r, g, b) = PHI_COLOURS[k];
        rgb[0] += wk * r as f64;
        rgb[1] += wk * g as f64;
        rgb[2] += wk * b as f64;
    }
    let c = |v: f64| v.clamp(0.0, 255.0) as u8;
    RGBColor(c(rgb[0]), c(rgb[1]), c(rgb[2]))
}

/// Colour map of the microstructure: white matrix, red delta, green mu,
/// blue Laves.
pub fn save_phase_map(field: &VectorField, filename: &str) -> Result<(), Box<dyn std::error::Error>> {
    let nx = field.grid.nx as i32;
    let ny = field.grid.ny as i32;

    let root = BitMapBackend::new(filename, (1024, (1024 * ny / nx.max(1)).clamp(64, 1024) as u32))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0..nx, 0..ny)?;

    chart
        .configure_mesh()
        .x_desc("x (node)")
        .y_desc("y (node)")
        .disable_mesh()
        .draw()?;

    chart.draw_series((0..nx).flat_map(|i| {
        (0..ny).map(move |j| {
            let n = field.at(i as isize, j as isize);
            Rectangle::new([(i, j), (i + 1, j + 1)], phase_colour(&n.phi).filled())
        })
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Boundary, Grid};

    #[test]
    fn midline_of_a_plane() {
        let mut f = VectorField::new(Grid::plane(4, 3, 2.0, Boundary::Neumann));
        for i in 0..4 {
            f.at_mut(i, 1).phi[0] = 0.25 * i as f64;
            f.at_mut(i, 1).x = [0.3, 0.1 * i as f64];
        }
        let p = midline_profile(&f);
        assert_eq!(p.position, vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(p.phi[0], vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(p.x[1][3], 0.1 * 3.0);
        assert_eq!(p.phi[2], vec![0.0; 4]);
    }

    #[test]
    fn phase_colours() {
        assert_eq!(phase_colour(&[0.0; NP]), RGBColor(255, 255, 255));
        assert_eq!(phase_colour(&[1.0, 0.0, 0.0]), RGBColor(255, 0, 0));
        assert_eq!(phase_colour(&[0.0, 0.0, -1.0]), RGBColor(0, 0, 255));
    }
}
