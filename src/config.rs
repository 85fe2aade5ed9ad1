// src/config.rs
//
// Run configuration: everything a run needs besides the grid itself.
// Defaults reproduce the IN625 constants; any subset can be overridden from
// a JSON file, and the effective configuration is written next to the
// outputs as config.json.

use std::fs::{self, File};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::free_energy::{FreeEnergyModel, ParabolicModel, RegularSolutionModel};
use crate::grid::Boundary;
use crate::params::{well_height, Material, Numerics, MESHRES};
use crate::vector_field::{NC, NP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Parabolic,
    RegularSolution,
}

impl ModelKind {
    pub fn build(self) -> Box<dyn FreeEnergyModel> {
        match self {
            ModelKind::Parabolic => Box::new(ParabolicModel::in625()),
            ModelKind::RegularSolution => Box::new(RegularSolutionModel::in625_sketch()),
        }
    }
}

/// One-dimensional initial conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout1D {
    GammaDelta,
    GammaMu,
    GammaLaves,
    DeltaLaves,
    FourPhase,
}

/// Two-dimensional initial conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout2D {
    /// Twelve particles, four per secondary phase, in heterogeneous pairs.
    Pairwise,
    /// One particle of each secondary phase in a row.
    ParticleRow,
    /// One stripe of each secondary phase in a row.
    StripeRow,
    /// A single gamma/delta planar interface.
    Planar,
}

/// Parse a kebab-case variant name through serde.
pub fn parse_name<T: DeserializeOwned>(name: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}

/// Material constants as written in the configuration. The well height is
/// derived from the interfacial energy and the interface width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub kappa: [f64; NP],
    pub mobility: [f64; NP],
    /// Interfacial energy (J/m^2).
    pub sigma: f64,
    pub width_factor: f64,
    /// Interface width in units of the mesh resolution.
    pub interface_width: f64,
    pub alpha: f64,
    pub diffusivity: [[f64; NC]; NC],
}

impl Default for MaterialConfig {
    fn default() -> Self {
        let m = Material::in625(MESHRES);
        Self {
            kappa: m.kappa,
            mobility: m.mobility,
            sigma: 1.01,
            width_factor: 2.2,
            interface_width: 10.0,
            alpha: m.alpha,
            diffusivity: m.diffusivity,
        }
    }
}

impl MaterialConfig {
    pub fn material(&self, meshres: f64) -> Material {
        let omega = well_height(self.sigma, self.width_factor, self.interface_width * meshres);
        Material {
            kappa: self.kappa,
            mobility: self.mobility,
            omega: [omega; NP],
            alpha: self.alpha,
            diffusivity: self.diffusivity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelKind,
    pub material: MaterialConfig,
    pub numerics: Numerics,
    pub boundary: Boundary,
    pub layout_1d: Layout1D,
    pub layout_2d: Layout2D,
    /// Generated grid extents (x, y); y is ignored in 1D.
    pub nodes: [usize; 2],
    pub steps: usize,
    /// Strips along the outer axis.
    pub partitions: usize,
    /// Accepted steps between log lines; defaults to min(100000, steps).
    pub log_every: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::Parabolic,
            material: MaterialConfig::default(),
            numerics: Numerics::default(),
            boundary: Boundary::Neumann,
            layout_1d: Layout1D::GammaDelta,
            layout_2d: Layout2D::Pairwise,
            nodes: [768, 192],
            steps: 1000,
            partitions: 1,
            log_every: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn write_to_dir(&self, out_dir: &Path) -> Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(&path).map_err(|e| SimError::io(&path, e))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let n = &self.numerics;
        if !(n.meshres > 0.0) {
            return Err(SimError::Config(format!("meshres must be positive, got {}", n.meshres)));
        }
        if !(n.solver.tolerance > 0.0) || n.solver.max_iterations == 0 {
            return Err(SimError::Config("solver needs a positive tolerance and iteration cap".into()));
        }
        if !(n.scale_down > 0.0 && n.scale_down < 1.0) || n.scale_up < 1.0 {
            return Err(SimError::Config(format!(
                "timestep scaling must shrink below 1 and grow above 1 (down {}, up {})",
                n.scale_down, n.scale_up
            )));
        }
        if self.partitions == 0 {
            return Err(SimError::Config("at least one partition is required".into()));
        }
        if self.nodes.iter().any(|&n| n == 0) {
            return Err(SimError::Config("grid extents must be non-zero".into()));
        }
        Ok(())
    }

    pub fn material(&self) -> Material {
        self.material.material(self.numerics.meshres)
    }

    pub fn log_every(&self) -> usize {
        self.log_every.unwrap_or(100_000.min(self.steps)).max(1)
    }
}
