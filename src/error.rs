// src/error.rs
//
// Fatal error taxonomy for a run. Equilibrium-solver non-convergence is not
// here: it is absorbed per node and only counted.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("{0}-dimensional grids unsupported")]
    UnsupportedDimension(usize),

    #[error(
        "interface swept {sweep:.3}dx in one step (limit {limit:.3}dx), timestep is too aggressive"
    )]
    InterfaceOvershoot { sweep: f64, limit: f64 },

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed grid file: {0}")]
    Format(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status reported by the CLI for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnsupportedDimension(_) => 2,
            Self::Io { .. } => 3,
            Self::InterfaceOvershoot { .. } => 4,
            Self::Format(_) | Self::Config(_) | Self::Json(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
