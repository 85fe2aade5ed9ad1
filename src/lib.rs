// src/lib.rs

pub mod checkpoint;
pub mod config;
pub mod diagnostics;
pub mod energy;
pub mod equilibrium;
pub mod error;
pub mod free_energy;
pub mod grid;
pub mod guess;
pub mod initial_states;
pub mod params;
pub mod partition;
pub mod simulation;
pub mod stepper;
pub mod summary;
pub mod timestep;
pub mod vector_field;
pub mod visualisation;
