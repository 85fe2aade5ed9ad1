// src/diagnostics.rs
//
// Tab-delimited run logs:
//
//   c.log  one line per logged step:
//          dt  x_Cr  x_Nb  p_gam  p_del  p_mu  p_lav  energy  velocity  failures
//   t.log  one line per attempt (adaptive runs only):
//          velocity  min(dtp,dtc)/dt  dt
//          rejected attempts are prefixed with a tab.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SimError};
use crate::summary::Summary;
use crate::timestep::StepDecision;

pub const COMPOSITION_LOG: &str = "c.log";
pub const TIMESTEP_LOG: &str = "t.log";

struct LogFile {
    path: PathBuf,
    w: BufWriter<File>,
}

impl LogFile {
    fn open(path: PathBuf, append: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(|e| SimError::io(&path, e))?;
        Ok(Self {
            path,
            w: BufWriter::new(file),
        })
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) -> Result<()> {
        writeln!(self.w, "{}", text).map_err(|e| SimError::io(&self.path, e))
    }

    fn flush(&mut self) -> Result<()> {
        self.w.flush().map_err(|e| SimError::io(&self.path, e))
    }
}

pub struct DiagnosticsLog {
    composition: LogFile,
    timestep: Option<LogFile>,
}

impl DiagnosticsLog {
    /// Start fresh logs in `dir`. `t.log` is only kept for adaptive runs.
    pub fn create(dir: &Path, adaptive: bool) -> Result<Self> {
        Self::open(dir, adaptive, false)
    }

    /// Continue the logs of an earlier run in `dir`.
    pub fn append(dir: &Path, adaptive: bool) -> Result<Self> {
        Self::open(dir, adaptive, true)
    }

    fn open(dir: &Path, adaptive: bool, append: bool) -> Result<Self> {
        let composition = LogFile::open(dir.join(COMPOSITION_LOG), append)?;
        let timestep = if adaptive {
            Some(LogFile::open(dir.join(TIMESTEP_LOG), append)?)
        } else {
            None
        };
        Ok(Self {
            composition,
            timestep,
        })
    }

    pub fn log_step(&mut self, dt: f64, s: &Summary) -> Result<()> {
        let x = s.mean_x();
        let p = s.mean_fractions();
        self.composition.line(format_args!(
            "{:.6e}\t{:.6e}\t{:.6e}\t{:.6e}\t{:.6e}\t{:.6e}\t{:.6e}\t{:.6e}\t{:.6e}\t{}",
            dt, x[0], x[1], p[0], p[1], p[2], p[3], s.energy, s.velocity, s.failures
        ))
    }

    pub fn log_decision(&mut self, d: &StepDecision, stability_ratio: f64) -> Result<()> {
        let Some(t) = self.timestep.as_mut() else {
            return Ok(());
        };
        let lead = if d.accepted() { "" } else { "\t" };
        t.line(format_args!(
            "{}{:.6e}\t{:.6e}\t{:.6e}",
            lead, d.velocity, stability_ratio, d.dt
        ))
    }

    pub fn finish(&mut self) -> Result<()> {
        self.composition.flush()?;
        if let Some(t) = self.timestep.as_mut() {
            t.flush()?;
        }
        Ok(())
    }
}

impl Drop for DiagnosticsLog {
    fn drop(&mut self) {
        // errors here have nowhere to go; finish() reports them
        let _ = self.finish();
    }
}

/// One-line console summary of a logged step.
pub fn status_line(time: f64, dt: f64, s: &Summary) -> String {
    let x = s.mean_x();
    let p = s.mean_fractions();
    format!(
        "t={:.4e}s dt={:.3e}s x=({:.4},{:.4}) gam={:.4} del={:.4} mu={:.4} lav={:.4} F={:.6e}J v={:.3e}m/s fail={}",
        time, dt, x[0], x[1], p[0], p[1], p[2], p[3], s.energy, s.velocity, s.failures
    )
}
