//! # Control log
//!
//! A CSV table with one row per control tick while logging is active. The columns are the
//! elapsed time, the measured and reference tip positions, the tracking error, then every
//! curvature coordinate and every chamber pressure.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use nalgebra::{DVector, Vector3};
use std::path::{Path, PathBuf};
use std::time::Instant;

use util::archive::{ArchiveError, Archiver};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Name of the log file when none is given.
pub const DEFAULT_LOG_NAME: &str = "defaultController_log";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct ControlLog {
    path: PathBuf,
    dof: usize,
    p_size: usize,

    /// Open archive and the instant logging started
    active: Option<(Archiver, Instant)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlLog {
    /// A stopped log which will write to `{dir}/{name}.csv`.
    pub fn new<P: AsRef<Path>>(dir: P, name: &str, dof: usize, p_size: usize) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.csv", name)),
            dof,
            p_size,
            active: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_logging(&self) -> bool {
        self.active.is_some()
    }

    /// Start logging, truncating any previous file. Does nothing if already logging.
    pub fn start(&mut self) -> Result<(), ArchiveError> {
        if self.active.is_some() {
            return Ok(());
        }

        let mut arch = Archiver::create(&self.path)?;
        arch.write_fields(self.header())?;

        info!("Starting control log to {:?}", self.path);
        self.active = Some((arch, Instant::now()));

        Ok(())
    }

    /// Stop logging and close the file. Does nothing if not logging.
    pub fn stop(&mut self) -> Result<(), ArchiveError> {
        match self.active.take() {
            Some((mut arch, _)) => {
                info!("Ending control log to {:?}", self.path);
                arch.close()
            }
            None => Ok(()),
        }
    }

    /// Start logging if stopped, stop if logging. Returns whether the log is now active.
    pub fn toggle(&mut self) -> Result<bool, ArchiveError> {
        if self.is_logging() {
            self.stop()?;
        } else {
            self.start()?;
        }

        Ok(self.is_logging())
    }

    /// Append a row if logging.
    pub fn write_row(
        &mut self,
        x: &Vector3<f64>,
        x_ref: &Vector3<f64>,
        q: &DVector<f64>,
        p: &DVector<f64>,
    ) -> Result<(), ArchiveError> {
        let (arch, start) = match self.active.as_mut() {
            Some(a) => a,
            None => return Ok(()),
        };

        let row = std::iter::once(start.elapsed().as_secs_f64())
            .chain(x.iter().copied())
            .chain(x_ref.iter().copied())
            .chain(std::iter::once((x - x_ref).norm()))
            .chain(q.iter().copied())
            .chain(p.iter().copied());

        arch.write_values(row)
    }

    fn header(&self) -> Vec<String> {
        ["timestamp", "x", "y", "z", "x_ref", "y_ref", "z_ref", "err"]
            .iter()
            .map(|s| s.to_string())
            .chain((0..self.dof).map(|i| format!("q_{}", i)))
            .chain((0..self.p_size).map(|i| format!("p_{}", i)))
            .collect()
    }
}

impl Drop for ControlLog {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Could not close the control log: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rows_only_while_logging() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ControlLog::new(dir.path(), DEFAULT_LOG_NAME, 2, 3);

        let x = Vector3::new(0.0, 0.0, -0.25);
        let q = DVector::from_vec(vec![0.1, -0.1]);
        let p = DVector::from_vec(vec![100.0, 0.0, 50.0]);

        log.write_row(&x, &x, &q, &p).unwrap();
        assert!(!log.path().exists());

        log.start().unwrap();
        log.start().unwrap();
        log.write_row(&x, &Vector3::new(0.0, 0.0, -0.2), &q, &p).unwrap();
        log.stop().unwrap();
        log.stop().unwrap();
        log.write_row(&x, &x, &q, &p).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "timestamp,x,y,z,x_ref,y_ref,z_ref,err,q_0,q_1,p_0,p_1,p_2"
        );

        let row: Vec<f64> = lines[1].split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(row.len(), 13);
        approx::assert_relative_eq!(row[7], 0.05, epsilon = 1e-12);
        assert_eq!(row[12], 50.0);
    }
}
