//! # Trunk Executable Parameters
//!
//! This module provides the parameters of the trunk executable: which robot parameters to load,
//! which law to run and for how long, and what reference to track.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::robot_params::{ControllerType, RobotParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecParams {
    /// Robot parameter file, relative to the parameters directory
    pub robot_params: String,

    /// Law to run instead of the one in the robot parameters
    pub controller_type: Option<ControllerType>,

    /// Control rate to use instead of the law's configured rate.
    ///
    /// Units: Hertz
    pub rate_hz: Option<f64>,

    /// How long to run the controller for.
    ///
    /// Units: seconds
    pub duration_s: f64,

    /// Period between status messages.
    ///
    /// Units: seconds
    pub status_period_s: f64,

    /// Start the control log as soon as the controller is running
    pub log: bool,

    /// Directory to write the control log into, defaults to the session's archive directory
    pub log_dir: Option<String>,

    /// Curvature space target, one element per degree of freedom
    pub q_ref: Option<Vec<f64>>,

    /// Task space target of the tip.
    ///
    /// Units: meters
    pub x_ref_m: Option<[f64; 3]>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExecParamsError {
    #[error("The run duration must be positive and finite, found {0} s")]
    InvalidDuration(f64),

    #[error("The status period must be positive and finite, found {0} s")]
    InvalidStatusPeriod(f64),

    #[error("The control rate override must be positive and finite, found {0} Hz")]
    InvalidRate(f64),

    #[error("The curvature target has {found} elements but the trunk has {expected} degrees of freedom")]
    TargetSizeMismatch { expected: usize, found: usize },
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl ExecParams {
    /// Check the parameters which don't depend on the robot.
    pub fn validate(&self) -> Result<(), ExecParamsError> {
        if !(self.duration_s > 0.0) || !self.duration_s.is_finite() {
            return Err(ExecParamsError::InvalidDuration(self.duration_s));
        }

        if !(self.status_period_s > 0.0) || !self.status_period_s.is_finite() {
            return Err(ExecParamsError::InvalidStatusPeriod(self.status_period_s));
        }

        match self.rate_hz {
            Some(r) if !(r > 0.0) || !r.is_finite() => Err(ExecParamsError::InvalidRate(r)),
            _ => Ok(()),
        }
    }

    /// Apply the law and rate overrides to the robot parameters.
    pub fn apply(&self, robot: &mut RobotParams) {
        if let Some(ctrl) = self.controller_type {
            robot.controller_type = ctrl;
        }

        if let Some(rate_hz) = self.rate_hz {
            robot.ctrl.set_rate_hz(robot.controller_type, rate_hz);
        }
    }

    /// The curvature target as a vector, checked against the trunk's degrees of freedom.
    pub fn q_target(&self, dof: usize) -> Result<Option<DVector<f64>>, ExecParamsError> {
        match &self.q_ref {
            Some(q) if q.len() != dof => Err(ExecParamsError::TargetSizeMismatch {
                expected: dof,
                found: q.len(),
            }),
            Some(q) => Ok(Some(DVector::from_column_slice(q))),
            None => Ok(None),
        }
    }

    /// The task space target as a vector.
    pub fn x_target(&self) -> Option<Vector3<f64>> {
        self.x_ref_m.map(|x| Vector3::new(x[0], x[1], x[2]))
    }
}

impl Default for ExecParams {
    fn default() -> Self {
        Self {
            robot_params: String::from("trunk.toml"),
            controller_type: None,
            rate_hz: None,
            duration_s: 10.0,
            status_period_s: 1.0,
            log: false,
            log_dir: None,
            q_ref: None,
            x_ref_m: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
