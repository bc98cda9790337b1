//! Control law gains and rates

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::{ConfigError, ControllerType};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains of every control law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtrlParams {
    /// Per coordinate PID law
    pub pid: PidGains,

    /// Model based curvature space law
    pub dynamic: PdGains,

    /// Operational space law
    pub osc: PdGains,

    /// Inverse dynamics law
    pub inverse_dynamics: PdGains,

    /// Model predictive law
    pub mpc: MpcParams,

    /// Characterization sweep
    pub characterize: CharacterizeParams,
}

/// Gains of the PID law, applied to every coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,

    /// Units: Hertz
    pub rate_hz: f64,
}

/// Proportional and derivative gains of a model based law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdGains {
    pub k_p: f64,
    pub k_d: f64,

    /// Units: Hertz
    pub rate_hz: f64,
}

/// Parameters of the model predictive law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcParams {
    /// Number of steps in the prediction horizon
    pub horizon: usize,

    /// Weight of the squared input in the cost
    pub input_weight: f64,

    /// Maximum number of optimizer iterations per cycle
    pub max_iters: usize,

    /// Convergence tolerance on the change of the solution between iterations
    pub tolerance: f64,

    /// Units: Hertz
    pub rate_hz: f64,
}

/// Parameters of the characterization sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterizeParams {
    /// Segment which is swept
    pub segment: usize,

    /// Magnitude of the pseudo-pressure command.
    ///
    /// Units: millibar
    pub pressure_mbar: f64,

    /// Number of evenly spaced command directions
    pub num_directions: usize,

    /// Number of ticks each direction is held before it is sampled
    pub hold_ticks: usize,

    /// Units: Hertz
    pub rate_hz: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CtrlParams {
    /// Control rate of the given law.
    ///
    /// Units: Hertz
    pub fn rate_hz(&self, ctrl: ControllerType) -> f64 {
        match ctrl {
            ControllerType::Pid => self.pid.rate_hz,
            ControllerType::Dynamic => self.dynamic.rate_hz,
            ControllerType::Osc => self.osc.rate_hz,
            ControllerType::InverseDynamics => self.inverse_dynamics.rate_hz,
            ControllerType::Mpc => self.mpc.rate_hz,
            ControllerType::Characterize => self.characterize.rate_hz,
        }
    }

    /// Override the control rate of the given law.
    ///
    /// Units: Hertz
    pub fn set_rate_hz(&mut self, ctrl: ControllerType, rate_hz: f64) {
        let rate = match ctrl {
            ControllerType::Pid => &mut self.pid.rate_hz,
            ControllerType::Dynamic => &mut self.dynamic.rate_hz,
            ControllerType::Osc => &mut self.osc.rate_hz,
            ControllerType::InverseDynamics => &mut self.inverse_dynamics.rate_hz,
            ControllerType::Mpc => &mut self.mpc.rate_hz,
            ControllerType::Characterize => &mut self.characterize.rate_hz,
        };
        *rate = rate_hz;
    }

    pub(super) fn validate(&self, num_segments: usize) -> Result<(), ConfigError> {
        let rates = [
            self.pid.rate_hz,
            self.dynamic.rate_hz,
            self.osc.rate_hz,
            self.inverse_dynamics.rate_hz,
            self.mpc.rate_hz,
            self.characterize.rate_hz,
        ];
        if let Some(r) = rates.iter().find(|r| !(**r > 0.0) || !r.is_finite()) {
            return Err(ConfigError::InvalidValue {
                name: "ctrl rate_hz",
                value: *r,
            });
        }

        if self.mpc.horizon == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ctrl.mpc.horizon",
                value: 0.0,
            });
        }

        if self.characterize.segment >= num_segments {
            return Err(ConfigError::InvalidValue {
                name: "ctrl.characterize.segment",
                value: self.characterize.segment as f64,
            });
        }

        if self.characterize.num_directions == 0 || self.characterize.hold_ticks == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ctrl.characterize",
                value: 0.0,
            });
        }

        Ok(())
    }
}

impl Default for CtrlParams {
    fn default() -> Self {
        Self {
            pid: PidGains {
                k_p: 0.1,
                k_i: 0.0,
                k_d: 0.005,
                rate_hz: 100.0,
            },
            dynamic: PdGains {
                k_p: 0.1,
                k_d: 0.0,
                rate_hz: 100.0,
            },
            osc: PdGains {
                k_p: 70.0,
                k_d: 5.5,
                rate_hz: 50.0,
            },
            inverse_dynamics: PdGains {
                k_p: 70.0,
                k_d: 5.5,
                rate_hz: 50.0,
            },
            mpc: MpcParams {
                horizon: 7,
                input_weight: 1e-4,
                max_iters: 200,
                tolerance: 1e-9,
                rate_hz: 20.0,
            },
            characterize: CharacterizeParams {
                segment: 0,
                pressure_mbar: 300.0,
                num_directions: 12,
                hold_ticks: 50,
                rate_hz: 50.0,
            },
        }
    }
}
