//! # PID law
//!
//! One PID controller per curvature coordinate. The controllers produce a generalized force
//! which is expressed as pseudo-pressures and added to the gravity compensation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::DVector;
use serde::Serialize;
use std::sync::Arc;

use super::law::{Command, ControlLaw, LawError};
use crate::robot_params::TrunkConfig;
use crate::state::{ControllerReference, State};
use crate::trunk_model::SoftTrunkModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,
}

/// Per coordinate PID law.
pub struct PidLaw {
    controllers: Vec<PidController>,

    /// Units: seconds
    dt: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral: 0f64,
            prev_error: None,
        }
    }

    /// Get the value of the controller for the given error, `dt` seconds after the previous
    /// call.
    pub fn get(&mut self, error: f64, dt: f64) -> f64 {
        // Accumulate the integral term
        self.integral += error * dt;

        // Calculate the derivative.
        //
        // On the first call there is no previous error, so we assume no derivative rather than
        // producing a spike.
        let deriv = match self.prev_error {
            Some(e) if dt > 0.0 => (error - e) / dt,
            _ => 0f64,
        };

        // Calculate the output
        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        // Remember the previous error
        self.prev_error = Some(error);

        out
    }

    /// Clear the integral and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
    }
}

impl PidLaw {
    pub fn new(config: &Arc<TrunkConfig>) -> Self {
        let gains = &config.params().ctrl.pid;

        Self {
            controllers: (0..config.dof())
                .map(|_| PidController::new(gains.k_p, gains.k_i, gains.k_d))
                .collect(),
            dt: 1.0 / gains.rate_hz,
        }
    }
}

impl ControlLaw for PidLaw {
    fn name(&self) -> &'static str {
        "pid"
    }

    fn compute(
        &mut self,
        state: &State,
        reference: &ControllerReference,
        model: &SoftTrunkModel,
    ) -> Result<Command, LawError> {
        let dt = self.dt;
        let error = &reference.state_ref.q - &state.q;

        let force = DVector::from_iterator(
            error.len(),
            self.controllers
                .iter_mut()
                .zip(error.iter())
                .map(|(c, e)| c.get(*e, dt)),
        );

        let pseudo = model.force_to_pseudo(&force) + model.gravity_compensate(state);

        Ok(Command::from_pseudo(model, pseudo, force))
    }

    fn reference_changed(&mut self) {
        // Integral and derivative memory belong to the old error
        for c in self.controllers.iter_mut() {
            c.reset();
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::robot_params::RobotParams;
    use approx::assert_relative_eq;

    #[test]
    fn test_pid_terms() {
        let mut pid = PidController::new(2.0, 1.0, 0.5);

        // First call: no derivative, integral accumulates one step
        assert_relative_eq!(pid.get(1.0, 0.1), 2.0 + 0.1);

        // Second call: derivative of the change in error
        assert_relative_eq!(pid.get(0.5, 0.1), 1.0 + 0.15 + 0.5 * -5.0);

        pid.reset();
        assert_relative_eq!(pid.get(0.0, 0.1), 0.0);
    }

    #[test]
    fn test_pid_law_pushes_towards_reference() {
        let config = RobotParams::default().finalize().unwrap();
        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let mut law = PidLaw::new(&config);

        let state = State::zeros(12);
        model.update_state(&state).unwrap();

        let mut q_ref = DVector::zeros(12);
        q_ref[0] = 0.2;
        let cmd = law
            .compute(&state, &ControllerReference::from_state(State::at_rest(q_ref)), &model)
            .unwrap();

        assert_eq!(cmd.pressure.len(), 6);
        assert_eq!(cmd.force.len(), 12);
        assert!(cmd.force[0] > 0.0);
        assert_eq!(cmd.force[1], 0.0);

        // Only the error drives the first segment's x pseudo-pressure away from compensation
        let comp = model.gravity_compensate(&state);
        assert!(cmd.pseudo[0] > comp[0]);
        assert_relative_eq!(cmd.pseudo[2], comp[2], epsilon = 1e-9);
    }

    #[test]
    fn test_new_reference_clears_memory() {
        let mut params = RobotParams::default();
        params.ctrl.pid.k_i = 1.0;
        let config = params.finalize().unwrap();
        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let state = State::zeros(12);
        model.update_state(&state).unwrap();

        let mut q_ref = DVector::zeros(12);
        q_ref[0] = 0.2;
        let reference = ControllerReference::from_state(State::at_rest(q_ref));

        // A fresh law's first output, with no integral and no derivative history
        let first = PidLaw::new(&config)
            .compute(&state, &reference, &model)
            .unwrap();

        let mut law = PidLaw::new(&config);
        for _ in 0..5 {
            law.compute(&state, &reference, &model).unwrap();
        }
        assert!(law.compute(&state, &reference, &model).unwrap().force[0] > first.force[0]);

        law.reference_changed();
        let after = law.compute(&state, &reference, &model).unwrap();
        assert_relative_eq!(after.force, first.force, epsilon = 1e-12);
    }
}
