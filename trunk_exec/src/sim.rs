//! # Simulator
//!
//! Forward integrates the trunk model under a constant chamber pressure for one control step.
//! The model is evaluated once per control step. Within the step the state is advanced with a
//! Beeman integrator at a much finer fixed step, re-evaluating only the stiffness and damping
//! forces, which are cheap.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::DVector;
use std::sync::Arc;

use crate::robot_params::TrunkConfig;
use crate::state::State;
use crate::trunk_model::{ModelError, SoftTrunkModel, PA_PER_MBAR};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Inner integration step.
///
/// Units: seconds
pub const SIM_STEP_S: f64 = 1e-5;

/// Any state component larger than this means the simulation has diverged.
pub const DIVERGENCE_BOUND: f64 = 1e10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Simulates the trunk in place of the hardware.
pub struct Simulator {
    model: SoftTrunkModel,

    /// Units: seconds
    control_step_s: f64,

    /// Number of inner steps per control step
    num_steps: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Simulator {
    /// Create a simulator with its own model of the trunk.
    pub fn new(config: Arc<TrunkConfig>, control_step_s: f64) -> Result<Self, ModelError> {
        Ok(Self {
            model: SoftTrunkModel::new(config)?,
            control_step_s,
            num_steps: ((control_step_s / SIM_STEP_S).round() as usize).max(1),
        })
    }

    /// Length of one control step.
    ///
    /// Units: seconds
    pub fn control_step_s(&self) -> f64 {
        self.control_step_s
    }

    /// Advance `state` by one control step under the chamber pressures `p` (millibar).
    ///
    /// Returns `Ok(false)` if the simulation has diverged, in which case it must not be stepped
    /// again.
    pub fn simulate(&mut self, p: &DVector<f64>, state: &mut State) -> Result<bool, ModelError> {
        self.model.update_state(state)?;
        let dp = self.model.dynamic_params();

        let b_inv = dp
            .b
            .clone()
            .try_inverse()
            .ok_or(ModelError::SingularInertia)?;

        // ddq = B⁻¹(A p - c - g) - B⁻¹K q - B⁻¹D dq
        let b_inv_rest = &b_inv * (&dp.a * p * PA_PER_MBAR - &dp.c - &dp.g);
        let b_inv_k = -&b_inv * &dp.k;
        let b_inv_d = -&b_inv * &dp.d;

        let h = self.control_step_s / self.num_steps as f64;
        let mut ddq_prev;

        for _ in 0..self.num_steps {
            ddq_prev = std::mem::replace(
                &mut state.ddq,
                &b_inv_rest + &b_inv_k * &state.q + &b_inv_d * &state.dq,
            );

            state.q += &state.dq * h + (&state.ddq * 4.0 - &ddq_prev) * (h * h / 6.0);
            state.dq += ((&state.ddq * 2.0 - &ddq_prev) * 2.0 + &state.ddq * 5.0 - &ddq_prev)
                * (h / 6.0);
        }

        let ok = state.is_finite()
            && state
                .q
                .iter()
                .chain(state.dq.iter())
                .chain(state.ddq.iter())
                .all(|v| v.abs() <= DIVERGENCE_BOUND);

        trace!("Simulated {} s, ok: {}", self.control_step_s, ok);

        Ok(ok)
    }

    /// The simulator's model, at the state of the last step.
    pub fn model(&self) -> &SoftTrunkModel {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
