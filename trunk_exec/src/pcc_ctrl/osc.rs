//! # Operational space law
//!
//! Tip tracking with the operational space formulation. The task force is computed with the
//! operational space inertia `(J B⁻¹ Jᵀ)⁻¹` and the remaining motion is damped through the
//! dynamically consistent null space projector.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, Vector3};
use std::sync::Arc;

use super::law::{tip_jacobian, Command, ControlLaw, LawError};
use crate::robot_params::TrunkConfig;
use crate::state::{ControllerReference, State};
use crate::trunk_model::SoftTrunkModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct Osc {
    k_p: f64,
    k_d: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Osc {
    pub fn new(config: &Arc<TrunkConfig>) -> Self {
        let gains = &config.params().ctrl.osc;

        Self {
            k_p: gains.k_p,
            k_d: gains.k_d,
        }
    }
}

impl ControlLaw for Osc {
    fn name(&self) -> &'static str {
        "osc"
    }

    fn compute(
        &mut self,
        state: &State,
        reference: &ControllerReference,
        model: &SoftTrunkModel,
    ) -> Result<Command, LawError> {
        let dp = model.dynamic_params();
        let j = tip_jacobian(model)?;
        let n = state.dof();

        let b_inv = dp
            .b
            .clone()
            .try_inverse()
            .ok_or(LawError::SingularMatrix("B"))?;

        // Operational space inertia and the dynamically consistent inverse of J
        let b_op = (j * &b_inv * j.transpose())
            .try_inverse()
            .ok_or(LawError::SingularMatrix("J B^-1 J^T"))?;
        let j_bar = &b_inv * j.transpose() * &b_op;

        let x = model.tip_position();
        let dx = j * &state.dq;
        let dx = Vector3::new(dx[0], dx[1], dx[2]);

        let ddx_d = reference.ddx_ref
            + (reference.x_ref - x) * self.k_p
            + (reference.dx_ref - dx) * self.k_d;
        let f = &b_op * DVector::from_column_slice(ddx_d.as_slice());

        let null = DMatrix::identity(n, n) - j.transpose() * j_bar.transpose();
        let tau_null = &state.dq * -self.k_d;

        let tau = j.transpose() * f
            + null * tau_null
            + &dp.g
            + &dp.c
            + &dp.k * &state.q
            + &dp.d * &state.dq;
        let pseudo = model.force_to_pseudo(&tau);

        Ok(Command::from_pseudo(model, pseudo, tau))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
