//! # Inverse dynamics law
//!
//! Task space tracking of the tip through the model's inverse dynamics. The desired tip
//! acceleration is mapped to a curvature acceleration with the right pseudo-inverse of the tip
//! Jacobian, the null space is damped, and the torque is obtained from the full model:
//!
//! `tau = B ddq + c + g + K q + D dq`

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

pub struct InverseDynamics {
    k_p: f64,
    k_d: f64,

    /// Units: seconds
    dt: f64,

    /// Tip Jacobian at the previous tick
    j_prev: Option<DMatrix<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InverseDynamics {
    pub fn new(config: &Arc<TrunkConfig>) -> Self {
        let gains = &config.params().ctrl.inverse_dynamics;

        Self {
            k_p: gains.k_p,
            k_d: gains.k_d,
            dt: 1.0 / gains.rate_hz,
            j_prev: None,
        }
    }
}

impl ControlLaw for InverseDynamics {
    fn name(&self) -> &'static str {
        "inverse_dynamics"
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

        // Rate of the Jacobian between ticks, zero on the first tick
        let dj = match self.j_prev.replace(j.clone()) {
            Some(j_prev) => (j - j_prev) / self.dt,
            None => DMatrix::zeros(j.nrows(), j.ncols()),
        };

        let x = model.tip_position();
        let dx = j * &state.dq;
        let dx = Vector3::new(dx[0], dx[1], dx[2]);

        let ddx_d = reference.ddx_ref
            + (reference.x_ref - x) * self.k_p
            + (reference.dx_ref - dx) * self.k_d;
        let ddx_d = DVector::from_column_slice(ddx_d.as_slice());

        let j_inv = j.transpose()
            * (j * j.transpose())
                .try_inverse()
                .ok_or(LawError::SingularMatrix("J J^T"))?;

        let null = DMatrix::identity(n, n) - &j_inv * j;
        let ddq = &j_inv * (ddx_d - &dj * &state.dq) + null * (&state.dq * -self.k_d);

        let tau = &dp.b * ddq + &dp.c + &dp.g + &dp.k * &state.q + &dp.d * &state.dq;
        let pseudo = model.force_to_pseudo(&tau);

        Ok(Command::from_pseudo(model, pseudo, tau))
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
    fn test_at_rest_on_target_holds() {
        let config = RobotParams::default().finalize().unwrap();
        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let mut law = InverseDynamics::new(&config);

        let mut q = DVector::zeros(12);
        q[0] = 0.1;
        q[6] = 0.1;
        let state = State::at_rest(q);
        model.update_state(&state).unwrap();

        let reference = ControllerReference::from_task(
            12,
            model.tip_position(),
            Vector3::zeros(),
            Vector3::zeros(),
        );
        let cmd = law.compute(&state, &reference, &model).unwrap();

        // No tracking error and no motion: the torque only holds the state
        let dp = model.dynamic_params();
        let hold = &dp.c + &dp.g + &dp.k * &state.q;
        assert_relative_eq!(cmd.force, hold, epsilon = 1e-9);
        assert_eq!(cmd.pseudo.len(), 4);
    }

    #[test]
    fn test_tip_error_drives_acceleration() {
        let config = RobotParams::default().finalize().unwrap();
        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let mut law = InverseDynamics::new(&config);

        let mut q = DVector::zeros(12);
        q[0] = 0.05;
        let state = State::at_rest(q);
        model.update_state(&state).unwrap();

        let x = model.tip_position();
        let target = x + Vector3::new(0.01, 0.0, 0.0);
        let reference = ControllerReference::from_task(
            12,
            target,
            Vector3::zeros(),
            Vector3::zeros(),
        );
        let cmd = law.compute(&state, &reference, &model).unwrap();

        // The requested acceleration moves the tip towards the target
        let dp = model.dynamic_params();
        let hold = &dp.c + &dp.g + &dp.k * &state.q;
        let b_inv = dp.b.clone().try_inverse().unwrap();
        let ddq = b_inv * (&cmd.force - hold);
        let ddx = tip_jacobian(&model).unwrap() * ddq;

        assert_relative_eq!(ddx[0], 70.0 * 0.01, epsilon = 1e-4);
        assert_relative_eq!(ddx[1], 0.0, epsilon = 1e-4);
    }
}
