//! # Model predictive law
//!
//! Each tick the model is linearised about the current state and discretised with backward
//! Euler at the control period, which stays stable for the stiff sections at the coarse MPC
//! rate. Over the horizon the predicted tip position is `x_tip + J (q_k - q_0)`, and the
//! pseudo-pressure sequence minimises
//!
//! `sum_k |x_k - x_ref|² + r |u_k / p_max|²`
//!
//! subject to `|u| <= p_max`. The first input of the sequence is applied and the whole sequence,
//! shifted by one step, warm starts the next tick. If the optimizer fails the previous input is
//! kept.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod optimizer;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

pub use optimizer::{BoxQp, Optimizer, OptimizerError, ProjectedGradient, Solution};

use super::law::{tip_jacobian, Command, ControlLaw, LawError};
use crate::robot_params::TrunkConfig;
use crate::state::{ControllerReference, State};
use crate::trunk_model::{SoftTrunkModel, PA_PER_MBAR};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct Mpc {
    optimizer: Box<dyn Optimizer>,

    horizon: usize,

    /// Weight of the normalised input
    input_weight: f64,

    /// Units: millibar
    p_max: f64,

    /// Units: seconds
    dt: f64,

    /// Solution of the last tick, used as the warm start
    u_prev: DVector<f64>,

    /// Last applied pseudo-pressure.
    ///
    /// Units: millibar
    p_prev: DVector<f64>,
}

/// Tip positions over the horizon as an affine function of the stacked inputs:
/// `x = offset + gain * u`.
struct Prediction {
    offset: DVector<f64>,
    gain: DMatrix<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Mpc {
    /// Create the law with the built-in optimizer.
    pub fn new(config: &Arc<TrunkConfig>) -> Self {
        let params = &config.params().ctrl.mpc;

        Self::with_optimizer(
            config,
            Box::new(ProjectedGradient::new(params.max_iters, params.tolerance)),
        )
    }

    /// Create the law around any optimizer.
    pub fn with_optimizer(config: &Arc<TrunkConfig>, optimizer: Box<dyn Optimizer>) -> Self {
        let params = &config.params().ctrl.mpc;
        let m = config.pseudo_size();

        Self {
            optimizer,
            horizon: params.horizon,
            input_weight: params.input_weight,
            p_max: config.params().p_max_mbar,
            dt: 1.0 / params.rate_hz,
            u_prev: DVector::zeros(m * params.horizon),
            p_prev: DVector::zeros(m),
        }
    }

    /// Predict the tip positions over the horizon.
    fn predict(&self, state: &State, model: &SoftTrunkModel) -> Result<Prediction, LawError> {
        let dp = model.dynamic_params();
        let j = tip_jacobian(model)?;
        let dt = self.dt;
        let n = state.dof();
        let m = dp.a_pseudo.ncols();
        let nu = m * self.horizon;

        // Backward Euler: (B + dt D + dt² K) dq' = B dq + dt (A u - c - g - K q), q' = q + dt dq'
        let m_inv = (&dp.b + &dp.d * dt + &dp.k * (dt * dt))
            .try_inverse()
            .ok_or(LawError::SingularMatrix("B + dt D + dt² K"))?;

        let dq_dq = &m_inv * &dp.b;
        let dq_q = &m_inv * &dp.k * -dt;
        let dq_u = &m_inv * &dp.a_pseudo * (PA_PER_MBAR * dt);
        let dq_c = &m_inv * (&dp.c + &dp.g) * -dt;

        let x0 = model.tip_position();
        let x0 = DVector::from_column_slice(x0.as_slice());

        let mut q_free = state.q.clone();
        let mut dq_free = state.dq.clone();
        let mut s_q = DMatrix::zeros(n, nu);
        let mut s_dq = DMatrix::zeros(n, nu);

        let mut offset = DVector::zeros(3 * self.horizon);
        let mut gain = DMatrix::zeros(3 * self.horizon, nu);

        for k in 0..self.horizon {
            dq_free = &dq_dq * &dq_free + &dq_q * &q_free + &dq_c;
            q_free += &dq_free * dt;

            s_dq = &dq_dq * &s_dq + &dq_q * &s_q;
            let mut block = s_dq.columns_mut(k * m, m);
            block += &dq_u;
            s_q += &s_dq * dt;

            offset
                .rows_mut(3 * k, 3)
                .copy_from(&(&x0 + j * (&q_free - &state.q)));
            gain.rows_mut(3 * k, 3).copy_from(&(j * &s_q));
        }

        Ok(Prediction { offset, gain })
    }

    /// Build the quadratic program for the given tip reference.
    fn problem(&self, prediction: &Prediction, reference: &ControllerReference) -> BoxQp {
        let nu = prediction.gain.ncols();

        let mut target = DVector::zeros(prediction.offset.len());
        for k in 0..self.horizon {
            target.rows_mut(3 * k, 3).copy_from(&reference.x_ref);
        }
        let error = &prediction.offset - target;

        let weight = self.input_weight / (self.p_max * self.p_max);
        let mut hessian = prediction.gain.transpose() * &prediction.gain;
        for i in 0..nu {
            hessian[(i, i)] += weight;
        }

        BoxQp {
            hessian,
            linear: prediction.gain.transpose() * error,
            lower: DVector::from_element(nu, -self.p_max),
            upper: DVector::from_element(nu, self.p_max),
        }
    }

    /// The previous solution advanced by one step, repeating the last input.
    fn warm_start(&self) -> DVector<f64> {
        let m = self.p_prev.len();
        let nu = self.u_prev.len();

        let mut warm = self.u_prev.clone();
        if self.horizon > 1 {
            let shifted = self.u_prev.rows(m, nu - m).clone_owned();
            warm.rows_mut(0, nu - m).copy_from(&shifted);
        }
        warm
    }
}

impl ControlLaw for Mpc {
    fn name(&self) -> &'static str {
        "mpc"
    }

    fn compute(
        &mut self,
        state: &State,
        reference: &ControllerReference,
        model: &SoftTrunkModel,
    ) -> Result<Command, LawError> {
        let m = self.p_prev.len();
        let prediction = self.predict(state, model)?;
        let qp = self.problem(&prediction, reference);

        match self.optimizer.solve(&qp, &self.warm_start()) {
            Ok(sol) => {
                if !sol.converged {
                    debug!("MPC optimizer stopped after {} iterations", sol.iterations);
                }
                self.p_prev = sol.x.rows(0, m).clone_owned();
                self.u_prev = sol.x;
            }
            Err(e) => warn!("MPC optimizer failed, keeping the previous input: {}", e),
        }

        let force = &model.dynamic_params().a_pseudo * &self.p_prev * PA_PER_MBAR;

        Ok(Command::from_pseudo(model, self.p_prev.clone(), force))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::robot_params::RobotParams;
    use nalgebra::Vector3;

    struct Failing;

    impl Optimizer for Failing {
        fn solve(&mut self, _: &BoxQp, _: &DVector<f64>) -> Result<Solution, OptimizerError> {
            Err(OptimizerError::NonFinite)
        }
    }

    fn setup() -> (Arc<TrunkConfig>, SoftTrunkModel, State) {
        let config = RobotParams::default().finalize().unwrap();
        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let state = State::zeros(12);
        model.update_state(&state).unwrap();
        (config, model, state)
    }

    fn task_ref(x: Vector3<f64>) -> ControllerReference {
        ControllerReference::from_task(12, x, Vector3::zeros(), Vector3::zeros())
    }

    #[test]
    fn test_input_moves_tip_towards_target() {
        let (config, model, state) = setup();
        let x0 = model.tip_position();

        let hold = Mpc::new(&config)
            .compute(&state, &task_ref(x0), &model)
            .unwrap();
        let moved = Mpc::new(&config)
            .compute(&state, &task_ref(x0 + Vector3::new(0.02, 0.0, 0.0)), &model)
            .unwrap();

        // Quasi-static tip displacement caused by the change of input
        let dp = model.dynamic_params();
        let k_inv = dp.k.clone().try_inverse().unwrap();
        let du = &moved.pseudo - &hold.pseudo;
        let dx = tip_jacobian(&model).unwrap() * (k_inv * &dp.a_pseudo * du * PA_PER_MBAR);

        assert!(dx[0] > 0.0);
        assert!(dx[0].abs() > dx[1].abs());
    }

    #[test]
    fn test_inputs_are_bounded() {
        let (config, model, state) = setup();

        let far = model.tip_position() + Vector3::new(1.0, -1.0, 0.5);
        let cmd = Mpc::new(&config)
            .compute(&state, &task_ref(far), &model)
            .unwrap();

        assert_eq!(cmd.pseudo.len(), 4);
        assert!(cmd.pseudo.iter().all(|p| p.abs() <= 600.0 + 1e-9));
        assert!(cmd.pressure.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn test_failure_keeps_previous_input() {
        let (config, model, state) = setup();
        let mut law = Mpc::with_optimizer(&config, Box::new(Failing));

        let cmd = law
            .compute(&state, &task_ref(Vector3::new(0.1, 0.0, 0.0)), &model)
            .unwrap();

        assert_eq!(cmd.pseudo, DVector::zeros(4));
        assert_eq!(cmd.force, DVector::zeros(12));
    }
}
