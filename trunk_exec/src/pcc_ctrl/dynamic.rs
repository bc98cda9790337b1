//! # Dynamic law
//!
//! Curvature space PD control on top of gravity, elastic and damping compensation:
//!
//! `f = D dq_ref + Kp (q_ref - q) + Kd (dq_ref - dq)`
//!
//! The force is expressed as pseudo-pressures and added to the compensation before allocation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;

use super::law::{Command, ControlLaw, LawError};
use crate::robot_params::TrunkConfig;
use crate::state::{ControllerReference, State};
use crate::trunk_model::SoftTrunkModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct Dynamic {
    k_p: f64,
    k_d: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Dynamic {
    pub fn new(config: &Arc<TrunkConfig>) -> Self {
        let gains = &config.params().ctrl.dynamic;

        Self {
            k_p: gains.k_p,
            k_d: gains.k_d,
        }
    }
}

impl ControlLaw for Dynamic {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn compute(
        &mut self,
        state: &State,
        reference: &ControllerReference,
        model: &SoftTrunkModel,
    ) -> Result<Command, LawError> {
        let dp = model.dynamic_params();
        let r = &reference.state_ref;

        let force = &dp.d * &r.dq + (&r.q - &state.q) * self.k_p + (&r.dq - &state.dq) * self.k_d;
        let pseudo = model.force_to_pseudo(&force) + model.gravity_compensate(state);

        Ok(Command::from_pseudo(model, pseudo, force))
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
    use nalgebra::DVector;

    #[test]
    fn test_at_reference_only_compensates() {
        let config = RobotParams::default().finalize().unwrap();
        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let mut law = Dynamic::new(&config);

        let mut q = DVector::zeros(12);
        q[0] = 0.1;
        q[7] = -0.05;
        let state = State::at_rest(q);
        model.update_state(&state).unwrap();

        let cmd = law
            .compute(&state, &ControllerReference::from_state(state.clone()), &model)
            .unwrap();

        assert_relative_eq!(cmd.force.amax(), 0.0);
        let comp = model.gravity_compensate(&state);
        assert_relative_eq!(cmd.pseudo, comp, epsilon = 1e-12);
        assert_eq!(cmd.pressure, model.pseudo2real(&comp));
    }
}
