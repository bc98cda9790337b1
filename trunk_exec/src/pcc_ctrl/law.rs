//! # Control laws
//!
//! A control law turns the current state and reference into a pressure command, given the model
//! updated at that state. The controller host owns exactly one law, selected by the
//! configuration.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::DVector;
use std::sync::Arc;
use thiserror::Error;

use super::{
    characterize::Characterize, dynamic::Dynamic, inverse_dynamics::InverseDynamics,
    mpc::{Mpc, OptimizerError},
    osc::Osc,
    pid::PidLaw,
};
use crate::robot_params::{ControllerType, TrunkConfig};
use crate::state::{ControllerReference, State};
use crate::trunk_model::{ModelError, SoftTrunkModel};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A feedback law run by the controller host once per control tick.
pub trait ControlLaw: Send {
    /// Short name of the law, used in logs.
    fn name(&self) -> &'static str;

    /// Compute the command for the current tick.
    ///
    /// `model` has been updated at `state` before this is called.
    fn compute(
        &mut self,
        state: &State,
        reference: &ControllerReference,
        model: &SoftTrunkModel,
    ) -> Result<Command, LawError>;

    /// Called before the first tick run against a newly set reference.
    fn reference_changed(&mut self) {}

    /// Called once when the host shuts down.
    fn finish(&mut self) {}
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Output of a control law.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Chamber pressures sent to the valves or simulator.
    ///
    /// Units: millibar
    pub pressure: DVector<f64>,

    /// Per segment pseudo-pressures the chamber pressures were allocated from.
    ///
    /// Units: millibar
    pub pseudo: DVector<f64>,

    /// Generalized force requested by the law, zero for laws which work directly in pressure.
    pub force: DVector<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LawError {
    #[error("Model error: {0}")]
    ModelError(ModelError),

    #[error("The {0} matrix is singular")]
    SingularMatrix(&'static str),

    #[error("Optimizer error: {0}")]
    OptimizerError(OptimizerError),

    #[error("Expected {expected} values for {name}, found {found}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Command {
    /// A command with every value zero.
    pub fn zeros(config: &TrunkConfig) -> Self {
        Self {
            pressure: DVector::zeros(config.p_size()),
            pseudo: DVector::zeros(config.pseudo_size()),
            force: DVector::zeros(config.dof()),
        }
    }

    /// Allocate a pseudo-pressure command onto the chambers.
    pub fn from_pseudo(model: &SoftTrunkModel, pseudo: DVector<f64>, force: DVector<f64>) -> Self {
        Self {
            pressure: model.pseudo2real(&pseudo),
            pseudo,
            force,
        }
    }
}

impl From<ModelError> for LawError {
    fn from(e: ModelError) -> Self {
        Self::ModelError(e)
    }
}

impl From<OptimizerError> for LawError {
    fn from(e: OptimizerError) -> Self {
        Self::OptimizerError(e)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the law selected in the configuration.
pub fn from_config(config: &Arc<TrunkConfig>) -> Box<dyn ControlLaw> {
    match config.params().controller_type {
        ControllerType::Pid => Box::new(PidLaw::new(config)),
        ControllerType::Dynamic => Box::new(Dynamic::new(config)),
        ControllerType::Osc => Box::new(Osc::new(config)),
        ControllerType::InverseDynamics => Box::new(InverseDynamics::new(config)),
        ControllerType::Mpc => Box::new(Mpc::new(config)),
        ControllerType::Characterize => Box::new(Characterize::new(config)),
    }
}

/// Tip Jacobian of the last segment, or an error if the model has none.
pub(super) fn tip_jacobian(
    model: &SoftTrunkModel,
) -> Result<&nalgebra::DMatrix<f64>, LawError> {
    let j = &model.dynamic_params().j;
    j.last().ok_or(LawError::DimensionMismatch {
        name: "tip Jacobians",
        expected: model.config().num_segments(),
        found: 0,
    })
}
