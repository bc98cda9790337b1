//! # Rigid chain
//!
//! Joint space dynamics of a serial chain of rigid bodies. The augmented rigid arm describes its
//! chain with a [`ChainDescription`] and consumes the dynamics through the [`RigidBodySolver`]
//! trait, so that any solver honouring the same numeric contract can be swapped in. The default
//! solver is the recursive Newton-Euler implementation in [`newton_euler`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod description;
pub mod newton_euler;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, Isometry3};
use thiserror::Error;

pub use description::{BodyDesc, ChainDescription, FrameDesc, JointDesc, JointKind};
pub use newton_euler::NewtonEulerChain;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A solver for the dynamics of a fixed serial chain.
///
/// Results must be identical for identical inputs.
pub trait RigidBodySolver: Send {
    /// Number of joints (generalized coordinates) of the chain.
    fn num_joints(&self) -> usize;

    /// Number of named frames whose kinematics are reported.
    fn num_frames(&self) -> usize;

    /// Compute the joint space mass matrix, bias term and gravity term at the given joint
    /// positions and velocities.
    fn dynamics(
        &self,
        xi: &DVector<f64>,
        dxi: &DVector<f64>,
    ) -> Result<JointSpaceDynamics, ChainError>;

    /// Compute the pose and translational Jacobian of every named frame, in the base frame.
    fn kinematics(&self, xi: &DVector<f64>) -> Result<Vec<FrameKinematics>, ChainError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joint space dynamics terms, `B(xi) ddxi + c(xi, dxi) + g(xi) = tau`.
#[derive(Debug, Clone)]
pub struct JointSpaceDynamics {
    /// Mass matrix
    pub b_xi: DMatrix<f64>,

    /// Coriolis and centrifugal terms
    pub c_xi: DVector<f64>,

    /// Gravity terms, the gradient of the potential energy
    pub g_xi: DVector<f64>,
}

/// Kinematics of a named frame.
#[derive(Debug, Clone)]
pub struct FrameKinematics {
    /// Pose of the frame in the base frame
    pub pose: Isometry3<f64>,

    /// Translational velocity Jacobian, 3 rows by one column per joint
    pub jacobian: DMatrix<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with the rigid chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Expected {expected} joint values, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Joint {0} is invalid, axes must be non-zero and masses non-negative")]
    InvalidJoint(String),

    #[error("Frame {name} is attached to joint {joint}, which does not exist")]
    InvalidFrame { name: String, joint: usize },
}
