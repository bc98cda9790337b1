//! # Curvature state and references
//!
//! The curvature state is the `(q, dq, ddq)` triple of the trunk in curvature space. Each section
//! contributes two coordinates, so every vector has `2 * segments * sections_per_segment`
//! elements.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use util::raise_error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position, velocity and acceleration of the trunk in curvature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Curvature coordinates.
    ///
    /// Units: radians
    pub q: DVector<f64>,

    /// Curvature rates.
    ///
    /// Units: radians/second
    pub dq: DVector<f64>,

    /// Curvature accelerations.
    ///
    /// Units: radians/second^2
    pub ddq: DVector<f64>,
}

/// A target for the controller.
///
/// Laws working in curvature space use `state_ref`, laws working in task space use the `x`
/// terms, which are expressed in the task frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerReference {
    /// Reference curvature state
    pub state_ref: State,

    /// Reference tip position.
    ///
    /// Units: meters
    pub x_ref: Vector3<f64>,

    /// Reference tip velocity.
    ///
    /// Units: meters/second
    pub dx_ref: Vector3<f64>,

    /// Reference tip acceleration.
    ///
    /// Units: meters/second^2
    pub ddx_ref: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State {
    /// A state at rest with zero curvature.
    pub fn zeros(dof: usize) -> Self {
        Self {
            q: DVector::zeros(dof),
            dq: DVector::zeros(dof),
            ddq: DVector::zeros(dof),
        }
    }

    /// A state at rest at the given coordinates.
    pub fn at_rest(q: DVector<f64>) -> Self {
        let dof = q.len();
        Self {
            q,
            dq: DVector::zeros(dof),
            ddq: DVector::zeros(dof),
        }
    }

    /// Number of degrees of freedom of the state.
    pub fn dof(&self) -> usize {
        self.q.len()
    }

    /// Returns true if all three vectors have `dof` elements.
    pub fn has_dof(&self, dof: usize) -> bool {
        self.q.len() == dof && self.dq.len() == dof && self.ddq.len() == dof
    }

    /// Check the state against the configured number of degrees of freedom.
    ///
    /// # Panics
    /// - A mismatch is a programming error, so this raises an unrecoverable error.
    pub fn assert_dof(&self, dof: usize) {
        if !self.has_dof(dof) {
            raise_error!(
                "State has sizes ({}, {}, {}) but the trunk has {} degrees of freedom",
                self.q.len(),
                self.dq.len(),
                self.ddq.len(),
                dof
            );
        }
    }

    /// Returns true if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.q
            .iter()
            .chain(self.dq.iter())
            .chain(self.ddq.iter())
            .all(|v| v.is_finite())
    }
}

impl ControllerReference {
    /// A reference in curvature space, with the task space terms at the origin.
    pub fn from_state(state_ref: State) -> Self {
        Self {
            state_ref,
            x_ref: Vector3::zeros(),
            dx_ref: Vector3::zeros(),
            ddx_ref: Vector3::zeros(),
        }
    }

    /// A reference in task space, with the curvature state at rest and straight.
    pub fn from_task(
        dof: usize,
        x_ref: Vector3<f64>,
        dx_ref: Vector3<f64>,
        ddx_ref: Vector3<f64>,
    ) -> Self {
        Self {
            state_ref: State::zeros(dof),
            x_ref,
            dx_ref,
            ddx_ref,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
