//! Serial chain descriptions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, Vector3};

use super::ChainError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A serial chain, from the base outwards.
#[derive(Debug, Clone)]
pub struct ChainDescription {
    /// Joints in order from the base
    pub joints: Vec<JointDesc>,

    /// Named frames whose kinematics are reported
    pub frames: Vec<FrameDesc>,

    /// Gravitational acceleration expressed in the base frame.
    ///
    /// Units: meters/second^2
    pub gravity: Vector3<f64>,
}

/// A single joint and the body it moves.
#[derive(Debug, Clone)]
pub struct JointDesc {
    pub name: String,

    pub kind: JointKind,

    /// Joint axis in the parent joint's frame
    pub axis: Vector3<f64>,

    /// Position of the joint relative to the parent joint's frame, at zero joint position.
    ///
    /// Units: meters
    pub offset: Vector3<f64>,

    /// Body rigidly attached to the joint's frame
    pub body: BodyDesc,
}

/// Inertial properties of a body.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    /// Units: kilograms
    pub mass: f64,

    /// Centre of mass in the joint frame.
    ///
    /// Units: meters
    pub com: Vector3<f64>,

    /// Inertia tensor about the centre of mass, in the joint frame.
    ///
    /// Units: kilogram meters^2
    pub inertia: Matrix3<f64>,
}

/// A frame rigidly attached to a joint.
#[derive(Debug, Clone)]
pub struct FrameDesc {
    pub name: String,

    /// Index of the joint the frame is attached to
    pub joint: usize,

    /// Position of the frame in the joint frame.
    ///
    /// Units: meters
    pub offset: Vector3<f64>,
}

/// Type of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    Revolute,
    Prismatic,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ChainDescription {
    /// Check the joint axes, masses and frame attachments.
    pub fn validate(&self) -> Result<(), ChainError> {
        for j in self.joints.iter() {
            let valid = j.axis.norm() > 0.0
                && j.axis.iter().all(|v| v.is_finite())
                && j.offset.iter().all(|v| v.is_finite())
                && j.body.mass >= 0.0;

            if !valid {
                return Err(ChainError::InvalidJoint(j.name.clone()));
            }
        }

        for f in self.frames.iter() {
            if f.joint >= self.joints.len() {
                return Err(ChainError::InvalidFrame {
                    name: f.name.clone(),
                    joint: f.joint,
                });
            }
        }

        Ok(())
    }
}

impl BodyDesc {
    /// A body with no mass.
    pub fn massless() -> Self {
        Self {
            mass: 0.0,
            com: Vector3::zeros(),
            inertia: Matrix3::zeros(),
        }
    }

    /// A solid cylinder along the z axis.
    pub fn cylinder(mass: f64, radius: f64, length: f64, com: Vector3<f64>) -> Self {
        let i_xx = mass * (3.0 * radius * radius + length * length) / 12.0;
        let i_zz = mass * radius * radius / 2.0;

        Self {
            mass,
            com,
            inertia: Matrix3::from_diagonal(&Vector3::new(i_xx, i_xx, i_zz)),
        }
    }
}
