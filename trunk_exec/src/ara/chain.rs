//! Rigid chain layout of the augmented arm

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Rotation3, Vector3};

use crate::rigid_chain::{BodyDesc, ChainDescription, FrameDesc, JointDesc, JointKind};
use crate::robot_params::TrunkConfig;

use super::joint_map::JOINTS_PER_SECTION;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Magnitude of gravitational acceleration.
///
/// Units: meters/second^2
pub const GRAVITY_MS2: f64 = 9.81;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Geometry of one section of the expanded chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionGeom {
    /// Units: meters
    pub length: f64,

    /// Units: kilograms
    pub mass: f64,

    /// Units: meters
    pub radius: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Geometry of every section, including the connector which follows each segment.
pub fn expanded_sections(config: &TrunkConfig) -> Vec<SectionGeom> {
    let params = config.params();
    let mut sections = Vec::with_capacity(config.num_segments() * (config.sections_per_segment() + 1));

    for seg in 0..config.num_segments() {
        for j in 0..config.sections_per_segment() {
            sections.push(SectionGeom {
                length: config.section_length(seg),
                mass: config.section_mass(seg),
                radius: config.section_radius(seg, j),
            });
        }

        sections.push(SectionGeom {
            length: params.lengths[2 * seg + 1],
            mass: params.masses[2 * seg + 1],
            radius: params.diameters[seg + 1] / 2.0,
        });
    }

    sections
}

/// Gravity in the base frame of the arm.
///
/// The base is rotated about y by the arm angle, 0 degrees is upright and 180 hangs down.
pub fn base_gravity(arm_angle_deg: f64) -> Vector3<f64> {
    let world_to_base = Rotation3::from_axis_angle(&Vector3::y_axis(), arm_angle_deg.to_radians());

    world_to_base.inverse() * Vector3::new(0.0, 0.0, -GRAVITY_MS2)
}

/// Build the rigid chain of the trunk.
///
/// Each section contributes a spherical joint at its base (offset by half of the previous
/// section's length from the previous prismatic pair) and two prismatic joints along `-z`. The
/// section's mass sits at its chord midpoint on the first prismatic joint. One frame per segment
/// marks the end of the segment's connector.
pub fn build_chain(config: &TrunkConfig) -> ChainDescription {
    let sections = expanded_sections(config);
    let per_segment = config.sections_per_segment() + 1;

    let mut joints = Vec::with_capacity(JOINTS_PER_SECTION * sections.len());
    let mut frames = Vec::with_capacity(config.num_segments());
    let mut l_prev = 0.0;

    for (s, sec) in sections.iter().enumerate() {
        let name = |kind: &str| format!("sec{}_{}", s, kind);
        let revolute = |kind: &str, axis: Vector3<f64>, offset: Vector3<f64>| JointDesc {
            name: name(kind),
            kind: JointKind::Revolute,
            axis,
            offset,
            body: BodyDesc::massless(),
        };

        joints.push(revolute(
            "rx",
            Vector3::x(),
            Vector3::new(0.0, 0.0, l_prev / 2.0),
        ));
        joints.push(revolute("ry", Vector3::y(), Vector3::zeros()));
        joints.push(revolute("rz", Vector3::z(), Vector3::zeros()));
        joints.push(JointDesc {
            name: name("p1"),
            kind: JointKind::Prismatic,
            axis: -Vector3::z(),
            offset: Vector3::new(0.0, 0.0, sec.length / 2.0),
            body: BodyDesc::cylinder(sec.mass, sec.radius, sec.length, Vector3::zeros()),
        });
        joints.push(JointDesc {
            name: name("p2"),
            kind: JointKind::Prismatic,
            axis: -Vector3::z(),
            offset: Vector3::zeros(),
            body: BodyDesc::massless(),
        });

        // The last section of each segment group is the connector
        if s % per_segment == per_segment - 1 {
            frames.push(FrameDesc {
                name: format!("seg{}_tip", s / per_segment),
                joint: joints.len() - 1,
                offset: Vector3::new(0.0, 0.0, sec.length / 2.0),
            });
        }

        l_prev = sec.length;
    }

    ChainDescription {
        joints,
        frames,
        gravity: base_gravity(config.params().arm_angle_deg),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
