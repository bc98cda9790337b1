//! Pressure allocation
//!
//! Each segment is commanded with a 2 DOF pseudo-pressure, the bending "force" in the plane of
//! the section. The allocation expands it into the three real chamber pressures of the segment.
//! It is a pure function of its input and the calibration constants.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DVector, Matrix2x3, Matrix3x2, Vector2, Vector3};
use std::f64::consts::TAU;
use util::maths::{poly_val, wrap_2pi};

use crate::robot_params::{calibration::NUM_REGIONS, PressureCalibration, TrunkConfig};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Converts pseudo-pressures into real chamber pressures.
#[derive(Debug, Clone)]
pub struct PressureAllocator {
    /// Maximum pseudo-pressure magnitude.
    ///
    /// Units: millibar
    p_max: f64,

    calibration: PressureCalibration,

    /// Pseudo-inverse of the chamber matrix
    chamber_pinv: Matrix3x2<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PressureAllocator {
    pub fn new(config: &TrunkConfig) -> Self {
        // C Cᵀ = 1.5 I, so the pseudo-inverse is Cᵀ / 1.5
        let chamber_pinv = chamber_matrix().transpose() / 1.5;

        Self {
            p_max: config.params().p_max_mbar,
            calibration: config.calibration().clone(),
            chamber_pinv,
        }
    }

    /// Convert per segment pseudo-pressures into per chamber pressures.
    ///
    /// Units: millibar
    pub fn pseudo2real(&self, pressure_pseudo: &DVector<f64>) -> DVector<f64> {
        let num_segments = pressure_pseudo.len() / 2;
        let mut real = DVector::zeros(3 * num_segments);

        for seg in 0..num_segments {
            let mut cmd = Vector2::new(pressure_pseudo[2 * seg], pressure_pseudo[2 * seg + 1]);

            let magnitude = cmd.norm();
            if magnitude > self.p_max {
                cmd *= self.p_max / magnitude;
            }
            let magnitude = cmd.norm();

            let angle =
                wrap_2pi(cmd.y.atan2(cmd.x) + self.calibration.angle_offset_rad[seg]);
            // The corrected angle is wrapped once, the rotation, gain region and gain all use it
            let angle = wrap_2pi(poly_val(
                angle,
                &self.calibration.angle_coeffs[seg][region(angle)],
            ));

            let rotated = Vector2::new(magnitude * angle.cos(), magnitude * angle.sin());
            let mut chambers: Vector3<f64> = self.chamber_pinv * rotated;

            // Chambers can only push, so shift up to a non-negative set
            let min = chambers.min();
            chambers.add_scalar_mut(-min);

            let gain = poly_val(angle, &self.calibration.gain_coeffs[seg][region(angle)]);
            chambers *= gain;

            for k in 0..3 {
                real[3 * seg + k] = chambers[k];
            }
        }

        real
    }

    /// Project per chamber pressures back onto per segment pseudo-pressures.
    pub fn real2pseudo(&self, pressure_real: &DVector<f64>) -> DVector<f64> {
        let num_segments = pressure_real.len() / 3;
        let chamber = chamber_matrix();
        let mut pseudo = DVector::zeros(2 * num_segments);

        for seg in 0..num_segments {
            let p = Vector3::new(
                pressure_real[3 * seg],
                pressure_real[3 * seg + 1],
                pressure_real[3 * seg + 2],
            );
            let v = chamber * p;
            pseudo[2 * seg] = v.x;
            pseudo[2 * seg + 1] = v.y;
        }

        pseudo
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Direction of each chamber's bending action in the section plane.
pub fn chamber_matrix() -> Matrix2x3<f64> {
    let s = 3f64.sqrt() / 2.0;
    Matrix2x3::new(1.0, -0.5, -0.5, 0.0, s, -s)
}

/// Calibration region of an angle in `[0, 2pi)`.
fn region(angle: f64) -> usize {
    let k = (angle / (TAU / NUM_REGIONS as f64)).floor();

    if k < 0.0 || !k.is_finite() {
        0
    } else {
        (k as usize).min(NUM_REGIONS - 1)
    }
}

/// Angle of a pseudo-pressure command of a segment, in `[0, 2pi)`.
pub fn pseudo_angle(x: f64, y: f64) -> f64 {
    if x == 0.0 && y == 0.0 {
        0.0
    } else {
        wrap_2pi(y.atan2(x))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
