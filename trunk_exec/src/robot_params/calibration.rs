//! Pressure allocation calibration data
//!
//! The calibration curves are fitted on a physical prototype and are treated as opaque data. Each
//! segment has an angle offset plus two sets of three cubic polynomials, one polynomial per 120
//! degree region of the command angle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::ConfigError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of angular regions in each calibration curve.
pub const NUM_REGIONS: usize = 3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Coefficients of the three regional polynomials of one segment.
///
/// Coefficients are ordered from the highest power down to the constant term.
pub type RegionCoeffs = [Vec<f64>; NUM_REGIONS];

/// Calibration constants of the pressure allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureCalibration {
    /// Rotation applied to the command of each segment.
    ///
    /// Units: radians
    pub angle_offset_rad: Vec<f64>,

    /// Per segment angle correction curves, mapping the command angle (radians, in `[0, 2pi)`)
    /// onto the corrected angle.
    pub angle_coeffs: Vec<RegionCoeffs>,

    /// Per segment gain curves, mapping the corrected angle onto a pressure gain.
    pub gain_coeffs: Vec<RegionCoeffs>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PressureCalibration {
    /// The identity calibration: no offset, no angle correction and unit gain.
    pub fn identity(num_segments: usize) -> Self {
        let angle = || vec![0.0, 0.0, 1.0, 0.0];
        let gain = || vec![0.0, 0.0, 0.0, 1.0];

        Self {
            angle_offset_rad: vec![0.0; num_segments],
            angle_coeffs: vec![[angle(), angle(), angle()]; num_segments],
            gain_coeffs: vec![[gain(), gain(), gain()]; num_segments],
        }
    }

    /// Check the calibration covers the given number of segments.
    pub(super) fn validate(&self, num_segments: usize) -> Result<(), ConfigError> {
        let check = |name: &'static str, len: usize| {
            if len != num_segments {
                Err(ConfigError::SizeMismatch {
                    name,
                    expected: num_segments,
                    found: len,
                })
            } else {
                Ok(())
            }
        };

        check("calibration.angle_offset_rad", self.angle_offset_rad.len())?;
        check("calibration.angle_coeffs", self.angle_coeffs.len())?;
        check("calibration.gain_coeffs", self.gain_coeffs.len())?;

        let all_curves = self.angle_coeffs.iter().chain(self.gain_coeffs.iter());
        for curves in all_curves {
            if curves.iter().any(|c| c.is_empty()) {
                return Err(ConfigError::EmptyCalibrationCurve);
            }
        }

        Ok(())
    }
}

