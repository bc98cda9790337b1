//! # Robot parameters
//!
//! The configuration of the trunk goes through two stages. [`RobotParams`] is the mutable,
//! deserialisable form which is loaded from a parameter file or built from defaults. Calling
//! [`RobotParams::finalize`] validates it and freezes it into a shared [`TrunkConfig`], which is
//! what every other component takes at construction. A `TrunkConfig` cannot be modified or
//! reloaded, and a component cannot be built from parameters which have not been finalized.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod calibration;
pub mod ctrl_params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use util::params::LoadError;

pub use calibration::PressureCalibration;
pub use ctrl_params::CtrlParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Physical and software parameters of the trunk, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotParams {
    /// Name of the robot, used to label logs
    pub robot_name: String,

    /// Number of actuated segments
    pub num_segments: usize,

    /// Number of PCC sections each segment is divided into
    pub sections_per_segment: usize,

    /// Mass of each part, alternating segment and connector from the base:
    /// `{segment 0, connector 0, segment 1, ...}`.
    ///
    /// Units: kilograms
    pub masses: Vec<f64>,

    /// Length of each part, in the same order as `masses`.
    ///
    /// Units: meters
    pub lengths: Vec<f64>,

    /// Outer diameter at each segment boundary, from the base of the first segment to the tip of
    /// the last one.
    ///
    /// Units: meters
    pub diameters: Vec<f64>,

    /// Shear modulus of each segment's material.
    ///
    /// Units: Pascals
    pub shear_modulus: Vec<f64>,

    /// Viscous damping of each section.
    ///
    /// Units: Newton meter seconds/radian
    pub drag_coef: f64,

    /// Angle of the arm's base relative to upright, 0 is upright and 180 hangs down.
    ///
    /// Units: degrees
    pub arm_angle_deg: f64,

    /// Maximum magnitude of a pseudo-pressure command.
    ///
    /// Units: millibar
    pub p_max_mbar: f64,

    /// Parametrization of the curvature state
    pub coord_type: CoordType,

    /// Source of the curvature state
    pub sensor_type: SensorType,

    /// Control law run by the controller
    pub controller_type: ControllerType,

    /// Rate at which the curvature estimator polls its sensor.
    ///
    /// Units: Hertz
    pub sensor_poll_hz: f64,

    /// Calibration of the pressure allocation, the identity calibration of every segment when
    /// omitted
    pub calibration: Option<PressureCalibration>,

    /// Control law gains
    pub ctrl: CtrlParams,
}

/// Validated, immutable configuration of the trunk.
///
/// Constructed only by [`RobotParams::finalize`] and shared through an `Arc`.
#[derive(Debug, PartialEq)]
pub struct TrunkConfig {
    params: RobotParams,

    calibration: PressureCalibration,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Parametrization of each section's curvature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordType {
    PhiTheta,
    Longitudinal,
}

/// Source of the curvature state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Motion capture of the segment boundaries
    Mocap,

    /// Serial bend sensors, two channels per segment
    BendLabs,

    /// The state is integrated by the simulator
    Simulator,
}

/// Control law selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    Pid,
    Dynamic,
    Osc,
    InverseDynamics,
    Mpc,
    Characterize,
}

/// Errors in the trunk configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not load the robot parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("{name} must have {expected} elements, found {found}")]
    SizeMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{name} has an invalid value ({value})")]
    InvalidValue { name: &'static str, value: f64 },

    #[error("Calibration curves must have at least one coefficient")]
    EmptyCalibrationCurve,

    #[error("Unknown controller \"{0}\"")]
    UnknownController(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotParams {
    /// Load robot parameters from a file in the parameters directory.
    pub fn load(name: &str) -> Result<Self, ConfigError> {
        util::params::load(name).map_err(ConfigError::ParamLoadError)
    }

    /// Validate the parameters and freeze them into a shared configuration.
    pub fn finalize(mut self) -> Result<Arc<TrunkConfig>, ConfigError> {
        let n = self.num_segments;

        if n == 0 {
            return Err(ConfigError::InvalidValue {
                name: "num_segments",
                value: 0.0,
            });
        }
        if self.sections_per_segment == 0 {
            return Err(ConfigError::InvalidValue {
                name: "sections_per_segment",
                value: 0.0,
            });
        }

        check_len("masses", &self.masses, 2 * n)?;
        check_len("lengths", &self.lengths, 2 * n)?;
        check_len("diameters", &self.diameters, n + 1)?;
        check_len("shear_modulus", &self.shear_modulus, n)?;

        check_positive("masses", &self.masses)?;
        check_positive("lengths", &self.lengths)?;
        check_positive("diameters", &self.diameters)?;
        check_positive("shear_modulus", &self.shear_modulus)?;
        check_positive("p_max_mbar", &[self.p_max_mbar])?;
        check_positive("sensor_poll_hz", &[self.sensor_poll_hz])?;

        // Cross-section properties need room for the 2 mm chamber wall
        if let Some(d) = self.diameters.iter().find(|d| **d <= 0.006) {
            return Err(ConfigError::InvalidValue {
                name: "diameters",
                value: *d,
            });
        }

        if !(self.drag_coef >= 0.0) || !self.drag_coef.is_finite() {
            return Err(ConfigError::InvalidValue {
                name: "drag_coef",
                value: self.drag_coef,
            });
        }
        if !self.arm_angle_deg.is_finite() {
            return Err(ConfigError::InvalidValue {
                name: "arm_angle_deg",
                value: self.arm_angle_deg,
            });
        }

        let calibration = self
            .calibration
            .take()
            .unwrap_or_else(|| PressureCalibration::identity(n));
        calibration.validate(n)?;
        self.ctrl.validate(n)?;

        self.calibration = Some(calibration.clone());

        Ok(Arc::new(TrunkConfig {
            params: self,
            calibration,
        }))
    }
}

impl Default for RobotParams {
    fn default() -> Self {
        Self {
            robot_name: String::from("2segment"),
            num_segments: 2,
            sections_per_segment: 3,
            masses: vec![0.160, 0.020, 0.082, 0.023],
            lengths: vec![0.125, 0.02, 0.125, 0.02],
            diameters: vec![0.035, 0.028, 0.0198],
            shear_modulus: vec![40686.0, 59116.0],
            drag_coef: 0.001,
            arm_angle_deg: 180.0,
            p_max_mbar: 600.0,
            coord_type: CoordType::Longitudinal,
            sensor_type: SensorType::Simulator,
            controller_type: ControllerType::Dynamic,
            sensor_poll_hz: 100.0,
            calibration: None,
            ctrl: CtrlParams::default(),
        }
    }
}

impl ControllerType {
    /// Names accepted by [`ControllerType::from_str`], matching the parameter file names.
    pub const NAMES: &'static [&'static str] = &[
        "pid",
        "dynamic",
        "osc",
        "inverse_dynamics",
        "mpc",
        "characterize",
    ];
}

impl FromStr for ControllerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pid" => Ok(Self::Pid),
            "dynamic" => Ok(Self::Dynamic),
            "osc" => Ok(Self::Osc),
            "inverse_dynamics" => Ok(Self::InverseDynamics),
            "mpc" => Ok(Self::Mpc),
            "characterize" => Ok(Self::Characterize),
            _ => Err(ConfigError::UnknownController(s.to_string())),
        }
    }
}

impl TrunkConfig {
    /// The validated parameters.
    pub fn params(&self) -> &RobotParams {
        &self.params
    }

    pub fn num_segments(&self) -> usize {
        self.params.num_segments
    }

    /// Calibration of the pressure allocation, sized for every segment.
    pub fn calibration(&self) -> &PressureCalibration {
        &self.calibration
    }

    pub fn sections_per_segment(&self) -> usize {
        self.params.sections_per_segment
    }

    /// Number of PCC sections, excluding connectors.
    pub fn num_sections(&self) -> usize {
        self.params.num_segments * self.params.sections_per_segment
    }

    /// Degrees of freedom of the curvature state.
    pub fn dof(&self) -> usize {
        2 * self.num_sections()
    }

    /// Number of pseudo-pressure inputs, two per segment.
    pub fn pseudo_size(&self) -> usize {
        2 * self.params.num_segments
    }

    /// Number of chambers, three per segment.
    pub fn p_size(&self) -> usize {
        3 * self.params.num_segments
    }

    /// Length of one PCC section of the given segment.
    ///
    /// Units: meters
    pub fn section_length(&self, segment: usize) -> f64 {
        self.params.lengths[2 * segment] / self.params.sections_per_segment as f64
    }

    /// Mass of one PCC section of the given segment.
    ///
    /// Units: kilograms
    pub fn section_mass(&self, segment: usize) -> f64 {
        self.params.masses[2 * segment] / self.params.sections_per_segment as f64
    }

    /// Outer radius of a section, interpolated between the segment's boundary diameters.
    ///
    /// Units: meters
    pub fn section_radius(&self, segment: usize, section_in_segment: usize) -> f64 {
        let n = self.params.sections_per_segment as f64;
        let j = section_in_segment as f64;
        let d_base = self.params.diameters[segment];
        let d_tip = self.params.diameters[segment + 1];

        (d_base * (n - j) + d_tip * j) / n / 2.0
    }

    /// Control period of the configured law.
    ///
    /// Units: seconds
    pub fn control_period_s(&self) -> f64 {
        1.0 / self.params.ctrl.rate_hz(self.params.controller_type)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn check_len(name: &'static str, values: &[f64], expected: usize) -> Result<(), ConfigError> {
    if values.len() != expected {
        Err(ConfigError::SizeMismatch {
            name,
            expected,
            found: values.len(),
        })
    } else {
        Ok(())
    }
}

fn check_positive(name: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    match values.iter().find(|v| !(**v > 0.0) || !v.is_finite()) {
        Some(v) => Err(ConfigError::InvalidValue { name, value: *v }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_finalizes() {
        let cfg = RobotParams::default().finalize().unwrap();

        assert_eq!(cfg.dof(), 12);
        assert_eq!(cfg.p_size(), 6);
        assert_eq!(cfg.pseudo_size(), 4);
        assert_relative_eq!(cfg.section_length(0), 0.125 / 3.0);
        assert_relative_eq!(cfg.section_radius(0, 0), 0.0175);
        assert_relative_eq!(cfg.section_radius(1, 3), 0.0099);
        assert_relative_eq!(cfg.control_period_s(), 0.01);
    }

    #[test]
    fn test_finalize_rejects_size_mismatch() {
        let mut params = RobotParams::default();
        params.num_segments = 3;

        match params.finalize() {
            Err(ConfigError::SizeMismatch { name, expected, .. }) => {
                assert_eq!(name, "masses");
                assert_eq!(expected, 6);
            }
            r => panic!("Expected a size mismatch, got {:?}", r),
        }

        let mut params = RobotParams::default();
        params.calibration = Some(PressureCalibration::identity(1));
        assert!(params.finalize().is_err());
    }

    #[test]
    fn test_finalize_rejects_invalid_values() {
        let mut params = RobotParams::default();
        params.masses[1] = -0.02;
        assert!(params.finalize().is_err());

        let mut params = RobotParams::default();
        params.sections_per_segment = 0;
        assert!(params.finalize().is_err());

        let mut params = RobotParams::default();
        params.ctrl.mpc.rate_hz = 0.0;
        assert!(params.finalize().is_err());

        let mut params = RobotParams::default();
        params.drag_coef = f64::NAN;
        assert!(matches!(
            params.finalize(),
            Err(ConfigError::InvalidValue { name: "drag_coef", .. })
        ));

        let mut params = RobotParams::default();
        params.arm_angle_deg = f64::INFINITY;
        match params.finalize() {
            Err(ConfigError::InvalidValue { name, value }) => {
                assert_eq!(name, "arm_angle_deg");
                assert_eq!(value, f64::INFINITY);
            }
            r => panic!("Expected an invalid arm angle, got {:?}", r),
        }
    }

    #[test]
    fn test_omitted_calibration_fits_segments() {
        let params: RobotParams = util::params::from_str(
            r#"
            num_segments = 3
            masses = [0.16, 0.02, 0.08, 0.02, 0.05, 0.02]
            lengths = [0.125, 0.02, 0.125, 0.02, 0.1, 0.02]
            diameters = [0.035, 0.028, 0.0198, 0.015]
            shear_modulus = [40686.0, 59116.0, 60000.0]
            "#,
        )
        .unwrap();
        assert_eq!(params.calibration, None);

        let cfg = params.finalize().unwrap();
        assert_eq!(cfg.calibration(), &PressureCalibration::identity(3));
        assert_eq!(cfg.params().calibration, Some(PressureCalibration::identity(3)));
    }

    #[test]
    fn test_load_partial_toml() {
        let params: RobotParams = util::params::from_str(
            r#"
            robot_name = "1segment"
            num_segments = 1
            sections_per_segment = 2
            masses = [0.16, 0.02]
            lengths = [0.125, 0.02]
            diameters = [0.035, 0.028]
            shear_modulus = [40686.0]
            controller_type = "inverse_dynamics"

            [calibration]
            angle_offset_rad = [0.1]
            angle_coeffs = [[[0.0, 1.0, 0.0], [0.0, 1.0, 0.0], [0.0, 1.0, 0.0]]]
            gain_coeffs = [[[1.0], [1.0], [1.0]]]
            "#,
        )
        .unwrap();

        assert_eq!(params.controller_type, ControllerType::InverseDynamics);
        assert_eq!(params.coord_type, CoordType::Longitudinal);

        let cfg = params.finalize().unwrap();
        assert_eq!(cfg.dof(), 4);
        assert_relative_eq!(cfg.control_period_s(), 0.02);
    }

    #[test]
    fn test_controller_names() {
        for name in ControllerType::NAMES {
            let ctrl: ControllerType = name.parse().unwrap();
            let json = serde_json::to_string(&ctrl).unwrap();
            assert_eq!(json, format!("\"{}\"", name));
        }

        assert!(matches!(
            "lqr".parse::<ControllerType>(),
            Err(ConfigError::UnknownController(_))
        ));
    }

    #[test]
    fn test_shipped_params() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../params/trunk.toml");
        let params: RobotParams = util::params::load_from_path(path).unwrap();

        assert_eq!(
            params.finalize().unwrap(),
            RobotParams::default().finalize().unwrap()
        );
    }
}
