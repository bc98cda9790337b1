//! # Soft trunk library.
//!
//! This library allows the executable and the benchmarks to access the model, estimation and
//! control modules of the soft trunk.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Augmented rigid arm - maps the PCC state onto an equivalent rigid joint chain
pub mod ara;

/// Curvature calculator - estimates the curvature state from sensor frames in the background
pub mod curv_calc;

/// Executable parameters
pub mod params;

/// PCC parametrization conversions
pub mod pcc;

/// PCC controller - the control loop host and the available control laws
pub mod pcc_ctrl;

/// Rigid chain - serial chain description and rigid body dynamics
pub mod rigid_chain;

/// Robot parameters - the immutable configuration of the trunk
pub mod robot_params;

/// Simulator - forward integration of the trunk model
pub mod sim;

/// Curvature state and controller references
pub mod state;

/// Soft trunk model - the full dynamic model and the pressure allocation
pub mod trunk_model;
