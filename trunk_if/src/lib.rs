//! # Soft Trunk interface crate.
//!
//! Provides the interfaces between the soft trunk software and its external
//! equipment: the sensor sources which supply raw frames and the valve
//! actuators which accept chamber pressure demands.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame and demand definitions for equipment (motion capture, bend sensors, valves)
pub mod eqpt;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use eqpt::{
    bend::BendFrame,
    mocap::MocapFrame,
    valve::{Actuator, ValveDems},
    SensorFrame, SensorSource,
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can be reported by equipment behind the interfaces.
#[derive(Debug, thiserror::Error)]
pub enum IfError {
    #[error("Equipment is not connected")]
    NotConnected,

    #[error("Index {index} is out of range for {len} valves")]
    InvalidValveIndex { index: usize, len: usize },

    #[error("Pressure demand {0} mbar is invalid, demands must be finite and non-negative")]
    InvalidPressure(f64),

    #[error("Equipment I/O error: {0}")]
    IoError(std::io::Error),
}
