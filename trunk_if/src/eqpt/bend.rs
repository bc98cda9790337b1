//! # Bend Sensor Frames

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A frame of raw readings from the serial bend sensors.
///
/// Each segment has two channels, giving the bend of the segment about two
/// orthogonal axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BendFrame {
    /// Reception timestamp.
    ///
    /// Units: microseconds
    pub timestamp_us: u64,

    /// Channel readings.
    ///
    /// Units: degrees
    pub channels: Vec<f64>,
}
