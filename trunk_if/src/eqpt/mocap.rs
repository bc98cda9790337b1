//! # Motion Capture Frames

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A frame from the motion capture system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MocapFrame {
    /// Capture timestamp, monotonically non-decreasing.
    ///
    /// Units: microseconds
    pub timestamp_us: u64,

    /// Absolute pose of each tracked boundary, from the base of the trunk
    /// (index 0) to the tip of the last segment.
    pub transforms: Vec<Isometry3<f64>>,
}
