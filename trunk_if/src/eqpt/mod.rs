//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the
//! trunk's sensing and actuation equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod bend;
pub mod mocap;
pub mod valve;

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::IfError;

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// A raw frame produced by a sensor source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorFrame {
    /// Absolute poses of the tracked segment boundaries
    Mocap(mocap::MocapFrame),

    /// Raw bend sensor channel readings
    Bend(bend::BendFrame),
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// A source of raw sensor frames.
///
/// Sources are polled by the curvature estimator at its own rate, so a source
/// should return its most recent frame without waiting for a new one. Any
/// reconnection on link loss is the responsibility of the source.
pub trait SensorSource: Send {
    /// Get the latest frame, or `None` if no frame has been received yet.
    fn latest(&mut self) -> Result<Option<SensorFrame>, IfError>;
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl SensorFrame {
    /// Timestamp of the frame.
    ///
    /// Units: microseconds
    pub fn timestamp_us(&self) -> u64 {
        match self {
            SensorFrame::Mocap(f) => f.timestamp_us,
            SensorFrame::Bend(f) => f.timestamp_us,
        }
    }
}
