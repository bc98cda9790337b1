//! # Valve Array Interface
//!
//! The trunk is driven by a proportional valve array with one valve per
//! chamber. Demands are absolute chamber pressures.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::IfError;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A device which can set the pressure of individual chambers.
pub trait Actuator: Send {
    /// Number of valves the device drives.
    fn num_valves(&self) -> usize;

    /// Set the pressure of a single valve.
    ///
    /// Units: millibar
    fn set_single_pressure(&mut self, index: usize, pressure_mbar: f64) -> Result<(), IfError>;

    /// Set the pressure of every valve, in valve order.
    fn set_pressures(&mut self, dems: &ValveDems) -> Result<(), IfError> {
        for (i, p) in dems.pressures_mbar.iter().enumerate() {
            self.set_single_pressure(i, *p)?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Pressure demands for the whole valve array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValveDems {
    /// Demanded pressure of each valve.
    ///
    /// Units: millibar
    pub pressures_mbar: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ValveDems {
    /// Check that every demand is finite and non-negative.
    pub fn validate(&self) -> Result<(), IfError> {
        match self
            .pressures_mbar
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0)
        {
            Some(p) => Err(IfError::InvalidPressure(*p)),
            None => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    struct Recorder {
        set: Vec<(usize, f64)>,
        len: usize,
    }

    impl Actuator for Recorder {
        fn num_valves(&self) -> usize {
            self.len
        }

        fn set_single_pressure(&mut self, index: usize, pressure_mbar: f64) -> Result<(), IfError> {
            if index >= self.len {
                return Err(IfError::InvalidValveIndex {
                    index,
                    len: self.len,
                });
            }
            self.set.push((index, pressure_mbar));
            Ok(())
        }
    }

    #[test]
    fn test_set_pressures_in_order() {
        let mut rec = Recorder {
            set: Vec::new(),
            len: 3,
        };
        let dems = ValveDems {
            pressures_mbar: vec![10.0, 0.0, 250.0],
        };

        rec.set_pressures(&dems).unwrap();
        assert_eq!(rec.set, vec![(0, 10.0), (1, 0.0), (2, 250.0)]);

        let too_many = ValveDems {
            pressures_mbar: vec![1.0; 4],
        };
        assert!(rec.set_pressures(&too_many).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ValveDems {
            pressures_mbar: vec![0.0, 600.0]
        }
        .validate()
        .is_ok());
        assert!(ValveDems {
            pressures_mbar: vec![-1.0]
        }
        .validate()
        .is_err());
        assert!(ValveDems {
            pressures_mbar: vec![f64::NAN]
        }
        .validate()
        .is_err());
    }
}
