//! # Characterization sweep
//!
//! An open loop law which drives one segment with a pseudo-pressure of fixed magnitude through
//! evenly spaced directions and records how the segment actually bends in each. The samples show
//! how far the measured bending direction departs from the commanded one, which is what the
//! pressure calibration curves correct for.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use nalgebra::DVector;
use serde::Serialize;
use std::f64::consts::TAU;
use std::sync::Arc;

use super::law::{Command, ControlLaw, LawError};
use crate::pcc;
use crate::robot_params::TrunkConfig;
use crate::state::{ControllerReference, State};
use crate::trunk_model::SoftTrunkModel;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Session relative path the samples are saved to.
pub const SAMPLES_PATH: &str = "characterize/angular_samples.json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Measured bending of the swept segment for one commanded direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AngularSample {
    /// Units: radians
    pub commanded_angle_rad: f64,

    /// Units: radians
    pub phi_rad: f64,

    /// Total bend angle of the segment.
    ///
    /// Units: radians
    pub theta_rad: f64,
}

pub struct Characterize {
    segment: usize,
    sections_per_segment: usize,
    pressure_mbar: f64,
    num_directions: usize,
    hold_ticks: usize,

    tick: usize,
    samples: Vec<AngularSample>,
    saved: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Characterize {
    pub fn new(config: &Arc<TrunkConfig>) -> Self {
        let params = &config.params().ctrl.characterize;

        Self {
            segment: params.segment,
            sections_per_segment: config.sections_per_segment(),
            pressure_mbar: params.pressure_mbar,
            num_directions: params.num_directions,
            hold_ticks: params.hold_ticks,
            tick: 0,
            samples: Vec::with_capacity(params.num_directions),
            saved: false,
        }
    }

    /// Samples collected so far.
    pub fn samples(&self) -> &[AngularSample] {
        &self.samples
    }

    /// Returns true once every direction has been sampled.
    pub fn is_finished(&self) -> bool {
        self.samples.len() >= self.num_directions
    }

    fn direction(&self, index: usize) -> f64 {
        TAU * index as f64 / self.num_directions as f64
    }

    /// Bend of the swept segment, summed over its sections.
    fn measure(&self, state: &State) -> (f64, f64) {
        let sections = self.segment * self.sections_per_segment
            ..(self.segment + 1) * self.sections_per_segment;

        let (lx, ly) = sections.fold((0.0, 0.0), |(lx, ly), s| {
            (lx + state.q[2 * s], ly + state.q[2 * s + 1])
        });

        pcc::longitudinal_to_phi_theta(lx, ly)
    }
}

impl ControlLaw for Characterize {
    fn name(&self) -> &'static str {
        "characterize"
    }

    fn compute(
        &mut self,
        state: &State,
        _reference: &ControllerReference,
        model: &SoftTrunkModel,
    ) -> Result<Command, LawError> {
        let mut pseudo = DVector::zeros(model.config().pseudo_size());
        let zero_force = DVector::zeros(state.dof());

        // At the end of each hold the state has settled under that direction's command
        if self.tick > 0 && self.tick % self.hold_ticks == 0 && !self.is_finished() {
            let (phi_rad, theta_rad) = self.measure(state);
            self.samples.push(AngularSample {
                commanded_angle_rad: self.direction(self.tick / self.hold_ticks - 1),
                phi_rad,
                theta_rad,
            });

            if self.is_finished() {
                info!("Characterization sweep complete");
            }
        }

        if self.is_finished() {
            return Ok(Command::from_pseudo(model, pseudo, zero_force));
        }

        let angle = self.direction(self.tick / self.hold_ticks);
        pseudo[2 * self.segment] = self.pressure_mbar * angle.cos();
        pseudo[2 * self.segment + 1] = self.pressure_mbar * angle.sin();
        self.tick += 1;

        Ok(Command::from_pseudo(model, pseudo, zero_force))
    }

    fn finish(&mut self) {
        if !self.saved && !self.samples.is_empty() {
            info!(
                "Saving {} characterization samples to {}",
                self.samples.len(),
                SAMPLES_PATH
            );
            util::session::save(SAMPLES_PATH, self.samples.clone());
            self.saved = true;
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::robot_params::RobotParams;
    use approx::assert_relative_eq;

    #[test]
    fn test_sweep() {
        let mut params = RobotParams::default();
        params.ctrl.characterize.num_directions = 4;
        params.ctrl.characterize.hold_ticks = 2;
        params.ctrl.characterize.pressure_mbar = 200.0;
        let config = params.finalize().unwrap();

        let mut model = SoftTrunkModel::new(config.clone()).unwrap();
        let mut law = Characterize::new(&config);
        let reference = ControllerReference::from_state(State::zeros(12));

        // Bend the first segment towards phi = pi / 2
        let mut q = DVector::zeros(12);
        for s in 0..3 {
            let (lx, ly) = pcc::phi_theta_to_longitudinal(std::f64::consts::FRAC_PI_2, 0.1);
            q[2 * s] = lx;
            q[2 * s + 1] = ly;
        }
        let state = State::at_rest(q);
        model.update_state(&state).unwrap();

        let mut pseudo = Vec::new();
        for _ in 0..9 {
            pseudo.push(law.compute(&state, &reference, &model).unwrap().pseudo);
        }

        // Each direction is held for two ticks, then the pressure is released
        assert_relative_eq!(pseudo[0][0], 200.0);
        assert_relative_eq!(pseudo[1][0], 200.0);
        assert_relative_eq!(pseudo[2][1], 200.0, epsilon = 1e-9);
        assert_relative_eq!(pseudo[5][0], -200.0, epsilon = 1e-9);
        assert_relative_eq!(pseudo[7][1], -200.0, epsilon = 1e-9);
        assert_eq!(pseudo[8], DVector::zeros(4));
        assert!(pseudo.iter().all(|p| p[2] == 0.0 && p[3] == 0.0));

        assert!(law.is_finished());
        assert_eq!(law.samples().len(), 4);
        assert_relative_eq!(law.samples()[1].commanded_angle_rad, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(law.samples()[2].phi_rad, std::f64::consts::FRAC_PI_2, epsilon = 1e-9);
        assert_relative_eq!(law.samples()[2].theta_rad, 0.3, epsilon = 1e-9);
    }
}
