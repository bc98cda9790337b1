//! Conversion of raw sensor frames into curvature states

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::DVector;
use std::f64::consts::PI;

use trunk_if::{BendFrame, MocapFrame, SensorFrame};

use super::CurvCalcError;
use crate::pcc::{self, THETA_EPSILON};
use crate::robot_params::{CoordType, SensorType, TrunkConfig};
use crate::state::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Turns a stream of sensor frames into a stream of curvature states.
///
/// Frames whose timestamp equals the previous frame's are skipped. Rates are backward finite
/// differences over the time at which the frames were processed.
#[derive(Debug, Clone)]
pub struct Tracker {
    sensor_type: SensorType,
    coord_type: CoordType,
    num_segments: usize,
    sections_per_segment: usize,

    last_timestamp_us: Option<u64>,

    /// Processing time and state of the last accepted frame.
    prev: Option<(f64, State)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tracker {
    pub fn new(config: &TrunkConfig) -> Self {
        let params = config.params();

        Self {
            sensor_type: params.sensor_type,
            coord_type: params.coord_type,
            num_segments: config.num_segments(),
            sections_per_segment: config.sections_per_segment(),
            last_timestamp_us: None,
            prev: None,
        }
    }

    /// Process a frame received at `time_s`.
    ///
    /// Returns `Ok(None)` if the frame carries no new data.
    pub fn process(
        &mut self,
        frame: &SensorFrame,
        time_s: f64,
    ) -> Result<Option<State>, CurvCalcError> {
        if self.last_timestamp_us == Some(frame.timestamp_us()) {
            return Ok(None);
        }

        let q = match (self.sensor_type, frame) {
            (SensorType::Mocap, SensorFrame::Mocap(f)) => self.mocap_to_q(f)?,
            (SensorType::BendLabs, SensorFrame::Bend(f)) => self.bend_to_q(f)?,
            (expected, _) => return Err(CurvCalcError::UnexpectedFrame(expected)),
        };

        self.last_timestamp_us = Some(frame.timestamp_us());

        let state = match self.prev.take() {
            Some((prev_time_s, prev)) if time_s > prev_time_s => {
                let dt = time_s - prev_time_s;
                let dq = (&q - &prev.q) / dt;
                let ddq = (&dq - &prev.dq) / dt;
                State { q, dq, ddq }
            }
            // No elapsed time to differentiate over, keep the previous rates
            Some((_, prev)) => State {
                q,
                dq: prev.dq,
                ddq: prev.ddq,
            },
            None => State::at_rest(q),
        };

        self.prev = Some((time_s, state.clone()));

        Ok(Some(state))
    }

    /// Curvature from the absolute poses of the segment boundaries.
    fn mocap_to_q(&self, frame: &MocapFrame) -> Result<DVector<f64>, CurvCalcError> {
        let expected = self.num_segments + 1;
        if frame.transforms.len() != expected {
            return Err(CurvCalcError::WrongFrameSize {
                expected,
                found: frame.transforms.len(),
            });
        }

        let mut q = DVector::zeros(2 * self.num_segments * self.sections_per_segment);

        for (seg, pair) in frame.transforms.windows(2).enumerate() {
            let rel = pair[0].inverse() * pair[1];
            let m = rel.rotation.to_rotation_matrix();
            let t = rel.translation.vector;

            let phi = t[1].atan2(t[0]);
            let theta = m[(2, 2)].max(-1.0).min(1.0).acos();

            self.distribute(&mut q, seg, phi, theta);
        }

        Ok(q)
    }

    /// Curvature from the bend sensor channels, two per segment.
    fn bend_to_q(&self, frame: &BendFrame) -> Result<DVector<f64>, CurvCalcError> {
        let expected = 2 * self.num_segments;
        if frame.channels.len() != expected {
            return Err(CurvCalcError::WrongFrameSize {
                expected,
                found: frame.channels.len(),
            });
        }

        let mut q = DVector::zeros(2 * self.num_segments * self.sections_per_segment);

        for seg in 0..self.num_segments {
            let lx = frame.channels[2 * seg + 1] * PI / 180.0;
            let ly = frame.channels[2 * seg] * PI / 180.0;
            let (phi, theta) = pcc::longitudinal_to_phi_theta(lx, ly);

            self.distribute(&mut q, seg, phi, theta);
        }

        Ok(q)
    }

    /// Split a segment's curvature evenly over its sections.
    fn distribute(&self, q: &mut DVector<f64>, seg: usize, phi: f64, theta: f64) {
        let n = self.sections_per_segment;
        let theta = (theta / n as f64).max(THETA_EPSILON);

        let (a, b) = match self.coord_type {
            CoordType::PhiTheta => (phi, theta),
            CoordType::Longitudinal => pcc::phi_theta_to_longitudinal(phi, theta),
        };

        for section in seg * n..(seg + 1) * n {
            q[2 * section] = a;
            q[2 * section + 1] = b;
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(super) mod test {
    use super::*;
    use crate::robot_params::RobotParams;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

    pub fn config(sensor_type: SensorType, coord_type: CoordType) -> TrunkConfig {
        let mut params = RobotParams::default();
        params.sensor_type = sensor_type;
        params.coord_type = coord_type;

        match std::sync::Arc::try_unwrap(params.finalize().unwrap()) {
            Ok(c) => c,
            Err(_) => panic!("Config is shared"),
        }
    }

    /// Pose of the end of a constant curvature arc relative to its start.
    pub fn arc(phi: f64, theta: f64, length: f64) -> Isometry3<f64> {
        let (r, z) = if theta.abs() < 1e-9 {
            (0.0, length)
        } else {
            (length / theta * (1.0 - theta.cos()), length / theta * theta.sin())
        };

        let rot = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), phi)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), theta)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -phi);

        Isometry3::from_parts(Translation3::new(r * phi.cos(), r * phi.sin(), z), rot)
    }

    pub fn mocap_frame(timestamp_us: u64, phi: f64, theta: f64) -> SensorFrame {
        let base = Isometry3::translation(0.1, 0.0, 0.5);
        let mid = base * arc(phi, theta, 0.1);
        let tip = mid * arc(0.0, 0.0, 0.1);

        SensorFrame::Mocap(MocapFrame {
            timestamp_us,
            transforms: vec![base, mid, tip],
        })
    }

    #[test]
    fn test_mocap_phi_theta() {
        let mut tracker = Tracker::new(&config(SensorType::Mocap, CoordType::PhiTheta));

        let state = tracker.process(&mocap_frame(1, 0.5, 0.6), 0.0).unwrap().unwrap();

        for section in 0..3 {
            assert_relative_eq!(state.q[2 * section], 0.5, epsilon = 1e-9);
            assert_relative_eq!(state.q[2 * section + 1], 0.2, epsilon = 1e-9);
        }

        // The straight segment is held at the curvature floor
        for section in 3..6 {
            assert_relative_eq!(state.q[2 * section + 1], THETA_EPSILON);
        }

        assert_eq!(state.dq, DVector::zeros(12));
    }

    #[test]
    fn test_mocap_longitudinal() {
        let mut tracker = Tracker::new(&config(SensorType::Mocap, CoordType::Longitudinal));

        let state = tracker.process(&mocap_frame(1, 0.5, 0.6), 0.0).unwrap().unwrap();
        let (lx, ly) = pcc::phi_theta_to_longitudinal(0.5, 0.2);

        assert_relative_eq!(state.q[0], lx, epsilon = 1e-9);
        assert_relative_eq!(state.q[1], ly, epsilon = 1e-9);
        assert_relative_eq!(state.q[4], lx, epsilon = 1e-9);
    }

    #[test]
    fn test_bend_channels() {
        let mut tracker = Tracker::new(&config(SensorType::BendLabs, CoordType::Longitudinal));

        let frame = SensorFrame::Bend(BendFrame {
            timestamp_us: 10,
            channels: vec![30.0, -60.0, 0.0, 90.0],
        });
        let state = tracker.process(&frame, 0.0).unwrap().unwrap();

        // Channels are swapped within a segment and split over three sections
        assert_relative_eq!(state.q[0], -PI / 3.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(state.q[1], PI / 6.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(state.q[6], PI / 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(state.q[11], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_duplicate_timestamps_skipped() {
        let mut tracker = Tracker::new(&config(SensorType::Mocap, CoordType::PhiTheta));

        assert!(tracker.process(&mocap_frame(5, 0.5, 0.3), 0.0).unwrap().is_some());
        assert!(tracker.process(&mocap_frame(5, 0.5, 0.6), 0.1).unwrap().is_none());

        // Rates are taken against the last accepted frame
        let state = tracker.process(&mocap_frame(6, 0.5, 0.6), 0.1).unwrap().unwrap();
        assert_relative_eq!(state.dq[1], 1.0, epsilon = 1e-9);
        assert_relative_eq!(state.ddq[1], 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bad_frames() {
        let mut tracker = Tracker::new(&config(SensorType::Mocap, CoordType::PhiTheta));

        let bend = SensorFrame::Bend(BendFrame {
            timestamp_us: 1,
            channels: vec![0.0; 4],
        });
        match tracker.process(&bend, 0.0) {
            Err(CurvCalcError::UnexpectedFrame(SensorType::Mocap)) => (),
            r => panic!("Expected unexpected frame error, got {:?}", r),
        }

        let short = SensorFrame::Mocap(MocapFrame {
            timestamp_us: 1,
            transforms: vec![Isometry3::identity()],
        });
        match tracker.process(&short, 0.0) {
            Err(CurvCalcError::WrongFrameSize {
                expected: 3,
                found: 1,
            }) => (),
            r => panic!("Expected frame size error, got {:?}", r),
        }
    }
}
