//! # Curvature estimator
//!
//! The estimator owns a background thread which polls a [`SensorSource`] at the configured rate,
//! converts every new frame into a curvature [`State`] and publishes it as a snapshot. Readers
//! always get the last complete state, never a partially written one.
//!
//! The thread is stopped by clearing its run flag and joining it, either explicitly with
//! [`CurvatureEstimator::stop`] or when the estimator is dropped.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod measure;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use arc_swap::ArcSwap;
use thiserror::Error;

use trunk_if::{IfError, SensorSource};
use util::time;

pub use measure::Tracker;

use crate::robot_params::{SensorType, TrunkConfig};
use crate::state::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Estimates the curvature state from a sensor in a background thread.
pub struct CurvatureEstimator {
    state: Arc<ArcSwap<State>>,
    run: Arc<AtomicBool>,
    bg_jh: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CurvCalcError {
    #[error("The configured sensor type is the simulator, which has no sensor to poll")]
    NoSensor,

    #[error("The sensor produced a frame which doesn't match the configured sensor type {0:?}")]
    UnexpectedFrame(SensorType),

    #[error("Expected a sensor frame with {expected} elements, found {found}")]
    WrongFrameSize { expected: usize, found: usize },

    #[error("Invalid sensor poll rate {0} Hz")]
    InvalidPollRate(f64),

    #[error("Could not start the estimator thread: {0}")]
    ThreadSpawnError(std::io::Error),

    #[error("Sensor error: {0}")]
    SensorError(IfError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CurvatureEstimator {
    /// Start estimating the curvature from the given source.
    ///
    /// Until the first frame is received the estimated state is straight and at rest.
    pub fn new(
        config: Arc<TrunkConfig>,
        source: Box<dyn SensorSource>,
    ) -> Result<Self, CurvCalcError> {
        let params = config.params();

        if params.sensor_type == SensorType::Simulator {
            return Err(CurvCalcError::NoSensor);
        }

        let period = time::period_from_hz(params.sensor_poll_hz)
            .ok_or(CurvCalcError::InvalidPollRate(params.sensor_poll_hz))?;

        let state = Arc::new(ArcSwap::from_pointee(State::zeros(config.dof())));
        let run = Arc::new(AtomicBool::new(true));
        let tracker = Tracker::new(&config);

        let state_bg = state.clone();
        let run_bg = run.clone();

        let bg_jh = thread::Builder::new()
            .name("curv_calc::poll".into())
            .spawn(move || poll_thread(source, tracker, period, state_bg, run_bg))
            .map_err(CurvCalcError::ThreadSpawnError)?;

        info!(
            "Curvature estimator started with a {:?} sensor at {} Hz",
            params.sensor_type, params.sensor_poll_hz
        );

        Ok(Self {
            state,
            run,
            bg_jh: Some(bg_jh),
        })
    }

    /// Get the latest curvature state.
    pub fn get_curvature(&self) -> State {
        State::clone(&self.state.load_full())
    }

    /// Returns true while the polling thread is running.
    pub fn is_running(&self) -> bool {
        self.bg_jh.is_some() && self.run.load(Ordering::Relaxed)
    }

    /// Stop the polling thread and wait for it to exit.
    ///
    /// Stopping an already stopped estimator does nothing.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                warn!("Curvature estimator thread panicked");
            } else {
                debug!("Curvature estimator thread joined");
            }
        }
    }
}

impl Drop for CurvatureEstimator {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn poll_thread(
    mut source: Box<dyn SensorSource>,
    mut tracker: Tracker,
    period: Duration,
    state: Arc<ArcSwap<State>>,
    run: Arc<AtomicBool>,
) {
    let epoch = Instant::now();

    while run.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();

        // The snapshot is only touched after the sensor call has returned
        match source.latest() {
            Ok(Some(frame)) => {
                match tracker.process(&frame, epoch.elapsed().as_secs_f64()) {
                    Ok(Some(s)) => state.store(Arc::new(s)),
                    Ok(None) => (),
                    Err(e) => warn!("Could not process sensor frame: {}", e),
                }
            }
            Ok(None) => (),
            Err(e) => warn!("{}", CurvCalcError::SensorError(e)),
        }

        time::sleep_remaining(cycle_start, period);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
