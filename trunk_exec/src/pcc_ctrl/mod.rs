//! # PCC controller
//!
//! [`ControllerPcc`] hosts one [`ControlLaw`] in a fixed rate control thread. Each tick the
//! thread:
//!
//! 1. gets the curvature state, from the estimator or from the simulator,
//! 2. updates the trunk model at that state,
//! 3. skips the rest of the tick if no reference has been set yet,
//! 4. runs the control law,
//! 5. sends the chamber pressures to the valves or to the simulator,
//! 6. appends a row to the control log if logging,
//! 7. publishes the state and command.
//!
//! The reference and the published output are atomically swapped snapshots, so neither side of
//! the API can observe a partially updated value. The controller starts idle and begins
//! actuating once the first reference is set, it never goes back to idle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod characterize;
pub mod dynamic;
pub mod inverse_dynamics;
pub mod law;
pub mod log;
pub mod mpc;
pub mod osc;
pub mod pid;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use ::log::{error, info, warn};
use arc_swap::{ArcSwap, ArcSwapOption};
use nalgebra::{DVector, Vector3};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use trunk_if::{Actuator, IfError, SensorSource, ValveDems};
use util::{archive::ArchiveError, time};

pub use self::law::{Command, ControlLaw, LawError};
pub use self::log::{ControlLog, DEFAULT_LOG_NAME};

use crate::curv_calc::{CurvCalcError, CurvatureEstimator};
use crate::robot_params::TrunkConfig;
use crate::sim::Simulator;
use crate::state::{ControllerReference, State};
use crate::trunk_model::{ModelError, SoftTrunkModel};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Hosts a control law in a fixed rate control thread.
pub struct ControllerPcc {
    config: Arc<TrunkConfig>,
    shared: Arc<Shared>,
    run: Arc<AtomicBool>,
    ctrl_jh: Option<JoinHandle<()>>,
}

/// Everything the control thread publishes at the end of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Latest curvature state
    pub state: State,

    /// Latest command, zero until the controller is actuating
    pub command: Command,

    /// Tip position in the task frame at the start of the tick.
    ///
    /// Units: meters
    pub x: Vector3<f64>,

    /// True once the first reference has been received
    pub actuating: bool,

    /// True if the simulation has diverged and stopped
    pub diverged: bool,
}

/// Data shared between the API and the control thread.
struct Shared {
    reference: ArcSwapOption<ControllerReference>,
    output: ArcSwap<Output>,
    log: Mutex<ControlLog>,
}

/// Everything owned by the control thread.
struct ControlLoop {
    model: SoftTrunkModel,
    law: Box<dyn ControlLaw>,
    io: Io,
    shared: Arc<Shared>,

    /// Simulated state, unused with hardware
    state: State,

    /// Last successfully computed command
    command: Command,

    /// Reference the law last ran against
    last_ref: Option<Arc<ControllerReference>>,

    sim_ok: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Where the state comes from and where the command goes.
pub enum Io {
    /// The simulator integrates the command into the next state
    Simulated(Simulator),

    /// The estimator measures the state and the actuator applies the command
    Hardware {
        estimator: CurvatureEstimator,
        actuator: Box<dyn Actuator>,
    },
}

#[derive(Debug, Error)]
pub enum CtrlError {
    #[error("Model error: {0}")]
    ModelError(ModelError),

    #[error("Curvature estimator error: {0}")]
    CurvCalcError(CurvCalcError),

    #[error("Actuator error: {0}")]
    ActuatorError(IfError),

    #[error("The actuator drives {found} valves but the trunk has {expected} chambers")]
    ActuatorSizeMismatch { expected: usize, found: usize },

    #[error("Control log error: {0}")]
    LogError(ArchiveError),

    #[error("Invalid control rate {0} Hz")]
    InvalidRate(f64),

    #[error("Could not start the control thread: {0}")]
    ThreadSpawnError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControllerPcc {
    /// Start a controller running the configured law against the simulator.
    pub fn simulated<P: AsRef<Path>>(config: Arc<TrunkConfig>, log_dir: P) -> Result<Self, CtrlError> {
        let sim = Simulator::new(config.clone(), config.control_period_s())?;
        let law = law::from_config(&config);

        Self::new(config, law, Io::Simulated(sim), log_dir)
    }

    /// Start a controller running the configured law against the trunk hardware.
    pub fn hardware<P: AsRef<Path>>(
        config: Arc<TrunkConfig>,
        source: Box<dyn SensorSource>,
        actuator: Box<dyn Actuator>,
        log_dir: P,
    ) -> Result<Self, CtrlError> {
        if actuator.num_valves() != config.p_size() {
            return Err(CtrlError::ActuatorSizeMismatch {
                expected: config.p_size(),
                found: actuator.num_valves(),
            });
        }

        let estimator = CurvatureEstimator::new(config.clone(), source)?;
        let law = law::from_config(&config);

        Self::new(config, law, Io::Hardware { estimator, actuator }, log_dir)
    }

    /// Start a controller running the given law.
    ///
    /// The control log is written to `{log_dir}/defaultController_log.csv`.
    pub fn new<P: AsRef<Path>>(
        config: Arc<TrunkConfig>,
        law: Box<dyn ControlLaw>,
        io: Io,
        log_dir: P,
    ) -> Result<Self, CtrlError> {
        let rate_hz = 1.0 / config.control_period_s();
        let period = time::period_from_hz(rate_hz).ok_or(CtrlError::InvalidRate(rate_hz))?;

        let model = SoftTrunkModel::new(config.clone())?;
        let state = State::zeros(config.dof());
        let command = Command::zeros(&config);

        let shared = Arc::new(Shared {
            reference: ArcSwapOption::empty(),
            output: ArcSwap::from_pointee(Output {
                state: state.clone(),
                command: command.clone(),
                x: model.tip_position(),
                actuating: false,
                diverged: false,
            }),
            log: Mutex::new(ControlLog::new(
                log_dir,
                DEFAULT_LOG_NAME,
                config.dof(),
                config.p_size(),
            )),
        });

        info!(
            "Starting {} controller at {:.1} Hz ({})",
            law.name(),
            rate_hz,
            match io {
                Io::Simulated(_) => "simulated",
                Io::Hardware { .. } => "hardware",
            }
        );

        let ctrl_loop = ControlLoop {
            model,
            law,
            io,
            shared: shared.clone(),
            state,
            command,
            last_ref: None,
            sim_ok: true,
        };

        let run = Arc::new(AtomicBool::new(true));
        let run_ctrl = run.clone();

        let ctrl_jh = thread::Builder::new()
            .name("pcc_ctrl::control".into())
            .spawn(move || ctrl_loop.run(run_ctrl, period))
            .map_err(CtrlError::ThreadSpawnError)?;

        Ok(Self {
            config,
            shared,
            run,
            ctrl_jh: Some(ctrl_jh),
        })
    }

    /// Set a curvature space reference.
    ///
    /// The task space part of any previous reference is kept.
    ///
    /// # Panics
    /// - If the state does not have the configured number of degrees of freedom.
    pub fn set_ref(&self, state_ref: State) {
        state_ref.assert_dof(self.config.dof());

        self.shared.reference.rcu(|r| {
            let new = match r {
                Some(r) => ControllerReference {
                    state_ref: state_ref.clone(),
                    ..ControllerReference::clone(r)
                },
                None => ControllerReference::from_state(state_ref.clone()),
            };

            Some(Arc::new(new))
        });
    }

    /// Set a task space reference for the tip.
    ///
    /// The curvature space part of any previous reference is kept.
    pub fn set_task_ref(&self, x_ref: Vector3<f64>, dx_ref: Vector3<f64>, ddx_ref: Vector3<f64>) {
        let dof = self.config.dof();

        self.shared.reference.rcu(|r| {
            let state_ref = match r {
                Some(r) => r.state_ref.clone(),
                None => State::zeros(dof),
            };

            Some(Arc::new(ControllerReference {
                state_ref,
                x_ref,
                dx_ref,
                ddx_ref,
            }))
        });
    }

    /// The current reference, if one has been set.
    pub fn get_ref(&self) -> Option<ControllerReference> {
        self.shared.reference.load_full().as_deref().cloned()
    }

    /// Everything published at the end of the last tick.
    pub fn get_output(&self) -> Arc<Output> {
        self.shared.output.load_full()
    }

    /// Latest curvature state.
    pub fn get_state(&self) -> State {
        self.shared.output.load().state.clone()
    }

    /// Latest chamber pressures.
    ///
    /// Units: millibar
    pub fn get_pressure(&self) -> DVector<f64> {
        self.shared.output.load().command.pressure.clone()
    }

    /// Latest generalized force requested by the law.
    pub fn get_force(&self) -> DVector<f64> {
        self.shared.output.load().command.force.clone()
    }

    /// Latest tip position in the task frame.
    ///
    /// Units: meters
    pub fn get_x(&self) -> Vector3<f64> {
        self.shared.output.load().x
    }

    /// Returns true once the controller has received a reference and started actuating.
    pub fn is_actuating(&self) -> bool {
        self.shared.output.load().actuating
    }

    /// Start logging. Does nothing if already logging.
    pub fn start_log(&self) -> Result<(), CtrlError> {
        self.log().start().map_err(CtrlError::LogError)
    }

    /// Stop logging and close the log file. Does nothing if not logging.
    pub fn stop_log(&self) -> Result<(), CtrlError> {
        self.log().stop().map_err(CtrlError::LogError)
    }

    /// Start logging if stopped, otherwise stop. Returns whether the controller is now logging.
    pub fn toggle_log(&self) -> Result<bool, CtrlError> {
        self.log().toggle().map_err(CtrlError::LogError)
    }

    pub fn is_logging(&self) -> bool {
        self.log().is_logging()
    }

    /// Path of the control log file.
    pub fn log_path(&self) -> PathBuf {
        self.log().path().to_path_buf()
    }

    /// Stop the control thread and wait for it to exit, then close the log.
    ///
    /// Stopping an already stopped controller does nothing.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.ctrl_jh.take() {
            if jh.join().is_err() {
                error!("Control thread panicked");
            } else {
                info!("Control thread stopped");
            }
        }

        if let Err(e) = self.stop_log() {
            warn!("{}", e);
        }
    }

    fn log(&self) -> MutexGuard<ControlLog> {
        // A panic while holding the lock cannot leave the log half written, rows are flushed
        // individually
        match self.shared.log.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ControllerPcc {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ControlLoop {
    fn run(mut self, run: Arc<AtomicBool>, period: Duration) {
        while run.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            if let Err(e) = self.tick() {
                warn!("Control tick failed: {}", e);
            }

            if let Some(overrun) = time::sleep_remaining(cycle_start, period) {
                warn!("Cycle overran by {:.06} s", overrun.as_secs_f64());
            }
        }

        self.law.finish();

        if let Io::Hardware { estimator, .. } = &mut self.io {
            estimator.stop();
        }
    }

    fn tick(&mut self) -> Result<(), CtrlError> {
        // ---- STATE ACQUISITION ----

        let state = match &self.io {
            Io::Simulated(_) => self.state.clone(),
            Io::Hardware { estimator, .. } => estimator.get_curvature(),
        };

        self.model.update_state(&state)?;
        let x = self.model.tip_position();

        // ---- CONTROL ----

        let reference = match self.shared.reference.load_full() {
            Some(r) => r,
            None => {
                self.publish(state, x, false);
                return Ok(());
            }
        };

        let changed = match &self.last_ref {
            Some(last) => !Arc::ptr_eq(last, &reference),
            None => true,
        };
        if changed {
            self.law.reference_changed();
            self.last_ref = Some(reference.clone());
        }

        match self.law.compute(&state, &reference, &self.model) {
            Ok(c) => self.command = c,
            Err(e) => warn!(
                "The {} law failed, keeping the previous command: {}",
                self.law.name(),
                e
            ),
        }

        // ---- ACTUATION ----

        let state = match &mut self.io {
            Io::Simulated(sim) => {
                if self.sim_ok {
                    let mut next = state.clone();
                    self.sim_ok = sim.simulate(&self.command.pressure, &mut next)?;

                    if self.sim_ok {
                        self.state = next;
                    } else {
                        error!("Simulation diverged, the simulated state will no longer change");
                    }
                }
                self.state.clone()
            }
            Io::Hardware { actuator, .. } => {
                let dems = ValveDems {
                    pressures_mbar: self.command.pressure.iter().copied().collect(),
                };
                dems.validate()?;
                actuator.set_pressures(&dems)?;
                state
            }
        };

        // ---- LOGGING ----

        {
            let mut log = match self.shared.log.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            log.write_row(&x, &reference.x_ref, &state.q, &self.command.pressure)
                .map_err(CtrlError::LogError)?;
        }

        self.publish(state, x, true);

        Ok(())
    }

    fn publish(&self, state: State, x: Vector3<f64>, actuating: bool) {
        self.shared.output.store(Arc::new(Output {
            state,
            command: self.command.clone(),
            x,
            actuating,
            diverged: !self.sim_ok,
        }));
    }
}

impl From<ModelError> for CtrlError {
    fn from(e: ModelError) -> Self {
        Self::ModelError(e)
    }
}

impl From<CurvCalcError> for CtrlError {
    fn from(e: CurvCalcError) -> Self {
        Self::CurvCalcError(e)
    }
}

impl From<IfError> for CtrlError {
    fn from(e: IfError) -> Self {
        Self::ActuatorError(e)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::robot_params::{RobotParams, SensorType};
    use trunk_if::{MocapFrame, SensorFrame};

    /// Wait up to two seconds for a condition to become true.
    fn wait_for<F: Fn() -> bool>(f: F) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_actuates_only_after_reference() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let mut ctrl = ControllerPcc::simulated(config, dir.path()).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(!ctrl.is_actuating());
        assert_eq!(ctrl.get_pressure(), DVector::zeros(6));
        assert!(ctrl.get_ref().is_none());

        ctrl.set_ref(State::zeros(12));
        assert!(wait_for(|| ctrl.is_actuating()));

        let out = ctrl.get_output();
        assert!(out.state.is_finite());
        assert!(!out.diverged);
        assert_eq!(ctrl.get_force().len(), 12);

        ctrl.stop();
        ctrl.stop();
        assert!(ctrl.is_actuating());
    }

    /// A law which holds zero pressure and counts reference changes.
    struct CountingLaw {
        changes: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ControlLaw for CountingLaw {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn compute(
            &mut self,
            _state: &State,
            _reference: &ControllerReference,
            model: &SoftTrunkModel,
        ) -> Result<Command, LawError> {
            Ok(Command::zeros(model.config()))
        }

        fn reference_changed(&mut self) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_law_told_of_new_references() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let changes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let law = Box::new(CountingLaw {
            changes: changes.clone(),
        });
        let sim = Simulator::new(config.clone(), config.control_period_s()).unwrap();
        let mut ctrl =
            ControllerPcc::new(config, law, Io::Simulated(sim), dir.path()).unwrap();

        ctrl.set_ref(State::zeros(12));
        assert!(wait_for(|| ctrl.is_actuating()));

        // The same reference over many ticks is a single change
        thread::sleep(Duration::from_millis(100));
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        ctrl.set_task_ref(Vector3::new(0.0, 0.0, -0.2), Vector3::zeros(), Vector3::zeros());
        assert!(wait_for(|| changes.load(Ordering::SeqCst) == 2));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(changes.load(Ordering::SeqCst), 2);

        ctrl.stop();
    }

    #[test]
    fn test_references_merge() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let ctrl = ControllerPcc::simulated(config, dir.path()).unwrap();

        let x_ref = Vector3::new(0.01, 0.0, -0.25);
        ctrl.set_task_ref(x_ref, Vector3::zeros(), Vector3::zeros());

        let mut q_ref = DVector::zeros(12);
        q_ref[0] = 0.1;
        ctrl.set_ref(State::at_rest(q_ref.clone()));

        let r = ctrl.get_ref().unwrap();
        assert_eq!(r.x_ref, x_ref);
        assert_eq!(r.state_ref.q, q_ref);
    }

    #[test]
    #[should_panic]
    fn test_set_ref_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let ctrl = ControllerPcc::simulated(config, dir.path()).unwrap();

        ctrl.set_ref(State::zeros(4));
    }

    #[test]
    fn test_concurrent_set_ref_and_get_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let ctrl = Arc::new(ControllerPcc::simulated(config, dir.path()).unwrap());

        let writer = {
            let ctrl = ctrl.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    let mut q = DVector::zeros(12);
                    q[i % 12] = 0.05;
                    ctrl.set_ref(State::at_rest(q));
                }
            })
        };

        for _ in 0..1000 {
            let s = ctrl.get_state();
            assert!(s.has_dof(12));
            let r = ctrl.get_ref();
            if let Some(r) = r {
                assert!(r.state_ref.has_dof(12));
            }
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_toggle_log_twice() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let ctrl = ControllerPcc::simulated(config, dir.path()).unwrap();

        assert!(ctrl.toggle_log().unwrap());
        assert!(!ctrl.toggle_log().unwrap());
        assert!(!ctrl.is_logging());

        // Nothing is actuating so only the header was written
        let contents = std::fs::read_to_string(ctrl.log_path()).unwrap();
        assert!(contents.starts_with("timestamp,x,y,z,x_ref,y_ref,z_ref,err,q_0,"));
        assert_eq!(contents.lines().count(), 1);
        assert!(ctrl.log_path().ends_with("defaultController_log.csv"));
    }

    #[test]
    fn test_log_rows_while_actuating() {
        let dir = tempfile::tempdir().unwrap();
        let config = RobotParams::default().finalize().unwrap();
        let mut ctrl = ControllerPcc::simulated(config, dir.path()).unwrap();

        ctrl.set_ref(State::zeros(12));
        assert!(wait_for(|| ctrl.is_actuating()));

        ctrl.start_log().unwrap();
        thread::sleep(Duration::from_millis(100));
        ctrl.stop();

        let contents = std::fs::read_to_string(ctrl.log_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines.len() >= 3);
        assert!(lines[1..].iter().all(|l| l.split(',').count() == 8 + 12 + 6));
    }

    struct Straight {
        timestamp_us: u64,
    }

    impl SensorSource for Straight {
        fn latest(&mut self) -> Result<Option<SensorFrame>, IfError> {
            self.timestamp_us += 1;
            Ok(Some(SensorFrame::Mocap(MocapFrame {
                timestamp_us: self.timestamp_us,
                transforms: vec![
                    nalgebra::Isometry3::identity(),
                    nalgebra::Isometry3::translation(0.0, 0.0, 0.145),
                    nalgebra::Isometry3::translation(0.0, 0.0, 0.29),
                ],
            })))
        }
    }

    struct Recorder {
        valves: usize,
        sets: Arc<Mutex<Vec<(usize, f64)>>>,
    }

    impl Actuator for Recorder {
        fn num_valves(&self) -> usize {
            self.valves
        }

        fn set_single_pressure(&mut self, index: usize, pressure_mbar: f64) -> Result<(), IfError> {
            self.sets.lock().unwrap().push((index, pressure_mbar));
            Ok(())
        }
    }

    #[test]
    fn test_hardware_actuates_valves() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = RobotParams::default();
        params.sensor_type = SensorType::Mocap;
        let config = params.finalize().unwrap();

        let sets = Arc::new(Mutex::new(Vec::new()));
        let mut ctrl = ControllerPcc::hardware(
            config,
            Box::new(Straight { timestamp_us: 0 }),
            Box::new(Recorder {
                valves: 6,
                sets: sets.clone(),
            }),
            dir.path(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(sets.lock().unwrap().is_empty());

        ctrl.set_ref(State::zeros(12));
        assert!(wait_for(|| sets.lock().unwrap().len() >= 12));
        ctrl.stop();

        let sets = sets.lock().unwrap();
        assert!(sets.iter().all(|(i, p)| *i < 6 && *p >= 0.0));
        assert_eq!(sets[0].0, 0);
        assert_eq!(sets[5].0, 5);
    }

    #[test]
    fn test_hardware_rejects_wrong_actuator() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = RobotParams::default();
        params.sensor_type = SensorType::Mocap;
        let config = params.finalize().unwrap();

        let result = ControllerPcc::hardware(
            config,
            Box::new(Straight { timestamp_us: 0 }),
            Box::new(Recorder {
                valves: 3,
                sets: Arc::new(Mutex::new(Vec::new())),
            }),
            dir.path(),
        );

        match result {
            Err(CtrlError::ActuatorSizeMismatch {
                expected: 6,
                found: 3,
            }) => (),
            Err(e) => panic!("Expected actuator size mismatch, got {}", e),
            Ok(_) => panic!("Expected actuator size mismatch"),
        }
    }
}
