//! Main soft trunk executable entry point.
//!
//! # Architecture
//!
//! The executable runs one control law against the simulated trunk:
//!
//!     - Initialise the session and logging
//!     - Load the executable and robot parameters, then freeze the configuration
//!     - Start the controller and set the reference
//!     - Main loop:
//!         - Report the tip position, tracking error and chamber pressures
//!         - Stop early if the simulation diverged
//!     - Stop the controller, closing the control log

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{error, info, warn};
use nalgebra::Vector3;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use trunk_lib::{
    params::ExecParams,
    pcc_ctrl::ControllerPcc,
    robot_params::{ControllerType, RobotParams, SensorType},
    state::State,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Run a soft trunk control law against the simulated trunk.
#[derive(Debug, StructOpt)]
#[structopt(name = "trunk_exec")]
struct Args {
    /// Executable parameter file, relative to $SOFT_TRUNK_ROOT/params
    #[structopt(long, default_value = "trunk_exec.toml")]
    exec_params: String,

    /// Robot parameter file, overriding the one named in the executable parameters
    #[structopt(long)]
    robot_params: Option<String>,

    /// Control law to run
    #[structopt(long, possible_values = ControllerType::NAMES)]
    law: Option<ControllerType>,

    /// Run duration in seconds
    #[structopt(long)]
    duration: Option<f64>,

    /// Write the control log
    #[structopt(long)]
    log: bool,

    /// Log at debug level
    #[structopt(short, long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("trunk_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logger_init(level, &session).wrap_err("Failed to initialise logging")?;

    info!("Soft Trunk Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut exec_params: ExecParams = util::params::load(&args.exec_params)
        .wrap_err("Could not load the executable parameters")?;

    if let Some(robot_params) = args.robot_params {
        exec_params.robot_params = robot_params;
    }
    if args.law.is_some() {
        exec_params.controller_type = args.law;
    }
    if let Some(duration) = args.duration {
        exec_params.duration_s = duration;
    }
    exec_params.log |= args.log;

    exec_params
        .validate()
        .wrap_err("Invalid executable parameters")?;

    let mut robot_params = RobotParams::load(&exec_params.robot_params)
        .wrap_err("Could not load the robot parameters")?;
    exec_params.apply(&mut robot_params);

    let config = robot_params
        .finalize()
        .wrap_err("Invalid robot parameters")?;

    info!(
        "Robot \"{}\": {} segments of {} sections, {:?} law",
        config.params().robot_name,
        config.num_segments(),
        config.sections_per_segment(),
        config.params().controller_type
    );

    if config.params().sensor_type != SensorType::Simulator {
        return Err(eyre!(
            "The {:?} sensor has no driver in this executable, only the simulator is supported",
            config.params().sensor_type
        ));
    }

    let q_target = exec_params
        .q_target(config.dof())
        .wrap_err("Invalid curvature target")?;

    // ---- START CONTROLLER ----

    let log_dir = match &exec_params.log_dir {
        Some(d) => PathBuf::from(d),
        None => session.arch_root.clone(),
    };

    let mut ctrl = ControllerPcc::simulated(config.clone(), &log_dir)
        .wrap_err("Failed to start the controller")?;

    if exec_params.log {
        ctrl.start_log().wrap_err("Failed to start the control log")?;
        info!("Logging to {:?}", ctrl.log_path());
    }

    // Task space laws hold the initial tip position unless told otherwise
    let x_ref = exec_params.x_target().unwrap_or_else(|| ctrl.get_x());
    ctrl.set_task_ref(x_ref, Vector3::zeros(), Vector3::zeros());

    let q_ref = q_target.unwrap_or_else(|| nalgebra::DVector::zeros(config.dof()));
    ctrl.set_ref(State::at_rest(q_ref));

    info!("Reference set, x_ref = {:?}", x_ref.as_slice());

    // ---- MAIN LOOP ----

    let start = Instant::now();
    let duration = Duration::from_secs_f64(exec_params.duration_s);
    let status_period = Duration::from_secs_f64(exec_params.status_period_s);

    while start.elapsed() < duration {
        thread::sleep(status_period.min(duration - start.elapsed().min(duration)));

        let out = ctrl.get_output();

        if out.diverged {
            error!("Simulation diverged, stopping");
            break;
        }

        if !out.actuating {
            warn!("Controller is not actuating yet");
            continue;
        }

        info!(
            "t = {:6.2} s, x = [{:+.4}, {:+.4}, {:+.4}] m, err = {:.4} m, p = {:.1?} mbar",
            start.elapsed().as_secs_f64(),
            out.x[0],
            out.x[1],
            out.x[2],
            (out.x - x_ref).norm(),
            out.command.pressure.as_slice()
        );
    }

    // ---- SHUTDOWN ----

    ctrl.stop();

    if exec_params.log {
        info!("Control log written to {:?}", ctrl.log_path());
    }

    info!("End of execution");
    session.exit();

    Ok(())
}
