//! # Augmented Rigid Arm
//!
//! The augmented rigid arm is an equivalent rigid joint chain whose configuration follows the PCC
//! state exactly. Each [`update`](AugmentedRigidArm::update) maps the curvature state onto the
//! chain, asks the rigid body solver for the joint space dynamics and projects them back into
//! curvature space:
//!
//! - `B = Mᵀ Jmᵀ B_xi Jm M`
//! - `c = Mᵀ Jmᵀ c_xi`
//! - `g = Mᵀ Jmᵀ g_xi`
//! - `J[i] = Jxi[i] Jm M`, with the y row negated to express it in the task frame
//!
//! where `Jm = d(xi)/d(q)` and `M` expands the curvature vector with the zero curvature connector
//! sections.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod chain;
pub mod joint_map;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use nalgebra::{DMatrix, DVector, Isometry3};
use std::sync::Arc;
use thiserror::Error;

use crate::rigid_chain::{ChainError, FrameKinematics, NewtonEulerChain, RigidBodySolver};
use crate::robot_params::{CoordType, TrunkConfig};

use self::joint_map::JOINTS_PER_SECTION;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Step along the velocity used to differentiate the task space Jacobians.
const DJ_STEP: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The augmented rigid arm of the trunk.
pub struct AugmentedRigidArm {
    config: Arc<TrunkConfig>,

    solver: Box<dyn RigidBodySolver>,

    /// Length of each section of the expanded chain
    section_lengths: Vec<f64>,

    /// Selection matrix inserting zero curvature connectors into the curvature vector
    map_normal2expanded: DMatrix<f64>,

    xi: DVector<f64>,
    dxi: DVector<f64>,
    jm: DMatrix<f64>,

    b: DMatrix<f64>,
    c: DVector<f64>,
    g: DVector<f64>,
    j: Vec<DMatrix<f64>>,
    dj: Vec<DMatrix<f64>>,
    h: Vec<Isometry3<f64>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with the augmented rigid arm.
#[derive(Debug, Error)]
pub enum AraError {
    #[error("The augmented rigid arm only supports the longitudinal parametrization, found {0:?}")]
    UnsupportedCoordType(CoordType),

    #[error("The chain has {found} joints but the trunk requires {expected}")]
    JointCountMismatch { expected: usize, found: usize },

    #[error("The chain reports {found} frames but the trunk has {expected} segments")]
    FrameCountMismatch { expected: usize, found: usize },

    #[error("Expected a state with {expected} coordinates, found {found}")]
    StateSizeMismatch { expected: usize, found: usize },

    #[error("Rigid chain error: {0}")]
    ChainError(ChainError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AugmentedRigidArm {
    /// Create the arm using the built-in Newton-Euler solver.
    pub fn new(config: Arc<TrunkConfig>) -> Result<Self, AraError> {
        let solver = NewtonEulerChain::new(chain::build_chain(&config))?;

        Self::with_solver(config, Box::new(solver))
    }

    /// Create the arm using the given solver, which must describe the trunk's chain.
    pub fn with_solver(
        config: Arc<TrunkConfig>,
        solver: Box<dyn RigidBodySolver>,
    ) -> Result<Self, AraError> {
        let coord_type = config.params().coord_type;
        if coord_type != CoordType::Longitudinal {
            return Err(AraError::UnsupportedCoordType(coord_type));
        }

        let section_lengths: Vec<f64> = chain::expanded_sections(&config)
            .iter()
            .map(|s| s.length)
            .collect();
        let num_joints = JOINTS_PER_SECTION * section_lengths.len();

        if solver.num_joints() != num_joints {
            return Err(AraError::JointCountMismatch {
                expected: num_joints,
                found: solver.num_joints(),
            });
        }
        if solver.num_frames() != config.num_segments() {
            return Err(AraError::FrameCountMismatch {
                expected: config.num_segments(),
                found: solver.num_frames(),
            });
        }

        // Each segment's sections map 1:1, its connector stays straight
        let dof = config.dof();
        let spp = config.sections_per_segment();
        let mut map_normal2expanded = DMatrix::zeros(2 * section_lengths.len(), dof);
        for seg in 0..config.num_segments() {
            for k in 0..2 * spp {
                map_normal2expanded[(2 * seg * (spp + 1) + k, 2 * seg * spp + k)] = 1.0;
            }
        }

        debug!(
            "Augmented rigid arm created with {} joints over {} sections",
            num_joints,
            section_lengths.len()
        );

        let num_segments = config.num_segments();
        let mut ara = Self {
            config,
            solver,
            section_lengths,
            map_normal2expanded,
            xi: DVector::zeros(num_joints),
            dxi: DVector::zeros(num_joints),
            jm: DMatrix::zeros(num_joints, 0),
            b: DMatrix::zeros(dof, dof),
            c: DVector::zeros(dof),
            g: DVector::zeros(dof),
            j: vec![DMatrix::zeros(3, dof); num_segments],
            dj: vec![DMatrix::zeros(3, dof); num_segments],
            h: vec![Isometry3::identity(); num_segments],
        };

        ara.update(&DVector::zeros(dof), &DVector::zeros(dof))?;

        Ok(ara)
    }

    /// Recompute every output for the given curvature position and velocity.
    pub fn update(&mut self, q: &DVector<f64>, dq: &DVector<f64>) -> Result<(), AraError> {
        let dof = self.config.dof();
        for v in [q, dq].iter() {
            if v.len() != dof {
                return Err(AraError::StateSizeMismatch {
                    expected: dof,
                    found: v.len(),
                });
            }
        }

        let (xi, jm) = joint_map::map(&(&self.map_normal2expanded * q), &self.section_lengths);
        let jm_q = &jm * &self.map_normal2expanded;
        let dxi = &jm_q * dq;

        let terms = self.solver.dynamics(&xi, &dxi)?;
        let frames = self.solver.kinematics(&xi)?;

        let jm_q_t = jm_q.transpose();
        self.b = &jm_q_t * &terms.b_xi * &jm_q;
        self.c = &jm_q_t * &terms.c_xi;
        self.g = &jm_q_t * &terms.g_xi;

        self.j = task_jacobians(&frames, &jm_q);
        self.h = frames.iter().map(|f| f.pose).collect();

        // Jacobian rates by differencing along the current velocity
        let (xi_step, jm_step) =
            joint_map::map(&(&self.map_normal2expanded * (q + dq * DJ_STEP)), &self.section_lengths);
        let frames_step = self.solver.kinematics(&xi_step)?;
        let j_step = task_jacobians(&frames_step, &(jm_step * &self.map_normal2expanded));

        self.dj = j_step
            .iter()
            .zip(self.j.iter())
            .map(|(js, j)| (js - j) / DJ_STEP)
            .collect();

        self.xi = xi;
        self.dxi = dxi;
        self.jm = jm;

        Ok(())
    }

    /// Inertia matrix in curvature space.
    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// Coriolis and centrifugal terms in curvature space.
    pub fn c(&self) -> &DVector<f64> {
        &self.c
    }

    /// Gravity terms in curvature space.
    pub fn g(&self) -> &DVector<f64> {
        &self.g
    }

    /// Task space Jacobian of each segment tip.
    pub fn j(&self) -> &[DMatrix<f64>] {
        &self.j
    }

    /// Rate of change of each task space Jacobian.
    pub fn dj(&self) -> &[DMatrix<f64>] {
        &self.dj
    }

    /// Pose of each segment tip relative to the base, in the chain's base frame.
    pub fn h(&self) -> &[Isometry3<f64>] {
        &self.h
    }

    /// Selection matrix from the curvature vector to the expanded curvature vector.
    pub fn map_normal2expanded(&self) -> &DMatrix<f64> {
        &self.map_normal2expanded
    }
}

impl From<ChainError> for AraError {
    fn from(e: ChainError) -> Self {
        Self::ChainError(e)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Project frame Jacobians into curvature space and into the task frame.
fn task_jacobians(frames: &[FrameKinematics], jm_q: &DMatrix<f64>) -> Vec<DMatrix<f64>> {
    frames
        .iter()
        .map(|f| {
            let mut j = &f.jacobian * jm_q;
            for v in j.row_mut(1).iter_mut() {
                *v = -*v;
            }
            j
        })
        .collect()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
