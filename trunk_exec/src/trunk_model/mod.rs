//! # Soft Trunk Model
//!
//! Combines the augmented rigid arm with the elastic, damping and actuation properties of each
//! section into the full curvature space dynamics of the trunk:
//!
//! `B ddq + c + g + K q + D dq = A p`
//!
//! `K`, `D`, `A` and `A_pseudo` depend only on the configuration and are computed once. `B`,
//! `c`, `g` and the task Jacobians are recomputed on every [`SoftTrunkModel::update_state`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod allocation;
pub mod cross_section;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use nalgebra::{DMatrix, DVector, Isometry3, Vector3};
use std::sync::Arc;
use thiserror::Error;

use crate::ara::{AraError, AugmentedRigidArm};
use crate::robot_params::TrunkConfig;
use crate::state::State;

use self::{
    allocation::{chamber_matrix, PressureAllocator},
    cross_section::CrossSection,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Pascals per millibar.
pub const PA_PER_MBAR: f64 = 100.0;

/// Singular values below this are treated as zero when inverting the actuation map.
const PINV_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Dynamic parameters of the trunk for one state.
#[derive(Debug, Clone)]
pub struct DynamicParams {
    /// Inertia matrix
    pub b: DMatrix<f64>,

    /// Coriolis and centrifugal terms
    pub c: DVector<f64>,

    /// Gravity terms
    pub g: DVector<f64>,

    /// Stiffness, one 2x2 block per section
    pub k: DMatrix<f64>,

    /// Damping, one 2x2 block per section
    pub d: DMatrix<f64>,

    /// Map from chamber pressures (Pascals) to generalized forces
    pub a: DMatrix<f64>,

    /// Map from pseudo-pressures (Pascals) to generalized forces
    pub a_pseudo: DMatrix<f64>,

    /// Task space Jacobian of each segment tip
    pub j: Vec<DMatrix<f64>>,

    /// Rate of each task space Jacobian
    pub dj: Vec<DMatrix<f64>>,
}

/// The dynamic model of the trunk.
pub struct SoftTrunkModel {
    config: Arc<TrunkConfig>,

    ara: AugmentedRigidArm,

    dyn_params: DynamicParams,

    /// Pseudo-inverse of `A_pseudo`
    a_pseudo_pinv: DMatrix<f64>,

    allocator: PressureAllocator,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with the trunk model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Augmented rigid arm error: {0}")]
    AraError(AraError),

    #[error("The actuation map cannot be inverted: {0}")]
    SingularActuation(&'static str),

    #[error("The inertia matrix is singular")]
    SingularInertia,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SoftTrunkModel {
    /// Create the model using the built-in rigid body solver.
    pub fn new(config: Arc<TrunkConfig>) -> Result<Self, ModelError> {
        let ara = AugmentedRigidArm::new(config.clone())?;
        Self::with_ara(config, ara)
    }

    /// Create the model around an existing augmented rigid arm.
    pub fn with_ara(config: Arc<TrunkConfig>, ara: AugmentedRigidArm) -> Result<Self, ModelError> {
        let dof = config.dof();
        let num_segments = config.num_segments();
        let spp = config.sections_per_segment();
        let params = config.params();

        let mut k = DMatrix::zeros(dof, dof);
        let mut d = DMatrix::zeros(dof, dof);
        let mut a = DMatrix::zeros(dof, 3 * num_segments);
        let mut a_pseudo = DMatrix::zeros(dof, 2 * num_segments);
        let chambers = chamber_matrix();

        for section in 0..config.num_sections() {
            let seg = section / spp;
            let radius = config.section_radius(seg, section % spp);
            let l = config.section_length(seg);
            let cs = CrossSection::from_radius(radius);

            let stiffness = 4.0 * params.shear_modulus[seg] * cs.second_moment_of_area / l;
            let lever = cs.chamber_area * cs.chamber_centroid_dist;

            trace!(
                "Section {}: radius {:.4} m, length {:.4} m, stiffness {:.4e}",
                section,
                radius,
                l,
                stiffness
            );

            for i in 0..2 {
                k[(2 * section + i, 2 * section + i)] = stiffness;
                d[(2 * section + i, 2 * section + i)] = params.drag_coef;
                a_pseudo[(2 * section + i, 2 * seg + i)] = lever;

                for ch in 0..3 {
                    a[(2 * section + i, 3 * seg + ch)] = lever * chambers[(i, ch)];
                }
            }
        }

        let a_pseudo_pinv = a_pseudo
            .clone()
            .pseudo_inverse(PINV_EPSILON)
            .map_err(ModelError::SingularActuation)?;

        let dyn_params = DynamicParams {
            b: ara.b().clone(),
            c: ara.c().clone(),
            g: ara.g().clone(),
            k,
            d,
            a,
            a_pseudo,
            j: ara.j().to_vec(),
            dj: ara.dj().to_vec(),
        };

        debug!("Soft trunk model created with {} degrees of freedom", dof);

        Ok(Self {
            allocator: PressureAllocator::new(&config),
            config,
            ara,
            dyn_params,
            a_pseudo_pinv,
        })
    }

    /// Update the state dependent parameters.
    ///
    /// # Panics
    /// - If the state does not have the configured number of degrees of freedom.
    pub fn update_state(&mut self, state: &State) -> Result<(), ModelError> {
        state.assert_dof(self.config.dof());

        self.ara.update(&state.q, &state.dq)?;

        self.dyn_params.b.copy_from(self.ara.b());
        self.dyn_params.c.copy_from(self.ara.c());
        self.dyn_params.g.copy_from(self.ara.g());
        self.dyn_params.j = self.ara.j().to_vec();
        self.dyn_params.dj = self.ara.dj().to_vec();

        Ok(())
    }

    /// Dynamic parameters at the last updated state.
    pub fn dynamic_params(&self) -> &DynamicParams {
        &self.dyn_params
    }

    /// The configuration the model was built from.
    pub fn config(&self) -> &Arc<TrunkConfig> {
        &self.config
    }

    /// Pseudo-inverse of `A_pseudo`.
    pub fn a_pseudo_pinv(&self) -> &DMatrix<f64> {
        &self.a_pseudo_pinv
    }

    /// Convert per segment pseudo-pressures into per chamber pressures.
    ///
    /// Units: millibar
    pub fn pseudo2real(&self, pressure_pseudo: &DVector<f64>) -> DVector<f64> {
        self.allocator.pseudo2real(pressure_pseudo)
    }

    /// Project per chamber pressures back onto per segment pseudo-pressures.
    ///
    /// Units: millibar
    pub fn real2pseudo(&self, pressure_real: &DVector<f64>) -> DVector<f64> {
        self.allocator.real2pseudo(pressure_real)
    }

    /// Generalized forces expressed as the pseudo-pressures which produce them.
    ///
    /// Units: millibar
    pub fn force_to_pseudo(&self, force: &DVector<f64>) -> DVector<f64> {
        &self.a_pseudo_pinv * force / PA_PER_MBAR
    }

    /// Pseudo-pressures which hold the trunk in the given state against gravity, elasticity,
    /// damping and Coriolis terms.
    ///
    /// Units: millibar
    pub fn gravity_compensate(&self, state: &State) -> DVector<f64> {
        let p = &self.dyn_params;
        let holding = &p.g + &p.k * &state.q + &p.d * &state.dq + &p.c;

        self.force_to_pseudo(&holding)
    }

    /// Pose of the tip of the given segment relative to the base, in the chain's base frame.
    pub fn get_h(&self, segment: usize) -> Option<Isometry3<f64>> {
        self.ara.h().get(segment).copied()
    }

    /// Position of the trunk's tip in the task frame.
    ///
    /// Units: meters
    pub fn tip_position(&self) -> Vector3<f64> {
        match self.ara.h().last() {
            Some(h) => {
                let t = h.translation.vector;
                Vector3::new(t.x, -t.y, t.z)
            }
            None => Vector3::zeros(),
        }
    }
}

impl From<AraError> for ModelError {
    fn from(e: AraError) -> Self {
        Self::AraError(e)
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

    fn model(params: RobotParams) -> SoftTrunkModel {
        SoftTrunkModel::new(params.finalize().unwrap()).unwrap()
    }

    fn gravity_at(params: RobotParams, q: DVector<f64>) -> DVector<f64> {
        let mut stm = model(params);
        stm.update_state(&State::at_rest(q)).unwrap();
        stm.dynamic_params().g.clone()
    }

    #[test]
    fn test_constant_matrices() {
        let stm = model(RobotParams::default());
        let p = stm.dynamic_params();

        assert_eq!(p.k.shape(), (12, 12));
        assert_eq!(p.a.shape(), (12, 6));
        assert_eq!(p.a_pseudo.shape(), (12, 4));

        // Block diagonal, isotropic stiffness
        for i in 0..12 {
            for j in 0..12 {
                if i != j {
                    assert_eq!(p.k[(i, j)], 0.0);
                    assert_eq!(p.d[(i, j)], 0.0);
                }
            }
            assert!(p.k[(i, i)] > 0.0);
            assert_relative_eq!(p.d[(i, i)], 0.001);
        }

        // Sections taper towards the tip, so they get softer
        assert!(p.k[(0, 0)] > p.k[(4, 4)]);

        // Equal pressure in every chamber produces no bending
        let equal = DVector::from_element(6, 1000.0);
        assert_relative_eq!((&p.a * equal).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gravity_sign_follows_orientation() {
        // A small bend towards -Lx on every section
        let q = DVector::from_fn(12, |i, _| if i % 2 == 0 { -0.05 } else { 0.0 });

        let mut upright = RobotParams::default();
        upright.arm_angle_deg = 0.0;
        let g_up = gravity_at(upright, q.clone());

        let hanging = RobotParams::default();
        let g_hang = gravity_at(hanging, q.clone());

        // Upright, gravity drives the bend further, hanging it restores it
        assert!(g_up.dot(&q) < 0.0);
        assert!(g_hang.dot(&q) > 0.0);
    }

    #[test]
    fn test_gravity_grows_with_mass() {
        for angle in [0.0, 90.0].iter() {
            let mut light = RobotParams::default();
            light.arm_angle_deg = *angle;
            let mut heavy = light.clone();
            heavy.masses = light.masses.iter().map(|m| m * 2.0).collect();

            let g_light = gravity_at(light, DVector::zeros(12)).norm();
            let g_heavy = gravity_at(heavy, DVector::zeros(12)).norm();

            assert!(g_light.is_finite());
            assert!(g_heavy > g_light);
        }

        let mut side = RobotParams::default();
        side.arm_angle_deg = 90.0;
        assert!(gravity_at(side, DVector::zeros(12)).norm() > 1e-3);
    }

    #[test]
    fn test_gravity_compensation_holds_state() {
        let mut params = RobotParams::default();
        params.arm_angle_deg = 90.0;
        let mut stm = model(params);

        let state = State::at_rest(DVector::from_fn(12, |i, _| 0.02 * (i % 3) as f64));
        stm.update_state(&state).unwrap();

        // The compensation pressures balance the holding forces where the actuation can reach
        let pseudo = stm.gravity_compensate(&state);
        let p = stm.dynamic_params();
        let applied = &p.a_pseudo * &pseudo * PA_PER_MBAR;
        let holding = &p.g + &p.k * &state.q + &p.c;
        let residual = &holding - &applied;

        // Least squares residual is orthogonal to the actuation directions
        let projected = p.a_pseudo.transpose() * residual;
        assert_relative_eq!(projected.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tip_position_straight() {
        let mut stm = model(RobotParams::default());
        stm.update_state(&State::zeros(12)).unwrap();

        let tip = stm.tip_position();
        let total_length: f64 = RobotParams::default().lengths.iter().sum();

        assert_relative_eq!(tip.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(tip.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(tip.z, total_length, epsilon = 1e-6);
        assert!(stm.get_h(1).is_some());
        assert!(stm.get_h(2).is_none());
    }

    #[test]
    #[should_panic]
    fn test_wrong_state_size_panics() {
        let mut stm = model(RobotParams::default());
        let _ = stm.update_state(&State::zeros(10));
    }
}
