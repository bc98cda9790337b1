//! Recursive Newton-Euler dynamics of a serial chain
//!
//! All quantities are expressed in the base frame. Gravity is applied by accelerating the base
//! upwards, the mass matrix is assembled one column at a time from unit joint accelerations.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Rotation3, Translation3, Unit, UnitQuaternion, Vector3,
};

use super::{
    ChainDescription, ChainError, FrameKinematics, JointKind, JointSpaceDynamics, RigidBodySolver,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Newton-Euler solver for a fixed chain.
#[derive(Debug, Clone)]
pub struct NewtonEulerChain {
    desc: ChainDescription,

    /// Normalised joint axes in their parent frames
    axes: Vec<Unit<Vector3<f64>>>,
}

/// Placement of a joint frame for a given configuration.
#[derive(Debug, Clone)]
struct JointFrame {
    /// Orientation of the frame in the base frame
    rot: Matrix3<f64>,

    /// Origin of the frame in the base frame
    pos: Vector3<f64>,

    /// Joint axis in the base frame
    axis: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NewtonEulerChain {
    /// Create a solver for the given chain.
    pub fn new(desc: ChainDescription) -> Result<Self, ChainError> {
        desc.validate()?;

        let axes = desc
            .joints
            .iter()
            .map(|j| Unit::new_normalize(j.axis))
            .collect();

        Ok(Self { desc, axes })
    }

    /// The description of the chain.
    pub fn description(&self) -> &ChainDescription {
        &self.desc
    }

    fn check_len(&self, v: &DVector<f64>) -> Result<(), ChainError> {
        if v.len() != self.desc.joints.len() {
            Err(ChainError::DimensionMismatch {
                expected: self.desc.joints.len(),
                found: v.len(),
            })
        } else {
            Ok(())
        }
    }

    fn forward_kinematics(&self, xi: &DVector<f64>) -> Vec<JointFrame> {
        let mut frames = Vec::with_capacity(self.desc.joints.len());
        let mut rot = Matrix3::identity();
        let mut pos = Vector3::zeros();

        for (i, joint) in self.desc.joints.iter().enumerate() {
            let origin = pos + rot * joint.offset;
            let axis = rot * self.axes[i].into_inner();

            match joint.kind {
                JointKind::Revolute => {
                    rot *= Rotation3::from_axis_angle(&self.axes[i], xi[i]).into_inner();
                    pos = origin;
                }
                JointKind::Prismatic => {
                    pos = origin + axis * xi[i];
                }
            }

            frames.push(JointFrame { rot, pos, axis });
        }

        frames
    }

    /// Joint forces required to produce the given motion.
    ///
    /// `base_acc` is the linear acceleration of the base, which is `-gravity` when gravity is to
    /// be included.
    fn inverse_dynamics(
        &self,
        frames: &[JointFrame],
        dxi: &DVector<f64>,
        ddxi: &DVector<f64>,
        base_acc: Vector3<f64>,
    ) -> DVector<f64> {
        let n = frames.len();
        let mut omega = Vec::with_capacity(n);
        let mut alpha = Vec::with_capacity(n);
        let mut acc = Vec::with_capacity(n);

        // Outward pass, velocities and accelerations of each frame origin
        let mut w_prev = Vector3::zeros();
        let mut al_prev = Vector3::zeros();
        let mut a_prev = base_acc;
        let mut p_prev = Vector3::zeros();

        for (i, f) in frames.iter().enumerate() {
            let r = f.pos - p_prev;
            let a_carried = a_prev + al_prev.cross(&r) + w_prev.cross(&w_prev.cross(&r));
            let z_dq = f.axis * dxi[i];

            let (w, al, a) = match self.desc.joints[i].kind {
                JointKind::Revolute => (
                    w_prev + z_dq,
                    al_prev + f.axis * ddxi[i] + w_prev.cross(&z_dq),
                    a_carried,
                ),
                JointKind::Prismatic => (
                    w_prev,
                    al_prev,
                    a_carried + 2.0 * w_prev.cross(&z_dq) + f.axis * ddxi[i],
                ),
            };

            omega.push(w);
            alpha.push(al);
            acc.push(a);

            w_prev = w;
            al_prev = al;
            a_prev = a;
            p_prev = f.pos;
        }

        // Inward pass, forces and moments transmitted through each joint
        let mut tau = DVector::zeros(n);
        let mut f_next = Vector3::zeros();
        let mut n_next = Vector3::zeros();

        for i in (0..n).rev() {
            let f = &frames[i];
            let body = &self.desc.joints[i].body;

            let rc = f.rot * body.com;
            let a_com = acc[i] + alpha[i].cross(&rc) + omega[i].cross(&omega[i].cross(&rc));
            let inertia = f.rot * body.inertia * f.rot.transpose();

            let force = a_com * body.mass;
            let moment = inertia * alpha[i] + omega[i].cross(&(inertia * omega[i]));

            let mut n_i = moment + rc.cross(&force) + n_next;
            if i + 1 < n {
                n_i += (frames[i + 1].pos - f.pos).cross(&f_next);
            }
            let f_i = force + f_next;

            tau[i] = match self.desc.joints[i].kind {
                JointKind::Revolute => f.axis.dot(&n_i),
                JointKind::Prismatic => f.axis.dot(&f_i),
            };

            f_next = f_i;
            n_next = n_i;
        }

        tau
    }
}

impl RigidBodySolver for NewtonEulerChain {
    fn num_joints(&self) -> usize {
        self.desc.joints.len()
    }

    fn num_frames(&self) -> usize {
        self.desc.frames.len()
    }

    fn dynamics(
        &self,
        xi: &DVector<f64>,
        dxi: &DVector<f64>,
    ) -> Result<JointSpaceDynamics, ChainError> {
        self.check_len(xi)?;
        self.check_len(dxi)?;

        let n = xi.len();
        let frames = self.forward_kinematics(xi);
        let zeros = DVector::zeros(n);

        let mut b_xi = DMatrix::zeros(n, n);
        for j in 0..n {
            let mut unit = DVector::zeros(n);
            unit[j] = 1.0;
            b_xi.set_column(
                j,
                &self.inverse_dynamics(&frames, &zeros, &unit, Vector3::zeros()),
            );
        }

        // Remove round-off asymmetry
        let b_xi = (&b_xi + b_xi.transpose()) * 0.5;

        let c_xi = self.inverse_dynamics(&frames, dxi, &zeros, Vector3::zeros());
        let g_xi = self.inverse_dynamics(&frames, &zeros, &zeros, -self.desc.gravity);

        Ok(JointSpaceDynamics { b_xi, c_xi, g_xi })
    }

    fn kinematics(&self, xi: &DVector<f64>) -> Result<Vec<FrameKinematics>, ChainError> {
        self.check_len(xi)?;

        let n = xi.len();
        let frames = self.forward_kinematics(xi);

        Ok(self
            .desc
            .frames
            .iter()
            .map(|fd| {
                let parent = &frames[fd.joint];
                let point = parent.pos + parent.rot * fd.offset;

                let mut jacobian = DMatrix::zeros(3, n);
                for (j, f) in frames.iter().enumerate().take(fd.joint + 1) {
                    let col = match self.desc.joints[j].kind {
                        JointKind::Revolute => f.axis.cross(&(point - f.pos)),
                        JointKind::Prismatic => f.axis,
                    };
                    jacobian.set_column(j, &col);
                }

                let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
                    parent.rot,
                ));

                FrameKinematics {
                    pose: Isometry3::from_parts(Translation3::from(point), rot),
                    jacobian,
                }
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::rigid_chain::{BodyDesc, FrameDesc, JointDesc};
    use approx::assert_relative_eq;

    const G: f64 = 9.81;

    fn point_mass(mass: f64, com: Vector3<f64>) -> BodyDesc {
        BodyDesc {
            mass,
            com,
            inertia: Matrix3::zeros(),
        }
    }

    fn pendulum(mass: f64, length: f64) -> NewtonEulerChain {
        NewtonEulerChain::new(ChainDescription {
            joints: vec![JointDesc {
                name: "ry".into(),
                kind: JointKind::Revolute,
                axis: Vector3::y(),
                offset: Vector3::zeros(),
                body: point_mass(mass, Vector3::new(0.0, 0.0, length)),
            }],
            frames: vec![FrameDesc {
                name: "tip".into(),
                joint: 0,
                offset: Vector3::new(0.0, 0.0, length),
            }],
            gravity: Vector3::new(0.0, 0.0, -G),
        })
        .unwrap()
    }

    /// Revolute, prismatic, revolute chain with distributed bodies.
    fn mixed_chain() -> NewtonEulerChain {
        NewtonEulerChain::new(ChainDescription {
            joints: vec![
                JointDesc {
                    name: "rx".into(),
                    kind: JointKind::Revolute,
                    axis: Vector3::x(),
                    offset: Vector3::zeros(),
                    body: BodyDesc::cylinder(0.3, 0.02, 0.1, Vector3::new(0.0, 0.0, 0.05)),
                },
                JointDesc {
                    name: "pz".into(),
                    kind: JointKind::Prismatic,
                    axis: Vector3::new(0.0, 0.0, -1.0),
                    offset: Vector3::new(0.0, 0.0, 0.1),
                    body: BodyDesc::cylinder(0.2, 0.02, 0.1, Vector3::new(0.0, 0.0, 0.05)),
                },
                JointDesc {
                    name: "ry".into(),
                    kind: JointKind::Revolute,
                    axis: Vector3::y(),
                    offset: Vector3::new(0.0, 0.0, 0.1),
                    body: BodyDesc::cylinder(0.1, 0.01, 0.1, Vector3::new(0.0, 0.01, 0.05)),
                },
            ],
            frames: vec![FrameDesc {
                name: "tip".into(),
                joint: 2,
                offset: Vector3::new(0.0, 0.0, 0.1),
            }],
            gravity: Vector3::new(0.0, 0.0, -G),
        })
        .unwrap()
    }

    fn potential(chain: &NewtonEulerChain, xi: &DVector<f64>) -> f64 {
        let frames = chain.forward_kinematics(xi);
        frames
            .iter()
            .zip(chain.desc.joints.iter())
            .map(|(f, j)| -j.body.mass * chain.desc.gravity.dot(&(f.pos + f.rot * j.body.com)))
            .sum()
    }

    #[test]
    fn test_pendulum() {
        let chain = pendulum(2.0, 0.5);
        let theta = 0.3;
        let xi = DVector::from_element(1, theta);
        let dyn_terms = chain.dynamics(&xi, &DVector::from_element(1, 1.5)).unwrap();

        assert_relative_eq!(dyn_terms.b_xi[(0, 0)], 2.0 * 0.25, epsilon = 1e-12);
        assert_relative_eq!(dyn_terms.c_xi[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            dyn_terms.g_xi[0],
            -2.0 * G * 0.5 * theta.sin(),
            epsilon = 1e-12
        );

        let tip = &chain.kinematics(&xi).unwrap()[0];
        assert_relative_eq!(tip.pose.translation.vector.x, 0.5 * theta.sin(), epsilon = 1e-12);
        assert_relative_eq!(tip.pose.translation.vector.z, 0.5 * theta.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_mass_matrix_spd() {
        let chain = mixed_chain();
        let xi = DVector::from_vec(vec![0.4, 0.02, -0.7]);
        let b = chain.dynamics(&xi, &DVector::zeros(3)).unwrap().b_xi;

        assert_relative_eq!(b, b.transpose(), epsilon = 1e-12);
        assert!(b.clone().cholesky().is_some());
    }

    #[test]
    fn test_gravity_is_potential_gradient() {
        let chain = mixed_chain();
        let xi = DVector::from_vec(vec![0.4, 0.02, -0.7]);
        let g = chain.dynamics(&xi, &DVector::zeros(3)).unwrap().g_xi;
        let h = 1e-6;

        for j in 0..3 {
            let mut up = xi.clone();
            let mut down = xi.clone();
            up[j] += h;
            down[j] -= h;
            let grad = (potential(&chain, &up) - potential(&chain, &down)) / (2.0 * h);
            assert_relative_eq!(g[j], grad, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_bias_matches_energy_balance() {
        // With no gravity and no applied force, dT/dt = 0 when ddxi = -B^-1 c, so
        // dxi^T c must equal half of dxi^T dB/dt dxi
        let chain = mixed_chain();
        let xi = DVector::from_vec(vec![0.4, 0.02, -0.7]);
        let dxi = DVector::from_vec(vec![0.5, -0.1, 1.2]);
        let h = 1e-6;

        let terms = chain.dynamics(&xi, &dxi).unwrap();
        let b_next = chain.dynamics(&(&xi + &dxi * h), &dxi).unwrap().b_xi;
        let b_prev = chain.dynamics(&(&xi - &dxi * h), &dxi).unwrap().b_xi;
        let db = (b_next - b_prev) / (2.0 * h);

        let lhs = dxi.dot(&terms.c_xi);
        let rhs = 0.5 * dxi.dot(&(db * &dxi));
        assert_relative_eq!(lhs, rhs, epsilon = 1e-7);
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let chain = mixed_chain();
        let xi = DVector::from_vec(vec![0.4, 0.02, -0.7]);
        let jac = chain.kinematics(&xi).unwrap()[0].jacobian.clone();
        let h = 1e-7;

        for j in 0..3 {
            let mut up = xi.clone();
            up[j] += h;
            let p0 = chain.kinematics(&xi).unwrap()[0].pose.translation.vector;
            let p1 = chain.kinematics(&up).unwrap()[0].pose.translation.vector;
            let col = (p1 - p0) / h;
            for r in 0..3 {
                assert_relative_eq!(jac[(r, j)], col[r], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let chain = mixed_chain();
        assert!(matches!(
            chain.kinematics(&DVector::zeros(2)),
            Err(ChainError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        ));
    }
}
