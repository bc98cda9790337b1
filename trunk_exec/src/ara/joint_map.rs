//! Mapping from PCC sections to rigid joints
//!
//! Each section is represented by five joints: a spherical joint at its base (revolute x, y and
//! z) and two prismatic joints along the chord which shorten it to the PCC chord length. The
//! spherical joint at a section's base takes the second half of the previous section's bend and
//! the first half of its own, so each section's joints depend on its own coordinates and on those
//! of the section before it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, Matrix3};

use crate::pcc::{longitudinal_to_phi_theta, phi_theta_jacobian, THETA_EPSILON};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of rigid joints representing one section.
pub const JOINTS_PER_SECTION: usize = 5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Joints of one section and their derivatives.
#[derive(Debug, Clone, PartialEq)]
struct SectionJoints {
    /// Joint positions `(rx, ry, rz, p1, p2)`
    xi: [f64; JOINTS_PER_SECTION],

    /// Derivative of each joint with respect to the previous section's `(phi, theta)`
    d_prev: [[f64; 2]; JOINTS_PER_SECTION],

    /// Derivative of each joint with respect to this section's `(phi, theta)`
    d_curr: [[f64; 2]; JOINTS_PER_SECTION],
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Compute the joint positions `xi` and the Jacobian `d(xi)/d(q)` for the given expanded
/// curvature vector.
///
/// `section_lengths` has one entry per section of `q`, and `q` is in the longitudinal
/// parametrization.
pub fn map(q: &DVector<f64>, section_lengths: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
    let num_sections = section_lengths.len();
    let mut xi = DVector::zeros(JOINTS_PER_SECTION * num_sections);
    let mut jm = DMatrix::zeros(JOINTS_PER_SECTION * num_sections, 2 * num_sections);

    let mut p0 = 0.0;
    let mut t0 = 0.0;
    let mut dpt_prev = [[0.0; 2]; 2];

    for (s, l) in section_lengths.iter().enumerate() {
        let (lx, ly) = (q[2 * s], q[2 * s + 1]);
        let (p1, t1) = longitudinal_to_phi_theta(lx, ly);
        let t1 = t1.max(THETA_EPSILON);
        let dpt = phi_theta_jacobian(lx, ly);

        let joints = section_joints(p0, t0, p1, t1, *l);
        let head = JOINTS_PER_SECTION * s;

        for k in 0..JOINTS_PER_SECTION {
            xi[head + k] = joints.xi[k];

            for c in 0..2 {
                jm[(head + k, 2 * s + c)] =
                    joints.d_curr[k][0] * dpt[0][c] + joints.d_curr[k][1] * dpt[1][c];

                if s > 0 {
                    jm[(head + k, 2 * (s - 1) + c)] =
                        joints.d_prev[k][0] * dpt_prev[0][c] + joints.d_prev[k][1] * dpt_prev[1][c];
                }
            }
        }

        p0 = p1;
        t0 = t1;
        dpt_prev = dpt;
    }

    (xi, jm)
}

/// Joints of one section, given the previous section's `(p0, t0)` and this section's `(p1, t1)`
/// and length.
fn section_joints(p0: f64, t0: f64, p1: f64, t1: f64, l: f64) -> SectionJoints {
    let r_prev = r_pcc(p0, t0 / 2.0);
    let r_curr = r_pcc(p1, t1 / 2.0);
    let r = r_prev * r_curr;

    // Rotation derivatives with respect to (p0, t0, p1, t1)
    let dr = [
        dr_pcc_dp(p0, t0 / 2.0) * r_curr,
        dr_pcc_dt(p0, t0 / 2.0) * r_curr * 0.5,
        r_prev * dr_pcc_dp(p1, t1 / 2.0),
        r_prev * dr_pcc_dt(p1, t1 / 2.0) * 0.5,
    ];

    let euler = euler_xyz(&r);
    let d_euler: Vec<[f64; 3]> = dr.iter().map(|d| euler_xyz_diff(&r, d)).collect();

    let shortening = l / 2.0 - l * (t1 / 2.0).sin() / t1;
    let d_shortening = -l * (t1 / 2.0).cos() / (2.0 * t1) + l * (t1 / 2.0).sin() / (t1 * t1);

    let mut joints = SectionJoints {
        xi: [euler[0], euler[1], euler[2], shortening, shortening],
        d_prev: [[0.0; 2]; JOINTS_PER_SECTION],
        d_curr: [[0.0; 2]; JOINTS_PER_SECTION],
    };

    for k in 0..3 {
        joints.d_prev[k] = [d_euler[0][k], d_euler[1][k]];
        joints.d_curr[k] = [d_euler[2][k], d_euler[3][k]];
    }
    joints.d_curr[3] = [0.0, d_shortening];
    joints.d_curr[4] = [0.0, d_shortening];

    joints
}

/// Rotation of a PCC bend of angle `t` in the plane at angle `p`.
fn r_pcc(p: f64, t: f64) -> Matrix3<f64> {
    rot_z(p) * rot_y(t) * rot_z(-p)
}

fn dr_pcc_dp(p: f64, t: f64) -> Matrix3<f64> {
    let ry = rot_y(t);
    rot_z(p) * (skew_z() * ry - ry * skew_z()) * rot_z(-p)
}

fn dr_pcc_dt(p: f64, t: f64) -> Matrix3<f64> {
    rot_z(p) * rot_y(t) * skew_y() * rot_z(-p)
}

/// Angles `(a, b, c)` such that `r = Rx(a) Ry(b) Rz(c)`.
fn euler_xyz(r: &Matrix3<f64>) -> [f64; 3] {
    let b = clamp_unit(r[(0, 2)]).asin();
    let cb = b.cos();

    [
        -clamp_unit(r[(1, 2)] / cb).asin(),
        b,
        -clamp_unit(r[(0, 1)] / cb).asin(),
    ]
}

/// Derivative of [`euler_xyz`] along the rotation derivative `dr`.
fn euler_xyz_diff(r: &Matrix3<f64>, dr: &Matrix3<f64>) -> [f64; 3] {
    let s = clamp_unit(r[(0, 2)]);
    let b = s.asin();
    let (sb, cb) = b.sin_cos();
    let db = dr[(0, 2)] / (1.0 - s * s).sqrt();

    let u = clamp_unit(r[(1, 2)] / cb);
    let du = dr[(1, 2)] / cb + r[(1, 2)] * sb * db / (cb * cb);

    let w = clamp_unit(r[(0, 1)] / cb);
    let dw = dr[(0, 1)] / cb + r[(0, 1)] * sb * db / (cb * cb);

    [-du / (1.0 - u * u).sqrt(), db, -dw / (1.0 - w * w).sqrt()]
}

fn clamp_unit(v: f64) -> f64 {
    util::maths::clamp(v, -1.0, 1.0)
}

fn rot_y(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

fn rot_z(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

fn skew_y() -> Matrix3<f64> {
    Matrix3::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0)
}

fn skew_z() -> Matrix3<f64> {
    Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn rot_x(a: f64) -> Matrix3<f64> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), a).into_inner()
    }

    #[test]
    fn test_euler_recovers_rotation() {
        let r = r_pcc(0.7, 0.3) * r_pcc(-1.2, 0.25);
        let [a, b, c] = euler_xyz(&r);

        assert_relative_eq!(rot_x(a) * rot_y(b) * rot_z(c), r, epsilon = 1e-12);
    }

    #[test]
    fn test_straight_section() {
        let joints = section_joints(0.0, 0.0, 0.0, THETA_EPSILON, 0.1);
        for v in joints.xi.iter() {
            assert!(v.abs() < 1e-4);
        }
    }

    #[test]
    fn test_chord_length() {
        let l = 0.04;
        let t = 0.8;
        let joints = section_joints(0.0, 0.0, 0.3, t, l);
        let chord = l - joints.xi[3] - joints.xi[4];

        assert_relative_eq!(chord, 2.0 * l * (t / 2.0).sin() / t, epsilon = 1e-12);
    }

    #[test]
    fn test_section_derivatives() {
        let (p0, t0, p1, t1, l) = (0.4, 0.3, -0.9, 0.5, 0.04);
        let h = 1e-7;
        let base = section_joints(p0, t0, p1, t1, l);
        let shifted = [
            section_joints(p0 + h, t0, p1, t1, l),
            section_joints(p0, t0 + h, p1, t1, l),
            section_joints(p0, t0, p1 + h, t1, l),
            section_joints(p0, t0, p1, t1 + h, l),
        ];

        for k in 0..JOINTS_PER_SECTION {
            let analytic = [
                base.d_prev[k][0],
                base.d_prev[k][1],
                base.d_curr[k][0],
                base.d_curr[k][1],
            ];
            for (v, s) in shifted.iter().enumerate() {
                let numeric = (s.xi[k] - base.xi[k]) / h;
                assert_relative_eq!(analytic[v], numeric, epsilon = 1e-5);
            }
        }
    }
}
