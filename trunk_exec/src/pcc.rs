//! # PCC parametrizations
//!
//! A PCC section can be described by its bending plane angle and bend angle (`phi`, `theta`) or
//! by its longitudinal parametrization (`Lx`, `Ly`). The longitudinal form has no singularity at
//! the straight configuration and is the one used for the state vector.

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Floor applied to the bend angle of a section.
///
/// Units: radians
pub const THETA_EPSILON: f64 = 1e-4;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert `(phi, theta)` into the longitudinal parametrization `(Lx, Ly)`.
pub fn phi_theta_to_longitudinal(phi: f64, theta: f64) -> (f64, f64) {
    (-phi.cos() * theta, -phi.sin() * theta)
}

/// Convert the longitudinal parametrization `(Lx, Ly)` into `(phi, theta)`.
///
/// A straight section has `phi = 0`.
pub fn longitudinal_to_phi_theta(lx: f64, ly: f64) -> (f64, f64) {
    let phi = if lx == 0.0 && ly == 0.0 {
        0.0
    } else {
        (-ly).atan2(-lx)
    };

    (phi, (lx * lx + ly * ly).sqrt())
}

/// Partial derivatives of `(phi, theta)` with respect to `(Lx, Ly)`.
///
/// Rows are `phi` and `theta`, columns are `Lx` and `Ly`. Near the straight configuration the
/// derivative is singular, so `Lx` is moved to `THETA_EPSILON` when both coordinates are smaller
/// than it.
pub fn phi_theta_jacobian(lx: f64, ly: f64) -> [[f64; 2]; 2] {
    let lx = if lx.abs() < THETA_EPSILON && ly.abs() < THETA_EPSILON {
        THETA_EPSILON
    } else {
        lx
    };

    let r2 = lx * lx + ly * ly;
    let r = r2.sqrt();

    [[-ly / r2, lx / r2], [lx / r, ly / r]]
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_conversions() {
        let (lx, ly) = phi_theta_to_longitudinal(PI / 3.0, 0.5);
        let (phi, theta) = longitudinal_to_phi_theta(lx, ly);

        assert_relative_eq!(phi, PI / 3.0, epsilon = 1e-12);
        assert_relative_eq!(theta, 0.5, epsilon = 1e-12);

        // phi = 0 bends towards -x
        let (lx, ly) = phi_theta_to_longitudinal(0.0, 0.2);
        assert_relative_eq!(lx, -0.2);
        assert_relative_eq!(ly, 0.0);

        assert_eq!(longitudinal_to_phi_theta(0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let (lx, ly) = (0.3, -0.2);
        let jac = phi_theta_jacobian(lx, ly);
        let h = 1e-7;

        let (p0, t0) = longitudinal_to_phi_theta(lx, ly);
        let (px, tx) = longitudinal_to_phi_theta(lx + h, ly);
        let (py, ty) = longitudinal_to_phi_theta(lx, ly + h);

        assert_relative_eq!(jac[0][0], (px - p0) / h, epsilon = 1e-5);
        assert_relative_eq!(jac[0][1], (py - p0) / h, epsilon = 1e-5);
        assert_relative_eq!(jac[1][0], (tx - t0) / h, epsilon = 1e-5);
        assert_relative_eq!(jac[1][1], (ty - t0) / h, epsilon = 1e-5);
    }

    #[test]
    fn test_jacobian_is_finite_when_straight() {
        let jac = phi_theta_jacobian(0.0, 0.0);
        assert!(jac.iter().flatten().all(|v| v.is_finite()));
    }
}
