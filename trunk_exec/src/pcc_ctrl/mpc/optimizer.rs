//! # Box constrained quadratic programs
//!
//! The MPC law poses one problem per tick:
//!
//! `minimise ½ xᵀ H x + cᵀ x  subject to  lower <= x <= upper`
//!
//! and hands it to an [`Optimizer`]. The built-in optimizer is an accelerated projected gradient
//! method, which needs nothing but matrix-vector products and always returns a feasible point.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Solves box constrained quadratic programs.
pub trait Optimizer: Send {
    /// Solve the problem starting from `warm_start`.
    ///
    /// The warm start does not need to be feasible.
    fn solve(&mut self, qp: &BoxQp, warm_start: &DVector<f64>) -> Result<Solution, OptimizerError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A quadratic program with box constraints.
#[derive(Debug, Clone)]
pub struct BoxQp {
    /// Symmetric positive semi-definite cost matrix `H`
    pub hessian: DMatrix<f64>,

    /// Linear cost term `c`
    pub linear: DVector<f64>,

    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub x: DVector<f64>,
    pub iterations: usize,

    /// False if the iteration limit was reached first. The solution is still feasible.
    pub converged: bool,
}

/// Accelerated projected gradient (FISTA) optimizer.
#[derive(Debug, Clone)]
pub struct ProjectedGradient {
    max_iters: usize,

    /// Largest change of any element between iterations at which the solution is converged
    tolerance: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Problem dimensions are inconsistent: {0}")]
    DimensionMismatch(&'static str),

    #[error("The problem is infeasible, a lower bound is above its upper bound")]
    Infeasible,

    #[error("The problem or its solution contains non-finite values")]
    NonFinite,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BoxQp {
    /// Check the problem is well formed.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let n = self.linear.len();

        if self.hessian.nrows() != n || self.hessian.ncols() != n {
            return Err(OptimizerError::DimensionMismatch("hessian"));
        }
        if self.lower.len() != n || self.upper.len() != n {
            return Err(OptimizerError::DimensionMismatch("bounds"));
        }

        let finite = self.hessian.iter().all(|v| v.is_finite())
            && self.linear.iter().all(|v| v.is_finite());
        if !finite {
            return Err(OptimizerError::NonFinite);
        }

        if self.lower.iter().zip(self.upper.iter()).any(|(l, u)| !(l <= u)) {
            return Err(OptimizerError::Infeasible);
        }

        Ok(())
    }

    /// Project a point onto the box.
    pub fn project(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(v, (l, u))| util::maths::clamp(*v, *l, *u)),
        )
    }

    /// Value of the cost at `x`.
    pub fn cost(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) + self.linear.dot(x)
    }
}

impl ProjectedGradient {
    pub fn new(max_iters: usize, tolerance: f64) -> Self {
        Self {
            max_iters,
            tolerance,
        }
    }
}

impl Optimizer for ProjectedGradient {
    fn solve(&mut self, qp: &BoxQp, warm_start: &DVector<f64>) -> Result<Solution, OptimizerError> {
        qp.validate()?;
        if warm_start.len() != qp.linear.len() {
            return Err(OptimizerError::DimensionMismatch("warm start"));
        }

        // Gershgorin bound on the largest eigenvalue gives a safe step size
        let lipschitz = qp
            .hessian
            .row_iter()
            .map(|r| r.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max);

        let mut x = qp.project(warm_start);

        if lipschitz <= 0.0 {
            // Linear cost, the minimum is at a corner of the box
            let x = DVector::from_iterator(
                x.len(),
                qp.linear
                    .iter()
                    .zip(qp.lower.iter().zip(qp.upper.iter()))
                    .zip(x.iter())
                    .map(|((c, (l, u)), v)| match c {
                        c if *c > 0.0 => *l,
                        c if *c < 0.0 => *u,
                        _ => *v,
                    }),
            );
            return Ok(Solution {
                x,
                iterations: 0,
                converged: true,
            });
        }

        let mut y = x.clone();
        let mut t: f64 = 1.0;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iters {
            iterations += 1;

            let grad = &qp.hessian * &y + &qp.linear;
            let x_next = qp.project(&(&y - grad / lipschitz));

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            y = &x_next + (&x_next - &x) * ((t - 1.0) / t_next);

            let step = (&x_next - &x).amax();
            x = x_next;
            t = t_next;

            if step < self.tolerance {
                converged = true;
                break;
            }
        }

        if !x.iter().all(|v| v.is_finite()) {
            return Err(OptimizerError::NonFinite);
        }

        trace!(
            "QP solved in {} iterations (converged: {})",
            iterations,
            converged
        );

        Ok(Solution {
            x,
            iterations,
            converged,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
