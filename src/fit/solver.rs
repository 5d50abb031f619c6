//! Seam between the calibrator and a bounded nonlinear least-squares solver.
//!
//! The calibrator only needs `minimize(objective, x0, lower, upper, config)`;
//! any solver honouring box constraints can be plugged in through
//! [`LeastSquaresSolver`]. The crate ships one implementation,
//! [`crate::math::BoundedLevenbergMarquardt`].

use crate::domain::{OptimizerConfig, SolverStatus, Termination};
use crate::error::AppError;

/// Result of a bounded least-squares solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// Best parameter vector found, always inside the bounds.
    pub x: Vec<f64>,
    /// `0.5 * Σ r²` at `x`.
    pub cost: f64,
    /// `false` only when the evaluation budget ran out before a tolerance was met.
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub evaluations: usize,
}

impl SolverOutcome {
    pub fn status(&self) -> SolverStatus {
        SolverStatus {
            converged: self.converged,
            termination: self.termination,
            iterations: self.iterations,
            evaluations: self.evaluations,
            cost: self.cost,
        }
    }
}

/// Minimize `0.5 * ||objective(x)||²` subject to `lower <= x <= upper`.
pub trait LeastSquaresSolver {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> Vec<f64>,
        initial: &[f64],
        lower: &[f64],
        upper: &[f64],
        config: &OptimizerConfig,
    ) -> Result<SolverOutcome, AppError>;
}
