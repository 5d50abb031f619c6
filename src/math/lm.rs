//! Box-constrained Levenberg-Marquardt solver.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr
//! ```
//!
//! over the free parameters and projects the trial point back onto the box.
//! Parameters whose lower and upper bounds coincide are frozen and never
//! perturbed. The Jacobian is a forward difference that flips to a backward
//! difference at the upper bound, so the objective is never evaluated outside
//! the box.
//!
//! Stopping rules:
//! - `gtol`: infinity norm of the projected gradient
//! - `ftol`: relative cost reduction of an accepted step
//! - `xtol`: step norm relative to the free-parameter norm
//! - `max_nfev`: objective evaluation budget, finite-difference evaluations
//!   included (the only non-converged exit)

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, trace};

use crate::domain::{OptimizerConfig, Termination};
use crate::error::AppError;
use crate::fit::{LeastSquaresSolver, SolverOutcome};

const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const MIN_LAMBDA: f64 = 1e-12;
const MAX_LAMBDA: f64 = 1e12;
/// Floor for diagonal scaling so a flat direction still receives damping.
const DIAG_FLOOR: f64 = 1e-12;

/// Projected Levenberg-Marquardt with finite-difference Jacobians.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedLevenbergMarquardt;

impl LeastSquaresSolver for BoundedLevenbergMarquardt {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> Vec<f64>,
        initial: &[f64],
        lower: &[f64],
        upper: &[f64],
        config: &OptimizerConfig,
    ) -> Result<SolverOutcome, AppError> {
        let n = initial.len();
        if n == 0 {
            return Err(AppError::invalid_input("Empty parameter vector."));
        }
        if lower.len() != n || upper.len() != n {
            return Err(AppError::invalid_input(format!(
                "Bounds length mismatch: params={n}, lower={}, upper={}.",
                lower.len(),
                upper.len()
            )));
        }
        if lower.iter().zip(upper).any(|(lo, hi)| !(lo <= hi)) {
            return Err(AppError::invalid_input("Each lower bound must not exceed its upper bound."));
        }

        let mut problem = Problem {
            objective,
            lower,
            upper,
            penalty: config.nan_penalty,
            evaluations: 0,
        };

        let mut x = clip(initial, lower, upper);
        let free: Vec<usize> = (0..n).filter(|&i| lower[i] < upper[i]).collect();
        let budget = config.evaluation_budget(free.len());

        let mut r = problem.residuals(&x);
        if r.is_empty() {
            return Err(AppError::numerical("Objective returned an empty residual vector."));
        }
        let mut cost = half_sum_of_squares(&r);

        if free.is_empty() {
            return Ok(problem.finish(x, cost, Termination::AllParametersFixed, 0, config));
        }

        let mut lambda = config.initial_damping.max(MIN_LAMBDA);
        let mut iterations = 0usize;

        loop {
            // A Jacobian plus at least one trial step must fit in the budget.
            if problem.evaluations + free.len() + 1 > budget {
                return Ok(problem.finish(x, cost, Termination::EvaluationLimit, iterations, config));
            }
            iterations += 1;

            let jac = problem.jacobian(&x, &r, &free);
            let rv = DVector::from_column_slice(&r);
            let jtj = jac.transpose() * &jac;
            let grad = jac.transpose() * &rv;

            if projected_gradient_norm(&x, &grad, &free, lower, upper) <= config.gtol {
                return Ok(problem.finish(x, cost, Termination::GradientTolerance, iterations, config));
            }

            // Inner loop: raise damping until a step lowers the cost.
            loop {
                if problem.evaluations >= budget {
                    return Ok(problem.finish(x, cost, Termination::EvaluationLimit, iterations, config));
                }

                let Some(delta) = damped_step(&jtj, &grad, lambda) else {
                    if lambda >= MAX_LAMBDA {
                        return Ok(problem.finish(x, cost, Termination::StepTolerance, iterations, config));
                    }
                    lambda = (lambda * LAMBDA_UP).min(MAX_LAMBDA);
                    continue;
                };

                let mut trial = x.clone();
                for (k, &i) in free.iter().enumerate() {
                    trial[i] = (x[i] + delta[k]).clamp(lower[i], upper[i]);
                }
                let step_norm = free.iter().map(|&i| (trial[i] - x[i]).powi(2)).sum::<f64>().sqrt();
                let x_norm = free.iter().map(|&i| x[i] * x[i]).sum::<f64>().sqrt();
                let step_small = step_norm <= config.xtol * (config.xtol + x_norm);

                if step_norm == 0.0 {
                    return Ok(problem.finish(x, cost, Termination::StepTolerance, iterations, config));
                }

                let trial_r = problem.residuals(&trial);
                let trial_cost = half_sum_of_squares(&trial_r);

                if config.verbose >= 2 {
                    debug!(iterations, lambda, cost, trial_cost, step_norm, "lm iteration");
                } else {
                    trace!(iterations, lambda, cost, trial_cost, step_norm, "lm iteration");
                }

                if trial_cost < cost {
                    let reduction = cost - trial_cost;
                    let previous = cost;
                    x = trial;
                    r = trial_r;
                    cost = trial_cost;
                    lambda = (lambda * LAMBDA_DOWN).max(MIN_LAMBDA);

                    if reduction <= config.ftol * previous {
                        return Ok(problem.finish(x, cost, Termination::CostTolerance, iterations, config));
                    }
                    if step_small {
                        return Ok(problem.finish(x, cost, Termination::StepTolerance, iterations, config));
                    }
                    break;
                }

                if step_small || lambda >= MAX_LAMBDA {
                    return Ok(problem.finish(x, cost, Termination::StepTolerance, iterations, config));
                }
                lambda = (lambda * LAMBDA_UP).min(MAX_LAMBDA);
            }
        }
    }
}

/// Objective wrapper that counts evaluations and replaces non-finite residuals.
struct Problem<'a> {
    objective: &'a dyn Fn(&[f64]) -> Vec<f64>,
    lower: &'a [f64],
    upper: &'a [f64],
    penalty: f64,
    evaluations: usize,
}

impl Problem<'_> {
    fn residuals(&mut self, x: &[f64]) -> Vec<f64> {
        self.evaluations += 1;
        let mut r = (self.objective)(x);
        for v in r.iter_mut() {
            if !v.is_finite() {
                *v = self.penalty;
            }
        }
        r
    }

    /// Finite-difference Jacobian over the free parameters (`m × free.len()`).
    fn jacobian(&mut self, x: &[f64], r0: &[f64], free: &[usize]) -> DMatrix<f64> {
        let m = r0.len();
        let mut jac = DMatrix::<f64>::zeros(m, free.len());
        let base_step = f64::EPSILON.sqrt();

        for (k, &i) in free.iter().enumerate() {
            let h = finite_difference_step(x[i], base_step, self.lower[i], self.upper[i]);
            let mut shifted = x.to_vec();
            shifted[i] += h;
            let r = self.residuals(&shifted);
            for row in 0..m.min(r.len()) {
                jac[(row, k)] = (r[row] - r0[row]) / h;
            }
        }
        jac
    }

    fn finish(
        &self,
        x: Vec<f64>,
        cost: f64,
        termination: Termination,
        iterations: usize,
        config: &OptimizerConfig,
    ) -> SolverOutcome {
        let converged = termination != Termination::EvaluationLimit;
        if config.verbose >= 1 {
            info!(
                iterations,
                evaluations = self.evaluations,
                cost,
                converged,
                "lm finished: {}",
                termination.describe()
            );
        } else {
            debug!(iterations, evaluations = self.evaluations, cost, converged, "lm finished");
        }
        SolverOutcome {
            x,
            cost,
            converged,
            termination,
            iterations,
            evaluations: self.evaluations,
        }
    }
}

/// Step for a forward difference that stays inside `[lower, upper]`.
fn finite_difference_step(x: f64, base: f64, lower: f64, upper: f64) -> f64 {
    let h = base * x.abs().max(1.0);
    let room_up = upper - x;
    let room_down = x - lower;
    if room_up >= h {
        h
    } else if room_down >= h {
        -h
    } else if room_up >= room_down {
        room_up
    } else {
        -room_down
    }
}

fn damped_step(jtj: &DMatrix<f64>, grad: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut a = jtj.clone();
    for i in 0..a.nrows() {
        a[(i, i)] += lambda * jtj[(i, i)].max(DIAG_FLOOR);
    }
    let delta = a.cholesky()?.solve(&(-grad));
    if delta.iter().all(|v| v.is_finite()) {
        Some(delta)
    } else {
        None
    }
}

/// Infinity norm of the gradient with components pointing out of the box removed.
fn projected_gradient_norm(x: &[f64], grad: &DVector<f64>, free: &[usize], lower: &[f64], upper: &[f64]) -> f64 {
    free.iter()
        .enumerate()
        .map(|(k, &i)| {
            let g = grad[k];
            // A descent step moves along -g.
            let blocked = (x[i] <= lower[i] && g > 0.0) || (x[i] >= upper[i] && g < 0.0);
            if blocked { 0.0 } else { g.abs() }
        })
        .fold(0.0, f64::max)
}

fn clip(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect()
}

#[inline]
fn half_sum_of_squares(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::RefCell;

    fn solve(
        objective: &dyn Fn(&[f64]) -> Vec<f64>,
        x0: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> SolverOutcome {
        BoundedLevenbergMarquardt
            .minimize(objective, x0, lower, upper, &OptimizerConfig::default())
            .unwrap()
    }

    #[test]
    fn solves_unconstrained_quadratic() {
        let f = |p: &[f64]| vec![p[0] - 2.0, p[1] + 3.0];
        let out = solve(&f, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0]);
        assert!(out.converged);
        assert_relative_eq!(out.x[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(out.x[1], -3.0, epsilon = 1e-6);
    }

    #[test]
    fn active_bound_stops_at_the_box() {
        // Minimum at 5 but upper bound is 1.
        let f = |p: &[f64]| vec![p[0] - 5.0];
        let out = solve(&f, &[0.0], &[-1.0], &[1.0]);
        assert!(out.converged);
        assert_relative_eq!(out.x[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn exponential_fit() {
        let xs = [0.0, 0.5, 1.0, 1.5, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|&x: &f64| 2.0 * (-0.7 * x).exp()).collect();
        let f = |p: &[f64]| -> Vec<f64> {
            xs.iter().zip(&ys).map(|(&x, &y)| p[0] * (-p[1] * x).exp() - y).collect()
        };
        let out = solve(&f, &[1.0, 0.1], &[0.0, 0.0], &[10.0, 10.0]);
        assert!(out.converged);
        assert_relative_eq!(out.x[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(out.x[1], 0.7, epsilon = 1e-5);
    }

    #[test]
    fn frozen_parameters_never_move() {
        let f = |p: &[f64]| vec![p[0] - 2.0, p[1] - 7.0];
        let out = solve(&f, &[0.0, 3.0], &[-5.0, 3.0], &[5.0, 3.0]);
        assert_eq!(out.x[1], 3.0);
        assert_relative_eq!(out.x[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn all_fixed_returns_initial_point_after_one_evaluation() {
        let f = |p: &[f64]| vec![p[0] - 1.0];
        let out = solve(&f, &[0.5], &[0.5], &[0.5]);
        assert_eq!(out.termination, Termination::AllParametersFixed);
        assert!(out.converged);
        assert_eq!(out.x, vec![0.5]);
        assert_eq!(out.evaluations, 1);
        assert_relative_eq!(out.cost, 0.125);
    }

    #[test]
    fn never_evaluates_outside_the_box() {
        let seen = RefCell::new(Vec::new());
        let f = |p: &[f64]| {
            seen.borrow_mut().push(p.to_vec());
            vec![p[0] - 3.0, 10.0 * (p[1] - p[0] * p[0])]
        };
        let lower = [0.0, 0.0];
        let upper = [1.0, 0.5];
        let _ = solve(&f, &[1.0, 0.5], &lower, &upper);
        for p in seen.borrow().iter() {
            assert!(p[0] >= 0.0 && p[0] <= 1.0, "{p:?}");
            assert!(p[1] >= 0.0 && p[1] <= 0.5, "{p:?}");
        }
    }

    #[test]
    fn evaluation_budget_reports_non_convergence() {
        let f = |p: &[f64]| vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]];
        let config = OptimizerConfig {
            max_nfev: Some(4),
            ..OptimizerConfig::default()
        };
        let out = BoundedLevenbergMarquardt
            .minimize(&f, &[-1.2, 1.0], &[-5.0, -5.0], &[5.0, 5.0], &config)
            .unwrap();
        assert!(!out.converged);
        assert_eq!(out.termination, Termination::EvaluationLimit);
        assert!(out.x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn evaluations_never_exceed_max_nfev() {
        let f = |p: &[f64]| -> Vec<f64> {
            (0..8)
                .map(|k| {
                    let t = k as f64 * 0.25;
                    p[0] + p[1] * t + p[2] * t * t + p[3] * (p[4] * t).sin() + p[5] * t.exp() - 1.0
                })
                .collect()
        };
        let lower = [-5.0; 6];
        let upper = [5.0; 6];
        for max_nfev in [1, 3, 7, 8, 9, 20, 50] {
            let config = OptimizerConfig {
                max_nfev: Some(max_nfev),
                ..OptimizerConfig::default()
            };
            let out = BoundedLevenbergMarquardt
                .minimize(&f, &[0.5, 0.5, 0.5, 0.5, 0.5, 0.5], &lower, &upper, &config)
                .unwrap();
            assert!(out.evaluations <= max_nfev.max(1), "max_nfev={max_nfev}: {out:?}");
        }

        let config = OptimizerConfig {
            max_nfev: Some(3),
            ..OptimizerConfig::default()
        };
        let out = BoundedLevenbergMarquardt
            .minimize(&f, &[0.5; 6], &lower, &upper, &config)
            .unwrap();
        assert_eq!(out.termination, Termination::EvaluationLimit);
        assert_eq!(out.evaluations, 1);
        assert!(!out.converged);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn iteration_log_lines(verbose: u8) -> Vec<String> {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let config = OptimizerConfig {
            verbose,
            ..OptimizerConfig::default()
        };
        tracing::subscriber::with_default(subscriber, || {
            let f = |p: &[f64]| vec![p[0] - 2.0, p[1] + 3.0];
            BoundedLevenbergMarquardt
                .minimize(&f, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0], &config)
                .unwrap();
        });
        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        text.lines().filter(|l| l.contains("lm iteration")).map(str::to_string).collect()
    }

    #[test]
    fn per_iteration_logs_are_debug_at_verbose_two() {
        let lines = iteration_log_lines(2);
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| l.contains("DEBUG") && !l.contains("INFO")), "{lines:?}");

        assert!(iteration_log_lines(0).is_empty());
    }

    #[test]
    fn nan_residuals_are_penalised_not_propagated() {
        let f = |p: &[f64]| if p[0] < 0.0 { vec![f64::NAN] } else { vec![p[0] - 0.5] };
        let out = solve(&f, &[1.0], &[-1.0], &[2.0]);
        assert!(out.cost.is_finite());
        assert_relative_eq!(out.x[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let f = |p: &[f64]| vec![p[0]];
        let err = BoundedLevenbergMarquardt
            .minimize(&f, &[0.0], &[1.0], &[0.0], &OptimizerConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn backward_difference_at_upper_bound() {
        assert!(finite_difference_step(1.0, 1e-8, 0.0, 1.0) < 0.0);
        assert!(finite_difference_step(0.0, 1e-8, 0.0, 1.0) > 0.0);
        let h = finite_difference_step(0.5, 1e-8, 0.5, 0.5 + 1e-10);
        assert!(h > 0.0 && h < 1e-9);
    }
}
