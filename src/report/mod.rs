//! Reporting utilities: calibration-point residuals, error aggregates and
//! formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{CalibrationPoints, ErrorMetrics, MaterialParameters, SpecimenSet};
use crate::models::evaluate;

/// Predicted strain and residual at every specimen's own stress state.
///
/// No masking is applied: a singular point keeps its NaN prediction and residual.
pub fn compute_calibration_points(
    specimens: &SpecimenSet,
    params: &MaterialParameters,
    epsilon: f64,
) -> CalibrationPoints {
    let triaxiality = specimens.triaxialities();
    let invariant = specimens.invariants();
    let measured_strain = specimens.fracture_strains();

    let predicted_strain = evaluate(params, &triaxiality, &invariant, epsilon).fracture_strain;
    let residuals = measured_strain
        .iter()
        .zip(&predicted_strain)
        .map(|(m, p)| m - p)
        .collect();

    CalibrationPoints {
        names: specimens.names(),
        triaxiality,
        invariant,
        measured_strain,
        predicted_strain,
        residuals,
    }
}

/// Absolute and percentage error aggregates.
///
/// - total absolute error sums `|residual|` over defined (non-NaN) residuals
/// - percentage error is `|residual / (measured + f64::EPSILON)| × 100`, with
///   any non-finite entry counted as 0 so the total stays finite
pub fn compute_error_metrics(points: &CalibrationPoints) -> ErrorMetrics {
    let total_abs_difference = points
        .residuals
        .iter()
        .filter(|r| !r.is_nan())
        .map(|r| r.abs())
        .sum();

    let percentage_errors: Vec<f64> = points
        .measured_strain
        .iter()
        .zip(&points.residuals)
        .map(|(&measured, &residual)| {
            let pct = (residual / (measured + f64::EPSILON)).abs() * 100.0;
            if pct.is_finite() { pct } else { 0.0 }
        })
        .collect();

    let total_percentage_error = percentage_errors.iter().sum();

    ErrorMetrics {
        total_abs_difference,
        percentage_errors,
        total_percentage_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Specimen;
    use approx::assert_relative_eq;

    fn points(measured: Vec<f64>, residuals: Vec<f64>) -> CalibrationPoints {
        let n = measured.len();
        CalibrationPoints {
            names: (0..n).map(|i| format!("S{i}")).collect(),
            triaxiality: vec![0.0; n],
            invariant: vec![0.0; n],
            predicted_strain: measured.iter().zip(&residuals).map(|(m, r)| m - r).collect(),
            measured_strain: measured,
            residuals,
        }
    }

    #[test]
    fn error_metrics_basic() {
        let m = compute_error_metrics(&points(vec![0.5, 1.0], vec![0.05, -0.2]));
        assert_relative_eq!(m.total_abs_difference, 0.25, epsilon = 1e-12);
        assert_relative_eq!(m.percentage_errors[0], 10.0, epsilon = 1e-9);
        assert_relative_eq!(m.percentage_errors[1], 20.0, epsilon = 1e-9);
        assert_relative_eq!(m.total_percentage_error, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn undefined_residuals_do_not_leak() {
        let m = compute_error_metrics(&points(vec![0.5, 0.0, 0.8], vec![f64::NAN, 0.0, 0.1]));
        assert_relative_eq!(m.total_abs_difference, 0.1, epsilon = 1e-12);
        assert_eq!(m.percentage_errors[0], 0.0);
        // 0 / (0 + eps) is a clean zero.
        assert_eq!(m.percentage_errors[1], 0.0);
        assert!(m.total_percentage_error.is_finite());
        assert!(m.total_percentage_error >= 0.0);
    }

    #[test]
    fn zero_measured_strain_uses_machine_epsilon() {
        let m = compute_error_metrics(&points(vec![0.0], vec![1e-20]));
        assert_relative_eq!(m.percentage_errors[0], 1e-20 / f64::EPSILON * 100.0, max_relative = 1e-12);
    }

    #[test]
    fn calibration_points_keep_specimen_order() {
        let g = MaterialParameters::new([0.0, 0.0, 0.0, 0.5, 0.5, 0.5]);
        let specimens: SpecimenSet = [
            ("second", Specimen::new(0.9, 0.5, 0.0)),
            ("first", Specimen::new(0.5, 0.33, 0.0)),
        ]
        .into_iter()
        .collect();
        let pts = compute_calibration_points(&specimens, &g, 1e-6);
        assert_eq!(pts.names, vec!["second", "first"]);
        assert_relative_eq!(pts.predicted_strain[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(pts.residuals[0], -0.1, epsilon = 1e-12);
        assert_eq!(pts.residuals[1], 0.5 - 0.5 / 0.33);
    }
}
