//! Export per-specimen calibration results to CSV.
//!
//! Meant to be easy to consume in spreadsheets or downstream scripts.
//! Undefined values are written as empty fields.

use std::path::Path;

use crate::domain::{CalibrationPoints, ErrorMetrics};
use crate::error::AppError;

const HEADER: [&str; 7] = [
    "name",
    "stress_triaxiality",
    "normalized_third_invariant",
    "measured_strain",
    "predicted_strain",
    "residual",
    "percentage_error",
];

/// Write per-specimen results to a CSV file.
pub fn write_results_csv(path: &Path, points: &CalibrationPoints, errors: &ErrorMetrics) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writer
        .write_record(HEADER)
        .map_err(|e| AppError::io(format!("Failed to write export CSV header: {e}")))?;

    for i in 0..points.len() {
        writer
            .write_record([
                points.names[i].clone(),
                format!("{:.10}", points.triaxiality[i]),
                format!("{:.10}", points.invariant[i]),
                format!("{:.10}", points.measured_strain[i]),
                fmt_opt(points.predicted_strain[i]),
                fmt_opt(points.residuals[i]),
                format!("{:.6}", errors.percentage_errors.get(i).copied().unwrap_or(0.0)),
            ])
            .map_err(|e| AppError::io(format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush export CSV '{}': {e}", path.display())))?;
    Ok(())
}

fn fmt_opt(v: f64) -> String {
    if v.is_finite() { format!("{v:.10}") } else { String::new() }
}
