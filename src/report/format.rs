//! Formatted terminal output for a calibration run.
//!
//! Formatting lives here so the solver and locus code stay free of
//! presentation concerns and output changes stay localized.

use crate::domain::{CalibrationPoints, CalibrationResult, ErrorMetrics, RunConfig};

/// Format the run summary (inputs, solver diagnostics, fitted parameters, error totals).
pub fn format_run_summary(result: &CalibrationResult, config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== khps2 - KHPS2 Fracture Locus Calibration ===\n");
    out.push_str(&format!("Specimens: n={}\n", config.specimens.len()));
    out.push_str(&format!(
        "Denominator epsilon: {:e} | z limits: [{}, {}]\n",
        config.denominator_epsilon, config.z_lim.min, config.z_lim.max
    ));
    out.push_str(&format!("Initial G: {}\n", fmt_vec(&config.initial_g)));
    out.push_str(&format!("Lower    : {}\n", fmt_vec(&config.lower_bounds)));
    out.push_str(&format!("Upper    : {}\n", fmt_vec(&config.upper_bounds)));

    let status = &result.status;
    out.push_str("\nSolver:\n");
    out.push_str(&format!(
        "- {} ({})\n",
        if status.converged { "converged" } else { "NOT converged" },
        status.termination.describe()
    ));
    out.push_str(&format!(
        "- iterations={} evaluations={} cost={:.6e}\n",
        status.iterations, status.evaluations, status.cost
    ));

    out.push_str("\nFitted parameters:\n");
    for (i, g) in result.parameters.as_slice().iter().enumerate() {
        out.push_str(&format!("- G{} = {g:.6}\n", i + 1));
    }

    out.push_str("\nErrors:\n");
    out.push_str(&format!("- total |residual| : {:.6}\n", result.errors.total_abs_difference));
    out.push_str(&format!("- total % error    : {:.3}\n", result.errors.total_percentage_error));
    out.push('\n');

    out
}

/// Format the per-specimen table (stress state, measured vs predicted, errors).
pub fn format_specimen_table(points: &CalibrationPoints, errors: &ErrorMetrics) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<20} {:>8} {:>8} {:>10} {:>10} {:>10} {:>8}\n",
            "specimen", "eta", "xi", "measured", "predicted", "residual", "error%"
        )
        .trim_end(),
    );
    out.push('\n');

    out.push_str(
        format!(
            "{:-<20} {:-<8} {:-<8} {:-<10} {:-<10} {:-<10} {:-<8}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for i in 0..points.len() {
        let pct = errors.percentage_errors.get(i).copied().unwrap_or(0.0);
        out.push_str(
            format!(
                "{:<20} {:>8.4} {:>8.4} {:>10} {:>10} {:>10} {:>8.2}\n",
                truncate(&points.names[i], 20),
                points.triaxiality[i],
                points.invariant[i],
                fmt_strain(points.measured_strain[i]),
                fmt_strain(points.predicted_strain[i]),
                fmt_strain(points.residuals[i]),
                pct,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_strain(v: f64) -> String {
    if v.is_finite() { format!("{v:.5}") } else { "-".to_string() }
}

pub(crate) fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
