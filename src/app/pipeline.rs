//! Shared calibration pipeline used by the CLI and by library callers.
//!
//! Calibrate -> hand the result to a visualizer -> summarize. No computation
//! of its own beyond sequencing.

use tracing::info;

use crate::domain::{AnalysisSummary, CalibrationResult, RunConfig};
use crate::error::AppError;
use crate::fit::calibrate_with;
use crate::math::BoundedLevenbergMarquardt;
use crate::plot::Visualizer;

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub result: CalibrationResult,
    pub summary: AnalysisSummary,
}

/// Run calibration for `config`, render through `visualizer` and return the outputs.
pub fn run_analysis(config: &RunConfig, visualizer: &dyn Visualizer) -> Result<AnalysisOutput, AppError> {
    let result = calibrate_with(
        &BoundedLevenbergMarquardt,
        &config.mesh,
        &config.specimens,
        &config.initial_g,
        &config.bounds(),
        &config.optimization_options,
        config.denominator_epsilon,
        config.z_lim,
    )?;

    visualizer.render(&result, &config.plotting_options)?;

    let summary = AnalysisSummary::from_result(&result);
    info!(
        params = %summary.final_parameters,
        total_abs_difference = summary.total_abs_difference,
        total_percentage_error = summary.total_percentage_error,
        converged = summary.converged,
        "analysis finished"
    );
    Ok(AnalysisOutput { result, summary })
}

/// Like [`run_analysis`] but returns only the summary.
pub fn run_analysis_summary(config: &RunConfig, visualizer: &dyn Visualizer) -> Result<AnalysisSummary, AppError> {
    run_analysis(config, visualizer).map(|out| out.summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CalibrationResult, MeshSpec, OptimizerConfig, PlotOptions, Specimen, ZLimits};
    use std::cell::Cell;

    struct CountingVisualizer {
        calls: Cell<usize>,
    }

    impl Visualizer for CountingVisualizer {
        fn render(&self, result: &CalibrationResult, options: &PlotOptions) -> Result<(), AppError> {
            assert_eq!(result.points.len(), 2);
            assert_eq!(options.width, 40);
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    struct FailingVisualizer;

    impl Visualizer for FailingVisualizer {
        fn render(&self, _: &CalibrationResult, _: &PlotOptions) -> Result<(), AppError> {
            Err(AppError::io("display unavailable"))
        }
    }

    fn config() -> RunConfig {
        let g = vec![0.0, 0.0, 0.0, 0.5, 0.5, 0.5];
        RunConfig {
            specimens: [
                ("T", Specimen::new(0.5, 0.33, 0.0)),
                ("S", Specimen::new(0.9, 0.5, 0.0)),
            ]
            .into_iter()
            .collect(),
            initial_g: g.clone(),
            lower_bounds: g.clone(),
            upper_bounds: g,
            optimization_options: OptimizerConfig::default(),
            denominator_epsilon: 1e-6,
            z_lim: ZLimits::new(0.0, 2.0),
            mesh: MeshSpec {
                surface_samples: 11,
                plane_stress_samples: 11,
                ..MeshSpec::default()
            },
            plotting_options: PlotOptions {
                width: 40,
                ..PlotOptions::default()
            },
        }
    }

    #[test]
    fn summary_mirrors_result() {
        let vis = CountingVisualizer { calls: Cell::new(0) };
        let out = run_analysis(&config(), &vis).unwrap();
        assert_eq!(vis.calls.get(), 1);
        assert_eq!(out.summary.final_parameters, out.result.parameters);
        assert_eq!(out.summary.residuals, out.result.points.residuals);
        assert_eq!(out.summary.percentage_errors, out.result.errors.percentage_errors);
        assert_eq!(out.summary.total_abs_difference, out.result.errors.total_abs_difference);
        assert!(out.summary.converged);
    }

    #[test]
    fn visualizer_errors_propagate() {
        let err = run_analysis_summary(&config(), &FailingVisualizer).unwrap_err();
        assert_eq!(err.message(), "display unavailable");
    }
}
