//! Rendering of a calibration result.
//!
//! The pipeline hands its [`CalibrationResult`] to a [`Visualizer`]; the
//! terminal renderer lives in [`ascii`].

pub mod ascii;

pub use crate::domain::PlotOptions;

use crate::domain::CalibrationResult;
use crate::error::AppError;

/// Consumes a calibration result and a rendering configuration.
pub trait Visualizer {
    fn render(&self, result: &CalibrationResult, options: &PlotOptions) -> Result<(), AppError>;
}

/// Prints the locus map and the strain profiles to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiVisualizer;

impl Visualizer for AsciiVisualizer {
    fn render(&self, result: &CalibrationResult, options: &PlotOptions) -> Result<(), AppError> {
        println!("{}", ascii::render_locus_map(result, options));
        println!("{}", ascii::render_profiles(result, options));
        Ok(())
    }
}

/// Renders nothing (`--no-plot`, batch runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {
    fn render(&self, _result: &CalibrationResult, _options: &PlotOptions) -> Result<(), AppError> {
        Ok(())
    }
}
