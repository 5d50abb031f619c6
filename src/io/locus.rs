//! Read/write locus JSON files.
//!
//! A locus file is the portable record of a calibration:
//! - fitted parameters, solver status and error aggregates
//! - the epsilon, strain limits and mesh used for the run
//! - the plotting options, so a re-plot looks like the original run
//! - the plane-stress curve and per-specimen comparison
//!
//! The full surface is not stored; [`LocusFile::to_result`] re-evaluates it
//! from the stored parameters and mesh.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CalibrationPoints, CalibrationResult, ErrorMetrics, MaterialParameters, MeshSpec, PlaneStressCurve, PlotOptions,
    RunConfig, SolverStatus, ZLimits,
};
use crate::error::AppError;
use crate::fit::build_locus_surface;

pub const TOOL_NAME: &str = "khps2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocusFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub parameters: MaterialParameters,
    pub status: SolverStatus,
    pub errors: ErrorMetrics,
    pub z_lim: ZLimits,
    pub epsilon: f64,
    pub mesh: MeshSpec,
    /// Missing in files written before plot options were stored.
    #[serde(default)]
    pub plot: PlotOptions,
    pub plane_stress: PlaneStressCurve,
    pub points: CalibrationPoints,
}

impl LocusFile {
    pub fn from_result(result: &CalibrationResult, config: &RunConfig) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            generated_at: Utc::now(),
            parameters: result.parameters,
            status: result.status.clone(),
            errors: result.errors.clone(),
            z_lim: config.z_lim,
            epsilon: config.denominator_epsilon,
            mesh: config.mesh.clone(),
            plot: config.plotting_options.clone(),
            plane_stress: result.plane_stress.clone(),
            points: result.points.clone(),
        }
    }

    /// Rebuild a full result, re-evaluating the masked surface.
    pub fn to_result(&self) -> Result<CalibrationResult, AppError> {
        self.mesh.validate()?;
        let surface = build_locus_surface(&self.parameters, &self.mesh, self.epsilon, self.z_lim);
        Ok(CalibrationResult {
            parameters: self.parameters,
            status: self.status.clone(),
            surface,
            plane_stress: self.plane_stress.clone(),
            points: self.points.clone(),
            errors: self.errors.clone(),
        })
    }
}

/// Write a locus JSON file.
pub fn write_locus_json(path: &Path, locus: &LocusFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create locus JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, locus).map_err(|e| AppError::io(format!("Failed to write locus JSON: {e}")))?;
    Ok(())
}

/// Read a locus JSON file.
pub fn read_locus_json(path: &Path) -> Result<LocusFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open locus JSON '{}': {e}", path.display())))?;
    let locus: LocusFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::io(format!("Invalid locus JSON: {e}")))?;
    Ok(locus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bounds, OptimizerConfig, Specimen, SpecimenSet, Termination};

    fn run_config(params: &MaterialParameters, mesh: MeshSpec, z_lim: ZLimits, specimens: SpecimenSet) -> RunConfig {
        RunConfig {
            specimens,
            initial_g: params.as_slice().to_vec(),
            lower_bounds: params.as_slice().to_vec(),
            upper_bounds: params.as_slice().to_vec(),
            optimization_options: OptimizerConfig::default(),
            denominator_epsilon: 1e-6,
            z_lim,
            mesh,
            plotting_options: PlotOptions {
                plot_title: "Steel A".to_string(),
                x_lim: [-1.0, 2.0],
                marker_styles: vec!["T".to_string()],
                plot_constant_invariant_curves: false,
                ..PlotOptions::default()
            },
        }
    }
    use crate::fit::calibrate_with;
    use crate::math::BoundedLevenbergMarquardt;

    #[test]
    fn write_then_read_restores_result() {
        let g = [0.0, 0.0, 0.0, 0.5, 0.5, 0.5];
        let params = MaterialParameters::new(g);
        let mesh = MeshSpec {
            surface_samples: 15,
            plane_stress_samples: 15,
            ..MeshSpec::default()
        };
        let z_lim = ZLimits::new(0.0, 2.0);
        let specimens: SpecimenSet = [("T", Specimen::new(0.5, 0.33, 0.0))].into_iter().collect();
        let result = calibrate_with(
            &BoundedLevenbergMarquardt,
            &mesh,
            &specimens,
            &g,
            &Bounds::fixed(&params),
            &OptimizerConfig::default(),
            1e-6,
            z_lim,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locus.json");
        let config = run_config(&params, mesh.clone(), z_lim, specimens.clone());
        let file = LocusFile::from_result(&result, &config);
        write_locus_json(&path, &file).unwrap();

        let back = read_locus_json(&path).unwrap();
        assert_eq!(back.tool, TOOL_NAME);
        assert_eq!(back.parameters, params);
        assert_eq!(back.status.termination, Termination::AllParametersFixed);
        assert_eq!(back.points.names, vec!["T"]);
        assert_eq!(back.plot, config.plotting_options);
        assert_eq!(back.z_lim, z_lim);
        assert_eq!(back.epsilon, 1e-6);

        let rebuilt = back.to_result().unwrap();
        assert_eq!(rebuilt.surface.fracture_strain.shape(), (15, 15));
        let same_nan_pattern = rebuilt
            .surface
            .fracture_strain
            .iter()
            .zip(result.surface.fracture_strain.iter())
            .all(|(a, b)| a.is_nan() == b.is_nan());
        assert!(same_nan_pattern);
    }

    #[test]
    fn files_without_plot_options_use_defaults() {
        let params = MaterialParameters::new([0.0, 0.0, 0.0, 0.5, 0.5, 0.5]);
        let mesh = MeshSpec {
            surface_samples: 5,
            plane_stress_samples: 5,
            ..MeshSpec::default()
        };
        let specimens: SpecimenSet = [("T", Specimen::new(0.5, 0.33, 0.0))].into_iter().collect();
        let config = run_config(&params, mesh.clone(), ZLimits::new(0.0, 2.0), specimens.clone());
        let result = calibrate_with(
            &BoundedLevenbergMarquardt,
            &mesh,
            &specimens,
            params.as_slice(),
            &Bounds::fixed(&params),
            &OptimizerConfig::default(),
            1e-6,
            config.z_lim,
        )
        .unwrap();

        let mut json = serde_json::to_value(LocusFile::from_result(&result, &config)).unwrap();
        json.as_object_mut().unwrap().remove("plot");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        let back = read_locus_json(&path).unwrap();
        assert_eq!(back.plot, PlotOptions::default());
    }

    #[test]
    fn non_json_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(read_locus_json(&path).is_err());
    }
}
