//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - calibration inputs (`MaterialParameters`, `Specimen`, `SpecimenSet`, `Bounds`)
//! - run configuration (`OptimizerConfig`, `MeshSpec`, `PlotOptions`, `RunConfig`)
//! - calibration outputs (`LocusField`, `PlaneStressCurve`, `CalibrationResult`, etc.)

pub mod types;

pub use types::*;
