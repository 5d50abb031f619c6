//! `khps2-locus` library crate.
//!
//! Calibrates the six parameters of the KHPS2 ductile fracture locus against
//! specimen data and evaluates the fitted locus over stress space.
//!
//! The binary (`khps2`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the evaluator, calibrator and renderers are reusable on their own

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
