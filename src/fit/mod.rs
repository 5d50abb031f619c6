//! Calibration orchestration.
//!
//! Responsibilities:
//!
//! - build the residual function over a specimen set
//! - run a bounded least-squares solver through [`LeastSquaresSolver`]
//! - evaluate and mask the fitted locus surface and plane-stress curve

pub mod calibrator;
pub mod residual;
pub mod solver;

pub use calibrator::*;
pub use residual::*;
pub use solver::*;
