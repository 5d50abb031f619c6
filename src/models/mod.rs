//! KHPS2 locus model.
//!
//! The locus is implemented as small, pure functions so the residual function,
//! the calibrator and the renderers can all share one evaluator.

pub mod locus;

pub use locus::*;
