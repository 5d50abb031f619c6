//! Mathematical utilities: sampling grids and the bounded least-squares solver.

pub mod grid;
pub mod lm;

pub use grid::*;
pub use lm::*;
