//! Input/output helpers.
//!
//! - specimen CSV ingest + validation (`ingest`)
//! - JSON run config (`config`)
//! - per-specimen result export (`export`)
//! - locus JSON read/write (`locus`)

pub mod config;
pub mod export;
pub mod ingest;
pub mod locus;

pub use config::*;
pub use export::*;
pub use ingest::*;
pub use locus::*;
