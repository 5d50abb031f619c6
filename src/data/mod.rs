//! Data sources other than user files.
//!
//! - synthetic specimen sets drawn from a known KHPS2 parameter vector (`synthetic`)

pub mod synthetic;

pub use synthetic::*;
