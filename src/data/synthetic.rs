//! Synthetic specimen generation from a known parameter vector.
//!
//! Stress states are drawn uniformly, kept only where the locus is defined
//! (in front of the cut-off plane, strain in `(0, max_strain]`), and the
//! strain is perturbed with multiplicative log-normal noise.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::debug;

use crate::domain::{DEFAULT_DENOMINATOR_EPSILON, MaterialParameters, Specimen, SpecimenSet};
use crate::error::AppError;
use crate::models::evaluate_point;

/// Rejected draws allowed per requested specimen.
const MAX_DRAWS_PER_SPECIMEN: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub count: usize,
    /// Standard deviation of the log-normal strain noise (0 = exact).
    pub noise: f64,
    pub seed: u64,
    pub triaxiality_range: [f64; 2],
    pub max_strain: f64,
    pub epsilon: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            count: 12,
            noise: 0.05,
            seed: 42,
            triaxiality_range: [-0.5, 1.5],
            max_strain: 2.0,
            epsilon: DEFAULT_DENOMINATOR_EPSILON,
        }
    }
}

pub fn generate_specimens(params: &MaterialParameters, config: &SynthConfig) -> Result<SpecimenSet, AppError> {
    if config.count == 0 {
        return Err(AppError::invalid_input("Specimen count must be > 0."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::invalid_input("Noise level must be finite and >= 0."));
    }
    let [tri_lo, tri_hi] = config.triaxiality_range;
    if !(tri_lo.is_finite() && tri_hi.is_finite() && tri_hi > tri_lo) {
        return Err(AppError::invalid_input("Invalid triaxiality range for specimen generation."));
    }
    if !(config.max_strain.is_finite() && config.max_strain > 0.0) {
        return Err(AppError::invalid_input("Maximum strain must be finite and > 0."));
    }
    if !(config.epsilon.is_finite() && config.epsilon > 0.0) {
        return Err(AppError::invalid_input("Denominator epsilon must be finite and > 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal =
        Normal::new(0.0, config.noise).map_err(|e| AppError::numerical(format!("Noise distribution error: {e}")))?;

    let max_draws = config.count * MAX_DRAWS_PER_SPECIMEN;
    let mut specimens = SpecimenSet::new();
    let mut draws = 0usize;

    while specimens.len() < config.count {
        if draws >= max_draws {
            return Err(AppError::numerical(format!(
                "Only {} of {} specimens fall inside the defined locus region after {draws} draws.",
                specimens.len(),
                config.count
            )));
        }
        draws += 1;

        let tri = rng.gen_range(tri_lo..tri_hi);
        let xi = rng.gen_range(-1.0..=1.0);
        let (cut_off, ef) = evaluate_point(params, tri, xi, config.epsilon);
        if !(tri > cut_off && ef.is_finite() && ef > 0.0 && ef <= config.max_strain) {
            continue;
        }

        let z: f64 = normal.sample(&mut rng);
        let strain = ef * z.exp();
        let name = format!("S-{:03}", specimens.len() + 1);
        specimens.insert(name, Specimen::new(strain, tri, xi));
    }

    debug!(count = config.count, draws, "generated synthetic specimens");
    Ok(specimens)
}

/// Write specimens as a CSV readable by `io::load_specimens_csv`.
pub fn specimens_to_csv<W: std::io::Write>(specimens: &SpecimenSet, out: W) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    let write_err = |e: csv::Error| AppError::io(format!("Failed to write specimen CSV: {e}"));

    writer
        .write_record(["name", "fracture_strain", "stress_triaxiality", "normalized_third_invariant"])
        .map_err(write_err)?;
    for (name, s) in specimens.iter() {
        writer
            .write_record([
                name.to_string(),
                format!("{:.10}", s.fracture_strain),
                format!("{:.10}", s.stress_triaxiality),
                format!("{:.10}", s.normalized_third_invariant),
            ])
            .map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush specimen CSV: {e}")))?;
    Ok(())
}
