//! Calibration objective: measured minus predicted fracture strain per specimen.

use crate::domain::{MaterialParameters, SpecimenSet};
use crate::models::evaluate;

/// Residual function over a fixed specimen set.
///
/// The specimen columns are extracted once; each call only runs the locus
/// evaluator for the candidate parameters. Residuals follow specimen order and
/// are NaN where the locus denominator is singular.
#[derive(Debug, Clone)]
pub struct ResidualFunction {
    measured: Vec<f64>,
    triaxiality: Vec<f64>,
    invariant: Vec<f64>,
    epsilon: f64,
}

impl ResidualFunction {
    pub fn new(specimens: &SpecimenSet, epsilon: f64) -> Self {
        Self {
            measured: specimens.fracture_strains(),
            triaxiality: specimens.triaxialities(),
            invariant: specimens.invariants(),
            epsilon,
        }
    }

    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }

    pub fn evaluate(&self, params: &MaterialParameters) -> Vec<f64> {
        let predicted = evaluate(params, &self.triaxiality, &self.invariant, self.epsilon).fracture_strain;
        self.measured
            .iter()
            .zip(predicted)
            .map(|(&measured, predicted)| measured - predicted)
            .collect()
    }
}

/// One-shot residual evaluation.
pub fn residuals(params: &MaterialParameters, specimens: &SpecimenSet, epsilon: f64) -> Vec<f64> {
    ResidualFunction::new(specimens, epsilon).evaluate(params)
}
