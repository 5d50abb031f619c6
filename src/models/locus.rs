//! KHPS2 fracture locus evaluation.
//!
//! For parameters `G1..G6`, triaxiality `η` and normalized third invariant `ξ`:
//!
//! ```text
//! η_c = -(G3 + (G1 - G3)/2 - G2) ξ² - ((G1 - G3)/2) ξ - G2
//! d   = η - η_c
//! ε_f = (½(G4/d + G5/d) - G6/d) ξ² + ½(G4/d - G5/d) ξ + G6/d
//! ```
//!
//! `η_c` is the cut-off plane. Whenever `|d| < epsilon` the denominator is
//! treated as undefined, so `ε_f` becomes NaN instead of an infinity or a huge
//! finite value. Evaluation never fails for numeric input; undefined points
//! are NaN and downstream code masks or skips them.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::domain::MaterialParameters;

/// Inputs at least this long are evaluated on the rayon pool.
const PARALLEL_MIN_LEN: usize = 4096;

/// Locus values for a set of stress states.
#[derive(Debug, Clone, PartialEq)]
pub struct LocusEvaluation {
    pub cut_off_triaxiality: Vec<f64>,
    pub fracture_strain: Vec<f64>,
}

/// Cut-off triaxiality `η_c(ξ)`.
pub fn cut_off_triaxiality(params: &MaterialParameters, invariant: f64) -> f64 {
    let [g1, g2, g3, ..] = params.0;
    -(g3 + (g1 - g3) / 2.0 - g2) * (invariant * invariant) - ((g1 - g3) / 2.0) * invariant - g2
}

/// Evaluate one stress state. Returns `(cut_off_triaxiality, fracture_strain)`.
pub fn evaluate_point(params: &MaterialParameters, triaxiality: f64, invariant: f64, epsilon: f64) -> (f64, f64) {
    let [_, _, _, g4, g5, g6] = params.0;
    let tri_c = cut_off_triaxiality(params, invariant);

    let raw = triaxiality - tri_c;
    let den = if raw.abs() < epsilon { f64::NAN } else { raw };

    let inv_sq = invariant * invariant;
    let ef = (0.5 * (g4 / den + g5 / den) - g6 / den) * inv_sq + (0.5 * (g4 / den - g5 / den)) * invariant + g6 / den;

    (tri_c, ef)
}

/// Evaluate paired slices elementwise.
///
/// # Panics
/// Panics if `triaxiality` and `invariant` differ in length. Mismatched
/// stress-state arrays are a caller bug, not a data condition.
pub fn evaluate(params: &MaterialParameters, triaxiality: &[f64], invariant: &[f64], epsilon: f64) -> LocusEvaluation {
    assert_eq!(
        triaxiality.len(),
        invariant.len(),
        "triaxiality and invariant inputs must have the same length"
    );

    let pairs: Vec<(f64, f64)> = if triaxiality.len() >= PARALLEL_MIN_LEN {
        triaxiality
            .par_iter()
            .zip(invariant.par_iter())
            .map(|(&t, &i)| evaluate_point(params, t, i, epsilon))
            .collect()
    } else {
        triaxiality
            .iter()
            .zip(invariant)
            .map(|(&t, &i)| evaluate_point(params, t, i, epsilon))
            .collect()
    };

    let (cut_off_triaxiality, fracture_strain) = pairs.into_iter().unzip();
    LocusEvaluation {
        cut_off_triaxiality,
        fracture_strain,
    }
}

/// Evaluate a 2D mesh elementwise. Returns `(cut_off_triaxiality, fracture_strain)`.
///
/// # Panics
/// Panics if the two matrices differ in shape.
pub fn evaluate_grid(
    params: &MaterialParameters,
    triaxiality: &DMatrix<f64>,
    invariant: &DMatrix<f64>,
    epsilon: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    assert_eq!(
        triaxiality.shape(),
        invariant.shape(),
        "triaxiality and invariant meshes must have the same shape"
    );
    let (rows, cols) = triaxiality.shape();

    // Both matrices are column-major with the same shape, so their flat
    // storage lines up point for point.
    let eval = evaluate(params, triaxiality.as_slice(), invariant.as_slice(), epsilon);
    (
        DMatrix::from_vec(rows, cols, eval.cut_off_triaxiality),
        DMatrix::from_vec(rows, cols, eval.fracture_strain),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_params() -> MaterialParameters {
        MaterialParameters::new([0.2, -0.1, 0.4, 1.1, 0.7, 0.5])
    }

    #[test]
    fn point_matches_closed_form() {
        let g = sample_params();
        let (tri, inv) = (0.6, 0.3);
        let [g1, g2, g3, g4, g5, g6] = g.0;
        let tri_c = -(g3 + (g1 - g3) / 2.0 - g2) * inv * inv - ((g1 - g3) / 2.0) * inv - g2;
        let d = tri - tri_c;
        let expected = ((g4 + g5) / (2.0 * d) - g6 / d) * inv * inv + ((g4 - g5) / (2.0 * d)) * inv + g6 / d;

        let (c, ef) = evaluate_point(&g, tri, inv, 1e-6);
        assert_relative_eq!(c, tri_c, epsilon = 1e-14);
        assert_relative_eq!(ef, expected, epsilon = 1e-12);
    }

    #[test]
    fn zero_invariant_reduces_to_g6_over_distance() {
        let g = MaterialParameters::new([0.0, 0.0, 0.0, 0.5, 0.5, 0.5]);
        let (c, ef) = evaluate_point(&g, 0.33, 0.0, 1e-6);
        assert_eq!(c, 0.0);
        assert_relative_eq!(ef, 0.5 / 0.33, epsilon = 1e-12);
    }

    #[test]
    fn singular_denominator_is_nan_not_infinite() {
        let g = sample_params();
        let inv = -0.4;
        let tri_c = cut_off_triaxiality(&g, inv);
        for offset in [0.0, 5e-7, -5e-7] {
            let (_, ef) = evaluate_point(&g, tri_c + offset, inv, 1e-6);
            assert!(ef.is_nan(), "offset {offset} gave {ef}");
        }
        let (_, ef) = evaluate_point(&g, tri_c + 1e-3, inv, 1e-6);
        assert!(ef.is_finite());
    }

    #[test]
    fn slices_match_pointwise_evaluation() {
        let g = sample_params();
        let tri = [0.1, 0.33, 0.6, 1.2];
        let inv = [-1.0, 0.0, 0.5, 1.0];
        let eval = evaluate(&g, &tri, &inv, 1e-6);
        for i in 0..tri.len() {
            let (c, ef) = evaluate_point(&g, tri[i], inv[i], 1e-6);
            assert_eq!(eval.cut_off_triaxiality[i].to_bits(), c.to_bits());
            assert_eq!(eval.fracture_strain[i].to_bits(), ef.to_bits());
        }
    }

    #[test]
    fn parallel_path_matches_sequential() {
        let g = sample_params();
        let n = PARALLEL_MIN_LEN + 17;
        let tri: Vec<f64> = (0..n).map(|i| -1.0 + 3.0 * i as f64 / n as f64).collect();
        let inv: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin()).collect();
        let eval = evaluate(&g, &tri, &inv, 1e-6);
        for i in (0..n).step_by(97) {
            let (_, ef) = evaluate_point(&g, tri[i], inv[i], 1e-6);
            assert_eq!(eval.fracture_strain[i].to_bits(), ef.to_bits());
        }
    }

    #[test]
    fn grid_keeps_shape_and_layout() {
        let g = sample_params();
        let tri = DMatrix::from_row_slice(2, 3, &[0.1, 0.5, 0.9, 0.1, 0.5, 0.9]);
        let inv = DMatrix::from_row_slice(2, 3, &[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
        let (c, ef) = evaluate_grid(&g, &tri, &inv, 1e-6);
        assert_eq!(c.shape(), (2, 3));
        let (_, expected) = evaluate_point(&g, 0.9, 1.0, 1e-6);
        assert_eq!(ef[(1, 2)].to_bits(), expected.to_bits());
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn mismatched_lengths_panic() {
        let _ = evaluate(&sample_params(), &[0.1, 0.2], &[0.0], 1e-6);
    }
}
