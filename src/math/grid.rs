//! Sampling grids for locus evaluation.

use nalgebra::DMatrix;

/// `n` evenly spaced samples over `[start, end]`, both ends included.
///
/// Interior samples are `start + i * step`; the last sample is set to `end`
/// exactly so the closed interval is honoured despite rounding.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n as f64 - 1.0);
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Cartesian mesh in "xy" layout.
///
/// Returns `(xx, yy)` with `y.len()` rows and `x.len()` columns, where
/// `xx[(r, c)] = x[c]` and `yy[(r, c)] = y[r]`.
pub fn meshgrid(x: &[f64], y: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
    let xx = DMatrix::from_fn(y.len(), x.len(), |_, c| x[c]);
    let yy = DMatrix::from_fn(y.len(), x.len(), |r, _| y[r]);
    (xx, yy)
}
