//! KHPS2 calibration.
//!
//! Given:
//! - a specimen set (measured strain, triaxiality, invariant per specimen)
//! - an initial parameter guess and box bounds
//! - solver options, the denominator guard `epsilon` and the strain limits
//!
//! we:
//! - minimize the residual function with a bounded least-squares solver
//! - evaluate the fitted locus over a (triaxiality, invariant) mesh and mask it
//! - evaluate the locus along the plane-stress curve and mask it
//! - compare predictions with measurements at every calibration point

use tracing::{info, warn};

use crate::domain::{
    Bounds, CalibrationResult, LocusField, MaterialParameters, MeshSpec, OptimizerConfig, PlaneStressCurve,
    SpecimenSet, ZLimits,
};
use crate::error::AppError;
use crate::fit::{LeastSquaresSolver, ResidualFunction};
use crate::math::{BoundedLevenbergMarquardt, linspace, meshgrid};
use crate::models::{evaluate, evaluate_grid};
use crate::report::{compute_calibration_points, compute_error_metrics};

/// Triaxiality range of the plane-stress curve.
pub const PLANE_STRESS_TRIAXIALITY: [f64; 2] = [-2.0 / 3.0, 2.0 / 3.0];

/// Calibrate with the default solver and the default 999 × 999 mesh.
pub fn calibrate(
    specimens: &SpecimenSet,
    initial_params: &[f64],
    bounds: &Bounds,
    optimizer: &OptimizerConfig,
    epsilon: f64,
    z_lim: ZLimits,
) -> Result<CalibrationResult, AppError> {
    calibrate_with(
        &BoundedLevenbergMarquardt,
        &MeshSpec::default(),
        specimens,
        initial_params,
        bounds,
        optimizer,
        epsilon,
        z_lim,
    )
}

/// Calibrate with an explicit solver and mesh.
///
/// Input problems fail fast with `InvalidInput` before the solver runs.
/// Solver non-convergence is not an error: the best-effort parameters are
/// used and `status.converged` is `false`.
#[allow(clippy::too_many_arguments)]
pub fn calibrate_with(
    solver: &dyn LeastSquaresSolver,
    mesh: &MeshSpec,
    specimens: &SpecimenSet,
    initial_params: &[f64],
    bounds: &Bounds,
    optimizer: &OptimizerConfig,
    epsilon: f64,
    z_lim: ZLimits,
) -> Result<CalibrationResult, AppError> {
    validate_inputs(specimens, initial_params, bounds, epsilon, z_lim)?;
    mesh.validate()?;
    for key in optimizer.extra.keys() {
        warn!(option = %key, "ignoring unrecognized optimization option");
    }

    info!(
        specimens = specimens.len(),
        initial = %MaterialParameters::from_slice(initial_params)?,
        "starting KHPS2 calibration"
    );

    // 1) Bounded least squares over G1..G6.
    let residual_fn = ResidualFunction::new(specimens, epsilon);
    let objective = |x: &[f64]| -> Vec<f64> {
        match MaterialParameters::from_slice(x) {
            Ok(params) => residual_fn.evaluate(&params),
            Err(_) => vec![f64::NAN; residual_fn.len()],
        }
    };
    let outcome = solver.minimize(&objective, initial_params, &bounds.lower, &bounds.upper, optimizer)?;
    let parameters = MaterialParameters::from_slice(&outcome.x)?;

    if outcome.converged {
        info!(
            params = %parameters,
            cost = outcome.cost,
            evaluations = outcome.evaluations,
            "solver finished: {}",
            outcome.termination.describe()
        );
    } else {
        warn!(
            params = %parameters,
            evaluations = outcome.evaluations,
            "solver did not converge ({}); using best-effort parameters",
            outcome.termination.describe()
        );
    }

    // 2) Locus surface over the mesh.
    let surface = build_locus_surface(&parameters, mesh, epsilon, z_lim);

    // 3) Plane-stress curve.
    let plane_stress = build_plane_stress_curve(&parameters, mesh.plane_stress_samples, epsilon, z_lim);

    // 4-5) Calibration points and error aggregates.
    let points = compute_calibration_points(specimens, &parameters, epsilon);
    let errors = compute_error_metrics(&points);

    Ok(CalibrationResult {
        parameters,
        status: outcome.status(),
        surface,
        plane_stress,
        points,
        errors,
    })
}

fn validate_inputs(
    specimens: &SpecimenSet,
    initial_params: &[f64],
    bounds: &Bounds,
    epsilon: f64,
    z_lim: ZLimits,
) -> Result<(), AppError> {
    if specimens.is_empty() {
        return Err(AppError::invalid_input("Specimen set is empty; nothing to calibrate."));
    }
    if let Some((name, _)) = specimens.iter().find(|(_, s)| {
        !(s.fracture_strain.is_finite()
            && s.stress_triaxiality.is_finite()
            && s.normalized_third_invariant.is_finite())
    }) {
        return Err(AppError::invalid_input(format!("Specimen '{name}' has non-finite values.")));
    }

    let initial = MaterialParameters::from_slice(initial_params)?;
    bounds.validate()?;
    if initial.0.iter().any(|v| !v.is_finite()) {
        return Err(AppError::invalid_input(format!("Initial parameters must be finite: {initial}.")));
    }
    if !bounds.contains(initial_params) {
        return Err(AppError::invalid_input(format!(
            "Initial parameters {initial} lie outside the bounds."
        )));
    }

    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(AppError::invalid_input(format!(
            "Denominator epsilon must be finite and > 0 (got {epsilon})."
        )));
    }
    if !(z_lim.min <= z_lim.max) {
        return Err(AppError::invalid_input(format!(
            "Invalid z limits: [{}, {}] (min must not exceed max).",
            z_lim.min, z_lim.max
        )));
    }
    Ok(())
}

/// Evaluate the locus over the mesh described by `mesh` and apply [`mask_surface`].
pub fn build_locus_surface(params: &MaterialParameters, mesh: &MeshSpec, epsilon: f64, z_lim: ZLimits) -> LocusField {
    let [tri_lo, tri_hi] = mesh.triaxiality_range;
    let [inv_lo, inv_hi] = mesh.invariant_range;
    let tri_axis = linspace(tri_lo, tri_hi, mesh.surface_samples);
    let inv_axis = linspace(inv_lo, inv_hi, mesh.surface_samples);
    let (triaxiality, invariant) = meshgrid(&tri_axis, &inv_axis);

    let (cut_off_triaxiality, fracture_strain) = evaluate_grid(params, &triaxiality, &invariant, epsilon);
    let mut field = LocusField {
        triaxiality,
        invariant,
        cut_off_triaxiality,
        fracture_strain,
    };
    mask_surface(&mut field, z_lim.max);
    field
}

/// Undefine strains behind the cut-off plane, below zero or above `z_max`.
///
/// Applying the mask more than once has no further effect.
pub fn mask_surface(field: &mut LocusField, z_max: f64) {
    let behind: Vec<bool> = field
        .triaxiality
        .iter()
        .zip(field.cut_off_triaxiality.iter())
        .map(|(t, c)| t < c)
        .collect();
    for (ef, behind) in field.fracture_strain.iter_mut().zip(behind) {
        if behind || *ef < 0.0 || *ef > z_max {
            *ef = f64::NAN;
        }
    }
}

/// Invariant of a plane-stress state with triaxiality `tri`.
pub fn plane_stress_invariant(tri: f64) -> f64 {
    -27.0 / 2.0 * tri * (tri * tri - 1.0 / 3.0)
}

/// Evaluate the locus along the plane-stress curve.
///
/// Strains below zero or above `z_lim.max` are undefined; the cut-off plane is
/// not applied here.
pub fn build_plane_stress_curve(
    params: &MaterialParameters,
    samples: usize,
    epsilon: f64,
    z_lim: ZLimits,
) -> PlaneStressCurve {
    let [lo, hi] = PLANE_STRESS_TRIAXIALITY;
    let triaxiality = linspace(lo, hi, samples);
    let invariant: Vec<f64> = triaxiality.iter().map(|&t| plane_stress_invariant(t)).collect();

    let fracture_strain = evaluate(params, &triaxiality, &invariant, epsilon)
        .fracture_strain
        .into_iter()
        .map(|ef| if ef < 0.0 || ef > z_lim.max { f64::NAN } else { ef })
        .collect();

    PlaneStressCurve {
        triaxiality,
        invariant,
        fracture_strain,
    }
}
