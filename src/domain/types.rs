//! Shared domain types.
//!
//! Inputs (specimens, parameter vectors, bounds, solver and plotting options)
//! are serializable so a whole run can be described by one JSON document.
//! Derived outputs (`CalibrationResult` and its parts) are plain in-memory
//! bundles; only the pieces worth exporting implement `Serialize`.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DMatrix;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;

/// Number of free parameters of the KHPS2 criterion (G1..G6).
pub const PARAM_COUNT: usize = 6;

/// Default guard for near-zero locus denominators.
pub const DEFAULT_DENOMINATOR_EPSILON: f64 = 1e-6;

/// Material parameters `[G1, G2, G3, G4, G5, G6]` of the KHPS2 criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialParameters(pub [f64; PARAM_COUNT]);

impl MaterialParameters {
    pub fn new(values: [f64; PARAM_COUNT]) -> Self {
        Self(values)
    }

    /// Build a parameter vector from a slice, rejecting any length other than six.
    pub fn from_slice(values: &[f64]) -> Result<Self, AppError> {
        let array: [f64; PARAM_COUNT] = values.try_into().map_err(|_| {
            AppError::invalid_input(format!(
                "Expected {PARAM_COUNT} material parameters (G1..G6), got {}.",
                values.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl fmt::Display for MaterialParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| format!("{v:.6}")).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// One experimental calibration point.
///
/// Serialized as `[fracture_strain, stress_triaxiality, normalized_third_invariant]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Specimen {
    pub fracture_strain: f64,
    pub stress_triaxiality: f64,
    pub normalized_third_invariant: f64,
}

impl Specimen {
    pub fn new(fracture_strain: f64, stress_triaxiality: f64, normalized_third_invariant: f64) -> Self {
        Self {
            fracture_strain,
            stress_triaxiality,
            normalized_third_invariant,
        }
    }
}

impl From<[f64; 3]> for Specimen {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Specimen> for [f64; 3] {
    fn from(s: Specimen) -> Self {
        [s.fracture_strain, s.stress_triaxiality, s.normalized_third_invariant]
    }
}

/// Insertion-ordered mapping from specimen name to [`Specimen`].
///
/// Every derived per-specimen array (predictions, residuals, errors, plot
/// markers) follows this order, so it must never be reordered. Re-inserting an
/// existing name replaces the value in place and keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecimenSet {
    entries: Vec<(String, Specimen)>,
}

impl SpecimenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a specimen, returning the previous value stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, specimen: Specimen) -> Option<Specimen> {
        let name = name.into();
        if let Some((_, slot)) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            return Some(std::mem::replace(slot, specimen));
        }
        self.entries.push((name, specimen));
        None
    }

    pub fn get(&self, name: &str) -> Option<&Specimen> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Specimen)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn fracture_strains(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, s)| s.fracture_strain).collect()
    }

    pub fn triaxialities(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, s)| s.stress_triaxiality).collect()
    }

    pub fn invariants(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, s)| s.normalized_third_invariant).collect()
    }
}

impl<S: Into<String>> FromIterator<(S, Specimen)> for SpecimenSet {
    fn from_iter<I: IntoIterator<Item = (S, Specimen)>>(iter: I) -> Self {
        let mut set = SpecimenSet::new();
        for (name, specimen) in iter {
            set.insert(name, specimen);
        }
        set
    }
}

impl Serialize for SpecimenSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, specimen) in &self.entries {
            map.serialize_entry(name, specimen)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SpecimenSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecimenSetVisitor;

        impl<'de> Visitor<'de> for SpecimenSetVisitor {
            type Value = SpecimenSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of specimen name to [fracture_strain, triaxiality, invariant]")
            }

            // Entries are visited in document order, which is the order we keep.
            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = SpecimenSet::new();
                while let Some((name, specimen)) = access.next_entry::<String, Specimen>()? {
                    set.insert(name, specimen);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SpecimenSetVisitor)
    }
}

/// Elementwise box constraints on the parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self { lower, upper }
    }

    /// Zero-width bounds pinning every parameter to `params`.
    pub fn fixed(params: &MaterialParameters) -> Self {
        Self::new(params.0.to_vec(), params.0.to_vec())
    }

    pub fn unbounded() -> Self {
        Self::new(vec![f64::NEG_INFINITY; PARAM_COUNT], vec![f64::INFINITY; PARAM_COUNT])
    }

    /// Check shape and ordering. Equal bounds are allowed and freeze the parameter.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.lower.len() != PARAM_COUNT || self.upper.len() != PARAM_COUNT {
            return Err(AppError::invalid_input(format!(
                "Bounds must have {PARAM_COUNT} entries each (got lower={}, upper={}).",
                self.lower.len(),
                self.upper.len()
            )));
        }
        for (i, (lo, hi)) in self.lower.iter().zip(&self.upper).enumerate() {
            // Written as a negated `<=` so NaN bounds are rejected too.
            if !(lo <= hi) {
                return Err(AppError::invalid_input(format!(
                    "Lower bound of G{} ({lo}) exceeds its upper bound ({hi}).",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params.len() == self.lower.len()
            && params
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(p, (lo, hi))| lo <= p && p <= hi)
    }
}

/// Fracture-strain axis limits `[min, max]`.
///
/// `max` doubles as the clipping threshold for the surface and the plane-stress curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct ZLimits {
    pub min: f64,
    pub max: f64,
}

impl ZLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl From<[f64; 2]> for ZLimits {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<ZLimits> for [f64; 2] {
    fn from(z: ZLimits) -> Self {
        [z.min, z.max]
    }
}

/// Options for the bounded least-squares solve.
///
/// Keys nobody recognizes are kept in `extra` so they can be reported instead
/// of silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Relative cost-reduction tolerance.
    pub ftol: f64,
    /// Relative step-size tolerance.
    pub xtol: f64,
    /// Projected-gradient tolerance (infinity norm).
    pub gtol: f64,
    /// Objective evaluation cap. `None` means `100 * free_parameter_count`.
    pub max_nfev: Option<usize>,
    /// 0 = silent, 1 = termination summary, 2 = per-iteration trace.
    pub verbose: u8,
    /// Starting Levenberg-Marquardt damping factor.
    pub initial_damping: f64,
    /// Value substituted for non-finite residuals inside the solver objective.
    pub nan_penalty: f64,
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            max_nfev: None,
            verbose: 0,
            initial_damping: 1e-3,
            nan_penalty: 1e3,
            extra: BTreeMap::new(),
        }
    }
}

impl OptimizerConfig {
    pub fn evaluation_budget(&self, free_params: usize) -> usize {
        self.max_nfev.unwrap_or(100 * free_params.max(1))
    }
}

/// Sampling of the locus surface and the plane-stress curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSpec {
    pub triaxiality_range: [f64; 2],
    pub invariant_range: [f64; 2],
    pub surface_samples: usize,
    pub plane_stress_samples: usize,
}

impl Default for MeshSpec {
    fn default() -> Self {
        Self {
            triaxiality_range: [-3.0, 3.0],
            invariant_range: [-1.0, 1.0],
            surface_samples: 999,
            plane_stress_samples: 999,
        }
    }
}

impl MeshSpec {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.surface_samples < 2 || self.plane_stress_samples < 2 {
            return Err(AppError::invalid_input("Mesh sample counts must be >= 2."));
        }
        for (label, [lo, hi]) in [
            ("triaxiality", self.triaxiality_range),
            ("invariant", self.invariant_range),
        ] {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(AppError::invalid_input(format!(
                    "Invalid {label} mesh range: [{lo}, {hi}] (must be finite with min < max)."
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for a locus renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    pub plot_title: String,
    pub x_label: String,
    pub y_label: String,
    pub z_label: String,
    pub x_lim: [f64; 2],
    pub y_lim: [f64; 2],
    pub z_lim: [f64; 2],
    /// Plot width (columns).
    pub width: usize,
    /// Plot height (rows).
    pub height: usize,
    /// One marker per specimen, in specimen order. Only the first character is used.
    pub marker_styles: Vec<String>,
    pub plot_cut_off_plane: bool,
    pub plot_plane_stress_curve: bool,
    pub plot_approximated_points: bool,
    pub plot_constant_invariant_curves: bool,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            plot_title: "KHPS2 fracture locus".to_string(),
            x_label: "Stress triaxiality".to_string(),
            y_label: "Normalized third invariant".to_string(),
            z_label: "Fracture strain".to_string(),
            x_lim: [-1.0, 1.0],
            y_lim: [-1.0, 1.0],
            z_lim: [0.0, 2.0],
            width: 100,
            height: 25,
            marker_styles: ["o", "s", "^", "v", "d", "x", "+", "*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            plot_cut_off_plane: true,
            plot_plane_stress_curve: true,
            plot_approximated_points: true,
            plot_constant_invariant_curves: true,
        }
    }
}

/// A full run as described by the JSON run config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub specimens: SpecimenSet,
    pub initial_g: Vec<f64>,
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    #[serde(default)]
    pub optimization_options: OptimizerConfig,
    #[serde(default = "default_denominator_epsilon")]
    pub denominator_epsilon: f64,
    pub z_lim: ZLimits,
    #[serde(default)]
    pub mesh: MeshSpec,
    #[serde(default)]
    pub plotting_options: PlotOptions,
}

fn default_denominator_epsilon() -> f64 {
    DEFAULT_DENOMINATOR_EPSILON
}

impl RunConfig {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.lower_bounds.clone(), self.upper_bounds.clone())
    }
}

/// Cut-off triaxiality and fracture strain over a 2D (triaxiality, invariant) mesh.
///
/// All four matrices share one shape; rows follow the invariant axis and
/// columns the triaxiality axis. Undefined strains are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct LocusField {
    pub triaxiality: DMatrix<f64>,
    pub invariant: DMatrix<f64>,
    pub cut_off_triaxiality: DMatrix<f64>,
    pub fracture_strain: DMatrix<f64>,
}

/// Locus evaluated along the plane-stress relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneStressCurve {
    pub triaxiality: Vec<f64>,
    pub invariant: Vec<f64>,
    #[serde(with = "nullable")]
    pub fracture_strain: Vec<f64>,
}

/// Measured vs predicted values at each calibration point, in specimen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoints {
    pub names: Vec<String>,
    pub triaxiality: Vec<f64>,
    pub invariant: Vec<f64>,
    pub measured_strain: Vec<f64>,
    #[serde(with = "nullable")]
    pub predicted_strain: Vec<f64>,
    #[serde(with = "nullable")]
    pub residuals: Vec<f64>,
}

impl CalibrationPoints {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Aggregate calibration error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Sum of |residual| over defined residuals.
    pub total_abs_difference: f64,
    /// Per-specimen |residual| / measured × 100, undefined entries as 0.
    pub percentage_errors: Vec<f64>,
    pub total_percentage_error: f64,
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    GradientTolerance,
    CostTolerance,
    StepTolerance,
    EvaluationLimit,
    /// Every parameter was pinned by zero-width bounds.
    AllParametersFixed,
}

impl Termination {
    pub fn describe(self) -> &'static str {
        match self {
            Termination::GradientTolerance => "projected gradient below gtol",
            Termination::CostTolerance => "relative cost reduction below ftol",
            Termination::StepTolerance => "relative step below xtol",
            Termination::EvaluationLimit => "evaluation budget exhausted",
            Termination::AllParametersFixed => "all parameters fixed by bounds",
        }
    }
}

/// Solver diagnostics carried on the calibration result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverStatus {
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub evaluations: usize,
    /// `0.5 * Σ r²` at the returned parameters (penalised residuals).
    pub cost: f64,
}

/// Everything a single calibration produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub parameters: MaterialParameters,
    pub status: SolverStatus,
    pub surface: LocusField,
    pub plane_stress: PlaneStressCurve,
    pub points: CalibrationPoints,
    pub errors: ErrorMetrics,
}

/// Undefined (NaN) entries travel as JSON `null`.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let opts: Vec<Option<f64>> = values.iter().map(|v| v.is_finite().then_some(*v)).collect();
        opts.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let opts = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(opts.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// The orchestrator's return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub final_parameters: MaterialParameters,
    pub total_abs_difference: f64,
    pub percentage_errors: Vec<f64>,
    pub total_percentage_error: f64,
    #[serde(with = "nullable")]
    pub residuals: Vec<f64>,
    pub converged: bool,
}

impl AnalysisSummary {
    pub fn from_result(result: &CalibrationResult) -> Self {
        Self {
            final_parameters: result.parameters,
            total_abs_difference: result.errors.total_abs_difference,
            percentage_errors: result.errors.percentage_errors.clone(),
            total_percentage_error: result.errors.total_percentage_error,
            residuals: result.points.residuals.clone(),
            converged: result.status.converged,
        }
    }
}
