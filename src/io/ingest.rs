//! CSV ingest of calibration specimens.
//!
//! Turns a specimen CSV into an ordered [`SpecimenSet`]:
//! - strict schema for the required columns (clear errors, exit code 2)
//! - row-level validation: bad rows are skipped and reported
//! - file order is preserved

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::warn;

use crate::domain::{Specimen, SpecimenSet};
use crate::error::AppError;

/// Accepted header spellings per column (compared lower-case).
const NAME_COLUMNS: &[&str] = &["name", "specimen"];
const STRAIN_COLUMNS: &[&str] = &["fracture_strain", "ef"];
const TRIAXIALITY_COLUMNS: &[&str] = &["stress_triaxiality", "triaxiality", "eta"];
const INVARIANT_COLUMNS: &[&str] = &["normalized_third_invariant", "invariant", "xi"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub name: Option<String>,
    pub message: String,
}

/// Ingest output: specimens in file order plus what was skipped.
#[derive(Debug, Clone)]
pub struct IngestedSpecimens {
    pub specimens: SpecimenSet,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

struct Columns {
    name: usize,
    strain: usize,
    triaxiality: usize,
    invariant: usize,
}

/// Load specimens from a CSV file.
pub fn load_specimens_csv(path: &Path) -> Result<IngestedSpecimens, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open specimen CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let columns = resolve_columns(&build_header_map(&headers))?;

    let mut specimens = SpecimenSet::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header, lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    name: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &columns) {
            Ok((name, specimen)) => {
                if specimens.insert(name.clone(), specimen).is_some() {
                    warn!(line, specimen = %name, "duplicate specimen name; later row replaces the earlier one");
                }
            }
            Err(message) => row_errors.push(RowError {
                line,
                name: record.get(columns.name).map(str::to_string).filter(|s| !s.is_empty()),
                message,
            }),
        }
    }

    for e in &row_errors {
        warn!(line = e.line, specimen = e.name.as_deref().unwrap_or("-"), "skipped row: {}", e.message);
    }

    if specimens.is_empty() {
        return Err(AppError::invalid_input(format!(
            "No valid specimen rows in '{}' ({} read, {} rejected).",
            path.display(),
            rows_read,
            row_errors.len()
        )));
    }

    Ok(IngestedSpecimens {
        specimens,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_columns(header_map: &HashMap<String, usize>) -> Result<Columns, AppError> {
    Ok(Columns {
        name: find_column(header_map, NAME_COLUMNS)?,
        strain: find_column(header_map, STRAIN_COLUMNS)?,
        triaxiality: find_column(header_map, TRIAXIALITY_COLUMNS)?,
        invariant: find_column(header_map, INVARIANT_COLUMNS)?,
    })
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Result<usize, AppError> {
    names
        .iter()
        .find_map(|n| header_map.get(*n).copied())
        .ok_or_else(|| AppError::io(format!("Missing required column: `{}`", names[0])))
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<(String, Specimen), String> {
    let name = get_required(record, columns.name, "name")?.to_string();
    let fracture_strain = parse_f64(get_required(record, columns.strain, "fracture_strain")?, "fracture_strain")?;
    let stress_triaxiality = parse_f64(
        get_required(record, columns.triaxiality, "stress_triaxiality")?,
        "stress_triaxiality",
    )?;
    let normalized_third_invariant = parse_f64(
        get_required(record, columns.invariant, "normalized_third_invariant")?,
        "normalized_third_invariant",
    )?;

    Ok((
        name,
        Specimen::new(fracture_strain, stress_triaxiality, normalized_third_invariant),
    ))
}

fn get_required<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value '{s}'."))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite `{name}` value."))
    }
}
