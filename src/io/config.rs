//! JSON run configuration.
//!
//! One document describes a whole calibration run: specimens (in document
//! order), initial guess and bounds, solver options, epsilon, strain limits,
//! mesh resolution and plotting options. See `domain::RunConfig`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use crate::domain::RunConfig;
use crate::error::AppError;

/// Read a run config JSON file.
pub fn load_run_config(path: &Path) -> Result<RunConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open run config '{}': {e}", path.display())))?;
    let config: RunConfig = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::io(format!("Invalid run config JSON '{}': {e}", path.display())))?;

    debug!(
        path = %path.display(),
        specimens = config.specimens.len(),
        epsilon = config.denominator_epsilon,
        "loaded run config"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_DENOMINATOR_EPSILON, MeshSpec, ZLimits};
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "specimens": {{"T1": [0.5, 0.33, 1.0], "S1": [0.9, 0.0, 0.0]}},
                "initial_g": [0.0, 0.0, 0.0, 0.5, 0.5, 0.5],
                "lower_bounds": [-1, -1, -1, 0, 0, 0],
                "upper_bounds": [1, 1, 1, 2, 2, 2],
                "z_lim": [0, 2],
                "optimization_options": {{"max_nfev": 200, "loss": "linear"}}
            }}"#
        )
        .unwrap();

        let config = load_run_config(file.path()).unwrap();
        assert_eq!(config.specimens.names(), vec!["T1", "S1"]);
        assert_eq!(config.denominator_epsilon, DEFAULT_DENOMINATOR_EPSILON);
        assert_eq!(config.z_lim, ZLimits::new(0.0, 2.0));
        assert_eq!(config.mesh, MeshSpec::default());
        assert_eq!(config.optimization_options.max_nfev, Some(200));
        assert!(config.optimization_options.extra.contains_key("loss"));
        assert_eq!(config.bounds().upper, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn malformed_json_is_io_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"specimens": {{}}"#).unwrap();
        let err = load_run_config(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_run_config(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.exit_code(), 2);
    }
}
