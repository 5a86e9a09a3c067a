//! Loads [`GridConfig`] from a data directory.
//!
//! The directory may hold one of `grid.ron`, `grid.toml` or `grid.json`.
//! No file means built-in defaults; more than one is an error, as is any
//! fuel name outside the known set.

use eitrgrid_core::config::GridConfig;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::schema::GridConfigData;

/// Base name of the grid configuration file.
pub const GRID_FILE: &str = "grid";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("unknown {expected_kind} '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A value parsed but is outside its allowed range.
    #[error("invalid {field} in {file}: {detail}")]
    Invalid {
        file: PathBuf,
        field: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }
}

pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .into_iter()
        .find(|format| Some(format.extension()) == ext)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Find `{base_name}.{ron,toml,json}` in `dir`. `Ok(None)` when absent.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for format in Format::ALL {
        let candidate = dir.join(format!("{base_name}.{}", format.extension()));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

pub fn parse_str<T: DeserializeOwned>(
    format: Format,
    content: &str,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parse_err = |detail: String| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_str(format, &content, path)
}

// ===========================================================================
// Grid configuration
// ===========================================================================

/// Load and validate the grid configuration in `dir`.
pub fn load_grid_config(dir: &Path) -> Result<GridConfig, DataLoadError> {
    let Some(path) = find_data_file(dir, GRID_FILE)? else {
        debug!(dir = %dir.display(), "no grid config, using defaults");
        return Ok(GridConfig::default());
    };
    let data: GridConfigData = deserialize_file(&path)?;
    let config = data.resolve(&path)?;
    debug!(file = %path.display(), "loaded grid config");
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use eitrgrid_core::config::FuelType;
    use eitrgrid_core::fixed::Fixed64;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "eitrgrid_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // detect_format / find_data_file
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("grid.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("grid.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("grid.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("grid.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(detect_format(Path::new("grid")).is_err());
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("conflict");
        fs::write(dir.join("grid.ron"), "()").unwrap();
        fs::write(dir.join("grid.json"), "{}").unwrap();
        let result = find_data_file(&dir, GRID_FILE);
        assert!(matches!(result, Err(DataLoadError::ConflictingFormats { .. })));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // load_grid_config
    // -----------------------------------------------------------------------

    #[test]
    fn missing_file_gives_defaults() {
        let dir = make_test_dir("missing");
        assert_eq!(load_grid_config(&dir).unwrap(), GridConfig::default());
        cleanup(&dir);
    }

    #[test]
    fn loads_ron() {
        let dir = make_test_dir("ron");
        fs::write(
            dir.join("grid.ron"),
            r#"(
                fuel_types: { "coal": 1.5, "eitr": 6.0 },
                conduit: (regen_cost: 20.0),
                fuel_request_timeout_seconds: 2.0,
            )"#,
        )
        .unwrap();
        let config = load_grid_config(&dir).unwrap();
        assert_eq!(config.fuel_types.efficiency(FuelType::Coal), Fixed64::from_num(1.5));
        assert_eq!(config.fuel_types.surtling_core, 2.5);
        assert_eq!(config.conduit.regen_cost, 20.0);
        assert_eq!(config.conduit.interval_seconds, 1.0);
        assert_eq!(config.fuel_request_timeout_seconds, 2.0);
        cleanup(&dir);
    }

    #[test]
    fn loads_toml() {
        let dir = make_test_dir("toml");
        fs::write(
            dir.join("grid.toml"),
            r#"
[fuel_types]
surtling_core = 3.0

[replication]
radius = 45.0
"#,
        )
        .unwrap();
        let config = load_grid_config(&dir).unwrap();
        assert_eq!(config.fuel_types.surtling_core, 3.0);
        assert_eq!(config.replication.radius, 45.0);
        assert_eq!(config.replication.interval_seconds, 0.5);
        cleanup(&dir);
    }

    #[test]
    fn loads_json() {
        let dir = make_test_dir("json");
        fs::write(
            dir.join("grid.json"),
            r#"{ "conduit": { "energy_per_interval": 2.0, "max_fill_ratio": 0.8 } }"#,
        )
        .unwrap();
        let config = load_grid_config(&dir).unwrap();
        assert_eq!(config.conduit.energy_per_interval, 2.0);
        assert_eq!(config.conduit.max_fill_ratio, 0.8);
        assert_eq!(config.fuel_types.coal, 1.0);
        cleanup(&dir);
    }

    #[test]
    fn unknown_fuel_type_is_rejected() {
        let dir = make_test_dir("unknown_fuel");
        fs::write(dir.join("grid.json"), r#"{ "fuel_types": { "wood": 0.5 } }"#).unwrap();
        let err = load_grid_config(&dir).unwrap_err();
        assert!(
            matches!(&err, DataLoadError::UnresolvedRef { name, expected_kind: "fuel type", .. } if name == "wood"),
            "got {err}"
        );
        cleanup(&dir);
    }

    #[test]
    fn fuel_names_are_case_insensitive_but_unique() {
        let dir = make_test_dir("dup_fuel");
        fs::write(dir.join("grid.json"), r#"{ "fuel_types": { "Coal": 1.0, "coal": 2.0 } }"#)
            .unwrap();
        assert!(matches!(
            load_grid_config(&dir),
            Err(DataLoadError::DuplicateName { .. })
        ));
        cleanup(&dir);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = make_test_dir("invalid");
        fs::write(dir.join("grid.json"), r#"{ "conduit": { "regen_cost": 0.0 } }"#).unwrap();
        assert!(matches!(
            load_grid_config(&dir),
            Err(DataLoadError::Invalid { field: "conduit.regen_cost", .. })
        ));
        cleanup(&dir);
    }

    #[test]
    fn parse_error_names_file() {
        let dir = make_test_dir("parse");
        fs::write(dir.join("grid.ron"), "not valid ron {{{").unwrap();
        let err = load_grid_config(&dir).unwrap_err();
        assert!(err.to_string().contains("grid.ron"));
        cleanup(&dir);
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DataLoadError = io.into();
        assert!(matches!(err, DataLoadError::Io(_)));
    }
}
