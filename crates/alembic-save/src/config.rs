//! Session configuration, loadable from RON, TOML or JSON.

use alembic_core::player::VITAL_MARKER;
use alembic_core::sim::{SimConfig, SimConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("autosave_interval_secs must be positive and finite, got {0}")]
    AutosaveInterval(f64),

    #[error("storage_key must not be empty")]
    EmptyStorageKey,

    #[error(transparent)]
    Sim(#[from] SimConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Configuration
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key the save blob is stored under.
    pub storage_key: String,
    /// Seconds of real time between autosaves.
    pub autosave_interval_secs: f64,
    pub sim: SimConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: VITAL_MARKER.to_string(),
            autosave_interval_secs: 10.0,
            sim: SimConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.is_empty() {
            return Err(ConfigError::EmptyStorageKey);
        }
        if !(self.autosave_interval_secs.is_finite() && self.autosave_interval_secs > 0.0) {
            return Err(ConfigError::AutosaveInterval(self.autosave_interval_secs));
        }
        self.sim.validate()?;
        Ok(())
    }
}

// ===========================================================================
// Loading
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Parse `content` as a [`SessionConfig`] in the given format and validate it.
/// Missing fields take their defaults.
pub fn parse_config(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<SessionConfig, ConfigError> {
    let parse_err = |detail: String| ConfigError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    let config: SessionConfig = match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_err(e.to_string()))?,
        Format::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?,
        Format::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
    };
    config.validate()?;
    Ok(config)
}

/// Read and validate a configuration file, picking the format from its
/// extension.
pub fn load_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_config(&content, format, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str, format: Format) -> Result<SessionConfig, ConfigError> {
        parse_config(content, format, Path::new("session"))
    }

    // -----------------------------------------------------------------------
    // Test 1: format detection
    // -----------------------------------------------------------------------
    #[test]
    fn detects_formats() {
        assert_eq!(detect_format(Path::new("a.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("a.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("a.yaml")),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 2: each format fills in defaults
    // -----------------------------------------------------------------------
    #[test]
    fn partial_configs_use_defaults() {
        let ron = parse("(autosave_interval_secs: 30.0)", Format::Ron).unwrap();
        assert_eq!(ron.autosave_interval_secs, 30.0);
        assert_eq!(ron.storage_key, VITAL_MARKER);

        let toml = parse(
            "storage_key = \"slot-2\"\n[sim]\nmax_step_secs = 0.05\n",
            Format::Toml,
        )
        .unwrap();
        assert_eq!(toml.storage_key, "slot-2");
        assert_eq!(toml.sim.max_step_secs, 0.05);
        assert_eq!(toml.sim.max_steps_per_advance, 100);

        let json = parse(r#"{"sim": {"pipe_rate": 4.0}}"#, Format::Json).unwrap();
        assert_eq!(json.sim.pipe_rate, 4.0);
        assert_eq!(json.autosave_interval_secs, 10.0);
    }

    // -----------------------------------------------------------------------
    // Test 3: invalid values are rejected
    // -----------------------------------------------------------------------
    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            parse(r#"{"autosave_interval_secs": 0}"#, Format::Json),
            Err(ConfigError::AutosaveInterval(_))
        ));
        assert!(matches!(
            parse(r#"{"storage_key": ""}"#, Format::Json),
            Err(ConfigError::EmptyStorageKey)
        ));
        assert!(matches!(
            parse("[sim]\nmax_steps_per_advance = 0\n", Format::Toml),
            Err(ConfigError::Sim(SimConfigError::StepCount))
        ));
        assert!(matches!(
            parse("(oops", Format::Ron),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/alembic/session.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
