// TOML configuration with defaults for every field.
//
// Lookup order: an explicit `--config` path, then `price_report.toml` in the
// working directory, then built-in defaults. CLI flags override the result.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "price_report.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub reference: ReferenceConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Base table with the permitted unit price range per equipment code.
    pub base_path: PathBuf,
    /// Materials exempt from price checks.
    pub exceptions_path: PathBuf,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("Base.xlsx"),
            exceptions_path: PathBuf::from("Excecoes.xlsx"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Append `_YYYYMMDD_HHMMSS` to the output file name.
    pub timestamped: bool,
    /// Project elements ending with this suffix are reversal entries and are
    /// dropped before grouping.
    pub reversal_suffix: Option<String>,
    pub preview_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "Resultado".to_string(),
            timestamped: true,
            reversal_suffix: None,
            preview_rows: 5,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Explicit path must exist; the default file is optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report.file_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "report.file_prefix must not be empty".to_string(),
            ));
        }
        if matches!(&self.report.reversal_suffix, Some(s) if s.is_empty()) {
            return Err(ConfigError::ValidationError(
                "report.reversal_suffix must not be an empty string".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.report.file_prefix, "Resultado");
        assert!(config.report.timestamped);
        assert_eq!(config.report.reversal_suffix, None);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [reference]
            base_path = "dados/Base.csv"

            [report]
            reversal_suffix = "-D"
            timestamped = false
            "#,
        )
        .unwrap();
        assert_eq!(config.reference.base_path, PathBuf::from("dados/Base.csv"));
        assert_eq!(config.reference.exceptions_path, PathBuf::from("Excecoes.xlsx"));
        assert_eq!(config.report.reversal_suffix.as_deref(), Some("-D"));
        assert!(!config.report.timestamped);
        assert_eq!(config.report.preview_rows, 5);
    }

    #[test]
    fn rejects_empty_prefix() {
        let err = AppConfig::from_toml_str("[report]\nfile_prefix = \" \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[report\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::discover(Some(&missing)),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
