//! Kula Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! defaults matching the conventional `data/` layout of a Kula project.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Annotation session settings
    pub annotation: AnnotationConfig,

    /// SpERT export settings
    pub export: ExportConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("KULA_DATA_DIR") {
            config.annotation.data_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("KULA_AUTO_SAVE") {
            config.annotation.auto_save = parse_bool("KULA_AUTO_SAVE", &value)?;
        }
        if let Ok(value) = std::env::var("KULA_UNDO_CAPACITY") {
            config.annotation.undo_capacity =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "KULA_UNDO_CAPACITY".to_string(),
                    value,
                })?;
        }
        if let Ok(value) = std::env::var("KULA_EXPORT_SEED") {
            config.export.seed = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "KULA_EXPORT_SEED".to_string(),
                value,
            })?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.annotation.data_dir != defaults.annotation.data_dir {
            self.annotation.data_dir = env_config.annotation.data_dir;
        }
        if env_config.annotation.undo_capacity != defaults.annotation.undo_capacity {
            self.annotation.undo_capacity = env_config.annotation.undo_capacity;
        }
        if env_config.export.seed != defaults.export.seed {
            self.export.seed = env_config.export.seed;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }

        // A boolean cannot be told apart from its default, so read it directly
        if let Ok(value) = std::env::var("KULA_AUTO_SAVE") {
            self.annotation.auto_save = parse_bool("KULA_AUTO_SAVE", &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.export.train_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "export.train_ratio".to_string(),
                value: self.export.train_ratio.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Annotation session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Root of the data layout
    pub data_dir: PathBuf,

    /// Candidate files, relative to `data_dir`
    pub candidate_dir: PathBuf,

    /// Annotated output files, relative to `data_dir`
    pub annotated_dir: PathBuf,

    /// Output file name used when none is given
    pub default_output: String,

    /// Persist saved records after every Save
    pub auto_save: bool,

    /// Number of undo steps kept
    pub undo_capacity: usize,

    /// Entity label suggestions
    pub entity_labels: Vec<String>,

    /// Relation suggestions
    pub relation_labels: Vec<String>,
}

impl AnnotationConfig {
    /// Absolute or `data_dir`-relative directory holding candidate files
    pub fn candidate_path(&self) -> PathBuf {
        self.data_dir.join(&self.candidate_dir)
    }

    /// Directory holding annotated output files
    pub fn annotated_path(&self) -> PathBuf {
        self.data_dir.join(&self.annotated_dir)
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            candidate_dir: PathBuf::from("csv_data"),
            annotated_dir: PathBuf::from("annotated_csv_data"),
            default_output: "edited_output.csv".to_string(),
            auto_save: true,
            undo_capacity: 50,
            entity_labels: ["PERSON", "ORG", "LOC", "EVENT", "DATE", "PRODUCT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            relation_labels: ["works_for", "lives_in", "part_of"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// SpERT export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory the JSON splits are written to
    pub out_dir: PathBuf,

    /// Shuffle seed for the train/dev/test split
    pub seed: u64,

    /// Share of documents in the training split
    pub train_ratio: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("data"),
            seed: 42,
            train_ratio: 0.8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
