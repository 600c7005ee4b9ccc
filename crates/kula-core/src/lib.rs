//! Kula Core - Record types, store traits, and shared errors
//!
//! This crate defines the core abstractions used throughout Kula:
//! - Candidate and annotated record models
//! - The tabular `Table` exchanged with record stores
//! - The `RecordStore` trait consumed by the annotation session
//! - Common error types and user-facing status messages
//! - Configuration management

pub mod config;
pub mod table;

pub use config::{AnnotationConfig, AppConfig, ConfigError, ExportConfig, LoggingConfig};
pub use table::{Table, RECORD_COLUMNS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Kula operations
#[derive(Error, Debug)]
pub enum KulaError {
    #[error("Record source not found: {0}")]
    StoreNotFound(String),

    #[error("Schema error in {source_id}: {message}")]
    SchemaError { source_id: String, message: String },

    #[error("Failed to write {destination}: {message}")]
    StoreWriteFailed {
        destination: String,
        message: String,
    },

    #[error("No current record (cursor {cursor} of {total})")]
    OutOfRange { cursor: usize, total: usize },

    #[error("Nothing to undo")]
    NoHistory,

    #[error("No candidate source is loaded")]
    NotReady,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Export error: {0}")]
    Export(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KulaError {
    /// Whether the session can keep going after this error
    ///
    /// Load failures and write failures leave the session usable; only a
    /// closed session is a dead end.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SessionClosed | Self::Other(_))
    }

    /// Build a schema error for a source
    pub fn schema(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaError {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Build a write failure for a destination
    pub fn write_failed(destination: impl Into<String>, message: impl ToString) -> Self {
        Self::StoreWriteFailed {
            destination: destination.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KulaError>;

// ============================================================================
// Records
// ============================================================================

/// A candidate or annotation row
///
/// Every field defaults to an empty string. Records are never edited in
/// place: the `with_*` builders return a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub sentence: String,
    pub entity1: String,
    pub entity1_label: String,
    pub entity2: String,
    pub entity2_label: String,
    pub relation: String,
}

impl Record {
    /// Create a record holding only a sentence
    pub fn new(sentence: impl Into<String>) -> Self {
        Self {
            sentence: sentence.into(),
            ..Default::default()
        }
    }

    /// Set the first entity and its label
    pub fn with_entity1(mut self, text: impl Into<String>, label: impl Into<String>) -> Self {
        self.entity1 = text.into();
        self.entity1_label = label.into();
        self
    }

    /// Set the second entity and its label
    pub fn with_entity2(mut self, text: impl Into<String>, label: impl Into<String>) -> Self {
        self.entity2 = text.into();
        self.entity2_label = label.into();
        self
    }

    /// Set the relation
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }

    /// Field values in `RECORD_COLUMNS` order
    pub fn values(&self) -> [&str; 6] {
        [
            &self.sentence,
            &self.entity1,
            &self.entity1_label,
            &self.entity2,
            &self.entity2_label,
            &self.relation,
        ]
    }

    /// Look up a field by column name
    pub fn field(&self, name: &str) -> Option<&str> {
        RECORD_COLUMNS
            .iter()
            .position(|c| *c == name)
            .map(|i| self.values()[i])
    }

    /// Return a copy with one field replaced
    ///
    /// Returns `None` for an unknown field name.
    pub fn with_field(&self, name: &str, value: impl Into<String>) -> Option<Self> {
        let mut next = self.clone();
        let slot = match name {
            "sentence" => &mut next.sentence,
            "entity1" => &mut next.entity1,
            "entity1_label" => &mut next.entity1_label,
            "entity2" => &mut next.entity2,
            "entity2_label" => &mut next.entity2_label,
            "relation" => &mut next.relation,
            _ => return None,
        };
        *slot = value.into();
        Some(next)
    }
}

/// A record approved by a reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    pub record: Record,

    /// Position of the candidate in the loaded source
    pub original_index: usize,

    pub edited_at: DateTime<Utc>,
}

impl AnnotatedRecord {
    pub fn new(record: Record, original_index: usize, edited_at: DateTime<Utc>) -> Self {
        Self {
            record,
            original_index,
            edited_at,
        }
    }

    /// Strip the bookkeeping fields, leaving the six record columns
    pub fn project(&self) -> Record {
        self.record.clone()
    }
}

// ============================================================================
// Status Messages
// ============================================================================

/// Severity of a status message shown to the reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Information => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Short outcome message reported by every session operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub severity: Severity,
    pub message: String,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Information,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl From<&KulaError> for Status {
    fn from(err: &KulaError) -> Self {
        match err {
            KulaError::OutOfRange { .. } => Self::warning("No more sentences to edit"),
            KulaError::NoHistory => Self::warning(err.to_string()),
            KulaError::NotReady => Self::warning("Load a candidate file first"),
            _ => Self::error(err.to_string()),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Tabular storage for candidate and annotated records
///
/// Ids are opaque to the session; each store decides how they map onto
/// files or keys.
pub trait RecordStore: Send + Sync {
    /// Load a table
    ///
    /// Fails with `StoreNotFound` when the id does not exist and with
    /// `SchemaError` when the content cannot be read as string cells.
    fn load(&self, source_id: &str) -> Result<Table>;

    /// Overwrite a destination with the full table, header included
    fn save(&self, table: &Table, destination_id: &str) -> Result<()>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn load(&self, source_id: &str) -> Result<Table> {
        (**self).load(source_id)
    }

    fn save(&self, table: &Table, destination_id: &str) -> Result<()> {
        (**self).save(table, destination_id)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Tests
// ============================================================================
