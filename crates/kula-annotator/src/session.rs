//! Annotation session
//!
//! Walks a reviewer through a loaded candidate table one record at a time.
//! Each record is either saved (with the reviewer's edits) or skipped. Saves
//! can be persisted as they happen, every mutation can be undone, and
//! `finish` writes the approved records out and rewrites the candidate
//! source so it only holds the records nobody has decided on yet.

use chrono::Utc;
use kula_core::{AnnotationConfig, KulaError, Record, RecordStore, Result, Status, Table};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::SessionState;
use crate::undo::{UndoSnapshot, UndoStack};

// ============================================================================
// Phase and Summary
// ============================================================================

/// Lifecycle phase of a session
///
/// `Editing` covers both "records left" and "done" (`cursor == total`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No source loaded, or the last load failed
    Uninitialized,
    /// A source is loaded
    Editing,
    /// `finish` completed; only `finish` may run again
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Editing => write!(f, "editing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Counts reported when a session finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub saved_count: usize,
    pub skipped_count: usize,
    pub remaining_count: usize,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} saved, {} skipped, {} remaining",
            self.saved_count, self.skipped_count, self.remaining_count
        )
    }
}

// ============================================================================
// Annotation Session
// ============================================================================

/// Record-by-record review of a candidate source
pub struct AnnotationSession<S: RecordStore> {
    id: Uuid,
    store: S,
    output_id: String,
    auto_save: bool,
    source_id: Option<String>,
    source_table: Table,
    source: Vec<Record>,
    state: SessionState,
    history: UndoStack,
    dirty: bool,
    write_error: Option<KulaError>,
    phase: SessionPhase,
}

impl<S: RecordStore> AnnotationSession<S> {
    /// Create an empty session writing approved records to `output_id`
    pub fn new(store: S, output_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            store,
            output_id: output_id.into(),
            auto_save: true,
            source_id: None,
            source_table: Table::default(),
            source: Vec::new(),
            state: SessionState::default(),
            history: UndoStack::default(),
            dirty: false,
            write_error: None,
            phase: SessionPhase::Uninitialized,
        }
    }

    /// Create a session using the annotation settings from config
    pub fn from_config(store: S, config: &AnnotationConfig, output_id: impl Into<String>) -> Self {
        Self::new(store, output_id)
            .with_auto_save(config.auto_save)
            .with_undo_capacity(config.undo_capacity)
    }

    /// Enable or disable writing the output after every save
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    /// Set how many undo steps are kept
    pub fn with_undo_capacity(mut self, capacity: usize) -> Self {
        self.history = UndoStack::new(capacity);
        self
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Load a candidate source, discarding all previous progress
    ///
    /// On failure the session is left empty and Save/Skip report `NotReady`
    /// until a later load succeeds.
    pub fn load(&mut self, source_id: &str) -> Result<Status> {
        if self.phase == SessionPhase::Closed {
            return Err(KulaError::SessionClosed);
        }

        self.state = SessionState::default();
        self.history.clear();
        self.dirty = false;
        self.write_error = None;

        let loaded = self.store.load(source_id).and_then(|table| {
            let records = table.to_records(source_id)?;
            Ok((table, records))
        });

        match loaded {
            Ok((table, records)) => {
                self.source_id = Some(source_id.to_string());
                self.source_table = table;
                self.source = records;
                self.phase = SessionPhase::Editing;

                tracing::info!(
                    session = %self.id,
                    store = self.store.name(),
                    "Loaded {} candidates from {}",
                    self.source.len(),
                    source_id
                );
                Ok(Status::info(format!(
                    "Loaded {} sentences for editing",
                    self.source.len()
                )))
            }
            Err(e) => {
                self.source_id = None;
                self.source_table = Table::default();
                self.source.clear();
                self.phase = SessionPhase::Uninitialized;

                tracing::warn!(session = %self.id, "Failed to load {}: {}", source_id, e);
                Err(e)
            }
        }
    }

    /// Approve the current record with the reviewer's edits and move on
    ///
    /// A failed auto-save does not undo the save: the record stays in memory,
    /// the session is marked dirty, and the next write retries it. The
    /// returned status has `Severity::Error` and the store's error is kept
    /// in [`last_write_error`](Self::last_write_error).
    pub fn save(&mut self, edits: Record) -> Result<Status> {
        self.ensure_current()?;
        let index = self.state.cursor();

        self.history.push(UndoSnapshot::of(&self.state));
        self.state = std::mem::take(&mut self.state).with_saved(edits, Utc::now());

        let status = if self.auto_save {
            match self.write_output() {
                Ok(()) => Status::info(format!(
                    "Sentence {} saved to {}",
                    index + 1,
                    self.output_id
                )),
                Err(e) => {
                    tracing::warn!(session = %self.id, "Auto-save failed: {}", e);
                    Status::error(format!("Sentence {} kept in memory; {}", index + 1, e))
                }
            }
        } else {
            self.dirty = true;
            Status::info(format!("Sentence {} saved", index + 1))
        };

        self.state = std::mem::take(&mut self.state).advanced();
        tracing::debug!(session = %self.id, "Saved candidate {}", index);
        Ok(status)
    }

    /// Skip the current record and move on; nothing is written
    pub fn skip(&mut self) -> Result<Status> {
        self.ensure_current()?;
        let index = self.state.cursor();

        self.history.push(UndoSnapshot::of(&self.state));
        self.state = std::mem::take(&mut self.state).with_skipped().advanced();

        tracing::debug!(session = %self.id, "Skipped candidate {}", index);
        Ok(Status::info(format!("Sentence {} skipped", index + 1)))
    }

    /// Restore the state from before the last Save or Skip
    ///
    /// Files written by earlier auto-saves are left as they are until the
    /// next write.
    pub fn undo(&mut self) -> Result<Status> {
        if self.phase == SessionPhase::Closed {
            return Err(KulaError::SessionClosed);
        }

        let snapshot = self.history.pop()?;
        if snapshot.state.saved() != self.state.saved() {
            self.dirty = true;
        }
        self.state = snapshot.state;

        tracing::debug!(session = %self.id, "Undo to cursor {}", self.state.cursor());
        Ok(Status::info(format!(
            "Undone; back at sentence {} of {}",
            self.state.cursor() + 1,
            self.source.len()
        )))
    }

    /// Write the saved records to the output now
    pub fn flush(&mut self) -> Result<Status> {
        self.ensure_ready()?;
        self.write_output()?;
        Ok(Status::info(format!(
            "Wrote {} sentences to {}",
            self.state.saved().len(),
            self.output_id
        )))
    }

    /// Commit the output, rewrite the source with the undecided records, and close
    ///
    /// Safe to call again after it succeeded: the same files are rewritten
    /// and the same summary is returned. A write failure leaves the session
    /// open so the call can be retried.
    pub fn finish(&mut self) -> Result<SessionSummary> {
        let source_id = match (self.phase, &self.source_id) {
            (SessionPhase::Uninitialized, _) | (_, None) => return Err(KulaError::NotReady),
            (_, Some(id)) => id.clone(),
        };

        self.write_output()?;

        let remaining = self.remaining_table();
        self.store.save(&remaining, &source_id)?;

        let summary = self.summary();
        self.phase = SessionPhase::Closed;

        tracing::info!(
            session = %self.id,
            "Finished {}: {}; {} rows left in {}",
            self.output_id,
            summary,
            remaining.num_rows(),
            source_id
        );
        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    pub fn auto_save(&self) -> bool {
        self.auto_save
    }

    /// Records as loaded from the source
    pub fn source(&self) -> &[Record] {
        &self.source
    }

    pub fn total(&self) -> usize {
        self.source.len()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Record under review, if any
    pub fn current(&self) -> Option<&Record> {
        match self.phase {
            SessionPhase::Editing => self.source.get(self.state.cursor()),
            _ => None,
        }
    }

    /// `(cursor, total)`
    pub fn position(&self) -> (usize, usize) {
        (self.state.cursor(), self.source.len())
    }

    /// No record is left to review
    pub fn is_done(&self) -> bool {
        self.state.cursor() >= self.source.len()
    }

    /// The output may not match the saved records in memory
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Error from the most recent output write, cleared once a write succeeds
    pub fn last_write_error(&self) -> Option<&KulaError> {
        self.write_error.as_ref()
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn summary(&self) -> SessionSummary {
        let state = &self.state;
        SessionSummary {
            saved_count: state.saved().len(),
            skipped_count: state.skipped().len(),
            remaining_count: self.source.len() - state.processed().len(),
        }
    }

    /// Source rows not yet saved or skipped, with the source's own columns
    pub fn remaining_table(&self) -> Table {
        self.source_table.select(self.state.unprocessed(self.source.len()))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn ensure_ready(&self) -> Result<()> {
        match self.phase {
            SessionPhase::Uninitialized => Err(KulaError::NotReady),
            SessionPhase::Closed => Err(KulaError::SessionClosed),
            SessionPhase::Editing => Ok(()),
        }
    }

    fn ensure_current(&self) -> Result<()> {
        self.ensure_ready()?;
        let (cursor, total) = self.position();
        if cursor < total {
            Ok(())
        } else {
            Err(KulaError::OutOfRange { cursor, total })
        }
    }

    fn write_output(&mut self) -> Result<()> {
        let projected = self.state.projected();
        match self.store.save(&Table::from_records(&projected), &self.output_id) {
            Ok(()) => {
                self.dirty = false;
                self.write_error = None;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                self.write_error = Some(match &e {
                    KulaError::StoreWriteFailed {
                        destination,
                        message,
                    } => KulaError::write_failed(destination.clone(), message),
                    other => KulaError::write_failed(self.output_id.clone(), other),
                });
                Err(e)
            }
        }
    }
}

impl<S: RecordStore> std::fmt::Debug for AnnotationSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationSession")
            .field("id", &self.id)
            .field("store", &self.store.name())
            .field("source_id", &self.source_id)
            .field("output_id", &self.output_id)
            .field("phase", &self.phase)
            .field("cursor", &self.state.cursor())
            .field("total", &self.source.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
