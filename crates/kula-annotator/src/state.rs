//! Session state as a single value type
//!
//! Every mutation of a session is a pure transition from one `SessionState`
//! to the next. Undo snapshots are plain copies, so comparing two states is
//! a structural `==`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use kula_core::{AnnotatedRecord, Record};
use serde::{Deserialize, Serialize};

/// Cursor position and review decisions of one session
///
/// `processed` always equals the saved indices plus `skipped`, and no index
/// is both saved and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    cursor: usize,
    saved: Vec<AnnotatedRecord>,
    skipped: BTreeSet<usize>,
    processed: BTreeSet<usize>,
}

impl SessionState {
    /// Index of the record under review
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Saved records, in save order
    pub fn saved(&self) -> &[AnnotatedRecord] {
        &self.saved
    }

    pub fn skipped(&self) -> &BTreeSet<usize> {
        &self.skipped
    }

    pub fn processed(&self) -> &BTreeSet<usize> {
        &self.processed
    }

    /// Original indices of the saved records
    pub fn saved_indices(&self) -> BTreeSet<usize> {
        self.saved.iter().map(|a| a.original_index).collect()
    }

    /// Record the edits for the current index as saved
    pub fn with_saved(mut self, edits: Record, edited_at: DateTime<Utc>) -> Self {
        let index = self.cursor;
        self.saved.push(AnnotatedRecord::new(edits, index, edited_at));
        self.processed.insert(index);
        self
    }

    /// Mark the current index as skipped
    pub fn with_skipped(mut self) -> Self {
        self.skipped.insert(self.cursor);
        self.processed.insert(self.cursor);
        self
    }

    /// Move the cursor to the next record
    pub fn advanced(mut self) -> Self {
        self.cursor += 1;
        self
    }

    /// Saved records without bookkeeping fields
    pub fn projected(&self) -> Vec<Record> {
        self.saved.iter().map(AnnotatedRecord::project).collect()
    }

    /// Indices below `total` that have not been decided, in order
    pub fn unprocessed(&self, total: usize) -> Vec<usize> {
        (0..total).filter(|i| !self.processed.contains(i)).collect()
    }

    /// Check the processed/saved/skipped invariant
    pub fn is_consistent(&self) -> bool {
        let saved = self.saved_indices();
        saved.len() == self.saved.len()
            && saved.is_disjoint(&self.skipped)
            && saved.union(&self.skipped).copied().collect::<BTreeSet<_>>() == self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_keep_invariant() {
        let state = SessionState::default()
            .with_saved(Record::new("r0"), Utc::now())
            .advanced()
            .with_skipped()
            .advanced();

        assert_eq!(state.cursor(), 2);
        assert_eq!(state.saved_indices(), BTreeSet::from([0]));
        assert_eq!(state.skipped(), &BTreeSet::from([1]));
        assert!(state.is_consistent());
        assert_eq!(state.unprocessed(4), vec![2, 3]);
    }

    #[test]
    fn test_transition_leaves_original_untouched() {
        let before = SessionState::default();
        let after = before.clone().with_skipped().advanced();

        assert_eq!(before, SessionState::default());
        assert_ne!(before, after);
    }

    #[test]
    fn test_inconsistent_state_detected() {
        let state = SessionState::default()
            .with_saved(Record::new("r0"), Utc::now())
            .with_skipped();
        assert!(!state.is_consistent());
    }
}
