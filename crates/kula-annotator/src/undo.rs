//! Undo history
//!
//! A bounded stack of full session snapshots. Pushing past capacity evicts
//! the oldest snapshot.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use kula_core::{KulaError, Result};

use crate::state::SessionState;

/// Default number of undo steps kept
pub const DEFAULT_UNDO_CAPACITY: usize = 50;

/// Copy of the session state taken right before a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoSnapshot {
    pub state: SessionState,
    pub taken_at: DateTime<Utc>,
}

impl UndoSnapshot {
    /// Snapshot the given state now
    pub fn of(state: &SessionState) -> Self {
        Self {
            state: state.clone(),
            taken_at: Utc::now(),
        }
    }
}

/// Bounded LIFO of snapshots
#[derive(Debug, Clone)]
pub struct UndoStack {
    snapshots: VecDeque<UndoSnapshot>,
    capacity: usize,
}

impl UndoStack {
    /// Create a stack holding at most `capacity` snapshots (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a snapshot, returning the evicted oldest one if the stack was full
    pub fn push(&mut self, snapshot: UndoSnapshot) -> Option<UndoSnapshot> {
        self.snapshots.push_back(snapshot);
        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        }
    }

    /// Remove and return the most recent snapshot
    pub fn pop(&mut self) -> Result<UndoSnapshot> {
        self.snapshots.pop_back().ok_or(KulaError::NoHistory)
    }

    /// Most recent snapshot, if any
    pub fn peek(&self) -> Option<&UndoSnapshot> {
        self.snapshots.back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(cursor: usize) -> SessionState {
        (0..cursor).fold(SessionState::default(), |s, _| s.with_skipped().advanced())
    }

    #[test]
    fn test_pop_returns_most_recent() {
        let mut stack = UndoStack::new(5);
        stack.push(UndoSnapshot::of(&state_at(0)));
        stack.push(UndoSnapshot::of(&state_at(1)));

        assert_eq!(stack.pop().unwrap().state, state_at(1));
        assert_eq!(stack.pop().unwrap().state, state_at(0));
        assert!(matches!(stack.pop(), Err(KulaError::NoHistory)));
    }

    #[test]
    fn test_push_beyond_capacity_evicts_oldest() {
        let mut stack = UndoStack::new(3);
        for cursor in 0..3 {
            assert!(stack.push(UndoSnapshot::of(&state_at(cursor))).is_none());
        }

        let evicted = stack.push(UndoSnapshot::of(&state_at(3))).unwrap();
        assert_eq!(evicted.state, state_at(0));
        assert_eq!(stack.len(), 3);

        let restored: Vec<usize> = std::iter::from_fn(|| stack.pop().ok())
            .map(|s| s.state.cursor())
            .collect();
        assert_eq!(restored, vec![3, 2, 1]);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut stack = UndoStack::new(0);
        assert_eq!(stack.capacity(), 1);
        stack.push(UndoSnapshot::of(&state_at(0)));
        stack.push(UndoSnapshot::of(&state_at(1)));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.peek().unwrap().state.cursor(), 1);
    }

    #[test]
    fn test_clear() {
        let mut stack = UndoStack::default();
        stack.push(UndoSnapshot::of(&state_at(2)));
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), DEFAULT_UNDO_CAPACITY);
    }
}
