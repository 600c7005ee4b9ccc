//! Thread-safe session handle
//!
//! Wraps an `AnnotationSession` so a front end can run operations off its
//! interactive thread. Each operation holds the lock from start to end, so
//! mutations are serialized and readers see either the state before a
//! mutation or the state after it.

use std::sync::{Arc, Mutex, MutexGuard};

use kula_core::{KulaError, Record, RecordStore, Result, Status};

use crate::session::{AnnotationSession, SessionPhase, SessionSummary};
use crate::state::SessionState;

/// Cloneable handle to one annotation session
pub struct SharedSession<S: RecordStore> {
    inner: Arc<Mutex<AnnotationSession<S>>>,
}

impl<S: RecordStore> Clone for SharedSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RecordStore + 'static> SharedSession<S> {
    pub fn new(session: AnnotationSession<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AnnotationSession<S>>> {
        self.inner
            .lock()
            .map_err(|_| KulaError::Other(anyhow::anyhow!("session lock poisoned")))
    }

    /// Run `f` with exclusive access to the session
    pub fn with<T>(&self, f: impl FnOnce(&mut AnnotationSession<S>) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        f(&mut guard)
    }

    pub fn load(&self, source_id: &str) -> Result<Status> {
        self.with(|s| s.load(source_id))
    }

    pub fn save(&self, edits: Record) -> Result<Status> {
        self.with(|s| s.save(edits))
    }

    pub fn skip(&self) -> Result<Status> {
        self.with(|s| s.skip())
    }

    pub fn undo(&self) -> Result<Status> {
        self.with(|s| s.undo())
    }

    pub fn flush(&self) -> Result<Status> {
        self.with(|s| s.flush())
    }

    pub fn finish(&self) -> Result<SessionSummary> {
        self.with(|s| s.finish())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn current(&self) -> Result<Option<Record>> {
        self.with(|s| Ok(s.current().cloned()))
    }

    pub fn position(&self) -> Result<(usize, usize)> {
        self.with(|s| Ok(s.position()))
    }

    pub fn summary(&self) -> Result<SessionSummary> {
        self.with(|s| Ok(s.summary()))
    }

    pub fn phase(&self) -> Result<SessionPhase> {
        self.with(|s| Ok(s.phase()))
    }

    /// Copy of the current state
    pub fn state(&self) -> Result<SessionState> {
        self.with(|s| Ok(s.state().clone()))
    }

    // ------------------------------------------------------------------------
    // Async
    // ------------------------------------------------------------------------

    /// Run `f` on the blocking pool with exclusive access to the session
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut AnnotationSession<S>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.with(f))
            .await
            .map_err(|e| KulaError::Other(anyhow::Error::from(e)))?
    }

    pub async fn load_async(&self, source_id: impl Into<String>) -> Result<Status> {
        let source_id = source_id.into();
        self.run_blocking(move |s| s.load(&source_id)).await
    }

    pub async fn save_async(&self, edits: Record) -> Result<Status> {
        self.run_blocking(move |s| s.save(edits)).await
    }

    pub async fn skip_async(&self) -> Result<Status> {
        self.run_blocking(|s| s.skip()).await
    }

    pub async fn undo_async(&self) -> Result<Status> {
        self.run_blocking(|s| s.undo()).await
    }

    pub async fn finish_async(&self) -> Result<SessionSummary> {
        self.run_blocking(|s| s.finish()).await
    }
}
