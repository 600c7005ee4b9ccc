//! In-memory record store
//!
//! Thread-safe and cheap to clone. Writes can be made to fail on demand so
//! callers can exercise their recovery paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use kula_core::{KulaError, RecordStore, Result, Table};

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<HashMap<String, Table>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

/// Record store backed by a shared map of id to table
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a table under `id`, replacing any previous one
    pub fn insert(&self, id: impl Into<String>, table: Table) -> Result<()> {
        let mut tables = self.inner.tables.write().map_err(poisoned)?;
        tables.insert(id.into(), table);
        Ok(())
    }

    /// Current table under `id`
    pub fn get(&self, id: &str) -> Option<Table> {
        self.inner
            .tables
            .read()
            .ok()
            .and_then(|tables| tables.get(id).cloned())
    }

    /// Make subsequent saves fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> KulaError {
    KulaError::Other(anyhow::anyhow!("memory store lock poisoned"))
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, source_id: &str) -> Result<Table> {
        let tables = self.inner.tables.read().map_err(poisoned)?;
        tables
            .get(source_id)
            .cloned()
            .ok_or_else(|| KulaError::StoreNotFound(source_id.to_string()))
    }

    fn save(&self, table: &Table, destination_id: &str) -> Result<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(KulaError::write_failed(
                destination_id,
                "writes are disabled",
            ));
        }

        let mut tables = self.inner.tables.write().map_err(poisoned)?;
        tables.insert(destination_id.to_string(), table.clone());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
