//! In-memory driver.
//!
//! Used by tests and embedders that need no durable storage. It counts writes
//! per key and can be told to fail writes to a key, which makes the ordering
//! of dependent writes observable.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BackendKind, KvDriver};
use crate::error::{PersistenceError, Result};

#[derive(Default)]
struct State {
    entries: BTreeMap<String, Value>,
    writes: HashMap<String, usize>,
    deletes: HashMap<String, usize>,
    failing: HashSet<String>,
}

/// Driver keeping every value in a map
#[derive(Default)]
pub struct MemoryDriver {
    state: Mutex<State>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value directly, bypassing counters and injected failures
    pub fn seed(&self, key: impl Into<String>, value: Value) {
        self.state().entries.insert(key.into(), value);
    }

    /// Current value of a key, without counting as a read
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.state().entries.get(key).cloned()
    }

    /// Number of `set` calls that reached `key`
    pub fn writes_to(&self, key: &str) -> usize {
        self.state().writes.get(key).copied().unwrap_or_default()
    }

    /// Number of `set` calls across all keys
    pub fn total_writes(&self) -> usize {
        self.state().writes.values().sum()
    }

    /// Number of `delete` calls that removed `key`
    pub fn deletes_of(&self, key: &str) -> usize {
        self.state().deletes.get(key).copied().unwrap_or_default()
    }

    /// Make every later `set` on `key` fail
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        self.state().failing.insert(key.into());
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }
}

#[async_trait]
impl KvDriver for MemoryDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let mut state = self.state();
        if state.failing.contains(key) {
            return Err(PersistenceError::Io(io::Error::other(format!(
                "injected write failure for {key}"
            ))));
        }

        *state.writes.entry(key.to_string()).or_default() += 1;
        state.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.state();
        let removed = state.entries.remove(key).is_some();
        if removed {
            *state.deletes.entry(key.to_string()).or_default() += 1;
        }
        Ok(removed)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
