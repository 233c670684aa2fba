//! Durable key -> entry storage behind the resource store
//!
//! Backends only need atomic point writes and a full scan at startup; the
//! store keeps the working set in memory.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Persisted form of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Last committed checkpoint, opaque to the store
    pub cursor: Value,

    /// Last time the resource was touched
    pub updated: DateTime<Utc>,

    /// Reap eligibility window after release, in milliseconds
    pub ttl_ms: u64,
}

impl Entry {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Durable storage for resource entries
pub trait Backend: Send + Sync {
    /// Read every stored entry
    fn load_all(&self) -> Result<Vec<(String, Entry)>>;

    /// Atomically replace the entry for `key`
    fn put(&self, key: &str, entry: &Entry) -> Result<()>;

    /// Delete the entry for `key`; missing keys are not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile backend, mainly for tests and agents without a data directory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one entry
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Backend for MemoryBackend {
    fn load_all(&self) -> Result<Vec<(String, Entry)>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn put(&self, key: &str, entry: &Entry) -> Result<()> {
        self.entries.lock().insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
