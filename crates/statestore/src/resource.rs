//! Resource - in-memory record of one key's checkpoint, lock and TTL

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::Entry;
use crate::key::ResourceKey;

/// Shared state for one resource key
///
/// Workers never mutate a resource directly; all changes go through
/// [`Store`](crate::Store).
#[derive(Debug)]
pub struct Resource {
    key: ResourceKey,

    /// Exclusivity lock; tokio's mutex queues waiters in FIFO order
    pub(crate) lock: Arc<tokio::sync::Mutex<()>>,

    locked: AtomicBool,

    /// Staged update operations not yet executed or discarded
    pending: AtomicU64,

    /// Sequence number handed to the last staged update
    staged_seq: AtomicU64,

    state: Mutex<ResourceState>,
}

#[derive(Debug)]
pub(crate) struct ResourceState {
    pub(crate) cursor: Value,
    pub(crate) committed_seq: u64,
    pub(crate) updated: DateTime<Utc>,
    pub(crate) ttl: Duration,
    /// True once the entry exists in the backend
    pub(crate) stored: bool,
    /// Set by the reaper or explicit removal; lock waiters must look up again
    pub(crate) removed: bool,
}

impl Resource {
    pub(crate) fn new(key: ResourceKey) -> Self {
        Self::with_state(
            key,
            ResourceState {
                cursor: Value::Null,
                committed_seq: 0,
                updated: Utc::now(),
                ttl: Duration::ZERO,
                stored: false,
                removed: false,
            },
        )
    }

    pub(crate) fn from_entry(key: ResourceKey, entry: Entry) -> Self {
        let ttl = entry.ttl();
        Self::with_state(
            key,
            ResourceState {
                cursor: entry.cursor,
                committed_seq: 0,
                updated: entry.updated,
                ttl,
                stored: true,
                removed: false,
            },
        )
    }

    fn with_state(key: ResourceKey, state: ResourceState) -> Self {
        Self {
            key,
            lock: Arc::new(tokio::sync::Mutex::new(())),
            locked: AtomicBool::new(false),
            pending: AtomicU64::new(0),
            staged_seq: AtomicU64::new(0),
            state: Mutex::new(state),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Snapshot of the last committed checkpoint (`Null` if none)
    pub fn cursor(&self) -> Value {
        self.state.lock().cursor.clone()
    }

    /// True if no checkpoint was ever committed for this key
    pub fn is_new(&self) -> bool {
        self.state.lock().cursor.is_null()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.state.lock().updated
    }

    pub fn ttl(&self) -> Duration {
        self.state.lock().ttl
    }

    pub(crate) fn state(&self) -> parking_lot::MutexGuard<'_, ResourceState> {
        self.state.lock()
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Release);
    }

    pub(crate) fn touch(&self) {
        self.state.lock().updated = Utc::now();
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// Reserve a pending slot and return the new update's sequence number
    pub(crate) fn begin_update(&self) -> u64 {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.staged_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn finish_update(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn to_entry(state: &ResourceState) -> Entry {
        Entry {
            cursor: state.cursor.clone(),
            updated: state.updated,
            ttl_ms: u64::try_from(state.ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl ResourceState {
    /// Whether the TTL window since the last touch has elapsed at `now`
    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (now - self.updated).to_std() {
            Ok(elapsed) => elapsed >= self.ttl,
            Err(_) => false,
        }
    }
}
