//! Store - concurrency-safe registry of resources
//!
//! Resources live in a sharded map keyed by [`ResourceKey`]; each resource
//! carries its own lock so unrelated sources never contend. Persisted entries
//! are written through to the [`Backend`] on commit and release.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::backend::{Backend, MemoryBackend};
use crate::error::{Result, StoreError};
use crate::key::ResourceKey;
use crate::resource::{Resource, ResourceState};

/// Resource lock store
pub struct Store {
    backend: Arc<dyn Backend>,
    resources: DashMap<ResourceKey, Arc<Resource>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl Store {
    /// Open a store over `backend`, loading every persisted entry
    #[instrument(name = "store_open", skip(backend))]
    pub fn open(backend: Arc<dyn Backend>) -> Result<Self> {
        let resources = DashMap::new();
        for (raw, entry) in backend.load_all()? {
            let key = ResourceKey::from_raw(&raw);
            resources.insert(key.clone(), Arc::new(Resource::from_entry(key, entry)));
        }
        info!(resources = resources.len(), "resource store opened");
        Ok(Self { backend, resources })
    }

    /// Store backed by a fresh [`MemoryBackend`]
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            resources: DashMap::new(),
        }
    }

    /// Number of resources currently known
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// Look up a resource without creating it
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<Resource>> {
        self.resources.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Last committed checkpoint for `key`, if the resource exists
    pub fn checkpoint(&self, key: &ResourceKey) -> Option<Value> {
        self.get(key).map(|r| r.cursor())
    }

    fn find_or_create(&self, key: &ResourceKey) -> Arc<Resource> {
        let entry = self
            .resources
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Resource::new(key.clone())));
        Arc::clone(entry.value())
    }

    /// Acquire exclusive access to the resource for `key`
    ///
    /// Waits until the current holder releases it or `cancel` fires. Waiters
    /// are served in arrival order. The returned guard releases the lock when
    /// dropped, including during unwinding.
    #[instrument(name = "store_lock", skip(self, cancel), fields(key = %key))]
    pub async fn lock(
        self: &Arc<Self>,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ResourceGuard> {
        loop {
            let resource = self.find_or_create(key);
            let lock = Arc::clone(&resource.lock);

            let guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StoreError::Cancelled { key: key.to_string() });
                }
                guard = lock.lock_owned() => guard,
            };

            // Reaped or removed while we were queued; retry against the live entry.
            if resource.is_removed() {
                trace!("resource removed while waiting, retrying lookup");
                drop(guard);
                continue;
            }

            resource.set_locked(true);
            resource.touch();
            debug!("resource locked");
            return Ok(ResourceGuard {
                store: Arc::clone(self),
                resource,
                guard: Some(guard),
            });
        }
    }

    /// Release a held resource; equivalent to dropping the guard
    pub fn release(&self, guard: ResourceGuard) {
        guard.release();
    }

    fn release_resource(&self, resource: &Resource) {
        let mut state = resource.state();
        state.updated = Utc::now();
        if state.stored {
            let entry = Resource::to_entry(&state);
            if let Err(e) = self.backend.put(resource.key().as_str(), &entry) {
                warn!(key = %resource.key(), error = %e, "failed to persist resource on release");
            }
        }
        drop(state);
        resource.set_locked(false);
        debug!(key = %resource.key(), "resource released");
    }

    /// Set how long the resource survives after release without being touched
    pub fn update_ttl(&self, resource: &Resource, ttl: Duration) {
        let mut state = resource.state();
        state.ttl = ttl;
        if state.stored {
            let entry = Resource::to_entry(&state);
            if let Err(e) = self.backend.put(resource.key().as_str(), &entry) {
                warn!(key = %resource.key(), error = %e, "failed to persist ttl update");
            }
        }
    }

    /// Durably persist `payload` as the resource's checkpoint
    ///
    /// The in-memory checkpoint only changes after the backend write
    /// succeeds; readers observe either the old or the new value.
    pub fn commit_checkpoint(&self, resource: &Resource, payload: Value) -> Result<()> {
        let mut state = resource.state();
        self.write_checkpoint(resource, &mut state, payload)
    }

    /// Commit the checkpoint of staged update `seq`
    ///
    /// Returns `Ok(false)` without touching persisted state when a newer or
    /// equal update was already committed. The sequence check, the backend
    /// write and the sequence bump happen under one state lock.
    pub fn commit_staged(&self, resource: &Resource, seq: u64, payload: Value) -> Result<bool> {
        let mut state = resource.state();
        if state.committed_seq >= seq {
            trace!(key = %resource.key(), seq, "superseded update ignored");
            return Ok(false);
        }
        self.write_checkpoint(resource, &mut state, payload)?;
        state.committed_seq = seq;
        Ok(true)
    }

    fn write_checkpoint(
        &self,
        resource: &Resource,
        state: &mut ResourceState,
        payload: Value,
    ) -> Result<()> {
        let updated = Utc::now();
        let entry = crate::backend::Entry {
            cursor: payload,
            updated,
            ttl_ms: u64::try_from(state.ttl.as_millis()).unwrap_or(u64::MAX),
        };
        self.backend.put(resource.key().as_str(), &entry)?;
        state.cursor = entry.cursor;
        state.updated = updated;
        state.stored = true;
        metrics::counter!("ingest_registry_commits_total").increment(1);
        Ok(())
    }

    /// Reserve a pending slot for a new staged update; returns its sequence
    pub fn begin_update(&self, resource: &Resource) -> u64 {
        resource.begin_update()
    }

    /// Release the pending slot of an executed or discarded update
    pub fn finish_update(&self, resource: &Resource) {
        resource.finish_update();
    }

    /// Delete an unlocked resource and its persisted entry
    ///
    /// Returns `Ok(false)` if the key is unknown.
    #[instrument(name = "store_remove", skip(self), fields(key = %key))]
    pub fn remove(&self, key: &ResourceKey) -> Result<bool> {
        let Some(resource) = self.get(key) else {
            return Ok(false);
        };
        let Ok(_held) = resource.lock.try_lock() else {
            return Err(StoreError::ResourceLocked {
                key: key.to_string(),
            });
        };
        resource.state().removed = true;
        self.resources
            .remove_if(key, |_, current| Arc::ptr_eq(current, &resource));
        self.backend.remove(key.as_str())?;
        info!("resource removed");
        Ok(true)
    }

    /// Remove every unlocked resource without pending updates whose TTL
    /// elapsed since it was last touched. Returns the number removed.
    pub fn reap(&self) -> usize {
        let now = Utc::now();
        let candidates: Vec<Arc<Resource>> = self
            .resources
            .iter()
            .filter(|r| !r.value().is_locked())
            .map(|r| Arc::clone(r.value()))
            .collect();

        let mut removed = 0;
        for resource in candidates {
            // Holding the mutex keeps workers out while we decide.
            let Ok(_held) = resource.lock.try_lock() else {
                continue;
            };
            if resource.pending() > 0 {
                continue;
            }
            {
                let mut state = resource.state();
                if !state.is_expired(now) {
                    continue;
                }
                state.removed = true;
            }
            let key = resource.key().clone();
            self.resources
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &resource));
            if let Err(e) = self.backend.remove(key.as_str()) {
                warn!(key = %key, error = %e, "failed to delete reaped entry");
            }
            debug!(key = %key, "stale resource reaped");
            removed += 1;
        }

        if removed > 0 {
            metrics::counter!("ingest_registry_reaped_total").increment(removed as u64);
            info!(removed, remaining = self.resources.len(), "registry reaper pass");
        }
        removed
    }

    /// Run [`reap`](Self::reap) every `interval` until `cancel` fires
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "registry reaper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("registry reaper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        store.reap();
                    }
                }
            }
        })
    }
}

/// Exclusive hold on one resource
///
/// Dropping the guard releases the lock and refreshes the resource's
/// last-touched time.
pub struct ResourceGuard {
    store: Arc<Store>,
    resource: Arc<Resource>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceGuard {
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn key(&self) -> &ResourceKey {
        self.resource.key()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Release the lock now
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.store.release_resource(&self.resource);
            drop(guard);
        }
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("key", self.resource.key())
            .field("held", &self.guard.is_some())
            .finish()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
