//! UpdateOp - a staged checkpoint waiting for delivery confirmation

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use statestore::{Resource, ResourceKey, Store};
use tracing::trace;

use crate::error::Result;
use crate::metrics::InputMetrics;

/// Staged checkpoint travelling with an event as private metadata
///
/// Holds one pending slot on its resource until executed or dropped, which
/// keeps the resource from being reaped while the event is in flight.
pub struct UpdateOp {
    store: Arc<Store>,
    resource: Arc<Resource>,
    metrics: Arc<InputMetrics>,
    seq: u64,
    position: Value,
}

impl UpdateOp {
    pub(crate) fn new(
        store: Arc<Store>,
        resource: Arc<Resource>,
        metrics: Arc<InputMetrics>,
        position: Value,
    ) -> Self {
        let seq = store.begin_update(&resource);
        Self {
            store,
            resource,
            metrics,
            seq,
            position,
        }
    }

    /// Position in staging order on this resource
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn position(&self) -> &Value {
        &self.position
    }

    pub fn key(&self) -> &ResourceKey {
        self.resource.key()
    }

    /// Commit this position, superseding `n - 1` earlier confirmed updates
    ///
    /// Returns `Ok(false)` if a newer position was already committed.
    pub fn execute(mut self, n: u64) -> Result<bool> {
        let position = self.position.take();
        let committed = self
            .store
            .commit_staged(&self.resource, self.seq, position)?;
        if committed {
            self.metrics.record_commit(n.saturating_sub(1));
        } else {
            trace!(key = %self.resource.key(), seq = self.seq, "update already superseded");
        }
        Ok(committed)
    }
}

impl Drop for UpdateOp {
    fn drop(&mut self) {
        self.store.finish_update(&self.resource);
    }
}

impl fmt::Debug for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOp")
            .field("key", self.resource.key())
            .field("seq", &self.seq)
            .field("position", &self.position)
            .finish()
    }
}
