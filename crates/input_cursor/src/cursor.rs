//! Cursor - a worker's view of its resource's checkpoint

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use statestore::{Resource, ResourceKey, Store};

use crate::error::Result;
use crate::metrics::InputMetrics;
use crate::update_op::UpdateOp;

/// Read committed checkpoints and stage new ones
///
/// Bound to a resource locked by the owning worker. Staging never changes
/// persisted state; only acknowledged updates are committed.
#[derive(Clone)]
pub struct Cursor {
    store: Arc<Store>,
    resource: Arc<Resource>,
    metrics: Arc<InputMetrics>,
}

impl Cursor {
    pub(crate) fn new(
        store: Arc<Store>,
        resource: Arc<Resource>,
        metrics: Arc<InputMetrics>,
    ) -> Self {
        Self {
            store,
            resource,
            metrics,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        self.resource.key()
    }

    /// True if nothing was ever committed for this source
    pub fn is_new(&self) -> bool {
        self.resource.is_new()
    }

    /// Last committed checkpoint; `Null` for a new source
    pub fn last_position(&self) -> Value {
        self.resource.cursor()
    }

    /// Decode the last committed checkpoint
    pub fn unpack<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.last_position() {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Stage `position` for commit once the events carrying it are acknowledged
    pub fn stage<T: Serialize + ?Sized>(&self, position: &T) -> Result<UpdateOp> {
        let position = serde_json::to_value(position)?;
        Ok(UpdateOp::new(
            Arc::clone(&self.store),
            Arc::clone(&self.resource),
            Arc::clone(&self.metrics),
            position,
        ))
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("key", self.resource.key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Offset {
        offset: u64,
    }

    async fn locked_cursor(store: &Arc<Store>) -> (statestore::ResourceGuard, Cursor) {
        let key = ResourceKey::new("mock", None, "a");
        let guard = store.lock(&key, &CancellationToken::new()).await.unwrap();
        let cursor = Cursor::new(
            Arc::clone(store),
            Arc::clone(guard.resource()),
            Arc::new(InputMetrics::new("logs::a", "mock")),
        );
        (guard, cursor)
    }

    #[tokio::test]
    async fn test_stage_does_not_touch_committed_state() {
        let store = Arc::new(Store::in_memory());
        let (guard, cursor) = locked_cursor(&store).await;
        assert!(cursor.is_new());
        assert_eq!(cursor.unpack::<Offset>().unwrap(), None);

        let op = cursor.stage(&Offset { offset: 10 }).unwrap();
        assert_eq!(op.position(), &json!({"offset": 10}));
        assert!(cursor.is_new());
        assert_eq!(guard.resource().pending(), 1);

        drop(op);
        assert_eq!(guard.resource().pending(), 0);
        assert!(cursor.is_new());
    }

    #[tokio::test]
    async fn test_execute_commits_and_is_monotonic() {
        let store = Arc::new(Store::in_memory());
        let (_guard, cursor) = locked_cursor(&store).await;

        let u1 = cursor.stage(&Offset { offset: 1 }).unwrap();
        let u2 = cursor.stage(&Offset { offset: 2 }).unwrap();
        let u3 = cursor.stage(&Offset { offset: 3 }).unwrap();

        assert!(u2.execute(2).unwrap());
        assert_eq!(cursor.unpack::<Offset>().unwrap(), Some(Offset { offset: 2 }));

        // Already superseded by u2.
        assert!(!u1.execute(1).unwrap());
        assert_eq!(cursor.unpack::<Offset>().unwrap(), Some(Offset { offset: 2 }));

        assert!(u3.execute(1).unwrap());
        assert_eq!(cursor.last_position(), json!({"offset": 3}));
    }
}
