//! Publisher - hands events to the pipeline, tagging checkpoints

use std::fmt;

use contracts::{ContractError, Event, PipelineClient};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cursor::Cursor;
use crate::error::{InputError, Result};

/// Publishes a worker's events
///
/// Every call observes the worker's cancellation and returns
/// [`InputError::Cancelled`] once it fires, even while blocked on
/// backpressure.
pub struct Publisher {
    client: Box<dyn PipelineClient>,
    cursor: Cursor,
    cancel: CancellationToken,
}

impl Publisher {
    pub(crate) fn new(
        client: Box<dyn PipelineClient>,
        cursor: Cursor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            cursor,
            cancel,
        }
    }

    /// Publish an event that does not advance the checkpoint
    pub async fn publish(&self, event: Event) -> Result<()> {
        self.send(event).await
    }

    /// Publish an event and stage `position` to be committed once it is acked
    pub async fn publish_with_checkpoint<T: Serialize + ?Sized>(
        &self,
        event: Event,
        position: &T,
    ) -> Result<()> {
        let op = self.cursor.stage(position)?;
        self.send(event.with_private(Box::new(op))).await
    }

    async fn send(&self, event: Event) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(InputError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(InputError::Cancelled),
            result = self.client.publish(event) => result.map_err(|e| match e {
                ContractError::PublishCancelled => InputError::Cancelled,
                other => InputError::Pipeline(other),
            }),
        }
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("cursor", &self.cursor)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
