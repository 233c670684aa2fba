//! Acknowledgment aggregator - commits confirmed checkpoints

use contracts::{AckBatch, AckReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn, Instrument, Span};

use crate::update_op::UpdateOp;

/// Turns delivery confirmations into checkpoint commits
///
/// For every batch only the newest [`UpdateOp`] is committed; the older ones
/// it supersedes are discarded.
#[derive(Debug, Clone)]
pub struct AckAggregator {
    source_name: String,
}

impl AckAggregator {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }

    /// Apply one confirmed batch
    ///
    /// Returns the number of update operations found in the batch.
    pub fn handle_batch(&self, batch: AckBatch) -> u64 {
        let acked = batch.acked();
        let mut n: u64 = 0;
        let mut last: Option<UpdateOp> = None;

        for private in batch.private.into_iter().flatten() {
            if let Ok(op) = private.downcast::<UpdateOp>() {
                n += 1;
                // Replacing drops the superseded op, releasing its pending slot.
                last = Some(*op);
            }
        }

        let Some(op) = last else {
            trace!(source = %self.source_name, acked, "ack batch without checkpoint updates");
            return 0;
        };

        let key = op.key().clone();
        match op.execute(n) {
            Ok(committed) => {
                trace!(source = %self.source_name, %key, acked, updates = n, committed, "checkpoint acked");
            }
            Err(e) => {
                warn!(source = %self.source_name, %key, error = %e, "failed to commit acknowledged checkpoint");
            }
        }
        n
    }

    /// Consume batches from `rx` until every sender is gone
    pub fn spawn(self, mut rx: AckReceiver) -> JoinHandle<()> {
        let span = Span::current();
        tokio::spawn(
            async move {
                while let Some(batch) = rx.recv().await {
                    self.handle_batch(batch);
                }
                debug!(source = %self.source_name, "ack channel closed");
            }
            .instrument(span),
        )
    }
}
