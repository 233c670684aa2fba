//! MemoryPipeline - bounded queue, batching sink worker and ordered acks

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::{
    AckBatch, AckSender, ClientConfig, ClientListener, ContractError, Event, EventFilter,
    EventSink, PipelineClient, PipelineConnector, Private,
};

use crate::config::{AckMode, PipelineConfig};
use crate::metrics::PipelineMetrics;

struct ClientState {
    id: u64,
    ack: Option<AckSender>,
    /// Set once one of the client's events was dropped; later events are
    /// never acknowledged so acks stay a contiguous prefix
    gap: AtomicBool,
}

impl ClientState {
    fn has_gap(&self) -> bool {
        self.gap.load(Ordering::Acquire)
    }

    fn mark_gap(&self) {
        if !self.gap.swap(true, Ordering::AcqRel) {
            warn!(client = self.id, "client lost events, acknowledgments stopped");
        }
    }
}

/// One published event on its way through the queue
struct Queued {
    client: Arc<ClientState>,
    /// `None` when the client's filter dropped the event
    event: Option<Event>,
    private: Option<Private>,
}

/// Written (or filtered) event awaiting acknowledgment
struct Delivered {
    client: Arc<ClientState>,
    private: Option<Private>,
}

/// In-process delivery pipeline
///
/// A single worker drains the queue in batches and writes them to the sink.
/// Every client receives [`AckBatch`] messages covering its own events in
/// the order it published them. Events dropped after exhausting retries are
/// never acknowledged.
pub struct MemoryPipeline {
    name: String,
    ack_mode: AckMode,
    tx: Sender<Queued>,
    held: Arc<Mutex<VecDeque<Delivered>>>,
    metrics: Arc<PipelineMetrics>,
    next_client: AtomicU64,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryPipeline {
    /// Create the pipeline and spawn its sink worker
    pub fn spawn<S: EventSink + Send + 'static>(sink: S, config: PipelineConfig) -> Self {
        let (tx, rx) = bounded(config.queue_capacity.max(1));
        let metrics = Arc::new(PipelineMetrics::new());
        let held = Arc::new(Mutex::new(VecDeque::new()));

        let worker = Worker {
            name: config.name.clone(),
            config: config.clone(),
            metrics: Arc::clone(&metrics),
            held: Arc::clone(&held),
        };
        let worker_handle = tokio::spawn(async move {
            pipeline_worker(sink, rx, worker).await;
        });

        Self {
            name: config.name,
            ack_mode: config.ack_mode,
            tx,
            held,
            metrics,
            next_client: AtomicU64::new(1),
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Events written but not yet acknowledged (manual mode)
    pub fn held(&self) -> usize {
        self.held.lock().len()
    }

    /// Acknowledge the next `n` written events, oldest first
    ///
    /// Returns how many were acknowledged.
    pub fn ack_next(&self, n: usize) -> usize {
        let entries: Vec<Delivered> = {
            let mut held = self.held.lock();
            let take = n.min(held.len());
            held.drain(..take).collect()
        };
        deliver_acks(entries, &self.metrics)
    }

    /// Acknowledge every held event
    pub fn ack_all(&self) -> usize {
        self.ack_next(usize::MAX)
    }

    /// Stop accepting events and wait for queued ones to be written
    #[instrument(name = "memory_pipeline_shutdown", skip(self), fields(pipeline = %self.name))]
    pub async fn shutdown(&self) {
        self.tx.close();
        let handle = self.worker_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(pipeline = %self.name, error = ?e, "pipeline worker panicked");
            }
        }
        debug!(pipeline = %self.name, "MemoryPipeline shutdown complete");
    }
}

impl PipelineConnector for MemoryPipeline {
    fn connect_with(&self, config: ClientConfig) -> Result<Box<dyn PipelineClient>, ContractError> {
        if self.tx.is_closed() {
            return Err(ContractError::pipeline_connect(format!(
                "pipeline '{}' is shut down",
                self.name
            )));
        }
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        trace!(pipeline = %self.name, client = id, "client connected");
        Ok(Box::new(MemoryClient {
            state: Arc::new(ClientState {
                id,
                ack: config.ack,
                gap: AtomicBool::new(false),
            }),
            tx: self.tx.clone(),
            listener: config.listener,
            filter: config.filter,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryClient {
    state: Arc<ClientState>,
    tx: Sender<Queued>,
    listener: Option<Arc<dyn ClientListener>>,
    filter: Option<EventFilter>,
    closed: AtomicBool,
}

impl MemoryClient {
    fn notify(&self, f: impl FnOnce(&dyn ClientListener)) {
        if let Some(listener) = &self.listener {
            f(listener.as_ref());
        }
    }
}

impl PipelineClient for MemoryClient {
    fn publish(&self, mut event: Event) -> BoxFuture<'_, Result<(), ContractError>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(ContractError::PipelineClosed);
            }
            self.notify(|l| l.new_event());

            let private = event.private.take();
            let keep = self.filter.as_ref().is_none_or(|f| f(&event));
            let item = Queued {
                client: Arc::clone(&self.state),
                event: keep.then_some(event),
                private,
            };

            self.tx
                .send(item)
                .await
                .map_err(|_| ContractError::PipelineClosed)?;

            if keep {
                self.notify(|l| l.published());
            } else {
                self.notify(|l| l.filtered());
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), ContractError>> {
        Box::pin(async move {
            if !self.closed.swap(true, Ordering::AcqRel) {
                self.notify(|l| l.closing());
                trace!(client = self.state.id, "client closed");
                self.notify(|l| l.closed());
            }
            Ok(())
        })
    }
}

struct Worker {
    name: String,
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    held: Arc<Mutex<VecDeque<Delivered>>>,
}

/// Worker task that drains the queue in batches and writes them to the sink
#[instrument(name = "pipeline_worker_loop", skip(sink, rx, worker), fields(pipeline = %worker.name))]
async fn pipeline_worker<S: EventSink>(mut sink: S, rx: Receiver<Queued>, worker: Worker) {
    debug!(sink = sink.name(), "pipeline worker started");
    let batch_size = worker.config.batch_size.max(1);

    while let Ok(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(batch_size);
        batch.push(first);

        let deadline = Instant::now() + worker.config.flush_interval;
        while batch.len() < batch_size {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(item)) => batch.push(item),
                // Closed or the flush interval elapsed
                Ok(Err(_)) | Err(_) => break,
            }
        }

        worker.metrics.set_queue_len(rx.len());
        worker.process_batch(&mut sink, batch).await;
    }

    if let Err(e) = sink.flush().await {
        error!(pipeline = %worker.name, error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(pipeline = %worker.name, error = %e, "close failed on shutdown");
    }
    info!(
        pipeline = %worker.name,
        written = worker.metrics.written(),
        acked = worker.metrics.acked(),
        "pipeline worker stopped"
    );
}

impl Worker {
    async fn process_batch<S: EventSink>(&self, sink: &mut S, batch: Vec<Queued>) {
        let mut events = Vec::with_capacity(batch.len());
        let mut delivered = Vec::with_capacity(batch.len());
        for item in batch {
            if let Some(event) = item.event {
                events.push(event);
            }
            delivered.push(Delivered {
                client: item.client,
                private: item.private,
            });
        }

        if !events.is_empty() {
            if let Err(e) = self.write_with_retry(sink, &events).await {
                self.metrics.add_dropped(delivered.len());
                error!(
                    pipeline = %self.name,
                    events = events.len(),
                    error = %e,
                    "batch dropped after exhausting retries"
                );
                for entry in &delivered {
                    entry.client.mark_gap();
                }
                // Dropping `delivered` discards its private metadata unacknowledged.
                return;
            }
            self.metrics.add_written(events.len());
        }

        let before = delivered.len();
        delivered.retain(|entry| !entry.client.has_gap());
        if delivered.len() < before {
            trace!(
                pipeline = %self.name,
                withheld = before - delivered.len(),
                "acks withheld after earlier loss"
            );
        }

        match self.config.ack_mode {
            AckMode::Auto => {
                deliver_acks(delivered, &self.metrics);
            }
            AckMode::Manual => self.held.lock().extend(delivered),
        }
    }

    async fn write_with_retry<S: EventSink>(
        &self,
        sink: &mut S,
        events: &[Event],
    ) -> Result<(), ContractError> {
        let mut attempt: u32 = 0;
        loop {
            match sink.write(events).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.metrics.inc_failed();
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    warn!(
                        pipeline = %self.name,
                        attempt,
                        error = %e,
                        "sink write failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
            }
        }
    }
}

/// Send one [`AckBatch`] per client, preserving each client's order
fn deliver_acks(entries: Vec<Delivered>, metrics: &PipelineMetrics) -> usize {
    let total = entries.len();
    if total == 0 {
        return 0;
    }

    let mut per_client: Vec<(Arc<ClientState>, Vec<Option<Private>>)> = Vec::new();
    for entry in entries {
        match per_client
            .iter_mut()
            .find(|(client, _)| client.id == entry.client.id)
        {
            Some((_, privates)) => privates.push(entry.private),
            None => per_client.push((entry.client, vec![entry.private])),
        }
    }

    for (client, private) in per_client {
        if let Some(ack) = &client.ack {
            if ack.send(AckBatch { private }).is_err() {
                trace!(client = client.id, "ack receiver gone");
            }
        }
    }

    metrics.add_acked(total);
    total
}
