//! Delivery pipeline contracts
//!
//! A pipeline accepts events from connected clients and reports, per client,
//! which contiguous prefix of the published events has been durably accepted
//! downstream. Acknowledgments are delivered as [`AckBatch`] messages on the
//! client's ack channel, in production order.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::{AckBatch, ContractError, Event};

/// Sending half of a client's acknowledgment channel
pub type AckSender = mpsc::UnboundedSender<AckBatch>;

/// Receiving half of a client's acknowledgment channel
pub type AckReceiver = mpsc::UnboundedReceiver<AckBatch>;

/// Create an acknowledgment channel
pub fn ack_channel() -> (AckSender, AckReceiver) {
    mpsc::unbounded_channel()
}

/// Event filter applied by the pipeline; returns `false` to drop the event
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Observer of a client's event flow
///
/// All callbacks default to no-ops.
pub trait ClientListener: Send + Sync {
    /// An event was handed to the client
    fn new_event(&self) {}

    /// An event was dropped by the client's filter
    fn filtered(&self) {}

    /// An event was accepted into the pipeline queue
    fn published(&self) {}

    /// The client is closing
    fn closing(&self) {}

    /// The client is closed
    fn closed(&self) {}
}

/// Forwards every callback to two listeners
pub struct CombinedListener {
    a: Arc<dyn ClientListener>,
    b: Arc<dyn ClientListener>,
}

impl CombinedListener {
    pub fn new(a: Arc<dyn ClientListener>, b: Arc<dyn ClientListener>) -> Self {
        Self { a, b }
    }
}

impl ClientListener for CombinedListener {
    fn new_event(&self) {
        self.a.new_event();
        self.b.new_event();
    }

    fn filtered(&self) {
        self.a.filtered();
        self.b.filtered();
    }

    fn published(&self) {
        self.a.published();
        self.b.published();
    }

    fn closing(&self) {
        self.a.closing();
        self.b.closing();
    }

    fn closed(&self) {
        self.a.closed();
        self.b.closed();
    }
}

/// Per-client settings passed to [`PipelineConnector::connect_with`]
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Where acknowledged batches are delivered
    pub ack: Option<AckSender>,

    /// Event flow observer
    pub listener: Option<Arc<dyn ClientListener>>,

    /// Drop filter
    pub filter: Option<EventFilter>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("ack", &self.ack.is_some())
            .field("listener", &self.listener.is_some())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// A connected pipeline client
pub trait PipelineClient: Send + Sync {
    /// Publish one event; waits while the pipeline applies backpressure
    fn publish(&self, event: Event) -> BoxFuture<'_, Result<(), ContractError>>;

    /// Stop accepting events; already queued events are still delivered
    fn close(&self) -> BoxFuture<'_, Result<(), ContractError>>;
}

/// Factory for pipeline clients
pub trait PipelineConnector: Send + Sync {
    /// Connect a new client with the given settings
    fn connect_with(&self, config: ClientConfig)
        -> Result<Box<dyn PipelineClient>, ContractError>;

    /// Connect a new client with default settings
    fn connect(&self) -> Result<Box<dyn PipelineClient>, ContractError> {
        self.connect_with(ClientConfig::default())
    }
}

impl<P: PipelineConnector + ?Sized> PipelineConnector for Arc<P> {
    fn connect_with(
        &self,
        config: ClientConfig,
    ) -> Result<Box<dyn PipelineClient>, ContractError> {
        (**self).connect_with(config)
    }
}

/// Connector that rewrites every client config before delegating
pub struct ConfigEditConnector<F> {
    inner: Arc<dyn PipelineConnector>,
    edit: F,
}

impl<F> ConfigEditConnector<F>
where
    F: Fn(ClientConfig) -> Result<ClientConfig, ContractError> + Send + Sync,
{
    pub fn new(inner: Arc<dyn PipelineConnector>, edit: F) -> Self {
        Self { inner, edit }
    }
}

impl<F> PipelineConnector for ConfigEditConnector<F>
where
    F: Fn(ClientConfig) -> Result<ClientConfig, ContractError> + Send + Sync,
{
    fn connect_with(
        &self,
        config: ClientConfig,
    ) -> Result<Box<dyn PipelineClient>, ContractError> {
        let config = (self.edit)(config)?;
        self.inner.connect_with(config)
    }
}
