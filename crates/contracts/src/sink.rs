//! EventSink trait - pipeline output interface
//!
//! Defines the abstract interface for the downstream end of a pipeline.

use crate::{ContractError, Event};

/// Event output trait
///
/// All sink implementations must implement this trait. A successful `write`
/// means the batch was durably accepted and may be acknowledged.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write a batch of events
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, events: &[Event]) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
