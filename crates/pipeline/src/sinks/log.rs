//! LogSink - logs batch summaries via tracing

use contracts::{ContractError, Event, EventSink};
use tracing::{debug, info, instrument};

/// Sink that logs event batches for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, events),
        fields(sink = %self.name, events = events.len())
    )]
    async fn write(&mut self, events: &[Event]) -> Result<(), ContractError> {
        for event in events {
            debug!(sink = %self.name, event = %event.to_json(), "event");
        }
        info!(sink = %self.name, events = events.len(), "batch received");
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
