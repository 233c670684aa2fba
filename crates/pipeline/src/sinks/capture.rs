//! CaptureSink - keeps written events in memory for inspection

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use contracts::{ContractError, Event, EventSink};
use parking_lot::Mutex;
use serde_json::Value;

/// Sink that records every written event
///
/// Can be told to fail its first writes to exercise retry handling.
pub struct CaptureSink {
    name: String,
    events: Arc<Mutex<Vec<Value>>>,
    fail_remaining: AtomicU32,
}

impl CaptureSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Arc::new(Mutex::new(Vec::new())),
            fail_remaining: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` writes
    pub fn failing(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::Relaxed);
        self
    }

    /// Read access that outlives the sink being moved into a pipeline
    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            events: Arc::clone(&self.events),
        }
    }
}

/// Shared view of a [`CaptureSink`]'s events
#[derive(Clone)]
pub struct CaptureHandle {
    events: Arc<Mutex<Vec<Value>>>,
}

impl CaptureHandle {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of every captured event, in write order
    pub fn events(&self) -> Vec<Value> {
        self.events.lock().clone()
    }
}

impl EventSink for CaptureSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, events: &[Event]) -> Result<(), ContractError> {
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ContractError::sink_write(&self.name, "injected failure"));
        }
        self.events
            .lock()
            .extend(events.iter().map(Event::to_json));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
