//! Event - the unit handed to the delivery pipeline
//!
//! Events carry an optional private payload that the pipeline never inspects.
//! It is handed back, in production order, once the event is acknowledged.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Opaque per-event metadata, returned to the producer on acknowledgment
pub type Private = Box<dyn Any + Send + Sync>;

/// A single event produced by a source
pub struct Event {
    /// Event time
    pub timestamp: DateTime<Utc>,

    /// Event payload
    pub fields: Map<String, Value>,

    /// Producer private metadata (never serialized)
    pub private: Option<Private>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            fields,
            private: None,
        }
    }

    /// Create an event holding a single `message` field
    pub fn message(message: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::String(message.into()));
        Self::new(fields)
    }

    /// Set a field, replacing any previous value
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach private metadata
    pub fn with_private(mut self, private: Private) -> Self {
        self.private = Some(private);
        self
    }

    /// Serializable view of the event (timestamp + fields)
    pub fn to_json(&self) -> Value {
        let mut doc = Map::with_capacity(self.fields.len() + 1);
        doc.insert(
            "@timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339()),
        );
        for (k, v) in &self.fields {
            doc.insert(k.clone(), v.clone());
        }
        Value::Object(doc)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("timestamp", &self.timestamp)
            .field("fields", &self.fields)
            .field("has_private", &self.private.is_some())
            .finish()
    }
}

/// Acknowledged prefix of one client's events
///
/// `private` holds each acknowledged event's private metadata in production
/// order (`None` for events published without one).
#[derive(Default)]
pub struct AckBatch {
    pub private: Vec<Option<Private>>,
}

impl AckBatch {
    /// Number of events acknowledged by this batch
    pub fn acked(&self) -> usize {
        self.private.len()
    }
}

impl fmt::Debug for AckBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckBatch")
            .field("acked", &self.acked())
            .finish()
    }
}
