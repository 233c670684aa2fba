//! # Pipeline
//!
//! In-process delivery pipeline.
//!
//! Responsibilities:
//! - Accept events from connected clients behind a bounded queue
//! - Write batches to an [`EventSink`](contracts::EventSink), retrying failures
//! - Acknowledge each client's contiguous delivered prefix, in production order
//!
//! ## Usage Example
//!
//! ```ignore
//! use pipeline::{CaptureSink, MemoryPipeline, PipelineConfig};
//!
//! let sink = CaptureSink::new("capture");
//! let pipeline = Arc::new(MemoryPipeline::spawn(sink, PipelineConfig::default()));
//! let client = pipeline.connect_with(ClientConfig { ack: Some(ack_tx), ..Default::default() })?;
//! client.publish(Event::message("hello")).await?;
//! pipeline.shutdown().await;
//! ```

mod config;
mod memory;
mod metrics;
mod sinks;

pub use config::{AckMode, PipelineConfig};
pub use memory::MemoryPipeline;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use sinks::{CaptureHandle, CaptureSink, FileSink, FileSinkConfig, LogSink};
