//! Pipeline configuration

use std::time::Duration;

/// When written events are acknowledged to their clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// As soon as the sink accepted the batch
    #[default]
    Auto,
    /// Only when [`MemoryPipeline::ack_next`](crate::MemoryPipeline::ack_next) is called
    Manual,
}

/// MemoryPipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pipeline name (used for logging)
    pub name: String,

    /// Queue capacity; publishers wait when it is full
    pub queue_capacity: usize,

    /// Maximum events per sink write
    pub batch_size: usize,

    /// How long a partial batch waits for more events
    pub flush_interval: Duration,

    pub ack_mode: AckMode,

    /// Retries of a failed write before the batch is dropped
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            queue_capacity: 1024,
            batch_size: 64,
            flush_interval: Duration::from_millis(10),
            ack_mode: AckMode::Auto,
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl PipelineConfig {
    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }
}
