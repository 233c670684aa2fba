//! FileSink - appends events to a newline-delimited JSON file

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use contracts::{ContractError, Event, EventSink};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file; parent directories are created
    pub path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output/events.ndjson"));

        Self { path }
    }
}

/// Sink that appends one JSON document per event
///
/// A write only succeeds once the batch reached the file, so acknowledged
/// events survive a crash of the writer.
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            config,
            writer: BufWriter::new(file),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    fn append_batch(&mut self, events: &[Event]) -> std::io::Result<()> {
        for event in events {
            serde_json::to_writer(&mut self.writer, &event.to_json())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, events),
        fields(sink = %self.name, events = events.len())
    )]
    async fn write(&mut self, events: &[Event]) -> Result<(), ContractError> {
        self.append_batch(events).map_err(|e| {
            error!(sink = %self.name, path = %self.config.path.display(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer.flush()?;
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer.flush()?;
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
