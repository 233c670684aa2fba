//! Mock input
//!
//! Scriptable input type for tests without real data sources.

use std::sync::Arc;
use std::time::Duration;

use contracts::{Event, InputConfig, Source};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::context::{Context, TestContext};
use crate::cursor::Cursor;
use crate::error::{BoxError, InputError, Result};
use crate::input::Input;
use crate::manager::Configure;
use crate::publisher::Publisher;

/// One scripted action of a [`MockSource`]
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Publish a message, optionally staging a checkpoint with it
    Publish {
        message: String,
        checkpoint: Option<Value>,
    },
    /// Return a fatal error
    Fail(String),
    Panic(String),
    /// Block until cancelled, then return successfully
    WaitForCancel,
    /// Sleep, returning early with a cancellation error
    Sleep(Duration),
}

/// Scripted source
#[derive(Debug, Clone)]
pub struct MockSource {
    name: String,
    steps: Vec<MockStep>,
    test_error: Option<String>,
    test_panics: bool,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            test_error: None,
            test_panics: false,
        }
    }

    pub fn step(mut self, step: MockStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn publish(self, message: impl Into<String>) -> Self {
        self.step(MockStep::Publish {
            message: message.into(),
            checkpoint: None,
        })
    }

    pub fn publish_at(self, message: impl Into<String>, checkpoint: Value) -> Self {
        self.step(MockStep::Publish {
            message: message.into(),
            checkpoint: Some(checkpoint),
        })
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.step(MockStep::Fail(message.into()))
    }

    pub fn panic(self, message: impl Into<String>) -> Self {
        self.step(MockStep::Panic(message.into()))
    }

    pub fn wait_for_cancel(self) -> Self {
        self.step(MockStep::WaitForCancel)
    }

    pub fn sleep(self, duration: Duration) -> Self {
        self.step(MockStep::Sleep(duration))
    }

    /// Make `test` fail with `message`
    pub fn failing_test(mut self, message: impl Into<String>) -> Self {
        self.test_error = Some(message.into());
        self
    }

    /// Make `test` panic
    pub fn panicking_test(mut self) -> Self {
        self.test_panics = true;
        self
    }
}

impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Input type executing [`MockSource`] scripts
///
/// Records the checkpoint each source started from.
#[derive(Debug, Clone)]
pub struct MockInput {
    name: String,
    fips_capable: bool,
    starts: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fips_capable: true,
            starts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn not_fips_capable(mut self) -> Self {
        self.fips_capable = false;
        self
    }

    /// `(source, starting checkpoint)` for every run so far
    pub fn starts(&self) -> Vec<(String, Value)> {
        self.starts.lock().clone()
    }
}

impl Input for MockInput {
    type Source = MockSource;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_fips_capable(&self) -> bool {
        self.fips_capable
    }

    async fn test(&self, source: &MockSource, _ctx: &TestContext) -> std::result::Result<(), BoxError> {
        if source.test_panics {
            panic!("test of '{}' panicked", source.name);
        }
        match &source.test_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    async fn run(
        &self,
        ctx: &Context,
        source: &MockSource,
        cursor: &Cursor,
        publisher: &Publisher,
    ) -> std::result::Result<(), BoxError> {
        self.starts
            .lock()
            .push((source.name.clone(), cursor.last_position()));
        debug!(source = %source.name, steps = source.steps.len(), "mock source running");

        for step in &source.steps {
            trace!(source = %source.name, ?step, "mock step");
            match step {
                MockStep::Publish {
                    message,
                    checkpoint: None,
                } => publisher.publish(Event::message(message.as_str())).await?,
                MockStep::Publish {
                    message,
                    checkpoint: Some(position),
                } => {
                    publisher
                        .publish_with_checkpoint(Event::message(message.as_str()), position)
                        .await?
                }
                MockStep::Fail(message) => return Err(message.clone().into()),
                MockStep::Panic(message) => panic!("{message}"),
                MockStep::WaitForCancel => {
                    ctx.cancellation.cancelled().await;
                    return Ok(());
                }
                MockStep::Sleep(duration) => {
                    tokio::select! {
                        _ = ctx.cancellation.cancelled() => return Err(InputError::Cancelled.into()),
                        _ = tokio::time::sleep(*duration) => {}
                    }
                }
            }
        }
        Ok(())
    }
}

/// [`Configure`] implementation for [`MockInput`]
///
/// A `sources` setting (list of names) yields sources that wait for
/// cancellation; otherwise the scripted sources are used.
#[derive(Debug, Clone)]
pub struct MockConfigure {
    input: MockInput,
    sources: Vec<MockSource>,
}

impl MockConfigure {
    pub fn new(sources: Vec<MockSource>) -> Self {
        Self {
            input: MockInput::new("mock"),
            sources,
        }
    }

    pub fn with_input(mut self, input: MockInput) -> Self {
        self.input = input;
        self
    }

    pub fn input(&self) -> &MockInput {
        &self.input
    }
}

impl Configure for MockConfigure {
    type Input = MockInput;

    fn configure(&self, config: &InputConfig) -> Result<(Vec<MockSource>, MockInput)> {
        let names: Option<Vec<String>> = config
            .setting("sources")
            .map_err(|e| InputError::configuration(e.to_string()))?;
        let sources = match names {
            Some(names) => names
                .into_iter()
                .map(|name| MockSource::new(name).wait_for_cancel())
                .collect(),
            None => self.sources.clone(),
        };
        Ok((sources, self.input.clone()))
    }
}
