//! Execution context handed to inputs

use std::fmt;
use std::sync::Arc;

use contracts::{AgentInfo, Status, StatusReporter};
use tokio_util::sync::CancellationToken;
use tracing::{trace, Span};

use crate::metrics::InputMetrics;

/// Context of a running input or one of its source workers
#[derive(Clone)]
pub struct Context {
    /// Unique id; per source worker `{input_id}::{source_name}`
    pub id: String,

    /// Id of the configured input the worker belongs to
    pub id_without_name: String,

    /// Input name (usually its type)
    pub name: String,

    pub agent: AgentInfo,

    /// Fires on shutdown or when a sibling worker fails
    pub cancellation: CancellationToken,

    pub status_reporter: Option<Arc<dyn StatusReporter>>,

    pub metrics: Arc<InputMetrics>,

    pub span: Span,
}

impl Context {
    pub fn new(id: impl Into<String>, cancellation: CancellationToken) -> Self {
        let id = id.into();
        Self {
            metrics: Arc::new(InputMetrics::new(id.clone(), "")),
            id_without_name: id.clone(),
            id,
            name: String::new(),
            agent: AgentInfo::default(),
            cancellation,
            status_reporter: None,
            span: Span::current(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_agent(mut self, agent: AgentInfo) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_status_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.status_reporter = Some(reporter);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Report a status change; silently ignored without a reporter
    pub fn update_status(&self, status: Status, message: &str) {
        match &self.status_reporter {
            Some(reporter) => reporter.update_status(status, message),
            None => trace!(input_id = %self.id, %status, "no status reporter configured"),
        }
    }

    /// Derive the context of one source worker
    pub(crate) fn for_source(
        &self,
        source_name: &str,
        cancellation: CancellationToken,
        metrics: Arc<InputMetrics>,
        span: Span,
    ) -> Self {
        Self {
            id: format!("{}::{}", self.id, source_name),
            id_without_name: self.id.clone(),
            name: self.name.clone(),
            agent: self.agent.clone(),
            cancellation,
            status_reporter: self.status_reporter.clone(),
            metrics,
            span,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("id_without_name", &self.id_without_name)
            .field("name", &self.name)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("status_reporter", &self.status_reporter.is_some())
            .finish()
    }
}

/// Context for `test`, which performs no collection
#[derive(Debug, Clone)]
pub struct TestContext {
    pub agent: AgentInfo,
    pub cancellation: CancellationToken,
    pub span: Span,
}

impl TestContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            agent: AgentInfo::default(),
            cancellation,
            span: Span::current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Status, String)>>);

    impl StatusReporter for Recorder {
        fn update_status(&self, status: Status, message: &str) {
            self.0.lock().push((status, message.to_string()));
        }
    }

    #[test]
    fn test_update_status_without_reporter_is_noop() {
        let ctx = Context::new("logs", CancellationToken::new());
        ctx.update_status(Status::Running, "");
    }

    #[test]
    fn test_source_context_ids() {
        let recorder = Arc::new(Recorder::default());
        let ctx = Context::new("logs", CancellationToken::new())
            .with_name("mock")
            .with_status_reporter(recorder.clone());
        let child = ctx.for_source(
            "a.log",
            ctx.cancellation.child_token(),
            Arc::new(InputMetrics::new("logs::a.log", "mock")),
            Span::none(),
        );

        assert_eq!(child.id, "logs::a.log");
        assert_eq!(child.id_without_name, "logs");
        assert_eq!(child.name, "mock");

        child.update_status(Status::Degraded, "slow");
        assert_eq!(
            *recorder.0.lock(),
            vec![(Status::Degraded, "slow".to_string())]
        );

        ctx.cancellation.cancel();
        assert!(child.is_cancelled());
    }
}
