//! ManagedInput - supervises one worker per source

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ack_channel, ClientConfig, ClientListener, CombinedListener, ConfigEditConnector,
    PipelineConnector, Source, Status,
};
use futures::future::join_all;
use parking_lot::Mutex;
use statestore::{ResourceKey, Store};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::ack::AckAggregator;
use crate::context::{Context, TestContext};
use crate::cursor::Cursor;
use crate::error::{ErrorList, InputError, Result};
use crate::input::Input;
use crate::manager::IdLease;
use crate::metrics::{InputMetrics, MetricsRegistry};
use crate::publisher::Publisher;
use crate::recover::catch_panic;

/// Lifecycle of a [`ManagedInput`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Created,
    Running,
    /// A worker failed or shutdown began; waiting for the rest to unwind
    Draining,
    Done,
}

/// A configured input ready to be tested or run
pub struct ManagedInput<I: Input> {
    input_type: String,
    user_id: Option<String>,
    input: Arc<I>,
    sources: Vec<Arc<I::Source>>,
    store: Arc<Store>,
    clean_timeout: Duration,
    registry: Arc<MetricsRegistry>,
    state: Mutex<InputState>,
    _lease: Option<IdLease>,
}

impl<I> ManagedInput<I>
where
    I: Input + Sync + 'static,
{
    pub(crate) fn new(
        input_type: impl Into<String>,
        user_id: Option<String>,
        input: I,
        sources: Vec<I::Source>,
        store: Arc<Store>,
        clean_timeout: Duration,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            input_type: input_type.into(),
            user_id,
            input: Arc::new(input),
            sources: sources.into_iter().map(Arc::new).collect(),
            store,
            clean_timeout,
            registry,
            state: Mutex::new(InputState::Created),
            _lease: None,
        }
    }

    pub(crate) fn with_lease(mut self, lease: Option<IdLease>) -> Self {
        self._lease = lease;
        self
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn sources(&self) -> impl Iterator<Item = &I::Source> {
        self.sources.iter().map(Arc::as_ref)
    }

    pub fn clean_timeout(&self) -> Duration {
        self.clean_timeout
    }

    pub fn state(&self) -> InputState {
        *self.state.lock()
    }

    /// Store key of `source`'s persisted state
    pub fn resource_key(&self, source: &I::Source) -> ResourceKey {
        ResourceKey::new(&self.input_type, self.user_id.as_deref(), source.name())
    }

    /// Validate every source concurrently without collecting
    ///
    /// Fails with all source failures joined.
    #[instrument(name = "input_test", skip_all, fields(input_type = %self.input_type, sources = self.sources.len()))]
    pub async fn test(&self, ctx: &TestContext) -> Result<()> {
        let checks = self.sources.iter().map(|source| async move {
            let name = source.name();
            catch_panic(name, async {
                self.input
                    .test(source, ctx)
                    .await
                    .map_err(|e| InputError::source_failed(name, e))
            })
            .await
        });

        let results = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => return Err(InputError::Cancelled),
            results = join_all(checks) => results,
        };

        let errors: ErrorList = results.into_iter().filter_map(|r| r.err()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InputError::Validation { errors })
        }
    }

    /// Run one worker per source until all of them finished
    ///
    /// The first failing worker cancels its siblings. Every failure is
    /// reported in the returned error; cancellation alone is not a failure.
    #[instrument(name = "input_run", skip_all, fields(input_id = %ctx.id, sources = self.sources.len()))]
    pub async fn run(&self, ctx: &Context, pipeline: Arc<dyn PipelineConnector>) -> Result<()> {
        self.begin_run()?;
        let result = self.run_workers(ctx, pipeline).await;
        *self.state.lock() = InputState::Done;

        match &result {
            Ok(()) => {
                ctx.update_status(Status::Stopped, "");
                info!(input_id = %ctx.id, "input stopped");
            }
            Err(e) => {
                ctx.update_status(Status::Failed, &e.to_string());
                error!(input_id = %ctx.id, error = %e, "input failed");
            }
        }
        result
    }

    fn begin_run(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            InputState::Created | InputState::Done => {
                *state = InputState::Running;
                Ok(())
            }
            other => Err(InputError::invalid_state(format!(
                "cannot run input while {other:?}"
            ))),
        }
    }

    fn begin_draining(&self) {
        let mut state = self.state.lock();
        if *state == InputState::Running {
            *state = InputState::Draining;
        }
    }

    async fn run_workers(&self, ctx: &Context, pipeline: Arc<dyn PipelineConnector>) -> Result<()> {
        let cancel = ctx.cancellation.child_token();
        self.registry.register_nested(&ctx.id, &self.input_type);

        let mut workers = JoinSet::new();
        for source in &self.sources {
            let name = source.name().to_string();
            let key = self.resource_key(source);
            let span = info_span!("input_worker", input_id = %ctx.id, input_source = %name, key = %key);

            let worker_id = format!("{}::{}", ctx.id, name);
            let metrics = self.registry.register(&worker_id, &self.input_type);
            let worker = SourceWorker {
                input: Arc::clone(&self.input),
                source: Arc::clone(source),
                key,
                store: Arc::clone(&self.store),
                pipeline: prepare_input_metrics(Arc::clone(&pipeline), Arc::clone(&metrics)),
                clean_timeout: self.clean_timeout,
                ctx: ctx.for_source(&name, cancel.clone(), metrics, span.clone()),
            };
            let registry = Arc::clone(&self.registry);

            workers.spawn(
                async move {
                    let result = catch_panic(&name, worker.run()).await;
                    registry.unregister(&worker_id);
                    (name, result)
                }
                .instrument(span),
            );
        }

        ctx.update_status(Status::Running, "");
        info!(workers = workers.len(), "input started");

        let mut errors = ErrorList::new();
        while let Some(joined) = workers.join_next().await {
            let (name, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    let message = e.to_string();
                    (
                        String::from("<unknown>"),
                        Err(InputError::Panic {
                            source_name: String::from("<unknown>"),
                            message,
                            backtrace: String::new(),
                        }),
                    )
                }
            };

            if cancel.is_cancelled() {
                self.begin_draining();
            }
            match result {
                Ok(()) => debug!(source = %name, "worker finished"),
                Err(e) if e.is_cancelled() && cancel.is_cancelled() => {
                    debug!(source = %name, "worker cancelled");
                }
                Err(e) => {
                    if !cancel.is_cancelled() {
                        warn!(source = %name, error = %e, "worker failed, cancelling remaining workers");
                        self.begin_draining();
                        cancel.cancel();
                    }
                    errors.push(e);
                }
            }
        }

        self.registry.unregister(&ctx.id);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(InputError::RunFailed {
                input_id: ctx.id.clone(),
                errors,
            })
        }
    }
}

impl<I: Input> std::fmt::Debug for ManagedInput<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedInput")
            .field("input_type", &self.input_type)
            .field("user_id", &self.user_id)
            .field("sources", &self.sources)
            .field("clean_timeout", &self.clean_timeout)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Names of `sources` must be unique within one input
pub(crate) fn check_unique_names<S: Source>(sources: &[S]) -> Result<()> {
    let mut seen = HashSet::with_capacity(sources.len());
    for source in sources {
        if !seen.insert(source.name()) {
            return Err(InputError::configuration(format!(
                "duplicate source name '{}'",
                source.name()
            )));
        }
    }
    Ok(())
}

/// Route a worker's pipeline client events into its metrics
fn prepare_input_metrics(
    pipeline: Arc<dyn PipelineConnector>,
    metrics: Arc<InputMetrics>,
) -> Arc<dyn PipelineConnector> {
    Arc::new(ConfigEditConnector::new(
        pipeline,
        move |mut config: ClientConfig| {
            let listener: Arc<dyn ClientListener> = metrics.clone();
            config.listener = Some(match config.listener.take() {
                Some(existing) => Arc::new(CombinedListener::new(existing, listener)),
                None => listener,
            });
            Ok(config)
        },
    ))
}

/// One source's collection run
struct SourceWorker<I: Input> {
    input: Arc<I>,
    source: Arc<I::Source>,
    key: ResourceKey,
    store: Arc<Store>,
    pipeline: Arc<dyn PipelineConnector>,
    clean_timeout: Duration,
    ctx: Context,
}

impl<I: Input + Sync> SourceWorker<I> {
    async fn run(self) -> Result<()> {
        let guard = self.store.lock(&self.key, &self.ctx.cancellation).await?;
        self.store.update_ttl(guard.resource(), self.clean_timeout);

        let (ack_tx, ack_rx) = ack_channel();
        let client = self.pipeline.connect_with(ClientConfig {
            ack: Some(ack_tx),
            ..Default::default()
        })?;
        AckAggregator::new(self.source.name()).spawn(ack_rx);

        let cursor = Cursor::new(
            Arc::clone(&self.store),
            Arc::clone(guard.resource()),
            Arc::clone(&self.ctx.metrics),
        );
        let publisher = Publisher::new(client, cursor.clone(), self.ctx.cancellation.clone());

        debug!(new = cursor.is_new(), "worker started");
        let result = self
            .input
            .run(&self.ctx, &self.source, &cursor, &publisher)
            .await
            .map_err(|e| InputError::source_failed(self.source.name(), e));

        if let Err(e) = publisher.close().await {
            warn!(error = %e, "failed to close pipeline client");
        }
        guard.release();
        result
    }
}
