//! InputManager - shared state and factory for one input type

use std::sync::Arc;
use std::time::Duration;

use contracts::{InputConfig, RegistryConfig};
use dashmap::DashSet;
use parking_lot::Mutex;
use statestore::{Backend, FileBackend, MemoryBackend, Store};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::{InputError, Result};
use crate::input::{check_fips_capability, Input};
use crate::managed::{check_unique_names, ManagedInput};
use crate::metrics::MetricsRegistry;

/// Resolves an input configuration into its sources and input
pub trait Configure: Send + Sync {
    type Input: Input + Sync + 'static;

    fn configure(
        &self,
        config: &InputConfig,
    ) -> Result<(Vec<<Self::Input as Input>::Source>, Self::Input)>;
}

/// InputManager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Input type served; also the first segment of every resource key
    pub input_type: String,

    /// TTL of released resources when the input sets no `clean_inactive`
    pub default_clean_timeout: Duration,

    pub registry: RegistryConfig,

    /// Reject inputs that are not FIPS capable
    pub require_fips: bool,
}

impl ManagerConfig {
    pub fn new(input_type: impl Into<String>) -> Self {
        Self {
            input_type: input_type.into(),
            default_clean_timeout: Duration::from_secs(24 * 60 * 60),
            registry: RegistryConfig::default(),
            require_fips: false,
        }
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_clean_timeout(mut self, timeout: Duration) -> Self {
        self.default_clean_timeout = timeout;
        self
    }

    pub fn with_require_fips(mut self, require_fips: bool) -> Self {
        self.require_fips = require_fips;
        self
    }
}

struct Shared {
    store: Arc<Store>,
    reaper: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Factory and shared-resource owner for one input type
pub struct InputManager<C: Configure> {
    config: ManagerConfig,
    configure: C,
    shared: Mutex<Option<Shared>>,
    ids: Arc<DashSet<String>>,
    metrics: Arc<MetricsRegistry>,
}

impl<C: Configure> InputManager<C> {
    pub fn new(config: ManagerConfig, configure: C) -> Self {
        Self {
            config,
            configure,
            shared: Mutex::new(None),
            ids: Arc::new(DashSet::new()),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Share a metrics registry with other managers
    pub fn with_metrics_registry(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn input_type(&self) -> &str {
        &self.config.input_type
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// The store, once [`init`](Self::init) succeeded
    pub fn store(&self) -> Option<Arc<Store>> {
        self.shared.lock().as_ref().map(|s| Arc::clone(&s.store))
    }

    /// Open the store and start the reaper
    ///
    /// Idempotent. Must be called within a tokio runtime.
    #[instrument(name = "input_manager_init", skip(self), fields(input_type = %self.config.input_type))]
    pub fn init(&self) -> Result<Arc<Store>> {
        let mut shared = self.shared.lock();
        if let Some(shared) = shared.as_ref() {
            return Ok(Arc::clone(&shared.store));
        }

        let backend: Arc<dyn Backend> = match &self.config.registry.path {
            Some(path) => Arc::new(FileBackend::open(path.join(&self.config.input_type))?),
            None => Arc::new(MemoryBackend::new()),
        };
        let store = Arc::new(Store::open(backend)?);

        let cancel = CancellationToken::new();
        let interval = self.config.registry.reap_interval();
        let reaper = store.spawn_reaper(interval, cancel.clone());
        info!(
            resources = store.len(),
            reap_interval_secs = interval.as_secs(),
            "input manager initialized"
        );

        *shared = Some(Shared {
            store: Arc::clone(&store),
            reaper: Some((cancel, reaper)),
        });
        Ok(store)
    }

    /// Build a runnable input from `config`
    #[instrument(
        name = "input_manager_create",
        skip(self, config),
        fields(input_type = %self.config.input_type, id = ?config.id)
    )]
    pub fn create(&self, config: &InputConfig) -> Result<ManagedInput<C::Input>> {
        if config.input_type != self.config.input_type {
            return Err(InputError::configuration(format!(
                "input type '{}' is not handled by the '{}' manager",
                config.input_type, self.config.input_type
            )));
        }

        let store = self.init()?;
        let (sources, input) = self.configure.configure(config)?;
        if self.config.require_fips {
            check_fips_capability(&input)?;
        }
        if sources.is_empty() {
            return Err(InputError::configuration("no source has been configured"));
        }
        check_unique_names(&sources)?;

        let user_id = config.id.clone().filter(|id| !id.is_empty());
        let lease = user_id
            .as_deref()
            .map(|id| IdLease::acquire(&self.ids, id))
            .transpose()?;
        let clean_timeout = config
            .clean_inactive()
            .unwrap_or(self.config.default_clean_timeout);

        debug!(sources = sources.len(), ?clean_timeout, "input created");
        Ok(ManagedInput::new(
            self.config.input_type.clone(),
            user_id,
            input,
            sources,
            store,
            clean_timeout,
            Arc::clone(&self.metrics),
        )
        .with_lease(lease))
    }

    /// Stop the reaper; the store stays open for running inputs
    #[instrument(name = "input_manager_shutdown", skip(self), fields(input_type = %self.config.input_type))]
    pub async fn shutdown(&self) {
        let reaper = self.shared.lock().as_mut().and_then(|s| s.reaper.take());
        if let Some((cancel, handle)) = reaper {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(error = ?e, "reaper task panicked");
            }
        }
        debug!("input manager shut down");
    }
}

/// Reservation of an input id among a manager's live inputs
pub(crate) struct IdLease {
    ids: Arc<DashSet<String>>,
    id: String,
}

impl IdLease {
    fn acquire(ids: &Arc<DashSet<String>>, id: &str) -> Result<Self> {
        if !ids.insert(id.to_string()) {
            return Err(InputError::configuration(format!(
                "input with ID '{id}' already exists"
            )));
        }
        Ok(Self {
            ids: Arc::clone(ids),
            id: id.to_string(),
        })
    }
}

impl Drop for IdLease {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConfigure, MockInput, MockSource};
    use contracts::Source;

    fn manager(configure: MockConfigure) -> InputManager<MockConfigure> {
        InputManager::new(ManagerConfig::new("mock"), configure)
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let manager = manager(MockConfigure::new(vec![MockSource::new("a")]));
        let first = manager.init().unwrap();
        let second = manager.init().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        manager.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_without_sources_fails() {
        let manager = manager(MockConfigure::new(Vec::new()));
        let err = manager.create(&InputConfig::new("mock")).unwrap_err();
        assert!(err.to_string().contains("no source has been configured"));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_names() {
        let manager = manager(MockConfigure::new(vec![
            MockSource::new("a"),
            MockSource::new("a"),
        ]));
        assert!(matches!(
            manager.create(&InputConfig::new("mock")),
            Err(InputError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_id_in_use_until_dropped() {
        let manager = manager(MockConfigure::new(vec![MockSource::new("a")]));
        let config = InputConfig::new("mock").with_id("logs");

        let first = manager.create(&config).unwrap();
        assert_eq!(first.user_id(), Some("logs"));
        assert!(manager.create(&config).is_err());

        drop(first);
        assert!(manager.create(&config).is_ok());
    }

    #[tokio::test]
    async fn test_create_applies_clean_inactive() {
        let manager = manager(MockConfigure::new(vec![MockSource::new("a")]));
        let config = InputConfig {
            clean_inactive_secs: Some(5),
            ..InputConfig::new("mock")
        };
        let input = manager.create(&config).unwrap();
        assert_eq!(input.clean_timeout(), Duration::from_secs(5));

        let default = manager.create(&InputConfig::new("mock")).unwrap();
        assert_eq!(default.clean_timeout(), Duration::from_secs(24 * 60 * 60));
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_type() {
        let manager = manager(MockConfigure::new(vec![MockSource::new("a")]));
        assert!(manager.create(&InputConfig::new("journald")).is_err());
    }

    #[tokio::test]
    async fn test_fips_required() {
        let configure = MockConfigure::new(vec![MockSource::new("a")])
            .with_input(MockInput::new("mock").not_fips_capable());
        let manager = InputManager::new(
            ManagerConfig::new("mock").with_require_fips(true),
            configure,
        );
        let err = manager.create(&InputConfig::new("mock")).unwrap_err();
        assert!(err.to_string().contains("is not FIPS capable"));
    }

    #[tokio::test]
    async fn test_sources_from_settings() {
        let manager = manager(MockConfigure::new(Vec::new()));
        let input = manager
            .create(&InputConfig::new("mock").with_setting("sources", vec!["x", "y"]))
            .unwrap();
        let names: Vec<_> = input.sources().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }
}
