//! # Integration Tests
//!
//! End-to-end runs of configured inputs against the in-memory pipeline and
//! the file-backed registry:
//! - failure propagation and checkpoint safety
//! - takeover of persisted cursors by a new input
//! - crash consistency across store reopen
//! - panic isolation
//! - TTL reaping of finished sources
//! - configuration file to running input

#[cfg(test)]
mod support {
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{Status, StatusReporter};
    use parking_lot::Mutex;
    use pipeline::{AckMode, CaptureHandle, CaptureSink, MemoryPipeline, PipelineConfig};

    pub fn pipeline(mode: AckMode) -> (Arc<MemoryPipeline>, CaptureHandle) {
        let sink = CaptureSink::new("capture");
        let captured = sink.handle();
        let pipeline = MemoryPipeline::spawn(sink, PipelineConfig::default().with_ack_mode(mode));
        (Arc::new(pipeline), captured)
    }

    pub async fn wait_for(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(3), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    pub async fn within<T>(fut: impl Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), fut)
            .await
            .expect("operation timed out")
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        updates: Mutex<Vec<Status>>,
    }

    impl RecordingReporter {
        pub fn statuses(&self) -> Vec<Status> {
            self.updates.lock().clone()
        }
    }

    impl StatusReporter for RecordingReporter {
        fn update_status(&self, status: Status, _message: &str) {
            self.updates.lock().push(status);
        }
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{InputConfig, RegistryConfig};
    use input_cursor::mock::{MockConfigure, MockInput, MockSource};
    use input_cursor::{Context, InputError, InputManager, InputState, ManagerConfig};
    use pipeline::{AckMode, CaptureSink, MemoryPipeline, PipelineConfig};
    use serde_json::{json, Value};
    use statestore::{FileBackend, ResourceKey, Store};
    use tokio_util::sync::CancellationToken;

    use crate::support::{pipeline, wait_for, within};

    fn key(source: &str) -> ResourceKey {
        ResourceKey::new("mock", Some("logs"), source)
    }

    fn file_manager(dir: &std::path::Path, sources: Vec<MockSource>) -> InputManager<MockConfigure> {
        let registry = RegistryConfig {
            path: Some(dir.to_path_buf()),
            ..RegistryConfig::default()
        };
        InputManager::new(
            ManagerConfig::new("mock").with_registry(registry),
            MockConfigure::new(sources),
        )
    }

    /// One source fails after staging an unacknowledged checkpoint. Its
    /// siblings are cancelled and released, the failure names the input and
    /// the store keeps the previously committed position until the pipeline
    /// acknowledges.
    #[tokio::test]
    async fn test_failure_keeps_unacked_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = InputConfig::new("mock").with_id("logs");

        {
            let manager = file_manager(
                dir.path(),
                vec![MockSource::new("a").publish_at("a-0", json!({"offset": 0}))],
            );
            let input = manager.create(&config).unwrap();
            let store = manager.store().unwrap();
            let (pipeline, _) = pipeline(AckMode::Auto);
            within(input.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
                .await
                .unwrap();
            wait_for(|| store.checkpoint(&key("a")) == Some(json!({"offset": 0}))).await;
            pipeline.shutdown().await;
            manager.shutdown().await;
        }

        let manager = file_manager(
            dir.path(),
            vec![
                MockSource::new("a")
                    .publish_at("a-1", json!({"offset": 1}))
                    .fail("read error"),
                MockSource::new("b").wait_for_cancel(),
                MockSource::new("c").wait_for_cancel(),
            ],
        );
        let input = manager.create(&config).unwrap();
        let store = manager.store().unwrap();
        let (pipeline, captured) = pipeline(AckMode::Manual);
        let ctx = Context::new("logs", CancellationToken::new());

        let err = within(input.run(&ctx, pipeline.clone())).await.unwrap_err();
        assert!(matches!(err, InputError::RunFailed { ref input_id, .. } if input_id == "logs"));
        let message = err.to_string();
        assert!(message.contains("input logs failed"), "got: {message}");
        assert!(message.contains("read error"), "got: {message}");
        assert_eq!(input.state(), InputState::Done);
        assert_eq!(
            input.input().starts().last(),
            Some(&("a".to_string(), json!({"offset": 0})))
        );

        assert_eq!(store.checkpoint(&key("a")), Some(json!({"offset": 0})));
        for source in ["a", "b", "c"] {
            let resource = store.get(&key(source)).unwrap();
            assert!(!resource.is_locked(), "{source} still locked");
        }

        // The event was written; the committed position is still the old one
        // until it is acknowledged.
        wait_for(|| pipeline.held() == 1).await;
        assert_eq!(captured.len(), 1);
        assert_eq!(store.checkpoint(&key("a")), Some(json!({"offset": 0})));
        assert_eq!(pipeline.ack_all(), 1);
        wait_for(|| store.checkpoint(&key("a")) == Some(json!({"offset": 1}))).await;

        pipeline.shutdown().await;
        manager.shutdown().await;

        let reopened = Store::open(Arc::new(FileBackend::open(dir.path().join("mock")).unwrap()))
            .unwrap();
        assert_eq!(reopened.checkpoint(&key("a")), Some(json!({"offset": 1})));
    }

    /// Once the pipeline drops an event for a source, later events from that
    /// source are still written but never move its checkpoint.
    #[tokio::test]
    async fn test_dropped_event_freezes_checkpoint() {
        let manager = InputManager::new(
            ManagerConfig::new("mock"),
            MockConfigure::new(vec![MockSource::new("a")
                .publish_at("a-1", json!({"offset": 1}))
                .sleep(Duration::from_millis(200))
                .publish_at("a-2", json!({"offset": 2}))]),
        );
        let input = manager
            .create(&InputConfig::new("mock").with_id("logs"))
            .unwrap();
        let store = manager.store().unwrap();

        let sink = CaptureSink::new("capture").failing(1);
        let captured = sink.handle();
        let config = PipelineConfig {
            max_retries: 0,
            ..PipelineConfig::default()
        };
        let pipeline = Arc::new(MemoryPipeline::spawn(sink, config));

        within(input.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
            .await
            .unwrap();
        wait_for(|| pipeline.metrics().written() == 1).await;
        assert_eq!(pipeline.metrics().dropped(), 1);
        assert_eq!(captured.events().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pipeline.metrics().acked(), 0);
        assert_eq!(store.checkpoint(&key("a")), Some(Value::Null));

        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    /// A new input with the same id and source name resumes from the
    /// position committed by its predecessor.
    #[tokio::test]
    async fn test_takeover_resumes_from_persisted_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let config = InputConfig::new("mock").with_id("logs");

        {
            let manager = file_manager(
                dir.path(),
                vec![MockSource::new("app.log").publish_at("line", json!({"offset": 120}))],
            );
            let input = manager.create(&config).unwrap();
            let store = manager.store().unwrap();
            let (pipeline, _) = pipeline(AckMode::Auto);

            within(input.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
                .await
                .unwrap();
            wait_for(|| store.checkpoint(&key("app.log")) == Some(json!({"offset": 120}))).await;
            pipeline.shutdown().await;
            manager.shutdown().await;
        }

        let manager = file_manager(dir.path(), vec![MockSource::new("app.log")]);
        let input = manager.create(&config).unwrap();
        let (pipeline, _) = pipeline(AckMode::Auto);
        within(input.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
            .await
            .unwrap();

        assert_eq!(
            input.input().starts(),
            vec![("app.log".to_string(), json!({"offset": 120}))]
        );
        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    /// Inputs with a different id never see each other's cursors.
    #[tokio::test]
    async fn test_other_id_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let manager = file_manager(
            dir.path(),
            vec![MockSource::new("app.log").publish_at("line", json!({"offset": 7}))],
        );
        let store = manager.init().unwrap();
        let (pipeline, _) = pipeline(AckMode::Auto);

        let first = manager.create(&InputConfig::new("mock").with_id("logs")).unwrap();
        within(first.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
            .await
            .unwrap();
        wait_for(|| store.checkpoint(&key("app.log")) == Some(json!({"offset": 7}))).await;

        let second = manager.create(&InputConfig::new("mock").with_id("other")).unwrap();
        within(second.run(&Context::new("other", CancellationToken::new()), pipeline.clone()))
            .await
            .unwrap();
        assert_eq!(
            second.input().starts().last(),
            Some(&("app.log".to_string(), Value::Null))
        );

        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    /// Only acknowledged positions survive a restart.
    #[tokio::test]
    async fn test_crash_keeps_last_acked_position() {
        let dir = tempfile::tempdir().unwrap();
        let backend_dir = dir.path().join("mock");
        let ctx = Context::new("logs", CancellationToken::new());

        {
            let manager = file_manager(
                dir.path(),
                vec![MockSource::new("a")
                    .publish_at("one", json!({"offset": 1}))
                    .publish_at("two", json!({"offset": 2}))
                    .publish_at("three", json!({"offset": 3}))],
            );
            let input = manager.create(&InputConfig::new("mock").with_id("logs")).unwrap();
            let store = manager.store().unwrap();
            let (pipeline, _) = pipeline(AckMode::Manual);

            within(input.run(&ctx, pipeline.clone())).await.unwrap();
            wait_for(|| pipeline.held() == 3).await;
            assert_eq!(pipeline.ack_next(2), 2);
            wait_for(|| store.checkpoint(&key("a")) == Some(json!({"offset": 2}))).await;
            // The third event is never acknowledged before the "crash".
            manager.shutdown().await;
        }

        let reopened = Store::open(Arc::new(FileBackend::open(&backend_dir).unwrap())).unwrap();
        assert_eq!(reopened.checkpoint(&key("a")), Some(json!({"offset": 2})));
        assert!(!reopened.get(&key("a")).unwrap().is_locked());
    }

    /// A panicking source fails its input without taking down the process
    /// or its sibling's progress.
    #[tokio::test]
    async fn test_panic_is_isolated() {
        let manager = InputManager::new(
            ManagerConfig::new("mock"),
            MockConfigure::new(vec![
                MockSource::new("good")
                    .publish_at("ok", json!({"offset": 10}))
                    .sleep(Duration::from_millis(50)),
                MockSource::new("bad").sleep(Duration::from_millis(20)).panic("corrupt frame"),
            ]),
        );
        let input = manager.create(&InputConfig::new("mock").with_id("logs")).unwrap();
        let store = manager.store().unwrap();
        let (pipeline, _) = pipeline(AckMode::Auto);

        let err = within(input.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("input panic with: corrupt frame"), "got: {message}");

        wait_for(|| store.checkpoint(&key("good")) == Some(json!({"offset": 10}))).await;
        assert!(!store.get(&key("bad")).unwrap().is_locked());

        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    /// Released resources are reaped once their clean timeout elapsed.
    #[tokio::test]
    async fn test_finished_sources_are_reaped() {
        let manager = InputManager::new(
            ManagerConfig::new("mock").with_clean_timeout(Duration::from_millis(30)),
            MockConfigure::new(vec![
                MockSource::new("a").publish_at("x", json!({"offset": 1})),
                MockSource::new("b"),
            ]),
        );
        let input = manager.create(&InputConfig::new("mock").with_id("logs")).unwrap();
        let store = manager.store().unwrap();
        let (pipeline, _) = pipeline(AckMode::Auto);

        within(input.run(&Context::new("logs", CancellationToken::new()), pipeline.clone()))
            .await
            .unwrap();
        wait_for(|| store.checkpoint(&key("a")) == Some(json!({"offset": 1}))).await;
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.reap(), 2);
        assert!(store.is_empty());

        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    /// A blocked source holds its lock until the input is cancelled.
    #[tokio::test]
    async fn test_cancel_releases_held_source() {
        let manager = InputManager::new(
            ManagerConfig::new("mock"),
            MockConfigure::new(vec![MockSource::new("shared").wait_for_cancel()]),
        );
        let input = manager.create(&InputConfig::new("mock").with_id("logs")).unwrap();
        let store = manager.store().unwrap();
        let (pipeline, _) = pipeline(AckMode::Auto);

        let cancel = CancellationToken::new();
        let ctx = Context::new("logs", cancel.clone());
        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { input.run(&ctx, pipeline).await })
        };
        wait_for(|| store.get(&key("shared")).is_some_and(|r| r.is_locked())).await;

        // Nobody else can take the resource while the input runs.
        let other = CancellationToken::new();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock(&key("shared"), &other),
        )
        .await;
        assert!(blocked.is_err());

        cancel.cancel();
        within(task).await.unwrap().unwrap();
        assert!(!store.get(&key("shared")).unwrap().is_locked());

        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_unfinished_run_is_rejected() {
        let manager = InputManager::new(
            ManagerConfig::new("mock"),
            MockConfigure::new(vec![MockSource::new("a").wait_for_cancel()]),
        );
        let input = Arc::new(manager.create(&InputConfig::new("mock")).unwrap());
        let (pipeline, _) = pipeline(AckMode::Auto);
        let cancel = CancellationToken::new();

        let running = {
            let input = Arc::clone(&input);
            let pipeline = pipeline.clone();
            let ctx = Context::new("mock", cancel.clone());
            tokio::spawn(async move { input.run(&ctx, pipeline).await })
        };
        wait_for(|| input.state() == InputState::Running).await;

        let second = input
            .run(&Context::new("mock", CancellationToken::new()), pipeline.clone())
            .await;
        assert!(matches!(second, Err(InputError::InvalidState { .. })));

        cancel.cancel();
        within(running).await.unwrap().unwrap();
        assert_eq!(input.state(), InputState::Done);
        pipeline.shutdown().await;
    }
}

#[cfg(test)]
mod config_flow_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::Status;
    use input_cursor::mock::{MockConfigure, MockSource};
    use input_cursor::{Context, InputManager, ManagerConfig, TestContext};
    use observability::IngestMetricsAggregator;
    use pipeline::AckMode;
    use serde_json::json;
    use statestore::ResourceKey;
    use tokio_util::sync::CancellationToken;

    use crate::support::{pipeline, wait_for, within, RecordingReporter};

    const AGENT_TOML: &str = r#"
[registry]
reap_interval_secs = 1

[[inputs]]
type = "mock"
id = "app"
clean_inactive_secs = 600
sources = ["x", "y"]
"#;

    #[tokio::test]
    async fn test_config_to_running_input() {
        let config = ConfigLoader::load_from_str(AGENT_TOML, ConfigFormat::Toml).unwrap();
        let manager = InputManager::new(
            ManagerConfig::new("mock").with_registry(config.registry.clone()),
            MockConfigure::new(Vec::new()),
        );
        let input = manager.create(&config.inputs[0]).unwrap();
        assert_eq!(input.clean_timeout(), Duration::from_secs(600));
        assert_eq!(input.sources().count(), 2);

        let cancel = CancellationToken::new();
        input.test(&TestContext::new(cancel.clone())).await.unwrap();

        let reporter = Arc::new(RecordingReporter::default());
        let ctx = Context::new("app", cancel.clone()).with_status_reporter(reporter.clone());
        let (pipeline, _) = pipeline(AckMode::Auto);
        let running = {
            let pipeline = pipeline.clone();
            async move { input.run(&ctx, pipeline).await }
        };
        let handle = tokio::spawn(running);

        let store = manager.store().unwrap();
        let x = ResourceKey::new("mock", Some("app"), "x");
        wait_for(|| store.get(&x).is_some_and(|r| r.is_locked())).await;

        cancel.cancel();
        within(handle).await.unwrap().unwrap();
        assert!(!store.get(&x).unwrap().is_locked());
        assert_eq!(store.get(&x).unwrap().ttl(), Duration::from_secs(600));
        assert_eq!(
            reporter.statuses(),
            vec![Status::Running, Status::Stopped]
        );

        pipeline.shutdown().await;
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_source_test_failures_are_joined() {
        let manager = InputManager::new(
            ManagerConfig::new("mock"),
            MockConfigure::new(vec![
                MockSource::new("a").failing_test("permission denied"),
                MockSource::new("b"),
                MockSource::new("c").panicking_test(),
            ]),
        );
        let input = manager.create(&contracts::InputConfig::new("mock")).unwrap();
        let err = input
            .test(&TestContext::new(CancellationToken::new()))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("input tests failed"), "got: {message}");
        assert!(message.contains("permission denied"), "got: {message}");
        assert!(message.contains("test of 'c' panicked"), "got: {message}");
    }

    #[tokio::test]
    async fn test_metrics_follow_running_sources() {
        let manager = InputManager::new(
            ManagerConfig::new("mock"),
            MockConfigure::new(vec![MockSource::new("a")
                .publish_at("one", json!({"offset": 1}))
                .publish_at("two", json!({"offset": 2}))
                .wait_for_cancel()]),
        );
        let input = manager.create(&contracts::InputConfig::new("mock").with_id("app")).unwrap();
        let registry = Arc::clone(manager.metrics());
        let store = manager.init().unwrap();
        let (pipeline, captured) = pipeline(AckMode::Auto);
        let cancel = CancellationToken::new();

        let ctx = Context::new("app", cancel.clone());
        let handle = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { input.run(&ctx, pipeline).await })
        };

        let a = ResourceKey::new("mock", Some("app"), "a");
        wait_for(|| store.checkpoint(&a) == Some(json!({"offset": 2}))).await;
        assert_eq!(captured.len(), 2);

        let mut aggregator = IngestMetricsAggregator::new();
        let report = registry.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].0, "app::a");
        aggregator.update(&report);
        assert_eq!(observability::export_registry(&registry), 1);
        observability::record_registry_size("mock", store.len());

        cancel.cancel();
        let result = within(handle).await.unwrap();
        aggregator.record_run(result.is_ok());
        observability::record_run_finished("mock", result.is_ok());

        let summary = aggregator.summary();
        assert_eq!(summary.total_published, 2);
        assert_eq!(summary.runs_succeeded, 1);
        assert!(registry.is_empty());

        pipeline.shutdown().await;
        manager.shutdown().await;
    }
}
