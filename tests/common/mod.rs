#![allow(dead_code)]

pub mod mocks;

use mini_feed_lib::application::ports::key_value_store::KeyValueStore;
use mini_feed_lib::infrastructure::network::ManualConnectivitySource;
use mini_feed_lib::infrastructure::storage::InMemoryKeyValueStore;
use mini_feed_lib::shared::config::StorageBackend;
use mini_feed_lib::{AppComponents, AppConfig, AppState, PostSyncEvent};
use mocks::{FakeRemotePostApi, RecordingReporter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestApp {
    pub state: AppState,
    pub remote: FakeRemotePostApi,
    pub source: Arc<ManualConnectivitySource>,
    pub store: Arc<dyn KeyValueStore>,
    pub reporter: RecordingReporter,
}

impl TestApp {
    pub async fn start(remote: FakeRemotePostApi, online: bool) -> TestApp {
        Self::start_with(remote, online, test_config(), Arc::new(InMemoryKeyValueStore::new()))
            .await
    }

    pub async fn start_with(
        remote: FakeRemotePostApi,
        online: bool,
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> TestApp {
        let source = Arc::new(ManualConnectivitySource::new(online));
        let reporter = RecordingReporter::new();
        let state = AppState::with_components(
            config,
            AppComponents {
                remote: Arc::new(remote.clone()),
                store: store.clone(),
                connectivity_source: source.clone(),
                reporter: Arc::new(reporter.clone()),
            },
        )
        .await
        .expect("app state");

        TestApp {
            state,
            remote,
            source,
            store,
            reporter,
        }
    }

    /// 実ネットワークとモニターの両方をオンラインに戻す
    pub async fn reconnect(&self) {
        self.remote.set_offline(false);
        self.source.go_online();
        let connectivity = &self.state.connectivity;
        wait_until(move || async move { connectivity.is_connected() }).await;
    }
}

/// 短いデバウンスとバックオフ、メモリバックエンドの設定
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.connectivity.debounce_ms = 20;
    config.sync.backoff_base_ms = 5;
    config
}

pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// 条件に合うイベントが届くまで待つ
pub async fn next_event<F>(
    events: &mut broadcast::Receiver<PostSyncEvent>,
    mut matches: F,
) -> PostSyncEvent
where
    F: FnMut(&PostSyncEvent) -> bool,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("event channel closed: {err}"),
            }
        }
    })
    .await
    .expect("event not received in time")
}
