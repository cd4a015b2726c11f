use crate::application::ports::connectivity::ConnectivitySource;
use crate::application::ports::error_reporter::ErrorReporter;
use crate::application::ports::key_value_store::KeyValueStore;
use crate::application::ports::remote_post_api::RemotePostApi;
use crate::application::ports::repositories::PostRepository;
use crate::application::services::{
    ConnectivityMonitor, FeedEvent, FeedStore, OfflineFirstPostRepository, SyncService,
};
use crate::infrastructure::TracingErrorReporter;
use crate::infrastructure::network::HttpProbeConnectivitySource;
use crate::infrastructure::remote::HttpPostApi;
use crate::infrastructure::storage::{InMemoryKeyValueStore, SqliteKeyValueStore};
use crate::shared::config::{AppConfig, StorageBackend};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// 差し替え可能な外部コンポーネント
pub struct AppComponents {
    pub remote: Arc<dyn RemotePostApi>,
    pub store: Arc<dyn KeyValueStore>,
    pub connectivity_source: Arc<dyn ConnectivitySource>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub post_repository: OfflineFirstPostRepository,
    pub sync_service: SyncService,
    pub feed: Arc<FeedStore>,
    feed_bridge: Arc<JoinHandle<()>>,
}

impl AppState {
    /// 設定からすべての実装を組み立てる
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;

        let store: Arc<dyn KeyValueStore> = match config.storage.backend {
            StorageBackend::Sqlite => {
                Arc::new(SqliteKeyValueStore::connect(&config.storage.database_url).await?)
            }
            StorageBackend::Memory => Arc::new(InMemoryKeyValueStore::new()),
        };
        let remote = Arc::new(HttpPostApi::new(&config.api)?);
        let probe = Arc::new(HttpProbeConnectivitySource::new(
            &config.api,
            &config.connectivity,
        )?);
        probe.start();

        let components = AppComponents {
            remote,
            store,
            connectivity_source: probe,
            reporter: Arc::new(TracingErrorReporter::new()),
        };
        Self::with_components(config, components).await
    }

    /// 外部コンポーネントを注入して組み立てる（テスト・埋め込み用）
    pub async fn with_components(
        config: AppConfig,
        components: AppComponents,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let connectivity = Arc::new(ConnectivityMonitor::new(
            components.connectivity_source,
            config.connectivity.debounce(),
        ));
        connectivity.start().await;

        let post_repository = OfflineFirstPostRepository::new(
            components.remote,
            components.store.clone(),
            connectivity.clone(),
            components.reporter,
            &config.cache,
            config.sync.clone(),
        );
        post_repository.restore().await?;

        let sync_service = SyncService::new(Arc::new(post_repository.clone()), connectivity.clone());
        if config.sync.auto_sync {
            sync_service.start();
        }

        // 前回セッションの仮投稿をフィードに戻す（古い順に積んで新しいものを先頭に）
        let feed = Arc::new(FeedStore::new());
        for post in post_repository.pending_posts().await.into_iter().rev() {
            feed.dispatch(FeedEvent::OptimisticAdded(post));
        }
        let feed_bridge = feed.spawn_bridge(post_repository.subscribe());

        // 起動時にオンラインなら接続イベントは来ないので、保留分をここで送る
        let pending = post_repository.pending_operations().await.len();
        if config.sync.auto_sync && pending > 0 && connectivity.is_connected() {
            info!(pending, "replaying pending operations restored at startup");
            let service = sync_service.clone();
            tokio::spawn(async move {
                if let Err(e) = service.sync_now().await {
                    tracing::error!("Sync error: {}", e);
                }
            });
        }

        info!(
            backend = ?config.storage.backend,
            connectivity = %connectivity.current(),
            auto_sync = config.sync.auto_sync,
            "application state initialized"
        );

        Ok(Self {
            config,
            store: components.store,
            connectivity,
            post_repository,
            sync_service,
            feed,
            feed_bridge: Arc::new(feed_bridge),
        })
    }

    /// バックグラウンドタスクを停止する
    pub fn shutdown(&self) {
        self.sync_service.stop();
        self.connectivity.stop();
        self.feed_bridge.abort();
    }
}
