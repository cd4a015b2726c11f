use super::connectivity_monitor::ConnectivityMonitor;
use super::optimistic_post_tracker::{OptimisticPostTracker, PENDING_SNAPSHOT_KEY, TrackerSnapshot};
use super::sync_service::SyncParticipant;
use crate::application::ports::error_reporter::ErrorReporter;
use crate::application::ports::key_value_store::KeyValueStore;
use crate::application::ports::remote_post_api::RemotePostApi;
use crate::application::ports::repositories::{PostRepository, PostSyncEvent};
use crate::domain::entities::{
    Comment, Fetched, PendingOperation, PendingOperationKind, Post, PostDraft, SyncReport,
};
use crate::domain::value_objects::{LocalPostId, PageRequest, PendingOperationId, PostId};
use crate::infrastructure::cache::{CACHE_SNAPSHOT_KEY, CacheSnapshot, CacheStatus, CacheStore};
use crate::shared::config::{CacheConfig, SyncConfig};
use crate::shared::error::AppError;
use crate::shared::validation::{ValidationFailureKind, validate_new_post, validate_query};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 1 件の作成オペレーションを送信した結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Confirmed,
    RolledBack,
    Deferred,
    /// 他の送信が進行中、または既に解決済み
    Skipped,
}

struct RepositoryInner {
    remote: Arc<dyn RemotePostApi>,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<ConnectivityMonitor>,
    reporter: Arc<dyn ErrorReporter>,
    cache: RwLock<CacheStore>,
    tracker: Mutex<OptimisticPostTracker>,
    events: broadcast::Sender<PostSyncEvent>,
    sync: SyncConfig,
}

/// キャッシュ優先・リモートフォールバックの投稿リポジトリ。
///
/// CacheStore と OptimisticPostTracker を唯一所有し、両者への書き込みはここを通す。
/// ロックはトラッカー → キャッシュの順でのみ取得し、リモート呼び出し中は保持しない。
#[derive(Clone)]
pub struct OfflineFirstPostRepository {
    inner: Arc<RepositoryInner>,
}

impl OfflineFirstPostRepository {
    pub fn new(
        remote: Arc<dyn RemotePostApi>,
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<ConnectivityMonitor>,
        reporter: Arc<dyn ErrorReporter>,
        cache_config: &CacheConfig,
        sync_config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RepositoryInner {
                remote,
                store,
                connectivity,
                reporter,
                cache: RwLock::new(CacheStore::from_config(cache_config)),
                tracker: Mutex::new(OptimisticPostTracker::new()),
                events,
                sync: sync_config,
            }),
        }
    }

    /// 永続化済みのキャッシュと保留中オペレーションを読み込む。
    /// 壊れたスナップショットは警告のうえ無視する。
    pub async fn restore(&self) -> Result<(), AppError> {
        if let Some(snapshot) = self.load_snapshot::<CacheSnapshot>(CACHE_SNAPSHOT_KEY).await? {
            let mut cache = self.inner.cache.write().await;
            cache.restore(snapshot);
            info!(posts = cache.size(), "restored post cache");
        }

        if let Some(snapshot) = self
            .load_snapshot::<TrackerSnapshot>(PENDING_SNAPSHOT_KEY)
            .await?
        {
            let mut tracker = self.inner.tracker.lock().await;
            tracker.restore(snapshot);
            info!(pending = tracker.len(), "restored pending operations");
        }
        Ok(())
    }

    async fn load_snapshot<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let Some(raw) = self.inner.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<T>(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                let err = AppError::from(err);
                warn!(key, error = %err, "ignoring corrupt snapshot");
                self.inner.reporter.report(key, &err);
                Ok(None)
            }
        }
    }

    async fn persist_cache(&self) -> Result<(), AppError> {
        let snapshot = self.inner.cache.read().await.snapshot();
        let json = serde_json::to_string(&snapshot)?;
        self.inner.store.put(CACHE_SNAPSHOT_KEY, json).await
    }

    async fn persist_tracker(&self) -> Result<(), AppError> {
        let snapshot = self.inner.tracker.lock().await.snapshot();
        let json = serde_json::to_string(&snapshot)?;
        self.inner.store.put(PENDING_SNAPSHOT_KEY, json).await
    }

    /// 読み取り経路の永続化は失敗しても結果を返す
    async fn persist_cache_best_effort(&self, context: &str) {
        if let Err(err) = self.persist_cache().await {
            self.inner.reporter.report(context, &err);
        }
    }

    async fn persist_tracker_best_effort(&self, context: &str) {
        if let Err(err) = self.persist_tracker().await {
            self.inner.reporter.report(context, &err);
        }
    }

    fn emit(&self, event: PostSyncEvent) {
        // 購読者がいなくても処理は続ける
        let _ = self.inner.events.send(event);
    }

    pub async fn cache_status(&self) -> CacheStatus {
        self.inner.cache.read().await.status_at(Utc::now())
    }

    pub async fn pending_operations(&self) -> Vec<PendingOperation> {
        self.inner.tracker.lock().await.pending_operations()
    }

    /// 送信待ちの仮投稿（新しい順）
    pub async fn pending_posts(&self) -> Vec<Post> {
        self.inner.tracker.lock().await.pending_posts()
    }

    /// お気に入りは残して本文・ページ・コメントを消去する
    pub async fn clear_cache(&self) -> Result<(), AppError> {
        self.inner.cache.write().await.clear();
        self.persist_cache().await
    }

    async fn overlay_favorites(&self, posts: Vec<Post>) -> Vec<Post> {
        let cache = self.inner.cache.read().await;
        posts
            .into_iter()
            .map(|post| {
                let is_favorite = cache.is_favorite(&post.id);
                post.with_favorite(is_favorite)
            })
            .collect()
    }

    async fn store_page(&self, request: PageRequest, posts: Vec<Post>) -> Vec<Post> {
        let overlaid = self.overlay_favorites(posts.clone()).await;
        {
            let mut cache = self.inner.cache.write().await;
            cache.put_page(request, posts);
        }
        self.persist_cache_best_effort("persist_cache").await;
        overlaid
    }

    /// 作成オペレーションを送信する。
    ///
    /// `attempts` 回まで指数バックオフで再試行し、結果をトラッカーとキャッシュに反映する。
    pub async fn submit_create(
        &self,
        operation_id: &PendingOperationId,
        attempts: u32,
    ) -> CreateOutcome {
        let claimed = {
            let mut tracker = self.inner.tracker.lock().await;
            if !tracker.begin_attempt(operation_id) {
                None
            } else {
                match tracker.operation(operation_id).cloned() {
                    Some(operation) => Some(operation),
                    None => {
                        tracker.end_attempt(operation_id);
                        None
                    }
                }
            }
        };
        let Some(operation) = claimed else {
            debug!(operation_id = %operation_id, "create already in flight or resolved");
            return CreateOutcome::Skipped;
        };

        let (Some(local_id), Some(draft)) = (operation.local_post_id, operation.draft().cloned())
        else {
            self.inner.tracker.lock().await.end_attempt(operation_id);
            return CreateOutcome::Skipped;
        };

        let result = self.create_with_backoff(&draft, attempts.max(1)).await;
        self.resolve_create(operation_id, local_id, result).await
    }

    async fn create_with_backoff(&self, draft: &PostDraft, attempts: u32) -> Result<Post, AppError> {
        let mut attempt = 1;
        loop {
            match self.inner.remote.create_post(draft).await {
                Ok(post) => return Ok(post),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.inner.sync.backoff_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying create");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn resolve_create(
        &self,
        operation_id: &PendingOperationId,
        local_id: LocalPostId,
        result: Result<Post, AppError>,
    ) -> CreateOutcome {
        let outcome = match result {
            Ok(created) => {
                let confirmed = self.inner.tracker.lock().await.confirm(local_id, &created);
                if let Err(err) = confirmed {
                    self.inner.reporter.report("confirm_optimistic_post", &err);
                    return CreateOutcome::Skipped;
                }
                let post = {
                    let mut cache = self.inner.cache.write().await;
                    cache.insert_at_feed_head(created.clone());
                    cache.get(&created.id).unwrap_or(created)
                };
                info!(local_id = %local_id, post_id = %post.id, "optimistic post confirmed");
                self.persist_cache_best_effort("persist_cache").await;
                self.emit(PostSyncEvent::Confirmed { local_id, post });
                CreateOutcome::Confirmed
            }
            Err(err) if err.is_permanent() => self.roll_back(local_id, err).await,
            Err(err) => {
                let retry_count = {
                    let mut tracker = self.inner.tracker.lock().await;
                    let count = tracker.record_failure(operation_id, &err);
                    tracker.end_attempt(operation_id);
                    count
                };
                match retry_count {
                    Ok(count) if count >= self.inner.sync.max_retries => {
                        warn!(local_id = %local_id, retry_count = count, "retry budget exhausted");
                        self.roll_back(local_id, err).await
                    }
                    Ok(count) => {
                        info!(local_id = %local_id, retry_count = count, error = %err, "create deferred to next sync");
                        self.emit(PostSyncEvent::Deferred {
                            local_id,
                            retry_count: count,
                        });
                        CreateOutcome::Deferred
                    }
                    Err(invariant) => {
                        self.inner.reporter.report("record_create_failure", &invariant);
                        CreateOutcome::Skipped
                    }
                }
            }
        };
        self.persist_tracker_best_effort("persist_pending_operations").await;
        outcome
    }

    async fn roll_back(&self, local_id: LocalPostId, err: AppError) -> CreateOutcome {
        let rolled_back = self.inner.tracker.lock().await.rollback(local_id, &err);
        if let Err(invariant) = rolled_back {
            self.inner.reporter.report("rollback_optimistic_post", &invariant);
            return CreateOutcome::Skipped;
        }
        warn!(local_id = %local_id, kind = err.kind_name(), error = %err, "optimistic post rolled back");
        self.emit(PostSyncEvent::RolledBack {
            local_id,
            error: err,
        });
        CreateOutcome::RolledBack
    }

    /// 保存に失敗したお気に入り切り替えを取り消す
    async fn revert_favorite(
        &self,
        id: PostId,
        applied: bool,
        operation_id: &PendingOperationId,
    ) {
        let mut tracker = self.inner.tracker.lock().await;
        let mut cache = self.inner.cache.write().await;
        if applied {
            cache.unfavorite(&id);
        } else {
            cache.favorite(id);
        }
        if let Err(invariant) = tracker.complete_operation(operation_id) {
            self.inner.reporter.report("revert_unpersisted_favorite", &invariant);
        }
        warn!(post_id = %id, is_favorite = applied, "favorite toggle reverted after persistence failure");
    }

    /// 本文の無いお気に入りをリモートから補完する（失敗は無視）
    async fn backfill_favorites(&self) {
        let missing = self.inner.cache.read().await.favorites_missing_body();
        if missing.is_empty() || !self.inner.connectivity.is_connected() {
            return;
        }

        let fetches = missing
            .iter()
            .filter_map(|id| id.server_id())
            .map(|server_id| self.inner.remote.get_post(server_id));
        let results = join_all(fetches).await;

        let mut filled = 0;
        for result in results {
            match result {
                Ok(post) => {
                    self.inner.cache.write().await.put(post);
                    filled += 1;
                }
                Err(err) => self.inner.reporter.report("backfill_favorite", &err),
            }
        }
        if filled > 0 {
            debug!(filled, "back-filled favorite bodies");
            self.persist_cache_best_effort("persist_cache").await;
        }
    }
}

#[async_trait]
impl PostRepository for OfflineFirstPostRepository {
    async fn get_posts(
        &self,
        page: u32,
        limit: u32,
        force_refresh: bool,
    ) -> Result<Fetched<Vec<Post>>, AppError> {
        let request = PageRequest::new(page, limit)?;

        if !force_refresh {
            let cache = self.inner.cache.read().await;
            if cache.has_page(&request) {
                let stale = !cache.is_page_fresh(&request);
                debug!(%request, stale, "serving page from cache");
                return Ok(Fetched::cached(cache.get_page(&request), stale));
            }
        }

        match self.inner.remote.list_posts(request).await {
            Ok(posts) => {
                let posts = self.store_page(request, posts).await;
                Ok(Fetched::remote(posts))
            }
            Err(err) if err.is_remote_failure() => {
                let cache = self.inner.cache.read().await;
                if cache.has_page(&request) {
                    let stale = !cache.is_page_fresh(&request);
                    warn!(%request, error = %err, "remote fetch failed, serving cached page");
                    Ok(Fetched::fallback(cache.get_page(&request), stale, err.kind_name()))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn get_post(&self, id: PostId, force_refresh: bool) -> Result<Fetched<Post>, AppError> {
        let server_id = match id {
            PostId::Optimistic(local_id) => {
                let tracker = self.inner.tracker.lock().await;
                return tracker
                    .get_optimistic(local_id)
                    .map(|post| Fetched::cached(post, false))
                    .ok_or_else(|| AppError::NotFound(format!("post {id}")));
            }
            PostId::Confirmed(server_id) => server_id,
        };

        if !force_refresh {
            let cache = self.inner.cache.read().await;
            if let Some(post) = cache.get(&id) {
                let stale = !cache.is_fresh(&id);
                debug!(post_id = %id, stale, "serving post from cache");
                return Ok(Fetched::cached(post, stale));
            }
        }

        match self.inner.remote.get_post(server_id).await {
            Ok(post) => {
                let post = {
                    let mut cache = self.inner.cache.write().await;
                    let is_favorite = cache.is_favorite(&post.id);
                    cache.put(post.clone());
                    post.with_favorite(is_favorite)
                };
                self.persist_cache_best_effort("persist_cache").await;
                Ok(Fetched::remote(post))
            }
            Err(err) if err.is_remote_failure() => {
                let cache = self.inner.cache.read().await;
                match cache.get(&id) {
                    Some(post) => {
                        let stale = !cache.is_fresh(&id);
                        warn!(post_id = %id, error = %err, "remote fetch failed, serving cached post");
                        Ok(Fetched::fallback(post, stale, err.kind_name()))
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn search_posts(&self, query: &str, page: u32, limit: u32) -> Result<Vec<Post>, AppError> {
        let query = validate_query(query)?;
        let request = PageRequest::new(page, limit)?;

        let matches = self.inner.remote.search_posts(&query).await?;
        debug!(query = %query, matched = matches.len(), %request, "search completed");
        let sliced = request.slice(&matches).to_vec();
        Ok(self.overlay_favorites(sliced).await)
    }

    async fn create_post(
        &self,
        title: String,
        body: String,
        author_id: i64,
    ) -> Result<Post, AppError> {
        validate_new_post(&title, &body, author_id)?;
        let draft = PostDraft::new(title, body, author_id).normalized();

        let (post, operation_id) = self.inner.tracker.lock().await.add_optimistic(draft);
        let local_id = post
            .local_id()
            .ok_or_else(|| AppError::invariant("optimistic post without local id"))?;

        if let Err(err) = self.persist_tracker().await {
            // 保存できなかった書き込みは表示前に取り消す
            let reverted = self.inner.tracker.lock().await.rollback(local_id, &err);
            if let Err(invariant) = reverted {
                self.inner.reporter.report("revert_unpersisted_create", &invariant);
            }
            return Err(err);
        }

        info!(local_id = %local_id, operation_id = %operation_id, "optimistic post created");
        self.emit(PostSyncEvent::Created(post.clone()));

        if !self.inner.connectivity.is_connected() {
            info!(local_id = %local_id, "offline, create left pending for sync");
            return Ok(post);
        }

        // 呼び出し元が破棄されても結果は反映する
        let repository = self.clone();
        let attempts = self.inner.sync.create_attempts;
        tokio::spawn(async move {
            repository.submit_create(&operation_id, attempts).await;
        });

        Ok(post)
    }

    async fn toggle_favorite(&self, id: PostId, is_favorite: bool) -> Result<(), AppError> {
        if id.is_optimistic() {
            return Err(AppError::validation(
                ValidationFailureKind::NotYetConfirmed,
                format!("post {id} is not confirmed yet"),
            ));
        }

        let operation_id = {
            let mut tracker = self.inner.tracker.lock().await;
            let mut cache = self.inner.cache.write().await;
            let changed = if is_favorite {
                cache.favorite(id)
            } else {
                cache.unfavorite(&id)
            };
            changed.then(|| tracker.record_favorite_toggle(id, is_favorite))
        };

        if let Err(err) = self.persist_cache().await {
            if let Some(operation_id) = &operation_id {
                self.revert_favorite(id, is_favorite, operation_id).await;
            }
            return Err(err);
        }
        let Some(operation_id) = operation_id else {
            return Ok(());
        };
        if let Err(err) = self.persist_tracker().await {
            self.revert_favorite(id, is_favorite, &operation_id).await;
            // キャッシュ側は変更後の状態で保存済みなので戻した状態を書き直す
            self.persist_cache_best_effort("persist_cache").await;
            return Err(err);
        }

        debug!(post_id = %id, is_favorite, "favorite toggled");
        self.emit(PostSyncEvent::FavoriteChanged { id, is_favorite });
        Ok(())
    }

    async fn get_favorites(&self, page: u32, limit: u32) -> Result<Vec<Post>, AppError> {
        let request = PageRequest::new(page, limit)?;
        self.backfill_favorites().await;
        Ok(self.inner.cache.read().await.get_favorites(&request))
    }

    async fn get_comments(
        &self,
        post_id: PostId,
        force_refresh: bool,
    ) -> Result<Fetched<Vec<Comment>>, AppError> {
        let Some(server_id) = post_id.server_id() else {
            return Ok(Fetched::cached(Vec::new(), false));
        };

        if !force_refresh {
            let cache = self.inner.cache.read().await;
            if let Some(comments) = cache.get_comments(&post_id) {
                let stale = !cache.are_comments_fresh(&post_id);
                return Ok(Fetched::cached(comments, stale));
            }
        }

        match self.inner.remote.list_comments(server_id).await {
            Ok(comments) => {
                self.inner
                    .cache
                    .write()
                    .await
                    .put_comments(post_id, comments.clone());
                self.persist_cache_best_effort("persist_cache").await;
                Ok(Fetched::remote(comments))
            }
            Err(err) if err.is_remote_failure() => {
                let cache = self.inner.cache.read().await;
                match cache.get_comments(&post_id) {
                    Some(comments) => {
                        let stale = !cache.are_comments_fresh(&post_id);
                        Ok(Fetched::fallback(comments, stale, err.kind_name()))
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn refresh_posts(&self, clear_cache: bool, limit: u32) -> Result<Vec<Post>, AppError> {
        let request = PageRequest::first(limit)?;
        if clear_cache {
            self.inner.cache.write().await.clear();
            info!("post cache cleared before refresh");
        }

        let posts = match self.inner.remote.list_posts(request).await {
            Ok(posts) => posts,
            Err(err) => {
                if clear_cache {
                    self.persist_cache_best_effort("persist_cache").await;
                }
                return Err(err);
            }
        };
        Ok(self.store_page(request, posts).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<PostSyncEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl SyncParticipant for OfflineFirstPostRepository {
    async fn replay_pending(&self) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();
        if !self.inner.connectivity.is_connected() {
            debug!("offline, skipping replay");
            return Ok(report);
        }

        let operations = self.inner.tracker.lock().await.pending_operations();
        for operation in operations {
            match operation.kind() {
                PendingOperationKind::ToggleFavorite => {
                    match self.inner.tracker.lock().await.complete_operation(&operation.id) {
                        Ok(_) => report.confirmed += 1,
                        Err(_) => report.skipped_in_flight += 1,
                    }
                }
                PendingOperationKind::CreatePost => {
                    // 1 サイクルにつき 1 回だけ送信する
                    match self.submit_create(&operation.id, 1).await {
                        CreateOutcome::Confirmed => report.confirmed += 1,
                        CreateOutcome::RolledBack => report.rolled_back += 1,
                        CreateOutcome::Deferred => report.deferred += 1,
                        CreateOutcome::Skipped => report.skipped_in_flight += 1,
                    }
                }
            }
        }

        self.persist_tracker().await?;
        Ok(report)
    }

    async fn refresh_stale(&self) -> Result<u32, AppError> {
        if !self.inner.connectivity.is_connected() {
            return Ok(0);
        }

        let stale_pages = self.inner.cache.read().await.stale_pages_at(Utc::now());
        let mut refreshed = 0;
        for request in stale_pages {
            match self.inner.remote.list_posts(request).await {
                Ok(posts) => {
                    self.inner.cache.write().await.put_page(request, posts);
                    refreshed += 1;
                }
                Err(err) => self.inner.reporter.report("refresh_stale_page", &err),
            }
        }

        if refreshed > 0 {
            debug!(refreshed, "refreshed stale pages");
            self.persist_cache_best_effort("persist_cache").await;
        }
        Ok(refreshed)
    }
}
