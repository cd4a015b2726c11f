use crate::application::ports::repositories::{PostRepository, PostSyncEvent};
use crate::domain::entities::{DataSource, Post};
use crate::domain::value_objects::{LocalPostId, PostId};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FeedStatus {
    #[default]
    Initial,
    Loading,
    Loaded {
        source: DataSource,
    },
    Failed {
        error: AppError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    LoadStarted,
    PageLoaded {
        page: u32,
        posts: Vec<Post>,
        source: DataSource,
        has_more: bool,
    },
    LoadFailed {
        error: AppError,
    },
    OptimisticAdded(Post),
    OptimisticConfirmed {
        local_id: LocalPostId,
        post: Post,
    },
    OptimisticRolledBack {
        local_id: LocalPostId,
        error: AppError,
    },
    FavoriteChanged {
        id: PostId,
        is_favorite: bool,
    },
}

impl FeedEvent {
    /// リポジトリ通知をフィードイベントに変換する。Deferred は表示に影響しない。
    pub fn from_sync_event(event: PostSyncEvent) -> Option<Self> {
        match event {
            PostSyncEvent::Created(post) => Some(FeedEvent::OptimisticAdded(post)),
            PostSyncEvent::Confirmed { local_id, post } => {
                Some(FeedEvent::OptimisticConfirmed { local_id, post })
            }
            PostSyncEvent::RolledBack { local_id, error } => {
                Some(FeedEvent::OptimisticRolledBack { local_id, error })
            }
            PostSyncEvent::Deferred { .. } => None,
            PostSyncEvent::FavoriteChanged { id, is_favorite } => {
                Some(FeedEvent::FavoriteChanged { id, is_favorite })
            }
        }
    }
}

/// フィード画面の状態
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedState {
    pub status: FeedStatus,
    pub posts: Vec<Post>,
    pub page: u32,
    pub has_more: bool,
    pub last_error: Option<AppError>,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 状態遷移。副作用を持たない。
    pub fn handle(mut self, event: FeedEvent) -> FeedState {
        match event {
            FeedEvent::LoadStarted => {
                self.status = FeedStatus::Loading;
            }
            FeedEvent::PageLoaded {
                page,
                posts,
                source,
                has_more,
            } => {
                if page <= 1 {
                    // 未確定の仮投稿は先頭に残す
                    let mut merged: Vec<Post> = self
                        .posts
                        .into_iter()
                        .filter(|post| post.is_optimistic())
                        .collect();
                    merged.extend(posts);
                    self.posts = dedup_by_id(merged);
                } else {
                    self.posts.extend(posts);
                    self.posts = dedup_by_id(self.posts);
                }
                self.page = page.max(1);
                self.has_more = has_more;
                self.status = FeedStatus::Loaded { source };
                self.last_error = None;
            }
            FeedEvent::LoadFailed { error } => {
                self.last_error = Some(error.clone());
                self.status = FeedStatus::Failed { error };
            }
            FeedEvent::OptimisticAdded(post) => {
                if !self.posts.iter().any(|existing| existing.id == post.id) {
                    self.posts.insert(0, post);
                }
            }
            FeedEvent::OptimisticConfirmed { local_id, post } => {
                let placeholder = PostId::Optimistic(local_id);
                match self.posts.iter().position(|p| p.id == placeholder) {
                    Some(index) => {
                        let confirmed_id = post.id;
                        self.posts[index] = post;
                        let mut seen_confirmed = false;
                        self.posts.retain(|p| {
                            if p.id != confirmed_id {
                                return true;
                            }
                            let keep = !seen_confirmed;
                            seen_confirmed = true;
                            keep
                        });
                    }
                    None => {
                        if !self.posts.iter().any(|p| p.id == post.id) {
                            self.posts.insert(0, post);
                        }
                    }
                }
            }
            FeedEvent::OptimisticRolledBack { local_id, error } => {
                let placeholder = PostId::Optimistic(local_id);
                self.posts.retain(|p| p.id != placeholder);
                self.last_error = Some(error);
            }
            FeedEvent::FavoriteChanged { id, is_favorite } => {
                for post in self.posts.iter_mut().filter(|p| p.id == id) {
                    post.is_favorite = is_favorite;
                }
            }
        }
        self
    }

    pub fn pending_optimistic(&self) -> Vec<&Post> {
        self.posts.iter().filter(|p| p.is_optimistic()).collect()
    }

    pub fn position_of(&self, id: &PostId) -> Option<usize> {
        self.posts.iter().position(|p| &p.id == id)
    }
}

fn dedup_by_id(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = std::collections::HashSet::new();
    posts
        .into_iter()
        .filter(|post| seen.insert(post.id))
        .collect()
}

/// FeedState を watch チャネルで配信する
#[derive(Debug)]
pub struct FeedStore {
    sender: watch::Sender<FeedState>,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(FeedState::new());
        Self { sender }
    }

    pub fn state(&self) -> FeedState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.sender.subscribe()
    }

    pub fn dispatch(&self, event: FeedEvent) {
        self.sender.send_modify(|state| {
            let current = std::mem::take(state);
            *state = current.handle(event);
        });
    }

    /// ページを読み込み、結果を状態に反映する
    pub async fn load_page(
        &self,
        repository: &dyn PostRepository,
        page: u32,
        limit: u32,
        force_refresh: bool,
    ) -> Result<(), AppError> {
        self.dispatch(FeedEvent::LoadStarted);
        match repository.get_posts(page, limit, force_refresh).await {
            Ok(fetched) => {
                let has_more = fetched.data.len() as u32 >= limit;
                self.dispatch(FeedEvent::PageLoaded {
                    page,
                    posts: fetched.data,
                    source: fetched.source,
                    has_more,
                });
                Ok(())
            }
            Err(error) => {
                self.dispatch(FeedEvent::LoadFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    pub async fn load_next_page(
        &self,
        repository: &dyn PostRepository,
        limit: u32,
    ) -> Result<(), AppError> {
        let state = self.state();
        if !state.has_more && state.page > 0 {
            return Ok(());
        }
        self.load_page(repository, state.page + 1, limit, false).await
    }

    /// リポジトリ通知をこのストアへ流し込むタスクを起動する
    pub fn spawn_bridge(self: &Arc<Self>, mut events: broadcast::Receiver<PostSyncEvent>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(feed_event) = FeedEvent::from_sync_event(event) {
                            store.dispatch(feed_event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "feed bridge lagged behind repository events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
