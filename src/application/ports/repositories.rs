use crate::domain::entities::{Comment, Fetched, Post};
use crate::domain::value_objects::{LocalPostId, PostId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// 楽観的書き込みのライフサイクル通知。UI が購読していなくても処理は完結する。
#[derive(Debug, Clone, PartialEq)]
pub enum PostSyncEvent {
    Created(Post),
    Confirmed { local_id: LocalPostId, post: Post },
    RolledBack { local_id: LocalPostId, error: AppError },
    Deferred { local_id: LocalPostId, retry_count: u32 },
    FavoriteChanged { id: PostId, is_favorite: bool },
}

impl PostSyncEvent {
    pub fn local_id(&self) -> Option<LocalPostId> {
        match self {
            PostSyncEvent::Created(post) => post.local_id(),
            PostSyncEvent::Confirmed { local_id, .. }
            | PostSyncEvent::RolledBack { local_id, .. }
            | PostSyncEvent::Deferred { local_id, .. } => Some(*local_id),
            PostSyncEvent::FavoriteChanged { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostSyncEvent::Confirmed { .. } | PostSyncEvent::RolledBack { .. }
        )
    }
}

/// フィード読み取りと投稿書き込みの単一窓口
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn get_posts(
        &self,
        page: u32,
        limit: u32,
        force_refresh: bool,
    ) -> Result<Fetched<Vec<Post>>, AppError>;

    async fn get_post(&self, id: PostId, force_refresh: bool) -> Result<Fetched<Post>, AppError>;

    async fn search_posts(&self, query: &str, page: u32, limit: u32)
    -> Result<Vec<Post>, AppError>;

    /// 仮投稿を即座に返し、リモート作成はバックグラウンドで行う
    async fn create_post(
        &self,
        title: String,
        body: String,
        author_id: i64,
    ) -> Result<Post, AppError>;

    async fn toggle_favorite(&self, id: PostId, is_favorite: bool) -> Result<(), AppError>;

    async fn get_favorites(&self, page: u32, limit: u32) -> Result<Vec<Post>, AppError>;

    async fn get_comments(
        &self,
        post_id: PostId,
        force_refresh: bool,
    ) -> Result<Fetched<Vec<Comment>>, AppError>;

    async fn refresh_posts(&self, clear_cache: bool, limit: u32) -> Result<Vec<Post>, AppError>;

    fn subscribe(&self) -> broadcast::Receiver<PostSyncEvent>;
}
