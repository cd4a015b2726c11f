use crate::domain::entities::{Comment, Post, PostDraft};
use crate::domain::value_objects::PageRequest;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 投稿 API（リモート）のポート。HTTP 実装は infrastructure::remote。
#[async_trait]
pub trait RemotePostApi: Send + Sync {
    /// サーバーが返した順序のままページを返す
    async fn list_posts(&self, page: PageRequest) -> Result<Vec<Post>, AppError>;

    async fn get_post(&self, id: i64) -> Result<Post, AppError>;

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, AppError>;

    /// 一致した投稿をすべて返す。ページングは呼び出し側で行う。
    async fn search_posts(&self, query: &str) -> Result<Vec<Post>, AppError>;

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError>;
}
