use crate::shared::error::AppError;
use async_trait::async_trait;

/// ローカル永続化のポート。キャッシュとトラッカーのスナップショット保存に使う。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn put(&self, key: &str, value: String) -> Result<(), AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    async fn clear(&self) -> Result<(), AppError>;
}
