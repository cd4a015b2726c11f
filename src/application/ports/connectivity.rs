use async_trait::async_trait;
use tokio::sync::watch;

/// 到達可能性のシグナル源。デバウンス前の生の値を流す。
#[async_trait]
pub trait ConnectivitySource: Send + Sync {
    async fn is_reachable(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<bool>;
}
