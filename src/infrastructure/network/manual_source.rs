use crate::application::ports::connectivity::ConnectivitySource;
use async_trait::async_trait;
use tokio::sync::watch;

/// 埋め込み側（またはテスト）が到達可能性を直接設定するシグナル源
#[derive(Debug)]
pub struct ManualConnectivitySource {
    sender: watch::Sender<bool>,
}

impl ManualConnectivitySource {
    pub fn new(initially_reachable: bool) -> Self {
        let (sender, _) = watch::channel(initially_reachable);
        Self { sender }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.sender.send_replace(reachable);
    }

    pub fn go_offline(&self) {
        self.set_reachable(false);
    }

    pub fn go_online(&self) {
        self.set_reachable(true);
    }
}

impl Default for ManualConnectivitySource {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConnectivitySource for ManualConnectivitySource {
    async fn is_reachable(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
