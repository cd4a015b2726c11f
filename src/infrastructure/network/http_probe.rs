use crate::application::ports::connectivity::ConnectivitySource;
use crate::shared::config::{ApiConfig, ConnectivityConfig};
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// API のベース URL を定期的に叩いて到達可能性を判定する
pub struct HttpProbeConnectivitySource {
    client: Client,
    url: String,
    interval: Duration,
    sender: Arc<watch::Sender<bool>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpProbeConnectivitySource {
    pub fn new(api: &ApiConfig, connectivity: &ConnectivityConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(api.timeout())
            .timeout(api.timeout())
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("failed to build probe client: {e}")))?;
        let (sender, _) = watch::channel(false);

        Ok(Self {
            client,
            url: api.base_url.clone(),
            interval: connectivity.probe_interval(),
            sender: Arc::new(sender),
            task: Mutex::new(None),
        })
    }

    /// ステータスコードに関わらず応答が返れば到達可能とみなす
    async fn probe(client: &Client, url: &str) -> bool {
        match client.request(Method::HEAD, url).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "connectivity probe answered");
                true
            }
            Err(err) => {
                debug!(error = %err, "connectivity probe failed");
                false
            }
        }
    }

    /// ポーリングを開始する。既に動いていれば何もしない。
    pub fn start(&self) {
        let mut task = match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.is_some() {
            return;
        }

        let client = self.client.clone();
        let url = self.url.clone();
        let sender = Arc::clone(&self.sender);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        *task = Some(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let reachable = Self::probe(&client, &url).await;
                sender.send_if_modified(|current| {
                    if *current == reachable {
                        return false;
                    }
                    *current = reachable;
                    true
                });
            }
        }));
        info!(url = %self.url, interval_secs = self.interval.as_secs(), "connectivity probe started");
    }

    pub fn stop(&self) {
        let mut task = match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

impl Drop for HttpProbeConnectivitySource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl ConnectivitySource for HttpProbeConnectivitySource {
    async fn is_reachable(&self) -> bool {
        let reachable = Self::probe(&self.client, &self.url).await;
        self.sender.send_replace(reachable);
        reachable
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
