use crate::application::ports::connectivity::ConnectivitySource;
use crate::domain::value_objects::ConnectivityStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Connected,
    Disconnected,
}

impl From<ConnectivityStatus> for ConnectivityEvent {
    fn from(status: ConnectivityStatus) -> Self {
        match status {
            ConnectivityStatus::Connected => ConnectivityEvent::Connected,
            ConnectivityStatus::Disconnected => ConnectivityEvent::Disconnected,
        }
    }
}

/// 到達可能性の監視。
///
/// 生のシグナルが `debounce` の間変化しなかった場合だけ遷移イベントを流す。
/// 購読側は重複した Connected を受けても冪等であること。
pub struct ConnectivityMonitor {
    source: Arc<dyn ConnectivitySource>,
    debounce: Duration,
    status: Arc<watch::Sender<ConnectivityStatus>>,
    events: broadcast::Sender<ConnectivityEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(source: Arc<dyn ConnectivitySource>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(ConnectivityStatus::Disconnected);
        let (events, _) = broadcast::channel(16);
        Self {
            source,
            debounce,
            status: Arc::new(status),
            events,
            task: Mutex::new(None),
        }
    }

    /// 初期状態を取得して監視を開始する。初期状態ではイベントを流さない。
    pub async fn start(&self) {
        // 初期値の取得中に届いた変化は監視ループ側で拾う
        let raw = self.source.subscribe();
        let initial = ConnectivityStatus::from_reachable(self.source.is_reachable().await);
        self.status.send_replace(initial);

        let mut task = match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let debounce = self.debounce;
        *task = Some(tokio::spawn(debounce_loop(raw, status, events, debounce)));
        info!(status = %initial, debounce_ms = self.debounce.as_millis() as u64, "connectivity monitor started");
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

    pub fn current(&self) -> ConnectivityStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_connected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectivityStatus> {
        self.status.subscribe()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn debounce_loop(
    mut raw: watch::Receiver<bool>,
    status: Arc<watch::Sender<ConnectivityStatus>>,
    events: broadcast::Sender<ConnectivityEvent>,
    debounce: Duration,
) {
    loop {
        if raw.changed().await.is_err() {
            return;
        }
        let mut candidate = *raw.borrow_and_update();

        // debounce の間に値が変われば待ち直す
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                changed = raw.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    candidate = *raw.borrow_and_update();
                }
            }
        }

        let next = ConnectivityStatus::from_reachable(candidate);
        if next == *status.borrow() {
            debug!(status = %next, "connectivity flap ignored");
            continue;
        }

        status.send_replace(next);
        info!(status = %next, "connectivity changed");
        let _ = events.send(ConnectivityEvent::from(next));
    }
}
