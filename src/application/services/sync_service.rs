use super::connectivity_monitor::{ConnectivityEvent, ConnectivityMonitor};
use crate::domain::entities::SyncReport;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[async_trait]
pub trait SyncParticipant: Send + Sync {
    /// 保留中オペレーションを作成順に 1 回ずつ送信する
    async fn replay_pending(&self) -> Result<SyncReport, AppError>;

    /// 期限切れのキャッシュを再取得する（ベストエフォート）
    async fn refresh_stale(&self) -> Result<u32, AppError>;
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    pub sync_errors: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// 実行中の同期に合流した
    Coalesced,
}

/// 同期中フラグを drop 時に必ず下ろす
struct SyncingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for SyncingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncService {
    participant: Arc<dyn SyncParticipant>,
    monitor: Arc<ConnectivityMonitor>,
    syncing: Arc<AtomicBool>,
    status: Arc<RwLock<SyncStatus>>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncService {
    pub fn new(participant: Arc<dyn SyncParticipant>, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self {
            participant,
            monitor,
            syncing: Arc::new(AtomicBool::new(false)),
            status: Arc::new(RwLock::new(SyncStatus::default())),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// 1 サイクル実行する。実行中なら何もせず Coalesced を返す。
    pub async fn sync_now(&self) -> Result<SyncOutcome, AppError> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already running, coalescing request");
            return Ok(SyncOutcome::Coalesced);
        }
        let _guard = SyncingGuard {
            flag: Arc::clone(&self.syncing),
        };

        let mut report = match self.participant.replay_pending().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "replaying pending operations failed");
                self.status.write().await.sync_errors += 1;
                return Err(e);
            }
        };

        match self.participant.refresh_stale().await {
            Ok(refreshed) => report.refreshed += refreshed,
            Err(e) => {
                warn!(error = %e, "stale refresh failed");
                self.status.write().await.sync_errors += 1;
            }
        }

        let mut status = self.status.write().await;
        status.last_sync = Some(Utc::now());
        status.last_report = Some(report.clone());
        info!(
            confirmed = report.confirmed,
            rolled_back = report.rolled_back,
            deferred = report.deferred,
            skipped_in_flight = report.skipped_in_flight,
            refreshed = report.refreshed,
            "sync cycle completed"
        );

        Ok(SyncOutcome::Completed(report))
    }

    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        status.is_syncing = self.syncing.load(Ordering::Acquire);
        status
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub async fn reset_errors(&self) {
        self.status.write().await.sync_errors = 0;
    }

    /// 接続復帰イベントで同期を走らせるリスナーを起動する
    pub fn start(&self) {
        let mut listener = match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if listener.is_some() {
            return;
        }

        let mut events = self.monitor.subscribe();
        let service = self.clone();
        *listener = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::Connected) => {
                        if let Err(e) = service.sync_now().await {
                            tracing::error!("Sync error: {}", e);
                        }
                    }
                    Ok(ConnectivityEvent::Disconnected) => {
                        debug!("connectivity lost, waiting for reconnect");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "connectivity events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        info!("sync listener started");
    }

    pub fn stop(&self) {
        let mut listener = match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

impl Clone for SyncService {
    fn clone(&self) -> Self {
        Self {
            participant: self.participant.clone(),
            monitor: self.monitor.clone(),
            syncing: self.syncing.clone(),
            status: self.status.clone(),
            listener: self.listener.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::ManualConnectivitySource;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Participant {}

        #[async_trait]
        impl SyncParticipant for Participant {
            async fn replay_pending(&self) -> Result<SyncReport, AppError>;
            async fn refresh_stale(&self) -> Result<u32, AppError>;
        }
    }

    fn monitor() -> Arc<ConnectivityMonitor> {
        let source = Arc::new(ManualConnectivitySource::new(true));
        Arc::new(ConnectivityMonitor::new(source, Duration::from_millis(10)))
    }

    /// 同期の途中で止まる参加者
    struct SlowParticipant {
        calls: Arc<std::sync::atomic::AtomicU32>,
    }

    #[async_trait]
    impl SyncParticipant for SlowParticipant {
        async fn replay_pending(&self) -> Result<SyncReport, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(SyncReport {
                confirmed: 1,
                ..SyncReport::default()
            })
        }

        async fn refresh_stale(&self) -> Result<u32, AppError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_sync_now_merges_refresh_count() {
        let mut participant = MockParticipant::new();
        participant.expect_replay_pending().times(1).returning(|| {
            Ok(SyncReport {
                confirmed: 2,
                deferred: 1,
                ..SyncReport::default()
            })
        });
        participant.expect_refresh_stale().times(1).returning(|| Ok(3));

        let service = SyncService::new(Arc::new(participant), monitor());
        let outcome = service.sync_now().await.unwrap();

        let SyncOutcome::Completed(report) = outcome else {
            panic!("expected completed sync");
        };
        assert_eq!(report.confirmed, 2);
        assert_eq!(report.refreshed, 3);

        let status = service.status().await;
        assert!(!status.is_syncing);
        assert!(status.last_sync.is_some());
        assert_eq!(status.last_report, Some(report));
    }

    #[tokio::test]
    async fn test_failed_replay_releases_flag() {
        let mut participant = MockParticipant::new();
        participant
            .expect_replay_pending()
            .times(2)
            .returning(|| Err(AppError::Storage("disk full".into())));
        participant.expect_refresh_stale().never();

        let service = SyncService::new(Arc::new(participant), monitor());
        assert!(service.sync_now().await.is_err());
        assert!(!service.is_syncing());
        assert!(service.sync_now().await.is_err());
        assert_eq!(service.status().await.sync_errors, 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_not_fatal() {
        let mut participant = MockParticipant::new();
        participant
            .expect_replay_pending()
            .returning(|| Ok(SyncReport::default()));
        participant
            .expect_refresh_stale()
            .returning(|| Err(AppError::Network("down".into())));

        let service = SyncService::new(Arc::new(participant), monitor());
        assert!(matches!(
            service.sync_now().await,
            Ok(SyncOutcome::Completed(_))
        ));
        assert_eq!(service.status().await.sync_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_are_coalesced() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let service = SyncService::new(
            Arc::new(SlowParticipant {
                calls: calls.clone(),
            }),
            monitor(),
        );

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.sync_now().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(service.is_syncing());

        let second = service.sync_now().await.unwrap();
        assert_eq!(second, SyncOutcome::Coalesced);

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SyncOutcome::Completed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!service.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_triggers_sync() {
        let source = Arc::new(ManualConnectivitySource::new(false));
        let monitor = Arc::new(ConnectivityMonitor::new(
            source.clone(),
            Duration::from_millis(10),
        ));
        monitor.start().await;

        let mut participant = MockParticipant::new();
        participant
            .expect_replay_pending()
            .times(1)
            .returning(|| Ok(SyncReport::default()));
        participant.expect_refresh_stale().times(1).returning(|| Ok(0));

        let service = SyncService::new(Arc::new(participant), monitor.clone());
        service.start();

        source.go_online();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(service.status().await.last_sync.is_some());
        service.stop();
    }
}
