pub mod connectivity_monitor;
pub mod feed_state;
pub mod optimistic_post_tracker;
pub mod post_repository;
pub mod sync_service;

pub use connectivity_monitor::{ConnectivityEvent, ConnectivityMonitor};
pub use feed_state::{FeedEvent, FeedState, FeedStatus, FeedStore};
pub use optimistic_post_tracker::{OptimisticPostTracker, OptimisticState};
pub use post_repository::{CreateOutcome, OfflineFirstPostRepository};
pub use sync_service::{SyncOutcome, SyncParticipant, SyncService, SyncStatus};
