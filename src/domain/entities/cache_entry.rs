use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// キャッシュ済みデータと取得時刻。期限切れでも削除はされない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    /// cached_at が同一の場合の順序付け用
    pub sequence: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            data,
            cached_at,
            sequence,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.cached_at)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, expiration: Duration) -> bool {
        match chrono::Duration::from_std(expiration) {
            Ok(expiration) => self.age(now) < expiration,
            Err(_) => true,
        }
    }
}
