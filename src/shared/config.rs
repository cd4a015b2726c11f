use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// connect / receive 共通のタイムアウト（秒）
    pub timeout_secs: u64,
    pub search_fetch_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub expiration_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub max_retries: u32,
    pub create_attempts: u32,
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub debounce_ms: u64,
    pub probe_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "https://jsonplaceholder.typicode.com".to_string(),
                timeout_secs: 30,
                search_fetch_limit: 100,
            },
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            connectivity: ConnectivityConfig {
                debounce_ms: 2_000,
                probe_interval_secs: 10,
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                database_url: default_database_url(),
            },
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_secs: 3600, // 1 hour
            max_entries: 100,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            max_retries: 3,
            create_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    /// attempt は 1 始まり。2 回目以降の待機時間を返す。
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exponent))
    }
}

impl ConnectivityConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

fn default_database_url() -> String {
    let data_dir = dirs::data_local_dir()
        .map(|dir| dir.join("mini-feed"))
        .unwrap_or_else(|| "./data".into());
    format!("sqlite:{}?mode=rwc", data_dir.join("mini_feed.db").display())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("MINI_FEED_API_BASE_URL") {
            let trimmed = v.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                cfg.api.base_url = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("MINI_FEED_API_TIMEOUT_SECS") {
            cfg.api.timeout_secs = value;
        }
        if let Some(value) = env_u64("MINI_FEED_SEARCH_FETCH_LIMIT") {
            cfg.api.search_fetch_limit = value.min(u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("MINI_FEED_CACHE_EXPIRATION_SECS") {
            cfg.cache.expiration_secs = value;
        }
        if let Some(value) = env_u64("MINI_FEED_CACHE_MAX_ENTRIES") {
            cfg.cache.max_entries = value as usize;
        }
        if let Some(value) = env_u64("MINI_FEED_SYNC_MAX_RETRIES") {
            cfg.sync.max_retries = value.min(u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("MINI_FEED_CREATE_ATTEMPTS") {
            cfg.sync.create_attempts = value.min(u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("MINI_FEED_BACKOFF_BASE_MS") {
            cfg.sync.backoff_base_ms = value;
        }
        if let Ok(v) = std::env::var("MINI_FEED_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("MINI_FEED_CONNECTIVITY_DEBOUNCE_MS") {
            cfg.connectivity.debounce_ms = value;
        }
        if let Some(value) = env_u64("MINI_FEED_PROBE_INTERVAL_SECS") {
            cfg.connectivity.probe_interval_secs = value.max(1);
        }
        if let Ok(v) = std::env::var("MINI_FEED_STORAGE_BACKEND") {
            match v.trim().to_ascii_lowercase().as_str() {
                "memory" => cfg.storage.backend = StorageBackend::Memory,
                "sqlite" => cfg.storage.backend = StorageBackend::Sqlite,
                other => tracing::warn!(backend = other, "unknown storage backend, keeping default"),
            }
        }
        if let Ok(v) = std::env::var("MINI_FEED_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.storage.database_url = v.trim().to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::ConfigurationError(
                "API base_url must not be empty".to_string(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::ConfigurationError(
                "API timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(AppError::ConfigurationError(
                "Cache max_entries must be greater than 0".to_string(),
            ));
        }
        if self.sync.create_attempts == 0 {
            return Err(AppError::ConfigurationError(
                "Sync create_attempts must be greater than 0".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.database_url.trim().is_empty()
        {
            return Err(AppError::ConfigurationError(
                "Storage database_url must not be empty for the sqlite backend".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.expiration(), Duration::from_secs(3600));
        assert_eq!(cfg.api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_cache() {
        let mut cfg = AppConfig::default();
        cfg.cache.max_entries = 0;
        assert!(matches!(
            cfg.validate(),
            Err(AppError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let sync = SyncConfig {
            backoff_base_ms: 100,
            ..SyncConfig::default()
        };
        assert_eq!(sync.backoff_for(1), Duration::from_millis(100));
        assert_eq!(sync.backoff_for(2), Duration::from_millis(200));
        assert_eq!(sync.backoff_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_parse_bool_keeps_default_on_garbage() {
        assert!(parse_bool("yes", false));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("maybe", true));
    }
}
