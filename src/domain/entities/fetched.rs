use serde::{Deserialize, Serialize};

/// 読み取り結果の出所。UI が「オフラインのため古いデータ」と「取得失敗」を区別できるようにする。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Remote,
    Cache { stale: bool },
    CacheFallback { stale: bool, reason: String },
}

impl DataSource {
    pub fn is_from_cache(&self) -> bool {
        !matches!(self, DataSource::Remote)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DataSource::CacheFallback { .. })
    }

    pub fn is_stale(&self) -> bool {
        match self {
            DataSource::Remote => false,
            DataSource::Cache { stale } | DataSource::CacheFallback { stale, .. } => *stale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    pub fn remote(data: T) -> Self {
        Self {
            data,
            source: DataSource::Remote,
        }
    }

    pub fn cached(data: T, stale: bool) -> Self {
        Self {
            data,
            source: DataSource::Cache { stale },
        }
    }

    pub fn fallback(data: T, stale: bool, reason: impl Into<String>) -> Self {
        Self {
            data,
            source: DataSource::CacheFallback {
                stale,
                reason: reason.into(),
            },
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            source: self.source,
        }
    }
}
