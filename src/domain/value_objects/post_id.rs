use serde::{Deserialize, Serialize};
use std::fmt;

/// クライアントが発行する仮投稿 ID。セッション内で単調増加する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalPostId(u64);

impl LocalPostId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalPostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// 投稿 ID。サーバー採番と仮 ID を型で分離し、衝突を起こさない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PostId {
    Confirmed(i64),
    Optimistic(LocalPostId),
}

impl PostId {
    pub fn is_optimistic(&self) -> bool {
        matches!(self, PostId::Optimistic(_))
    }

    pub fn server_id(&self) -> Option<i64> {
        match self {
            PostId::Confirmed(id) => Some(*id),
            PostId::Optimistic(_) => None,
        }
    }

    pub fn local_id(&self) -> Option<LocalPostId> {
        match self {
            PostId::Confirmed(_) => None,
            PostId::Optimistic(local) => Some(*local),
        }
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Confirmed(id) => write!(f, "{id}"),
            PostId::Optimistic(local) => write!(f, "{local}"),
        }
    }
}

impl From<i64> for PostId {
    fn from(value: i64) -> Self {
        PostId::Confirmed(value)
    }
}

impl From<LocalPostId> for PostId {
    fn from(value: LocalPostId) -> Self {
        PostId::Optimistic(value)
    }
}
