use super::post::PostDraft;
use crate::domain::value_objects::{LocalPostId, PendingOperationId, PostId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingOperationKind {
    CreatePost,
    ToggleFavorite,
}

impl PendingOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingOperationKind::CreatePost => "create_post",
            PendingOperationKind::ToggleFavorite => "toggle_favorite",
        }
    }
}

impl fmt::Display for PendingOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingPayload {
    CreatePost(PostDraft),
    ToggleFavorite { post_id: PostId, is_favorite: bool },
}

/// ローカルに適用済みでリモート未確定の書き込み。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: PendingOperationId,
    pub payload: PendingPayload,
    pub local_post_id: Option<LocalPostId>,
    pub created_at: DateTime<Utc>,
    /// FIFO 順の基準。created_at が同一でも順序が定まる。
    pub sequence: u64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl PendingOperation {
    pub fn kind(&self) -> PendingOperationKind {
        match self.payload {
            PendingPayload::CreatePost(_) => PendingOperationKind::CreatePost,
            PendingPayload::ToggleFavorite { .. } => PendingOperationKind::ToggleFavorite,
        }
    }

    pub fn draft(&self) -> Option<&PostDraft> {
        match &self.payload {
            PendingPayload::CreatePost(draft) => Some(draft),
            PendingPayload::ToggleFavorite { .. } => None,
        }
    }

    pub fn record_failure(&mut self, message: String) {
        self.retry_count += 1;
        self.last_error = Some(message);
    }
}
