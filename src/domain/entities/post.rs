use crate::domain::value_objects::{LocalPostId, PostId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub body: String,
    pub author_id: i64,
    pub is_favorite: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(id: i64, title: String, body: String, author_id: i64) -> Self {
        Self {
            id: PostId::Confirmed(id),
            title,
            body,
            author_id,
            is_favorite: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// 送信前の仮投稿を生成する
    pub fn optimistic(local_id: LocalPostId, draft: &PostDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: PostId::Optimistic(local_id),
            title: draft.title.clone(),
            body: draft.body.clone(),
            author_id: draft.author_id,
            is_favorite: false,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.is_optimistic()
    }

    pub fn local_id(&self) -> Option<LocalPostId> {
        self.id.local_id()
    }

    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.title.to_lowercase().contains(&needle) || self.body.to_lowercase().contains(&needle)
    }
}

/// 投稿作成の入力。保留中オペレーションのペイロードとしても保存される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub author_id: i64,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>, author_id: i64) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            author_id,
        }
    }

    pub fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            body: self.body.trim().to_string(),
            author_id: self.author_id,
        }
    }
}
