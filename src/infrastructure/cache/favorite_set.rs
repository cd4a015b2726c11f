use crate::domain::entities::Post;
use crate::domain::value_objects::PostId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    pub post_id: PostId,
    pub favorited_at: DateTime<Utc>,
    /// 最後に確認できた本文。キャッシュから本文が消えてもお気に入り一覧に残すため。
    pub snapshot: Option<Post>,
}

/// お気に入り ID の集合（お気に入り登録順）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FavoriteSet {
    records: Vec<FavoriteRecord>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加した場合 true。既に登録済みなら snapshot の更新のみ行う。
    pub fn insert(&mut self, post_id: PostId, snapshot: Option<Post>, now: DateTime<Utc>) -> bool {
        if let Some(record) = self.records.iter_mut().find(|r| r.post_id == post_id) {
            if snapshot.is_some() {
                record.snapshot = snapshot;
            }
            return false;
        }

        self.records.push(FavoriteRecord {
            post_id,
            favorited_at: now,
            snapshot,
        });
        true
    }

    pub fn remove(&mut self, post_id: &PostId) -> bool {
        let before = self.records.len();
        self.records.retain(|r| &r.post_id != post_id);
        before != self.records.len()
    }

    pub fn contains(&self, post_id: &PostId) -> bool {
        self.records.iter().any(|r| &r.post_id == post_id)
    }

    pub fn update_snapshot(&mut self, post: &Post) {
        if let Some(record) = self.records.iter_mut().find(|r| r.post_id == post.id) {
            record.snapshot = Some(post.clone().with_favorite(true));
        }
    }

    pub fn ids(&self) -> Vec<PostId> {
        self.records.iter().map(|r| r.post_id).collect()
    }

    pub fn records(&self) -> &[FavoriteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
