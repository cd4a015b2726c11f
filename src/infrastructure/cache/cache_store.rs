use super::favorite_set::FavoriteSet;
use crate::domain::entities::{CacheEntry, Comment, Post};
use crate::domain::value_objects::{PageRequest, PostId};
use crate::shared::config::CacheConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

pub const CACHE_SNAPSHOT_KEY: &str = "cache/posts/v1";
const SNAPSHOT_VERSION: u32 = 1;

/// 永続化用のスナップショット。PostId は JSON のマップキーにできないため Vec で持つ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    pub posts: Vec<CacheEntry<Post>>,
    pub pages: Vec<(PageRequest, CacheEntry<Vec<PostId>>)>,
    pub comments: Vec<(PostId, CacheEntry<Vec<Comment>>)>,
    pub favorites: FavoriteSet,
    pub next_sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub total_items: usize,
    pub stale_items: usize,
    pub cached_pages: usize,
    pub favorites: usize,
    pub max_entries: usize,
}

/// 投稿キャッシュ。
///
/// 本文は `cached_at` 付きで保持し、`max_entries` を超えると最も古く取得された
/// 非お気に入りエントリから追い出す。期限切れは削除ではなく鮮度判定にのみ使う。
/// ページ索引は `(page, limit)` 単位で、構成する投稿が 1 件でも追い出されると
/// そのページは未キャッシュ扱いに戻る。
#[derive(Debug, Clone)]
pub struct CacheStore {
    posts: HashMap<PostId, CacheEntry<Post>>,
    pages: HashMap<PageRequest, CacheEntry<Vec<PostId>>>,
    comments: HashMap<PostId, CacheEntry<Vec<Comment>>>,
    favorites: FavoriteSet,
    max_entries: usize,
    expiration: Duration,
    next_sequence: u64,
}

impl CacheStore {
    pub fn new(max_entries: usize, expiration: Duration) -> Self {
        Self {
            posts: HashMap::new(),
            pages: HashMap::new(),
            comments: HashMap::new(),
            favorites: FavoriteSet::new(),
            max_entries,
            expiration,
            next_sequence: 0,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.expiration())
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// キャッシュ済み本文の件数
    pub fn size(&self) -> usize {
        self.posts.len()
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn insert_entry(&mut self, mut post: Post, now: DateTime<Utc>) -> PostId {
        // お気に入り状態は FavoriteSet が正とし、本文側には持たせない
        post.is_favorite = false;
        self.favorites.update_snapshot(&post);
        let id = post.id;
        let sequence = self.take_sequence();
        self.posts.insert(id, CacheEntry::new(post, now, sequence));
        id
    }

    /// 投稿を追加または上書きする。追い出された ID を返す。
    pub fn put(&mut self, post: Post) -> Vec<PostId> {
        self.put_at(post, Utc::now())
    }

    pub fn put_at(&mut self, post: Post, now: DateTime<Utc>) -> Vec<PostId> {
        self.insert_entry(post, now);
        self.evict_overflow()
    }

    pub fn put_all(&mut self, posts: Vec<Post>) -> Vec<PostId> {
        self.put_all_at(posts, Utc::now())
    }

    pub fn put_all_at(&mut self, posts: Vec<Post>, now: DateTime<Utc>) -> Vec<PostId> {
        for post in posts {
            self.insert_entry(post, now);
        }
        self.evict_overflow()
    }

    /// 取得したページを順序どおりに保存する
    pub fn put_page(&mut self, page: PageRequest, posts: Vec<Post>) -> Vec<PostId> {
        self.put_page_at(page, posts, Utc::now())
    }

    pub fn put_page_at(
        &mut self,
        page: PageRequest,
        posts: Vec<Post>,
        now: DateTime<Utc>,
    ) -> Vec<PostId> {
        let mut ids = Vec::with_capacity(posts.len());
        for post in posts {
            ids.push(self.insert_entry(post, now));
        }
        let sequence = self.take_sequence();
        self.pages.insert(page, CacheEntry::new(ids, now, sequence));
        self.evict_overflow()
    }

    /// 確定した投稿を 1 ページ目の先頭に差し込む（作成直後のフィード表示用）
    pub fn insert_at_feed_head(&mut self, post: Post) -> Vec<PostId> {
        let now = Utc::now();
        let id = self.insert_entry(post, now);
        for (page, entry) in self.pages.iter_mut() {
            if page.page != 1 {
                continue;
            }
            entry.data.retain(|existing| existing != &id);
            entry.data.insert(0, id);
            entry.data.truncate(page.limit as usize);
        }
        self.evict_overflow()
    }

    pub fn get(&self, id: &PostId) -> Option<Post> {
        self.posts
            .get(id)
            .map(|entry| entry.data.clone().with_favorite(self.favorites.contains(id)))
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.posts.contains_key(id)
    }

    pub fn cached_at(&self, id: &PostId) -> Option<DateTime<Utc>> {
        self.posts.get(id).map(|entry| entry.cached_at)
    }

    pub fn is_fresh(&self, id: &PostId) -> bool {
        self.is_fresh_at(id, Utc::now())
    }

    pub fn is_fresh_at(&self, id: &PostId, now: DateTime<Utc>) -> bool {
        self.posts
            .get(id)
            .map(|entry| entry.is_fresh(now, self.expiration))
            .unwrap_or(false)
    }

    pub fn has_page(&self, page: &PageRequest) -> bool {
        self.pages.contains_key(page)
    }

    /// 保存時の順序でページを返す。未キャッシュなら空。
    pub fn get_page(&self, page: &PageRequest) -> Vec<Post> {
        let Some(entry) = self.pages.get(page) else {
            return Vec::new();
        };
        entry.data.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn is_page_fresh(&self, page: &PageRequest) -> bool {
        self.is_page_fresh_at(page, Utc::now())
    }

    pub fn is_page_fresh_at(&self, page: &PageRequest, now: DateTime<Utc>) -> bool {
        self.pages
            .get(page)
            .map(|entry| entry.is_fresh(now, self.expiration))
            .unwrap_or(false)
    }

    pub fn cached_pages(&self) -> Vec<PageRequest> {
        let mut pages: Vec<PageRequest> = self.pages.keys().copied().collect();
        pages.sort();
        pages
    }

    pub fn stale_pages_at(&self, now: DateTime<Utc>) -> Vec<PageRequest> {
        self.cached_pages()
            .into_iter()
            .filter(|page| !self.is_page_fresh_at(page, now))
            .collect()
    }

    pub fn remove(&mut self, id: &PostId) -> Option<Post> {
        let removed = self.posts.remove(id).map(|entry| entry.data);
        if removed.is_some() {
            let ids: HashSet<PostId> = std::iter::once(*id).collect();
            self.invalidate_pages_containing(&ids);
            self.comments.remove(id);
        }
        removed
    }

    /// 本文・ページ索引・コメントを消去する。お気に入りは保持する。
    pub fn clear(&mut self) {
        self.posts.clear();
        self.pages.clear();
        self.comments.clear();
    }

    /// お気に入りも含めて完全に消去する
    pub fn clear_all(&mut self) {
        self.clear();
        self.favorites.clear();
    }

    pub fn favorite(&mut self, id: PostId) -> bool {
        self.favorite_at(id, Utc::now())
    }

    pub fn favorite_at(&mut self, id: PostId, now: DateTime<Utc>) -> bool {
        let snapshot = self
            .posts
            .get(&id)
            .map(|entry| entry.data.clone().with_favorite(true));
        self.favorites.insert(id, snapshot, now)
    }

    /// お気に入りから外す。固定が外れた分だけ上限超過を解消する。
    pub fn unfavorite(&mut self, id: &PostId) -> bool {
        let removed = self.favorites.remove(id);
        if removed {
            self.evict_overflow();
        }
        removed
    }

    pub fn is_favorite(&self, id: &PostId) -> bool {
        self.favorites.contains(id)
    }

    pub fn favorite_ids(&self) -> Vec<PostId> {
        self.favorites.ids()
    }

    /// お気に入り登録順。キャッシュ本文が無ければ保存済みスナップショットを使う。
    pub fn get_favorites(&self, page: &PageRequest) -> Vec<Post> {
        let posts: Vec<Post> = self
            .favorites
            .records()
            .iter()
            .filter_map(|record| {
                self.get(&record.post_id)
                    .or_else(|| record.snapshot.clone())
                    .map(|post| post.with_favorite(true))
            })
            .collect();
        page.slice(&posts).to_vec()
    }

    /// 本文もスナップショットも無いお気に入り
    pub fn favorites_missing_body(&self) -> Vec<PostId> {
        self.favorites
            .records()
            .iter()
            .filter(|record| record.snapshot.is_none() && !self.posts.contains_key(&record.post_id))
            .map(|record| record.post_id)
            .collect()
    }

    pub fn put_comments(&mut self, post_id: PostId, comments: Vec<Comment>) {
        self.put_comments_at(post_id, comments, Utc::now());
    }

    pub fn put_comments_at(&mut self, post_id: PostId, comments: Vec<Comment>, now: DateTime<Utc>) {
        let sequence = self.take_sequence();
        self.comments
            .insert(post_id, CacheEntry::new(comments, now, sequence));
    }

    pub fn get_comments(&self, post_id: &PostId) -> Option<Vec<Comment>> {
        self.comments.get(post_id).map(|entry| entry.data.clone())
    }

    pub fn are_comments_fresh(&self, post_id: &PostId) -> bool {
        self.comments
            .get(post_id)
            .map(|entry| entry.is_fresh(Utc::now(), self.expiration))
            .unwrap_or(false)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CacheStatus {
        let stale_items = self
            .posts
            .values()
            .filter(|entry| !entry.is_fresh(now, self.expiration))
            .count();
        CacheStatus {
            total_items: self.posts.len(),
            stale_items,
            cached_pages: self.pages.len(),
            favorites: self.favorites.len(),
            max_entries: self.max_entries,
        }
    }

    fn evict_overflow(&mut self) -> Vec<PostId> {
        if self.posts.len() <= self.max_entries {
            return Vec::new();
        }

        let overflow = self.posts.len() - self.max_entries;
        let mut candidates: Vec<(DateTime<Utc>, u64, PostId)> = self
            .posts
            .iter()
            .filter(|(id, _)| !self.favorites.contains(id))
            .map(|(id, entry)| (entry.cached_at, entry.sequence, *id))
            .collect();
        candidates.sort();

        let evicted: Vec<PostId> = candidates
            .into_iter()
            .take(overflow)
            .map(|(_, _, id)| id)
            .collect();

        for id in &evicted {
            self.posts.remove(id);
            self.comments.remove(id);
        }
        let evicted_set: HashSet<PostId> = evicted.iter().copied().collect();
        self.invalidate_pages_containing(&evicted_set);

        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                remaining = self.posts.len(),
                max_entries = self.max_entries,
                "evicted least recently cached posts"
            );
        }
        evicted
    }

    fn invalidate_pages_containing(&mut self, ids: &HashSet<PostId>) {
        self.pages
            .retain(|_, entry| !entry.data.iter().any(|id| ids.contains(id)));
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let mut posts: Vec<CacheEntry<Post>> = self.posts.values().cloned().collect();
        posts.sort_by_key(|entry| entry.sequence);
        let mut pages: Vec<(PageRequest, CacheEntry<Vec<PostId>>)> = self
            .pages
            .iter()
            .map(|(page, entry)| (*page, entry.clone()))
            .collect();
        pages.sort_by_key(|(page, _)| *page);
        let comments = self
            .comments
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();

        CacheSnapshot {
            version: SNAPSHOT_VERSION,
            posts,
            pages,
            comments,
            favorites: self.favorites.clone(),
            next_sequence: self.next_sequence,
        }
    }

    /// スナップショットから復元する。上限が縮んでいれば復元後に追い出す。
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.posts = snapshot
            .posts
            .into_iter()
            .map(|entry| (entry.data.id, entry))
            .collect();
        self.pages = snapshot.pages.into_iter().collect();
        self.comments = snapshot.comments.into_iter().collect();
        self.favorites = snapshot.favorites;
        self.next_sequence = snapshot.next_sequence;
        self.pages
            .retain(|_, entry| entry.data.iter().all(|id| self.posts.contains_key(id)));
        self.evict_overflow();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn post(id: i64) -> Post {
        Post::new(id, format!("title {id}"), format!("body {id}"), 1)
    }

    fn page(page: u32, limit: u32) -> PageRequest {
        PageRequest::new(page, limit).unwrap()
    }

    #[test]
    fn test_put_and_get_overlays_favorite() {
        let mut cache = CacheStore::new(10, HOUR);
        cache.put(post(1));
        cache.favorite(PostId::Confirmed(1));

        let cached = cache.get(&PostId::Confirmed(1)).unwrap();
        assert!(cached.is_favorite);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_page_preserves_fetch_order() {
        let mut cache = CacheStore::new(10, HOUR);
        cache.put_page(page(1, 3), vec![post(3), post(1), post(2)]);

        let ids: Vec<PostId> = cache.get_page(&page(1, 3)).iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            vec![
                PostId::Confirmed(3),
                PostId::Confirmed(1),
                PostId::Confirmed(2)
            ]
        );
        assert!(cache.get_page(&page(2, 3)).is_empty());
    }

    #[test]
    fn test_eviction_removes_oldest_non_favorite() {
        let mut cache = CacheStore::new(3, HOUR);
        let base = Utc::now();

        cache.put_at(post(1), base);
        cache.favorite(PostId::Confirmed(1));
        cache.put_at(post(2), base + chrono::Duration::seconds(1));
        cache.put_at(post(3), base + chrono::Duration::seconds(2));
        let evicted = cache.put_at(post(4), base + chrono::Duration::seconds(3));

        assert_eq!(evicted, vec![PostId::Confirmed(2)]);
        assert_eq!(cache.size(), 3);
        assert!(cache.contains(&PostId::Confirmed(1)));
        assert!(!cache.contains(&PostId::Confirmed(2)));
    }

    #[test]
    fn test_same_timestamp_evicts_by_insertion_order() {
        let mut cache = CacheStore::new(2, HOUR);
        let now = Utc::now();
        let evicted = cache.put_all_at(vec![post(1), post(2), post(3)], now);

        assert_eq!(evicted, vec![PostId::Confirmed(1)]);
    }

    #[test]
    fn test_eviction_invalidates_page_index() {
        let mut cache = CacheStore::new(3, HOUR);
        let base = Utc::now();
        cache.put_page_at(page(1, 2), vec![post(1), post(2)], base);
        cache.put_page_at(
            page(2, 2),
            vec![post(3), post(4)],
            base + chrono::Duration::seconds(1),
        );

        assert!(!cache.has_page(&page(1, 2)));
        assert!(cache.has_page(&page(2, 2)));
    }

    #[test]
    fn test_all_favorites_are_pinned() {
        let mut cache = CacheStore::new(1, HOUR);
        cache.put(post(1));
        cache.favorite(PostId::Confirmed(1));
        cache.favorite(PostId::Confirmed(2));
        cache.put(post(2));
        cache.put(post(3));

        assert_eq!(cache.size(), 2);
        assert!(!cache.contains(&PostId::Confirmed(3)));

        cache.unfavorite(&PostId::Confirmed(1));
        assert_eq!(cache.size(), 1);
        assert!(cache.contains(&PostId::Confirmed(2)));
    }

    #[test]
    fn test_freshness_uses_expiration() {
        let mut cache = CacheStore::new(10, HOUR);
        let now = Utc::now();
        cache.put_at(post(1), now - chrono::Duration::hours(2));
        cache.put_at(post(2), now - chrono::Duration::minutes(5));

        assert!(!cache.is_fresh_at(&PostId::Confirmed(1), now));
        assert!(cache.is_fresh_at(&PostId::Confirmed(2), now));
        assert!(!cache.is_fresh_at(&PostId::Confirmed(99), now));
        // 期限切れでも取得はできる
        assert!(cache.get(&PostId::Confirmed(1)).is_some());
    }

    #[test]
    fn test_clear_preserves_favorites_with_snapshot() {
        let mut cache = CacheStore::new(10, HOUR);
        cache.put(post(5));
        cache.favorite(PostId::Confirmed(5));
        cache.clear();

        assert_eq!(cache.size(), 0);
        let favorites = cache.get_favorites(&page(1, 10));
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, PostId::Confirmed(5));
        assert!(favorites[0].is_favorite);

        cache.clear_all();
        assert!(cache.get_favorites(&page(1, 10)).is_empty());
    }

    #[test]
    fn test_favorite_without_body_is_reported_missing() {
        let mut cache = CacheStore::new(10, HOUR);
        cache.favorite(PostId::Confirmed(9));

        assert!(cache.get_favorites(&page(1, 10)).is_empty());
        assert_eq!(cache.favorites_missing_body(), vec![PostId::Confirmed(9)]);

        cache.put(post(9));
        assert!(cache.favorites_missing_body().is_empty());
        assert_eq!(cache.get_favorites(&page(1, 10)).len(), 1);
    }

    #[test]
    fn test_insert_at_feed_head_only_touches_first_pages() {
        let mut cache = CacheStore::new(10, HOUR);
        cache.put_page(page(1, 3), vec![post(1), post(2), post(3)]);
        cache.put_page(page(2, 3), vec![post(4), post(5), post(6)]);

        cache.insert_at_feed_head(post(101));

        let first: Vec<PostId> = cache.get_page(&page(1, 3)).iter().map(|p| p.id).collect();
        assert_eq!(
            first,
            vec![
                PostId::Confirmed(101),
                PostId::Confirmed(1),
                PostId::Confirmed(2)
            ]
        );
        assert_eq!(cache.get_page(&page(2, 3)).len(), 3);
    }

    #[test]
    fn test_snapshot_restore_keeps_timestamps_and_pages() {
        let mut cache = CacheStore::new(10, HOUR);
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        cache.put_page_at(page(1, 2), vec![post(1), post(2)], two_hours_ago);
        cache.favorite(PostId::Confirmed(2));
        cache.put_comments(PostId::Confirmed(1), Vec::new());

        let json = serde_json::to_string(&cache.snapshot()).unwrap();
        let snapshot: CacheSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = CacheStore::new(10, HOUR);
        restored.restore(snapshot);

        assert_eq!(restored.get_page(&page(1, 2)).len(), 2);
        assert_eq!(
            restored.cached_at(&PostId::Confirmed(1)),
            Some(two_hours_ago)
        );
        assert!(!restored.is_page_fresh(&page(1, 2)));
        assert!(restored.is_favorite(&PostId::Confirmed(2)));
        assert!(restored.get_comments(&PostId::Confirmed(1)).is_some());
    }

    #[test]
    fn test_status_counts_stale_items() {
        let mut cache = CacheStore::new(10, HOUR);
        let now = Utc::now();
        cache.put_at(post(1), now - chrono::Duration::hours(3));
        cache.put_at(post(2), now);

        let status = cache.status_at(now);
        assert_eq!(status.total_items, 2);
        assert_eq!(status.stale_items, 1);
    }
}
