use async_trait::async_trait;
use mini_feed_lib::application::ports::remote_post_api::RemotePostApi;
use mini_feed_lib::domain::entities::{Comment, Post, PostDraft};
use mini_feed_lib::domain::value_objects::PageRequest;
use mini_feed_lib::AppError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

#[derive(Debug, Default)]
pub struct CallCounts {
    pub list: AtomicU32,
    pub get: AtomicU32,
    pub create: AtomicU32,
    pub search: AtomicU32,
    pub comments: AtomicU32,
}

/// 台本どおりに振る舞うリモート API
#[derive(Clone)]
pub struct FakeRemotePostApi {
    posts: Arc<RwLock<Vec<Post>>>,
    comments: Arc<RwLock<HashMap<i64, Vec<Comment>>>>,
    next_id: Arc<RwLock<i64>>,
    create_failures: Arc<RwLock<VecDeque<AppError>>>,
    list_error: Arc<RwLock<Option<AppError>>>,
    offline: Arc<AtomicBool>,
    create_gated: Arc<AtomicBool>,
    create_gate: Arc<Semaphore>,
    pub calls: Arc<CallCounts>,
}

impl FakeRemotePostApi {
    pub fn new() -> Self {
        Self {
            posts: Arc::new(RwLock::new(Vec::new())),
            comments: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(101)),
            create_failures: Arc::new(RwLock::new(VecDeque::new())),
            list_error: Arc::new(RwLock::new(None)),
            offline: Arc::new(AtomicBool::new(false)),
            create_gated: Arc::new(AtomicBool::new(false)),
            create_gate: Arc::new(Semaphore::new(0)),
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// id 1..=count の投稿を持つ
    pub fn with_posts(count: i64) -> Self {
        Self {
            posts: Arc::new(RwLock::new((1..=count).map(sample_post).collect())),
            ..Self::new()
        }
    }

    pub async fn set_posts(&self, posts: Vec<Post>) {
        *self.posts.write().await = posts;
    }

    pub async fn set_comments(&self, post_id: i64, comments: Vec<Comment>) {
        self.comments.write().await.insert(post_id, comments);
    }

    pub async fn fail_next_creates(&self, errors: Vec<AppError>) {
        self.create_failures.write().await.extend(errors);
    }

    pub async fn set_list_error(&self, error: Option<AppError>) {
        *self.list_error.write().await = error;
    }

    /// すべての呼び出しを Network エラーにする
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// release_creates が呼ばれるまで create_post を止める
    pub fn hold_creates(&self) {
        self.create_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_creates(&self, count: usize) {
        self.create_gate.add_permits(count);
    }

    pub fn count(&self, counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

impl Default for FakeRemotePostApi {
    fn default() -> Self {
        Self::new()
    }
}

pub fn sample_post(id: i64) -> Post {
    Post::new(id, format!("title {id}"), format!("body {id}"), 1)
}

#[async_trait]
impl RemotePostApi for FakeRemotePostApi {
    async fn list_posts(&self, page: PageRequest) -> Result<Vec<Post>, AppError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if let Some(error) = self.list_error.read().await.clone() {
            return Err(error);
        }
        let posts = self.posts.read().await;
        Ok(page.slice(&posts).to_vec())
    }

    async fn get_post(&self, id: i64) -> Result<Post, AppError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.posts
            .read()
            .await
            .iter()
            .find(|post| post.id.server_id() == Some(id))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("post {id}")))
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, AppError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        if self.create_gated.load(Ordering::SeqCst) {
            let permit = self
                .create_gate
                .acquire()
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;
            permit.forget();
        }
        self.check_online()?;
        if let Some(error) = self.create_failures.write().await.pop_front() {
            return Err(error);
        }

        let mut next_id = self.next_id.write().await;
        let id = *next_id;
        *next_id += 1;
        Ok(Post::new(id, draft.title.clone(), draft.body.clone(), draft.author_id))
    }

    async fn search_posts(&self, query: &str) -> Result<Vec<Post>, AppError> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self
            .posts
            .read()
            .await
            .iter()
            .filter(|post| post.matches_query(query))
            .cloned()
            .collect())
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        self.calls.comments.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self
            .comments
            .read()
            .await
            .get(&post_id)
            .cloned()
            .unwrap_or_default())
    }
}
