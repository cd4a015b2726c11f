use super::dto::{CommentDto, CreatePostRequestDto, ListPostsQuery, PostDto};
use super::error::HttpApiError;
use crate::application::ports::remote_post_api::RemotePostApi;
use crate::domain::entities::{Comment, Post, PostDraft};
use crate::domain::value_objects::PageRequest;
use crate::shared::config::ApiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::debug;

/// jsonplaceholder 互換の REST API クライアント
#[derive(Debug, Clone)]
pub struct HttpPostApi {
    base_url: String,
    client: Client,
    search_fetch_limit: u32,
}

impl HttpPostApi {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        // connect / receive は同じ値を使う
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("failed to build http client: {e}")))?;

        Ok(Self::with_client(
            client,
            config.base_url.clone(),
            config.search_fetch_limit,
        ))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, search_fetch_limit: u32) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            search_fetch_limit,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, HttpApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.ok();
            return Err(HttpApiError::from_status(status, message));
        }
        response.json::<T>().await.map_err(HttpApiError::from_reqwest)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&ListPostsQuery>,
    ) -> Result<T, HttpApiError> {
        let mut request = self.client.request(Method::GET, self.endpoint(path));
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(HttpApiError::from_reqwest)?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl RemotePostApi for HttpPostApi {
    async fn list_posts(&self, page: PageRequest) -> Result<Vec<Post>, AppError> {
        let query = ListPostsQuery {
            page: page.page,
            limit: page.limit,
        };
        let posts: Vec<PostDto> = self.get_json("/posts", Some(&query)).await?;
        debug!(page = page.page, limit = page.limit, count = posts.len(), "fetched posts");
        Ok(posts.into_iter().map(Post::from).collect())
    }

    async fn get_post(&self, id: i64) -> Result<Post, AppError> {
        let post: PostDto = self.get_json(&format!("/posts/{id}"), None).await?;
        Ok(post.into())
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, AppError> {
        let payload = CreatePostRequestDto::from(draft);
        let response = self
            .client
            .request(Method::POST, self.endpoint("/posts"))
            .json(&payload)
            .send()
            .await
            .map_err(HttpApiError::from_reqwest)?;
        let created: PostDto = Self::read_json(response).await?;
        Ok(created.into())
    }

    async fn search_posts(&self, query: &str) -> Result<Vec<Post>, AppError> {
        // 検索 API が無いため先頭 search_fetch_limit 件を取得して絞り込む
        let listing = ListPostsQuery {
            page: 1,
            limit: self.search_fetch_limit,
        };
        let posts: Vec<PostDto> = self.get_json("/posts", Some(&listing)).await?;
        let fetched = posts.len();
        let matches: Vec<Post> = posts
            .into_iter()
            .map(Post::from)
            .filter(|post| post.matches_query(query))
            .collect();
        debug!(fetched, matched = matches.len(), "filtered search results");
        Ok(matches)
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let comments: Vec<CommentDto> = self
            .get_json(&format!("/posts/{post_id}/comments"), None)
            .await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }
}
