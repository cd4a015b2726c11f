use crate::domain::entities::{Comment, Post, PostDraft};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDto {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: i64,
    pub post_id: i64,
    pub name: String,
    pub email: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequestDto<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub user_id: i64,
}

#[derive(Serialize)]
pub struct ListPostsQuery {
    #[serde(rename = "_page")]
    pub page: u32,
    #[serde(rename = "_limit")]
    pub limit: u32,
}

impl From<PostDto> for Post {
    fn from(value: PostDto) -> Self {
        Post::new(value.id, value.title, value.body, value.user_id)
    }
}

impl From<CommentDto> for Comment {
    fn from(value: CommentDto) -> Self {
        Self {
            id: value.id,
            post_id: value.post_id,
            name: value.name,
            email: value.email,
            body: value.body,
        }
    }
}

impl<'a> From<&'a PostDraft> for CreatePostRequestDto<'a> {
    fn from(draft: &'a PostDraft) -> Self {
        Self {
            title: &draft.title,
            body: &draft.body,
            user_id: draft.author_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_dto_maps_user_id_to_author() {
        let dto: PostDto = serde_json::from_str(
            r#"{"userId": 7, "id": 101, "title": "Hello", "body": "World body text"}"#,
        )
        .unwrap();
        let post = Post::from(dto);

        assert_eq!(post.id.server_id(), Some(101));
        assert_eq!(post.author_id, 7);
        assert!(!post.is_optimistic());
    }

    #[test]
    fn test_create_request_uses_camel_case() {
        let draft = PostDraft::new("Hello", "World body text", 1);
        let json = serde_json::to_value(CreatePostRequestDto::from(&draft)).unwrap();
        assert_eq!(json["userId"], 1);
        assert_eq!(json["title"], "Hello");
    }
}
