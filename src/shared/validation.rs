use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 5000;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 入力値バリデーションの失敗理由。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationFailureKind {
    /// タイトルが空（空白のみを含む）。
    EmptyTitle,
    /// タイトルが上限文字数を超過。
    TitleTooLong,
    /// 本文が空（空白のみを含む）。
    EmptyBody,
    /// 本文が上限文字数を超過。
    BodyTooLong,
    /// 投稿者 ID が正の整数ではない。
    InvalidAuthor,
    /// page / limit の範囲外。
    InvalidPagination,
    /// 検索クエリが空。
    EmptyQuery,
    /// サーバー未確定の仮投稿に対する操作。
    NotYetConfirmed,
}

impl ValidationFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFailureKind::EmptyTitle => "empty_title",
            ValidationFailureKind::TitleTooLong => "title_too_long",
            ValidationFailureKind::EmptyBody => "empty_body",
            ValidationFailureKind::BodyTooLong => "body_too_long",
            ValidationFailureKind::InvalidAuthor => "invalid_author",
            ValidationFailureKind::InvalidPagination => "invalid_pagination",
            ValidationFailureKind::EmptyQuery => "empty_query",
            ValidationFailureKind::NotYetConfirmed => "not_yet_confirmed",
        }
    }
}

impl fmt::Display for ValidationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationFailureKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty_title" => Ok(ValidationFailureKind::EmptyTitle),
            "title_too_long" => Ok(ValidationFailureKind::TitleTooLong),
            "empty_body" => Ok(ValidationFailureKind::EmptyBody),
            "body_too_long" => Ok(ValidationFailureKind::BodyTooLong),
            "invalid_author" => Ok(ValidationFailureKind::InvalidAuthor),
            "invalid_pagination" => Ok(ValidationFailureKind::InvalidPagination),
            "empty_query" => Ok(ValidationFailureKind::EmptyQuery),
            "not_yet_confirmed" => Ok(ValidationFailureKind::NotYetConfirmed),
            _ => Err(()),
        }
    }
}

/// 投稿作成リクエストを検証する。I/O やトラッカー更新の前に呼ぶこと。
pub fn validate_new_post(title: &str, body: &str, author_id: i64) -> Result<(), AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation(
            ValidationFailureKind::EmptyTitle,
            "title is required",
        ));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::validation(
            ValidationFailureKind::TitleTooLong,
            format!("title must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }

    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::validation(
            ValidationFailureKind::EmptyBody,
            "body is required",
        ));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::validation(
            ValidationFailureKind::BodyTooLong,
            format!("body must be at most {MAX_BODY_CHARS} characters"),
        ));
    }

    if author_id <= 0 {
        return Err(AppError::validation(
            ValidationFailureKind::InvalidAuthor,
            format!("invalid author id: {author_id}"),
        ));
    }

    Ok(())
}

pub fn validate_page(page: u32, limit: u32) -> Result<(), AppError> {
    if page == 0 || limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(AppError::validation(
            ValidationFailureKind::InvalidPagination,
            format!("page must be >= 1 and limit within 1..={MAX_PAGE_LIMIT} (page={page}, limit={limit})"),
        ));
    }
    Ok(())
}

pub fn validate_query(query: &str) -> Result<String, AppError> {
    let normalized = query.trim();
    if normalized.is_empty() {
        return Err(AppError::validation(
            ValidationFailureKind::EmptyQuery,
            "search query is required",
        ));
    }
    Ok(normalized.to_string())
}
