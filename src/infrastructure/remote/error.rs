use crate::shared::error::AppError;
use thiserror::Error;

/// HTTP クライアント内部のエラー。境界で AppError に変換する。
#[derive(Debug, Error)]
pub enum HttpApiError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl HttpApiError {
    pub(crate) fn from_status(status: reqwest::StatusCode, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("http status {status}"));
        Self::Status {
            status: status.as_u16(),
            message,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, None);
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Transport(err)
    }
}

impl From<HttpApiError> for AppError {
    fn from(err: HttpApiError) -> Self {
        match err {
            HttpApiError::Transport(err) => AppError::from(err),
            HttpApiError::Status { status: 404, message } => AppError::NotFound(message),
            HttpApiError::Status { status, message } => AppError::server(status, message),
            HttpApiError::Decode(message) => AppError::SerializationError(message),
        }
    }
}
