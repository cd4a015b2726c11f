use crate::shared::validation::ValidationFailureKind;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    Network(String),
    Server { status: u16, message: String },
    Storage(String),
    Database(String),
    NotFound(String),
    ValidationError {
        kind: ValidationFailureKind,
        message: String,
    },
    InvariantViolation(String),
    ConfigurationError(String),
    SerializationError(String),
    Internal(String),
}

impl AppError {
    pub fn validation(kind: ValidationFailureKind, message: impl Into<String>) -> Self {
        AppError::ValidationError {
            kind,
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        AppError::Server {
            status,
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        AppError::InvariantViolation(message.into())
    }

    /// 自動リトライの対象となるか（ネットワーク断・5xx・429）
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) => true,
            AppError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// リモート側が恒久的に拒否したエラー（同期で再送しても結果が変わらない）
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// リモート呼び出しの失敗か（キャッシュへのフォールバック対象）
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Server { .. } | AppError::NotFound(_)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AppError::Network(_) => "network",
            AppError::Server { .. } => "server",
            AppError::Storage(_) => "storage",
            AppError::Database(_) => "database",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError { .. } => "validation",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::ConfigurationError(_) => "configuration",
            AppError::SerializationError(_) => "serialization",
            AppError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError { kind, message } => {
                write!(f, "Validation error ({}): {}", kind, message)
            }
            AppError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return AppError::server(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return AppError::SerializationError(err.to_string());
        }
        // timeout / connect / 途中切断はすべてネットワーク扱い
        AppError::Network(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
