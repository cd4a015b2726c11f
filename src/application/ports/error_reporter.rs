use crate::shared::error::AppError;

/// ベストエフォート処理で握りつぶしたエラーの通知先
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &AppError);
}
