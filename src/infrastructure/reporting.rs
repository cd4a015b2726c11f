use crate::application::ports::error_reporter::ErrorReporter;
use crate::shared::error::AppError;
use tracing::warn;

/// 握りつぶしたエラーを warn ログとして出力する
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl TracingErrorReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, context: &str, error: &AppError) {
        warn!(context, kind = error.kind_name(), error = %error, "best-effort operation failed");
    }
}
