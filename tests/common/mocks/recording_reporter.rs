use mini_feed_lib::application::ports::error_reporter::ErrorReporter;
use mini_feed_lib::AppError;
use std::sync::{Arc, Mutex};

/// 報告されたエラーを (context, kind) で記録する
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.reports().into_iter().map(|(context, _)| context).collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, error: &AppError) {
        self.reports
            .lock()
            .unwrap()
            .push((context.to_string(), error.kind_name().to_string()));
    }
}
