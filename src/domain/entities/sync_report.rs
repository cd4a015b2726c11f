use serde::{Deserialize, Serialize};

/// 1 回の同期サイクルの集計。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncReport {
    pub confirmed: u32,
    pub rolled_back: u32,
    pub deferred: u32,
    pub skipped_in_flight: u32,
    pub refreshed: u32,
}

impl SyncReport {
    pub fn attempted(&self) -> u32 {
        self.confirmed + self.rolled_back + self.deferred
    }

    pub fn merge(&mut self, other: &SyncReport) {
        self.confirmed += other.confirmed;
        self.rolled_back += other.rolled_back;
        self.deferred += other.deferred;
        self.skipped_in_flight += other.skipped_in_flight;
        self.refreshed += other.refreshed;
    }
}
