use crate::shared::error::AppError;
use crate::shared::validation::validate_page;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1 始まりのページ番号と件数。キャッシュのページ索引キーも兼ねる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self, AppError> {
        validate_page(page, limit)?;
        Ok(Self { page, limit })
    }

    pub fn first(limit: u32) -> Result<Self, AppError> {
        Self::new(1, limit)
    }

    pub fn start_index(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    pub fn end_index(&self) -> usize {
        self.start_index() + self.limit as usize
    }

    /// ローカルでのページ切り出し。範囲外は空。
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.start_index().min(items.len());
        let end = self.end_index().min(items.len());
        &items[start..end]
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page={} limit={}", self.page, self.limit)
    }
}
