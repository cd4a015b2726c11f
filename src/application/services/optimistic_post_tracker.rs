use crate::domain::entities::{PendingOperation, PendingPayload, Post, PostDraft};
use crate::domain::value_objects::{LocalPostId, PendingOperationId, PostId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error};

pub const PENDING_SNAPSHOT_KEY: &str = "sync/pending_operations/v1";
const SNAPSHOT_VERSION: u32 = 1;

/// 仮投稿のライフサイクル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimisticState {
    Pending,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub version: u32,
    pub next_local_id: u64,
    pub next_sequence: u64,
    pub operations: Vec<PendingOperation>,
}

/// 仮投稿と保留中オペレーションの管理。
///
/// 仮投稿 1 件につき `confirm` / `rollback` のどちらか一方だけが 1 度だけ成功する。
/// 終端状態はセッション中保持し、二重遷移は `InvariantViolation` になる。
/// リモート送信の前には `begin_attempt` で送信権を取得すること。
#[derive(Debug, Default)]
pub struct OptimisticPostTracker {
    next_local_id: u64,
    next_sequence: u64,
    operations: Vec<PendingOperation>,
    resolved: HashMap<LocalPostId, OptimisticState>,
    in_flight: HashSet<PendingOperationId>,
}

impl OptimisticPostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_local_id(&mut self) -> LocalPostId {
        self.next_local_id += 1;
        LocalPostId::new(self.next_local_id)
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn push_operation(
        &mut self,
        payload: PendingPayload,
        local_post_id: Option<LocalPostId>,
        now: DateTime<Utc>,
    ) -> PendingOperationId {
        let id = PendingOperationId::generate();
        let sequence = self.take_sequence();
        self.operations.push(PendingOperation {
            id: id.clone(),
            payload,
            local_post_id,
            created_at: now,
            sequence,
            retry_count: 0,
            last_error: None,
        });
        id
    }

    /// 仮投稿を発行し、保留中の作成オペレーションを記録する
    pub fn add_optimistic(&mut self, draft: PostDraft) -> (Post, PendingOperationId) {
        self.add_optimistic_at(draft, Utc::now())
    }

    pub fn add_optimistic_at(
        &mut self,
        draft: PostDraft,
        now: DateTime<Utc>,
    ) -> (Post, PendingOperationId) {
        let local_id = self.take_local_id();
        let post = Post::optimistic(local_id, &draft, now);
        let operation_id = self.push_operation(PendingPayload::CreatePost(draft), Some(local_id), now);
        debug!(local_id = %local_id, operation_id = %operation_id, "optimistic post added");
        (post, operation_id)
    }

    /// お気に入り変更を記録する。クライアントローカルな操作のため同期時に即確定する。
    pub fn record_favorite_toggle(&mut self, post_id: PostId, is_favorite: bool) -> PendingOperationId {
        self.push_operation(
            PendingPayload::ToggleFavorite {
                post_id,
                is_favorite,
            },
            None,
            Utc::now(),
        )
    }

    pub fn state(&self, local_id: LocalPostId) -> Option<OptimisticState> {
        if self.position_of_local(local_id).is_some() {
            return Some(OptimisticState::Pending);
        }
        self.resolved.get(&local_id).copied()
    }

    pub fn is_pending(&self, local_id: LocalPostId) -> bool {
        self.position_of_local(local_id).is_some()
    }

    fn position_of_local(&self, local_id: LocalPostId) -> Option<usize> {
        self.operations
            .iter()
            .position(|op| op.local_post_id == Some(local_id))
    }

    fn position_of(&self, operation_id: &PendingOperationId) -> Option<usize> {
        self.operations.iter().position(|op| &op.id == operation_id)
    }

    /// 保留中の仮投稿本体
    pub fn get_optimistic(&self, local_id: LocalPostId) -> Option<Post> {
        self.position_of_local(local_id)
            .and_then(|index| optimistic_post_of(&self.operations[index]))
    }

    /// 保留中の仮投稿（新しい順）
    pub fn pending_posts(&self) -> Vec<Post> {
        let mut posts: Vec<(u64, Post)> = self
            .operations
            .iter()
            .filter_map(|op| optimistic_post_of(op).map(|post| (op.sequence, post)))
            .collect();
        posts.sort_by(|a, b| b.0.cmp(&a.0));
        posts.into_iter().map(|(_, post)| post).collect()
    }

    pub fn operation(&self, operation_id: &PendingOperationId) -> Option<&PendingOperation> {
        self.position_of(operation_id).map(|index| &self.operations[index])
    }

    pub fn operation_for(&self, local_id: LocalPostId) -> Option<&PendingOperation> {
        self.position_of_local(local_id)
            .map(|index| &self.operations[index])
    }

    /// 同期用スナップショット（作成順）
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        let mut operations = self.operations.clone();
        operations.sort_by_key(|op| (op.created_at, op.sequence));
        operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// 送信権を取得する。同じオペレーションの送信中は false。
    pub fn begin_attempt(&mut self, operation_id: &PendingOperationId) -> bool {
        if self.position_of(operation_id).is_none() {
            return false;
        }
        self.in_flight.insert(operation_id.clone())
    }

    pub fn end_attempt(&mut self, operation_id: &PendingOperationId) {
        self.in_flight.remove(operation_id);
    }

    pub fn is_in_flight(&self, operation_id: &PendingOperationId) -> bool {
        self.in_flight.contains(operation_id)
    }

    /// 一時的な失敗を記録し、更新後のリトライ回数を返す
    pub fn record_failure(
        &mut self,
        operation_id: &PendingOperationId,
        error: &AppError,
    ) -> Result<u32, AppError> {
        let index = self
            .position_of(operation_id)
            .ok_or_else(|| AppError::invariant(format!("operation {operation_id} is not pending")))?;
        let operation = &mut self.operations[index];
        operation.record_failure(error.to_string());
        Ok(operation.retry_count)
    }

    /// Pending → Confirmed。戻り値は置き換えられた仮投稿。
    pub fn confirm(&mut self, local_id: LocalPostId, confirmed: &Post) -> Result<Post, AppError> {
        let operation = self.take_pending(local_id, OptimisticState::Confirmed)?;
        debug!(
            local_id = %local_id,
            post_id = %confirmed.id,
            "optimistic post confirmed"
        );
        optimistic_post_of(&operation)
            .ok_or_else(|| AppError::invariant(format!("operation for {local_id} has no draft")))
    }

    /// Pending → RolledBack。戻り値は取り除かれた仮投稿。
    pub fn rollback(&mut self, local_id: LocalPostId, reason: &AppError) -> Result<Post, AppError> {
        let operation = self.take_pending(local_id, OptimisticState::RolledBack)?;
        debug!(local_id = %local_id, reason = %reason, "optimistic post rolled back");
        optimistic_post_of(&operation)
            .ok_or_else(|| AppError::invariant(format!("operation for {local_id} has no draft")))
    }

    /// 仮投稿を伴わないオペレーション（お気に入り変更）を確定して取り除く
    pub fn complete_operation(&mut self, operation_id: &PendingOperationId) -> Result<PendingOperation, AppError> {
        let index = self
            .position_of(operation_id)
            .ok_or_else(|| AppError::invariant(format!("operation {operation_id} is not pending")))?;
        if let Some(local_id) = self.operations[index].local_post_id {
            return Err(AppError::invariant(format!(
                "operation {operation_id} belongs to optimistic post {local_id}; use confirm or rollback"
            )));
        }
        self.in_flight.remove(operation_id);
        Ok(self.operations.remove(index))
    }

    fn take_pending(
        &mut self,
        local_id: LocalPostId,
        next: OptimisticState,
    ) -> Result<PendingOperation, AppError> {
        let Some(index) = self.position_of_local(local_id) else {
            let message = match self.resolved.get(&local_id) {
                Some(state) => format!("optimistic post {local_id} already resolved as {state:?}"),
                None => format!("optimistic post {local_id} is not tracked"),
            };
            error!(local_id = %local_id, transition = ?next, "{message}");
            return Err(AppError::invariant(message));
        };

        let operation = self.operations.remove(index);
        self.in_flight.remove(&operation.id);
        self.resolved.insert(local_id, next);
        Ok(operation)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            version: SNAPSHOT_VERSION,
            next_local_id: self.next_local_id,
            next_sequence: self.next_sequence,
            operations: self.pending_operations(),
        }
    }

    /// 前回セッションの保留分を復元する。ローカル ID は復元分より大きい値から再開する。
    pub fn restore(&mut self, snapshot: TrackerSnapshot) {
        let max_local = snapshot
            .operations
            .iter()
            .filter_map(|op| op.local_post_id.map(|id| id.value()))
            .max()
            .unwrap_or(0);
        let max_sequence = snapshot
            .operations
            .iter()
            .map(|op| op.sequence + 1)
            .max()
            .unwrap_or(0);

        self.next_local_id = snapshot.next_local_id.max(max_local).max(self.next_local_id);
        self.next_sequence = snapshot.next_sequence.max(max_sequence).max(self.next_sequence);
        self.operations = snapshot.operations;
        self.in_flight.clear();
    }
}

fn optimistic_post_of(operation: &PendingOperation) -> Option<Post> {
    match (&operation.payload, operation.local_post_id) {
        (PendingPayload::CreatePost(draft), Some(local_id)) => {
            Some(Post::optimistic(local_id, draft, operation.created_at))
        }
        _ => None,
    }
}
