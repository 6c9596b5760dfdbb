//! Errors - dispatch エラーと分類
//!
//! 1 タスク分のエラーはすべて、そのタスクの `Outcome` に変換されます。
//! バッチ全体を失敗させるエラーはありません。

use thiserror::Error;

/// ErrorKind は dispatch エラーの運用分類
///
/// - Expected: 想定内（ロック競合）。エラーではなく Skipped になる
/// - Infrastructure: ロックコーディネータの障害
/// - Task: タスク本体の失敗
/// - Overload: Worker Pool の飽和・停止
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Expected,
    Infrastructure,
    Task,
    Overload,
}

/// Everything that can stop one task from completing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("already in progress: {key}")]
    LockUnavailable { key: String },

    #[error("lock coordinator unreachable: {0}")]
    CoordinatorUnreachable(String),

    #[error("task failed: {0}")]
    TaskBody(String),

    #[error("worker pool saturated: {0}")]
    PoolSaturated(String),

    #[error("worker pool is shut down")]
    PoolShutdown,

    /// The body was running on a worker and panicked.
    #[error("worker lost: {0}")]
    WorkerLost(String),

    /// The dispatch itself died (panicked or was aborted); the body may never have started.
    #[error("dispatch lost: {0}")]
    DispatchLost(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::LockUnavailable { .. } => ErrorKind::Expected,
            DispatchError::CoordinatorUnreachable(_) | DispatchError::DispatchLost(_) => {
                ErrorKind::Infrastructure
            }
            DispatchError::TaskBody(_) | DispatchError::WorkerLost(_) => ErrorKind::Task,
            DispatchError::PoolSaturated(_) | DispatchError::PoolShutdown => ErrorKind::Overload,
        }
    }
}
