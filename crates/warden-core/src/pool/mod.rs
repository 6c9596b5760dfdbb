//! Worker Pool - 有界の実行基盤
//!
//! # 設計原則
//! - 同時実行数は `max_size` を超えない
//! - 待ち行列は `queue_capacity` を超えない。超えたら呼び出し元には即座に `Rejected` を返す
//! - ジョブ内の panic は worker を殺さず、そのジョブの `JobHandle` に `WorkerLost` として届く
//! - shutdown 後は新規受付を止め、キューに残ったものは実行してから終了する

mod config;
mod executor;
mod handle;

pub use config::PoolConfig;
pub use executor::{PoolStatus, WorkerPool};
pub use handle::JobHandle;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("invalid pool config: {0}")]
    InvalidConfig(String),

    #[error("worker pool requires a tokio runtime")]
    NoRuntime,

    #[error("{workers} workers busy and {queued}/{capacity} jobs queued")]
    Rejected {
        queued: usize,
        capacity: usize,
        workers: usize,
    },

    #[error("worker pool is shut down")]
    ShutDown,

    #[error("{0}")]
    WorkerLost(String),
}
