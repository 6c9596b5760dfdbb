//! Domain model (ids, tasks, leases, outcomes, batches, errors).
//!
//! このモジュールはロックサービスや実行基盤を前提にしません。
//! 「何を実行し、何が起きたか」の形だけを定義します。

pub mod batch;
pub mod errors;
pub mod ids;
pub mod lease;
pub mod outcome;
pub mod task;

pub use batch::{BatchCounts, DispatchBatch};
pub use errors::{DispatchError, ErrorKind};
pub use ids::{BatchId, OwnerId};
pub use lease::{LockHandle, LockKey};
pub use outcome::{FailureKind, Outcome, OutcomeKind};
pub use task::{BodyError, BodyResult, InvalidTaskKey, Task, TaskBody, TaskKey};
