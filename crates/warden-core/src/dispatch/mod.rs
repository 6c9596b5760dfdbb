//! Dispatcher - ロックで重複排除しながらタスクを Worker Pool に流す
//!
//! # フロー（1 タスク）
//! 1. `LockKey = {lock_prefix}{task_key}` を計算
//! 2. 新しい owner で `try_acquire`（既定では待たない）
//! 3. 取れなければ Skipped（本体は実行しない）
//! 4. 取れたら本体を Pool に投入し、結果を Outcome に畳み込む
//! 5. リースは本体の終了後に worker 側で 1 回だけ解放する（投入できなかった場合は呼び出し側で解放）
//!
//! 呼び出し側が `dispatch` の future を途中で drop しても、本体は走り続け、
//! リースは本体が終わるまで保持される。
//!
//! # フロー（バッチ）
//! `dispatch_all` はタスクごとに dispatch を spawn し、`join_all` で待ち合わせる。
//! 出力順は入力順と一致し、1 件の失敗がバッチ全体を失敗させることはない。

mod config;
mod guard;

pub use config::{DispatchConfig, InvalidDispatchConfig};
pub use guard::LeaseGuard;

use futures::FutureExt;
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::domain::{BodyResult, DispatchBatch, DispatchError, LockKey, Outcome, Task, TaskBody};
use crate::pool::{PoolError, WorkerPool};
use crate::ports::{IdGenerator, LockCoordinator, SystemClock, UlidGenerator};

/// Cheap to clone; every clone shares the coordinator, pool and id source.
#[derive(Clone)]
pub struct Dispatcher {
    coordinator: Arc<dyn LockCoordinator>,
    pool: Arc<WorkerPool>,
    ids: Arc<dyn IdGenerator>,
    config: Arc<DispatchConfig>,
}

impl Dispatcher {
    pub fn new(
        coordinator: Arc<dyn LockCoordinator>,
        pool: Arc<WorkerPool>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            coordinator,
            pool,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            config: Arc::new(config),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn coordinator(&self) -> &Arc<dyn LockCoordinator> {
        &self.coordinator
    }

    /// Run one task under its lock. Always yields an `Outcome`.
    pub async fn dispatch(&self, task: Task) -> Outcome {
        let (key, body) = task.into_parts();
        let lock_key = LockKey::for_task(&self.config.lock_prefix, &key);
        let owner = self.ids.generate_owner_id();

        let acquired = self
            .coordinator
            .try_acquire(
                &lock_key,
                owner,
                self.config.wait_time(),
                self.config.hold_time(),
            )
            .await;

        let handle = match acquired {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!(key = %key, "lock held elsewhere, skipping");
                return Outcome::from_error(&DispatchError::LockUnavailable {
                    key: key.to_string(),
                });
            }
            Err(err) => {
                let err = DispatchError::CoordinatorUnreachable(err.to_string());
                warn!(key = %key, error = %err, kind = ?err.kind(), "lock coordinator unavailable");
                return Outcome::from_error(&err);
            }
        };
        debug!(key = %key, owner = %owner, "lock acquired");

        // The lease travels with the job: it is released after the body finishes
        // on the worker, even if this future is dropped while waiting.
        let slot: LeaseSlot = Arc::new(Mutex::new(Some(LeaseGuard::new(
            Arc::clone(&self.coordinator),
            handle,
        ))));
        let job_slot = Arc::clone(&slot);

        let result = match self.pool.submit(move || run_then_release(body, job_slot)) {
            Ok(job) => match job.await {
                Ok(Ok(message)) => Ok(message),
                Ok(Err(err)) => Err(DispatchError::TaskBody(err.to_string())),
                Err(err) => Err(pool_error(err)),
            },
            Err(err) => {
                // never admitted: the job closure is gone and the guard is still ours
                if let Some(guard) = take_lease(&slot) {
                    guard.release().await;
                }
                Err(pool_error(err))
            }
        };

        match result {
            Ok(message) => Outcome::completed(message),
            Err(err) => {
                debug!(key = %key, error = %err, kind = ?err.kind(), "task did not complete");
                Outcome::from_error(&err)
            }
        }
    }

    /// Fan out one dispatch per task, then gather. `outcomes[i]` belongs to `tasks[i]`.
    ///
    /// Dispatches are spawned, so dropping the returned future does not cancel them.
    pub async fn dispatch_all(&self, tasks: Vec<Task>) -> DispatchBatch {
        let batch = self.ids.generate_batch_id();
        let span = info_span!("batch", batch = %batch);
        info!(parent: &span, tasks = tasks.len(), "dispatching batch");

        let joins: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let this = self.clone();
                tokio::spawn(async move { this.dispatch(task).await }.instrument(span.clone()))
            })
            .collect();

        let outcomes: Vec<Outcome> = join_all(joins)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|err| {
                    warn!(parent: &span, error = %err, "dispatch task lost");
                    Outcome::from_error(&DispatchError::DispatchLost(err.to_string()))
                })
            })
            .collect();

        let batch_result = DispatchBatch::new(outcomes);
        let counts = batch_result.counts();
        info!(
            parent: &span,
            completed = counts.completed,
            skipped = counts.skipped,
            failed = counts.failed,
            "batch finished"
        );
        batch_result
    }
}

/// Lease shared between the dispatch call and its pool job; whoever takes it releases it.
type LeaseSlot = Arc<Mutex<Option<LeaseGuard>>>;

fn take_lease(slot: &LeaseSlot) -> Option<LeaseGuard> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// Pool job body: run the task, give the lease back, then report.
/// A panic is re-raised after the release so the pool still sees it.
async fn run_then_release(body: TaskBody, slot: LeaseSlot) -> BodyResult {
    let result = AssertUnwindSafe(async move { body().await }).catch_unwind().await;
    if let Some(guard) = take_lease(&slot) {
        guard.release().await;
    }
    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn pool_error(err: PoolError) -> DispatchError {
    match err {
        PoolError::Rejected { .. } => DispatchError::PoolSaturated(err.to_string()),
        PoolError::ShutDown => DispatchError::PoolShutdown,
        PoolError::WorkerLost(msg) => DispatchError::WorkerLost(msg),
        other => DispatchError::WorkerLost(other.to_string()),
    }
}
