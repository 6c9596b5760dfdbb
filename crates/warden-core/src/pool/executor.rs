//! WorkerPool: bounded-concurrency executor on tokio.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use super::{JobHandle, PoolConfig, PoolError};

/// Resolves to `true` when the submitted closure panicked.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send + 'static>;

/// Snapshot for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub workers: usize,
    pub idle: usize,
    pub queued: usize,
    /// Jobs that ran to the end without panicking.
    pub completed: u64,
    /// Jobs that panicked (their handles resolved to `WorkerLost`).
    pub panicked: u64,
    pub rejected: u64,
    pub shut_down: bool,
}

/// Backlog and worker accounting. Guarded by a std mutex that is never held across an await.
struct PoolState {
    queue: VecDeque<Job>,
    workers: usize,
    idle: usize,
    next_worker: usize,
    completed: u64,
    panicked: u64,
    rejected: u64,
    shut_down: bool,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    notify: Notify,
    shutdown_tx: watch::Sender<bool>,
    joins: Mutex<Vec<JoinHandle<()>>>,
    runtime: Handle,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded worker pool.
///
/// - `start()` で構築し、`shutdown()` / `shutdown_and_join()` で止める
/// - `submit()` は呼び出し元をブロックしない（満杯なら `Rejected`）
/// - shutdown 後もキューに残っているジョブは実行してから worker が終了する
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Build a pool on the current tokio runtime. Workers start lazily on submit.
    pub fn start(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let (shutdown_tx, _) = watch::channel(false);

        debug!(
            core = config.core_size,
            max = config.max_size,
            queue_capacity = config.queue_capacity,
            prefix = %config.name_prefix,
            "worker pool started"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    queue: VecDeque::with_capacity(config.queue_capacity),
                    workers: 0,
                    idle: 0,
                    next_worker: 1,
                    completed: 0,
                    panicked: 0,
                    rejected: 0,
                    shut_down: false,
                }),
                config,
                notify: Notify::new(),
                shutdown_tx,
                joins: Mutex::new(Vec::new()),
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Run `f` on a pool worker. The caller observes completion only through the handle.
    ///
    /// A panic inside the job resolves the handle with `PoolError::WorkerLost`;
    /// the worker itself keeps running.
    pub fn submit<F, Fut, T>(&self, f: F) -> Result<JobHandle<T>, PoolError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let result = AssertUnwindSafe(async move { f().await })
                    .catch_unwind()
                    .await
                    .map_err(panic_message);
                let panicked = result.is_err();
                // 受け手が drop 済みでもジョブ自体は完了している
                let _ = tx.send(result);
                panicked
            }
            .boxed()
        });

        self.admit(job)?;
        Ok(JobHandle::new(rx))
    }

    fn admit(&self, job: Job) -> Result<(), PoolError> {
        let config = &self.shared.config;
        let mut state = self.shared.state();

        if state.shut_down {
            return Err(PoolError::ShutDown);
        }

        if state.workers < config.core_size {
            let name = claim_worker(&mut state, config);
            drop(state);
            self.spawn_worker(name, Some(job));
            return Ok(());
        }

        if state.queue.len() < config.queue_capacity {
            state.queue.push_back(job);
            drop(state);
            self.shared.notify.notify_one();
            return Ok(());
        }

        if state.workers < config.max_size {
            let name = claim_worker(&mut state, config);
            drop(state);
            self.spawn_worker(name, Some(job));
            return Ok(());
        }

        state.rejected += 1;
        let err = PoolError::Rejected {
            queued: state.queue.len(),
            capacity: config.queue_capacity,
            workers: state.workers,
        };
        drop(state);
        warn!(prefix = %config.name_prefix, error = %err, "job rejected");
        Err(err)
    }

    fn spawn_worker(&self, name: String, first: Option<Job>) {
        let span = info_span!("worker", name = %name);
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shared.shutdown_tx.subscribe();
        let join = self
            .shared
            .runtime
            .spawn(worker_loop(shared, first, shutdown_rx).instrument(span));

        let mut joins = self.shared.joins.lock().unwrap_or_else(|e| e.into_inner());
        joins.retain(|j| !j.is_finished());
        joins.push(join);
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state();
        PoolStatus {
            workers: state.workers,
            idle: state.idle,
            queued: state.queue.len(),
            completed: state.completed,
            panicked: state.panicked,
            rejected: state.rejected,
            shut_down: state.shut_down,
        }
    }

    /// Stop accepting jobs. Queued jobs still run; in-flight jobs are not cancelled.
    pub fn shutdown(&self) {
        let mut state = self.shared.state();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        drop(state);
        // ignore send error: no worker may be subscribed yet
        let _ = self.shared.shutdown_tx.send(true);
        debug!(prefix = %self.shared.config.name_prefix, "worker pool shutting down");
    }

    /// Shutdown and wait for every worker to drain the backlog and exit.
    pub async fn shutdown_and_join(&self) {
        self.shutdown();
        let joins = {
            let mut joins = self.shared.joins.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *joins)
        };
        for j in joins {
            let _ = j.await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn claim_worker(state: &mut PoolState, config: &PoolConfig) -> String {
    state.workers += 1;
    let n = state.next_worker;
    state.next_worker += 1;
    format!("{}{}", config.name_prefix, n)
}

async fn worker_loop(
    shared: Arc<Shared>,
    mut first: Option<Job>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let job = match first.take() {
            Some(job) => job,
            None => match next_job(&shared, &mut shutdown_rx).await {
                Some(job) => job,
                None => break,
            },
        };

        // panic は submit() 側の catch_unwind で捕まえている
        let panicked = job().await;
        {
            let mut state = shared.state();
            if panicked {
                state.panicked += 1;
            } else {
                state.completed += 1;
            }
        }
    }
    debug!("worker exiting");
}

/// Wait for the next queued job. `None` means this worker should exit
/// (pool shut down and drained, or a burst worker idled past keep-alive).
async fn next_job(shared: &Shared, shutdown_rx: &mut watch::Receiver<bool>) -> Option<Job> {
    let keep_alive = shared.config.keep_alive();
    loop {
        {
            let mut state = shared.state();
            if let Some(job) = state.queue.pop_front() {
                return Some(job);
            }
            if state.shut_down {
                state.workers -= 1;
                return None;
            }
            state.idle += 1;
        }

        // Notify は permit を保持するので、unlock 後の notify_one も取りこぼさない
        let woke = tokio::select! {
            _ = shared.notify.notified() => true,
            _ = shutdown_rx.changed() => true,
            _ = tokio::time::sleep(keep_alive) => false,
        };

        let mut state = shared.state();
        state.idle -= 1;
        if !woke && state.workers > shared.config.core_size && state.queue.is_empty() {
            state.workers -= 1;
            debug!("burst worker idle past keep-alive");
            return None;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn pool(core: usize, max: usize, queue: usize) -> WorkerPool {
        WorkerPool::start(PoolConfig::new(core, max, queue).with_name_prefix("test-")).unwrap()
    }

    #[tokio::test]
    async fn submit_runs_job_and_returns_value() {
        let pool = pool(1, 1, 4);
        let handle = pool.submit(|| async { 40 + 2 }).unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[test]
    fn start_outside_runtime_fails() {
        let err = WorkerPool::start(PoolConfig::default()).err();
        assert!(matches!(err, Some(PoolError::NoRuntime)));
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let err = WorkerPool::start(PoolConfig::new(3, 1, 0)).err();
        assert!(matches!(err, Some(PoolError::InvalidConfig(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn core_workers_run_jobs_concurrently() {
        let pool = pool(3, 3, 0);
        let barrier = Arc::new(Barrier::new(3));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let barrier = Arc::clone(&barrier);
                pool.submit(move || async move {
                    // 3 つ同時に走っていないとここで詰まる
                    barrier.wait().await;
                    i
                })
                .unwrap()
            })
            .collect();

        let results = tokio::time::timeout(Duration::from_secs(2), futures::future::join_all(handles))
            .await
            .expect("jobs did not run concurrently");
        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn saturated_pool_rejects_instead_of_blocking() {
        let pool = pool(1, 2, 2);
        let (release_tx, release_rx) = watch::channel(false);

        // 2 workers busy + 2 queued = full
        let mut handles = Vec::new();
        for _ in 0..4 {
            let mut rx = release_rx.clone();
            handles.push(
                pool.submit(move || async move {
                    let _ = rx.wait_for(|go| *go).await;
                })
                .unwrap(),
            );
        }

        let err = pool.submit(|| async {}).err();
        match err {
            Some(PoolError::Rejected {
                queued,
                capacity,
                workers,
            }) => {
                assert_eq!((queued, capacity, workers), (2, 2, 2));
            }
            _ => panic!("expected Rejected"),
        }
        assert_eq!(pool.status().rejected, 1);

        release_tx.send(true).unwrap();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(pool.status().completed, 4);
    }

    #[tokio::test]
    async fn panicking_job_reports_worker_lost_and_pool_survives() {
        let pool = pool(1, 1, 4);

        let bad = pool.submit::<_, _, ()>(|| async { panic!("boom") }).unwrap();
        let err = bad.await.unwrap_err();
        assert!(matches!(&err, PoolError::WorkerLost(msg) if msg.contains("boom")));

        let good = pool.submit(|| async { "still alive" }).unwrap();
        assert_eq!(good.await.unwrap(), "still alive");

        let status = pool.status();
        assert_eq!(status.workers, 1);
        assert_eq!(status.completed, 1);
        assert_eq!(status.panicked, 1);
    }

    #[tokio::test]
    async fn shutdown_drains_queue_then_rejects() {
        let pool = pool(1, 1, 8);
        let ran = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let ran = Arc::clone(&ran);
                pool.submit(move || async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        pool.shutdown_and_join().await;

        assert_eq!(ran.load(Ordering::SeqCst), 5);
        for h in handles {
            h.await.unwrap();
        }
        assert!(matches!(pool.submit(|| async {}), Err(PoolError::ShutDown)));

        let status = pool.status();
        assert!(status.shut_down);
        assert_eq!(status.workers, 0);
    }

    #[tokio::test]
    async fn burst_workers_retire_after_keep_alive() {
        let pool = WorkerPool::start(
            PoolConfig::new(1, 2, 0).with_keep_alive(Duration::from_millis(50)),
        )
        .unwrap();

        let a = pool.submit(|| async { tokio::time::sleep(Duration::from_millis(10)).await }).unwrap();
        let b = pool.submit(|| async { tokio::time::sleep(Duration::from_millis(10)).await }).unwrap();
        assert_eq!(pool.status().workers, 2);
        a.await.unwrap();
        b.await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.status().workers, 1);
    }
}
