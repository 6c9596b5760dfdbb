//! LockCoordinator port - 分散ロックサービス（Redis または InMemory）
//!
//! # 設計原則
//! - ロックはすべてリース（TTL 付き）。release されなくても `hold` 経過で消える
//! - release は owner を確認してから消す（期限切れ後に他人のロックを消さない）
//! - コーディネータに到達できないことは「取得できなかった」とは区別する
//!
//! # 既知の制限
//! fencing token はありません。`hold` を超えて走り続けた保持者は止められず、
//! 保証されるのは「リースが生きている間は新しい取得が成功しない」ことだけです。

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{LockHandle, LockKey, OwnerId};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator unreachable: {0}")]
    Unreachable(String),
}

/// Result of a release call. Neither variant is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// The lease belonged to the caller and is gone now.
    Released,
    /// Expired, taken over by another owner, or already released.
    NotHeld,
}

#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Single non-blocking attempt. `Ok(None)` when another owner holds a live lease.
    async fn acquire_once(
        &self,
        key: &LockKey,
        owner: OwnerId,
        hold: Duration,
    ) -> Result<Option<LockHandle>, CoordinatorError>;

    /// Release only if `handle.owner()` still holds the lease.
    async fn release(&self, handle: &LockHandle) -> Result<ReleaseStatus, CoordinatorError>;

    /// Acquire `key`, waiting up to `wait` for it to become free.
    ///
    /// `wait == 0` is a single attempt and never sleeps. Otherwise retries with
    /// jittered exponential backoff until the deadline, then gives up with `Ok(None)`.
    /// Coordinator errors are returned immediately.
    async fn try_acquire(
        &self,
        key: &LockKey,
        owner: OwnerId,
        wait: Duration,
        hold: Duration,
    ) -> Result<Option<LockHandle>, CoordinatorError> {
        if let Some(handle) = self.acquire_once(key, owner, hold).await? {
            return Ok(Some(handle));
        }
        if wait.is_zero() {
            return Ok(None);
        }

        let deadline = Instant::now() + wait;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let sleep = jittered(backoff).min(deadline - now);
            debug!(key = %key, owner = %owner, backoff_ms = sleep.as_millis() as u64, "lock held, backing off");
            tokio::time::sleep(sleep).await;

            if let Some(handle) = self.acquire_once(key, owner, hold).await? {
                return Ok(Some(handle));
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

// ThreadRng は Send ではないので await を跨がないよう関数に閉じ込める
fn jittered(backoff: Duration) -> Duration {
    let half = backoff.as_millis() as u64 / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    backoff + Duration::from_millis(jitter)
}
