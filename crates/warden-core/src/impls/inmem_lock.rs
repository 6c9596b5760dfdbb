//! InMemoryLockCoordinator - 単一プロセス用のリース型ロック
//!
//! 開発・テスト用です。フリート全体の排他には `RedisLockCoordinator` を使います。
//!
//! # 実装詳細
//! - HashMap<LockKey, LeaseEntry> を std の Mutex で保護（await を跨いで保持しない）
//! - 期限切れのエントリは「空き」とみなし、次の取得で上書きする
//! - `set_reachable(false)` でコーディネータ障害を再現できる

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::domain::{LockHandle, LockKey, OwnerId};
use crate::ports::{Clock, CoordinatorError, LockCoordinator, ReleaseStatus, SystemClock};

#[derive(Debug, Clone)]
struct LeaseEntry {
    owner: OwnerId,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryLockCoordinator<C = SystemClock> {
    leases: Mutex<HashMap<LockKey, LeaseEntry>>,
    clock: C,
    reachable: AtomicBool,
}

impl InMemoryLockCoordinator<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryLockCoordinator<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryLockCoordinator<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with `Unreachable` while false.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Current live holder of `key`, if any.
    pub fn holder(&self, key: &LockKey) -> Option<OwnerId> {
        let now = self.clock.now();
        let leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.owner)
    }

    /// Entries still stored, live or not yet swept.
    pub fn lease_count(&self) -> usize {
        self.leases.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.holder(key).is_some()
    }

    fn check_reachable(&self) -> Result<(), CoordinatorError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoordinatorError::Unreachable(
                "in-memory coordinator marked unreachable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl<C: Clock> LockCoordinator for InMemoryLockCoordinator<C> {
    async fn acquire_once(
        &self,
        key: &LockKey,
        owner: OwnerId,
        hold: Duration,
    ) -> Result<Option<LockHandle>, CoordinatorError> {
        self.check_reachable()?;

        let now = self.clock.now();
        let handle = LockHandle::new(key.clone(), owner, hold, now);
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        // 解放されずに期限切れになったリース（保持者のクラッシュなど）を掃除する
        leases.retain(|_, entry| entry.expires_at > now);

        if let Some(current) = leases.get(key)
            && current.expires_at > now
        {
            debug!(key = %key, holder = %current.owner, "lock held by another owner");
            return Ok(None);
        }

        leases.insert(
            key.clone(),
            LeaseEntry {
                owner,
                expires_at: handle.expires_at(),
            },
        );
        debug!(key = %key, owner = %owner, ttl_ms = hold.as_millis() as u64, "lock acquired");
        Ok(Some(handle))
    }

    async fn release(&self, handle: &LockHandle) -> Result<ReleaseStatus, CoordinatorError> {
        self.check_reachable()?;

        let now = self.clock.now();
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());

        let Some(current) = leases.get(handle.key()) else {
            return Ok(ReleaseStatus::NotHeld);
        };
        if current.owner != handle.owner() {
            debug!(key = %handle.key(), owner = %handle.owner(), holder = %current.owner, "release skipped: lock taken over");
            return Ok(ReleaseStatus::NotHeld);
        }

        let live = current.expires_at > now;
        leases.remove(handle.key());
        if live {
            debug!(key = %handle.key(), owner = %handle.owner(), "lock released");
            Ok(ReleaseStatus::Released)
        } else {
            debug!(key = %handle.key(), owner = %handle.owner(), "release skipped: lease expired");
            Ok(ReleaseStatus::NotHeld)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    const HOLD: Duration = Duration::from_secs(10);

    fn fixed() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn key(s: &str) -> LockKey {
        LockKey::new(format!("lock:task:{s}"))
    }

    #[tokio::test]
    async fn second_owner_is_refused_while_lease_is_live() {
        let coord = InMemoryLockCoordinator::new();
        let (a, b) = (OwnerId::generate(), OwnerId::generate());

        let held = coord.acquire_once(&key("a"), a, HOLD).await.unwrap();
        assert!(held.is_some());

        let refused = coord.acquire_once(&key("a"), b, HOLD).await.unwrap();
        assert!(refused.is_none());
        assert_eq!(coord.holder(&key("a")), Some(a));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let coord = InMemoryLockCoordinator::new();

        let a = coord.acquire_once(&key("a"), OwnerId::generate(), HOLD).await.unwrap();
        let b = coord.acquire_once(&key("b"), OwnerId::generate(), HOLD).await.unwrap();

        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let coord = InMemoryLockCoordinator::new();
        let handle = coord
            .acquire_once(&key("a"), OwnerId::generate(), HOLD)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(coord.release(&handle).await.unwrap(), ReleaseStatus::Released);
        assert_eq!(coord.release(&handle).await.unwrap(), ReleaseStatus::NotHeld);
        assert!(!coord.is_locked(&key("a")));
    }

    #[tokio::test]
    async fn lease_expires_without_release() {
        let clock = fixed();
        let coord = InMemoryLockCoordinator::with_clock(clock.clone());
        let first = coord
            .acquire_once(&key("a"), OwnerId::generate(), HOLD)
            .await
            .unwrap()
            .unwrap();

        clock.advance(HOLD);
        assert!(!coord.is_locked(&key("a")));
        assert_eq!(coord.release(&first).await.unwrap(), ReleaseStatus::NotHeld);
    }

    #[tokio::test]
    async fn stale_release_does_not_free_the_new_owner() {
        let clock = fixed();
        let coord = InMemoryLockCoordinator::with_clock(clock.clone());
        let (old, new) = (OwnerId::generate(), OwnerId::generate());

        let stale = coord.acquire_once(&key("a"), old, HOLD).await.unwrap().unwrap();
        clock.advance(HOLD + Duration::from_secs(1));
        let fresh = coord.acquire_once(&key("a"), new, HOLD).await.unwrap();
        assert!(fresh.is_some());

        assert_eq!(coord.release(&stale).await.unwrap(), ReleaseStatus::NotHeld);
        assert_eq!(coord.holder(&key("a")), Some(new));
    }

    #[tokio::test]
    async fn expired_leases_of_other_keys_are_swept_on_acquire() {
        let clock = fixed();
        let coord = InMemoryLockCoordinator::with_clock(clock.clone());
        for k in ["crashed-1", "crashed-2", "crashed-3"] {
            coord.acquire_once(&key(k), OwnerId::generate(), HOLD).await.unwrap();
        }
        assert_eq!(coord.lease_count(), 3);

        clock.advance(HOLD);
        coord.acquire_once(&key("b"), OwnerId::generate(), HOLD).await.unwrap();

        assert_eq!(coord.lease_count(), 1);
        assert!(coord.is_locked(&key("b")));
    }

    #[tokio::test]
    async fn outage_is_an_error_not_a_refusal() {
        let coord = InMemoryLockCoordinator::new();
        coord.set_reachable(false);

        let err = coord
            .acquire_once(&key("a"), OwnerId::generate(), HOLD)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Unreachable(_)));

        coord.set_reachable(true);
        assert!(coord.acquire_once(&key("a"), OwnerId::generate(), HOLD).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn zero_wait_returns_immediately() {
        let coord = InMemoryLockCoordinator::new();
        coord.acquire_once(&key("a"), OwnerId::generate(), HOLD).await.unwrap();

        let start = tokio::time::Instant::now();
        let got = coord
            .try_acquire(&key("a"), OwnerId::generate(), Duration::ZERO, HOLD)
            .await
            .unwrap();

        assert!(got.is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn waiting_acquire_succeeds_once_holder_releases() {
        let coord = Arc::new(InMemoryLockCoordinator::new());
        let first = coord
            .acquire_once(&key("a"), OwnerId::generate(), HOLD)
            .await
            .unwrap()
            .unwrap();

        let releaser = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                coord.release(&first).await.unwrap();
            })
        };

        let got = coord
            .try_acquire(&key("a"), OwnerId::generate(), Duration::from_secs(2), HOLD)
            .await
            .unwrap();
        releaser.await.unwrap();

        assert!(got.is_some());
    }

    #[tokio::test]
    async fn waiting_acquire_gives_up_at_the_deadline() {
        let coord = InMemoryLockCoordinator::new();
        coord.acquire_once(&key("a"), OwnerId::generate(), HOLD).await.unwrap();

        let got = coord
            .try_acquire(&key("a"), OwnerId::generate(), Duration::from_millis(100), HOLD)
            .await
            .unwrap();

        assert!(got.is_none());
    }
}
