//! LeaseGuard: releases an acquired lease exactly once.

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::domain::LockHandle;
use crate::ports::{LockCoordinator, ReleaseStatus};

/// Owns a live `LockHandle` until `release()` is awaited.
///
/// The dispatcher moves the guard into the pool job, so the release follows
/// the body rather than the caller. If the guard is dropped unreleased (the
/// queued job was discarded before it ran) the release is spawned on the
/// current runtime. Outside a runtime the lease simply expires.
pub struct LeaseGuard {
    coordinator: Arc<dyn LockCoordinator>,
    handle: Option<LockHandle>,
}

impl LeaseGuard {
    pub fn new(coordinator: Arc<dyn LockCoordinator>, handle: LockHandle) -> Self {
        Self {
            coordinator,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_ref()
    }

    /// Release now. Errors are logged, never returned: the task already ran.
    pub async fn release(mut self) -> Option<ReleaseStatus> {
        let handle = self.handle.take()?;
        release_logged(self.coordinator.as_ref(), &handle).await
    }
}

async fn release_logged(
    coordinator: &dyn LockCoordinator,
    handle: &LockHandle,
) -> Option<ReleaseStatus> {
    match coordinator.release(handle).await {
        Ok(status) => {
            debug!(key = %handle.key(), owner = %handle.owner(), ?status, "lease released");
            Some(status)
        }
        Err(err) => {
            warn!(
                key = %handle.key(),
                owner = %handle.owner(),
                error = %err,
                "lease release failed; it will expire on its own"
            );
            None
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                let coordinator = Arc::clone(&self.coordinator);
                runtime.spawn(async move {
                    release_logged(coordinator.as_ref(), &handle).await;
                });
            }
            Err(_) => {
                warn!(
                    key = %handle.key(),
                    owner = %handle.owner(),
                    "lease guard dropped outside a runtime; lease left to expire"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LockKey, OwnerId};
    use crate::impls::InMemoryLockCoordinator;
    use std::time::Duration;

    async fn acquired(
        coordinator: &Arc<InMemoryLockCoordinator>,
        key: &LockKey,
    ) -> LockHandle {
        coordinator
            .acquire_once(key, OwnerId::generate(), Duration::from_secs(10))
            .await
            .unwrap()
            .expect("lock should be free")
    }

    #[tokio::test]
    async fn release_frees_the_lock_once() {
        let coordinator = Arc::new(InMemoryLockCoordinator::new());
        let key = LockKey::new("lock:task:a");
        let handle = acquired(&coordinator, &key).await;

        let guard = LeaseGuard::new(coordinator.clone(), handle);
        assert!(guard.handle().is_some());
        assert_eq!(guard.release().await, Some(ReleaseStatus::Released));
        assert!(!coordinator.is_locked(&key));
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let coordinator = Arc::new(InMemoryLockCoordinator::new());
        let key = LockKey::new("lock:task:b");
        let handle = acquired(&coordinator, &key).await;

        drop(LeaseGuard::new(coordinator.clone(), handle));
        assert!(coordinator.is_locked(&key));

        // let the spawned release run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!coordinator.is_locked(&key));
    }

    #[tokio::test]
    async fn release_during_outage_is_swallowed() {
        let coordinator = Arc::new(InMemoryLockCoordinator::new());
        let key = LockKey::new("lock:task:c");
        let handle = acquired(&coordinator, &key).await;

        coordinator.set_reachable(false);
        let guard = LeaseGuard::new(coordinator.clone(), handle);
        assert_eq!(guard.release().await, None);

        coordinator.set_reachable(true);
        assert!(coordinator.is_locked(&key));
    }
}
