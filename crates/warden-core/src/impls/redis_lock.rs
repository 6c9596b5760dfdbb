//! Redis lock coordinator for fleet-wide mutual exclusion.
//!
//! | Operation | Redis |
//! |-----------|-------|
//! | acquire   | `SET {key} {owner} NX PX {hold_ms}` |
//! | release   | Lua compare-and-delete (only the owner may delete) |
//!
//! Redis expires the key after `hold`, which gives lease semantics for free.
//! Connection and protocol errors surface as `CoordinatorError::Unreachable`.

use ::redis::aio::MultiplexedConnection;
use ::redis::Script;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::domain::{LockHandle, LockKey, OwnerId};
use crate::ports::{CoordinatorError, LockCoordinator, ReleaseStatus};

/// KEYS[1] = lock key, ARGV[1] = owner token.
/// Returns 1 if the owner's lock was deleted, 0 otherwise.
const LUA_RELEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Holds a [`MultiplexedConnection`]; clones share one TCP connection.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    conn: MultiplexedConnection,
}

impl RedisLockCoordinator {
    /// Connect to `redis://[:<password>@]<host>:<port>[/<db>]`. Fails fast.
    pub async fn connect(url: &str) -> Result<Self, CoordinatorError> {
        let client = ::redis::Client::open(url).map_err(|e| unreachable_err(e, url))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| unreachable_err(e, url))?;
        Ok(Self { conn })
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn unreachable_err(err: ::redis::RedisError, key: &str) -> CoordinatorError {
    CoordinatorError::Unreachable(format!("Redis error for {key}: {err}"))
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn acquire_once(
        &self,
        key: &LockKey,
        owner: OwnerId,
        hold: Duration,
    ) -> Result<Option<LockHandle>, CoordinatorError> {
        // PX 0 は Redis が拒否するので最低 1ms
        let hold_ms = (hold.as_millis() as u64).max(1);
        let acquired_at = Utc::now();

        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key.as_str())
            .arg(owner.to_string())
            .arg("NX")
            .arg("PX")
            .arg(hold_ms)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| unreachable_err(e, key.as_str()))?;

        if reply.is_none() {
            debug!(key = %key, "lock held by another owner");
            return Ok(None);
        }
        debug!(key = %key, owner = %owner, ttl_ms = hold_ms, "lock acquired");
        Ok(Some(LockHandle::new(key.clone(), owner, hold, acquired_at)))
    }

    async fn release(&self, handle: &LockHandle) -> Result<ReleaseStatus, CoordinatorError> {
        let deleted: i64 = Script::new(LUA_RELEASE)
            .key(handle.key().as_str())
            .arg(handle.owner().to_string())
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| unreachable_err(e, handle.key().as_str()))?;

        if deleted == 1 {
            debug!(key = %handle.key(), owner = %handle.owner(), "lock released");
            Ok(ReleaseStatus::Released)
        } else {
            debug!(key = %handle.key(), owner = %handle.owner(), "release skipped: not held");
            Ok(ReleaseStatus::NotHeld)
        }
    }
}

/// Run with a live server:
/// ```bash
/// REDIS_URL=redis://127.0.0.1:6379 cargo test -p warden-core --features redis-tests -- redis_
/// ```
#[cfg(all(test, feature = "redis-tests"))]
mod integration_tests {
    use super::*;
    use ulid::Ulid;

    async fn coordinator() -> RedisLockCoordinator {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedisLockCoordinator::connect(&url)
            .await
            .expect("Redis connection failed -- is Redis running?")
    }

    fn unique_key() -> LockKey {
        LockKey::new(format!("test:lock:{}", Ulid::new()))
    }

    #[tokio::test]
    async fn redis_second_owner_is_refused() {
        let coord = coordinator().await;
        let key = unique_key();

        let first = coord
            .acquire_once(&key, OwnerId::generate(), Duration::from_secs(5))
            .await
            .unwrap();
        let second = coord
            .acquire_once(&key, OwnerId::generate(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        coord.release(&first.unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn redis_release_checks_owner_and_is_idempotent() {
        let coord = coordinator().await;
        let key = unique_key();
        let handle = coord
            .acquire_once(&key, OwnerId::generate(), Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        let impostor = LockHandle::new(key.clone(), OwnerId::generate(), Duration::from_secs(5), Utc::now());

        assert_eq!(coord.release(&impostor).await.unwrap(), ReleaseStatus::NotHeld);
        assert_eq!(coord.release(&handle).await.unwrap(), ReleaseStatus::Released);
        assert_eq!(coord.release(&handle).await.unwrap(), ReleaseStatus::NotHeld);
    }

    #[tokio::test]
    async fn redis_lease_expires() {
        let coord = coordinator().await;
        let key = unique_key();
        coord
            .acquire_once(&key, OwnerId::generate(), Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        let again = coord
            .acquire_once(&key, OwnerId::generate(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(again.is_some());
    }
}
