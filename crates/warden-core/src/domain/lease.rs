//! Lease model: lock names and the handle returned by a successful acquisition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::ids::OwnerId;
use super::task::TaskKey;

/// Fully-qualified lock name, `{prefix}{task key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// e.g. `lock:task:` + `a@x.com` -> `lock:task:a@x.com`
    pub fn for_task(prefix: &str, key: &TaskKey) -> Self {
        Self(format!("{prefix}{}", key.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A granted lease.
///
/// Owned by the dispatch invocation that acquired it and never shared. The
/// coordinator forgets the lease after `ttl` even if `release` never runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle {
    key: LockKey,
    owner: OwnerId,
    acquired: bool,
    ttl: Duration,
    acquired_at: DateTime<Utc>,
}

impl LockHandle {
    pub fn new(key: LockKey, owner: OwnerId, ttl: Duration, acquired_at: DateTime<Utc>) -> Self {
        Self {
            key,
            owner,
            acquired: true,
            ttl,
            acquired_at,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn acquired(&self) -> bool {
        self.acquired
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.acquired_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}
