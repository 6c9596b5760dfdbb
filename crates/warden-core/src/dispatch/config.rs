//! Lock timing for the dispatcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid dispatch config: {0}")]
pub struct InvalidDispatchConfig(pub String);

/// Lock key prefix and lease timing.
///
/// All durations are milliseconds so the struct reads the same in TOML and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Prepended to the task key: `{lock_prefix}{task_key}`.
    pub lock_prefix: String,

    /// How long to wait for a held lock. 0 = one attempt, never block.
    pub wait_ms: u64,

    /// Lease length; the lock auto-expires after this even if never released.
    pub hold_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lock_prefix: "lock:task:".to_string(),
            wait_ms: 0,
            hold_ms: 10_000,
        }
    }
}

impl DispatchConfig {
    pub fn with_lock_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = prefix.into();
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold_ms = hold.as_millis() as u64;
        self
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn hold_time(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    /// A zero hold would grant leases that are already expired, disabling dedup.
    pub fn validate(&self) -> Result<(), InvalidDispatchConfig> {
        if self.hold_ms == 0 {
            return Err(InvalidDispatchConfig(
                "hold_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
