//! Pool sizing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::PoolError;

/// Worker pool sizing, thread-pool-executor style.
///
/// Admission order for a new job:
/// 1. fewer than `core_size` workers -> start a worker for it
/// 2. backlog shorter than `queue_capacity` -> enqueue
/// 3. fewer than `max_size` workers -> start a burst worker
/// 4. otherwise reject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Steady-state worker count.
    pub core_size: usize,

    /// Burst ceiling.
    pub max_size: usize,

    /// Pending jobs allowed before burst workers / rejection kick in.
    pub queue_capacity: usize,

    /// Diagnostic label; workers are named `{name_prefix}{n}`.
    pub name_prefix: String,

    /// How long a burst worker (above `core_size`) may sit idle before exiting.
    pub keep_alive_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: 5,
            max_size: 10,
            queue_capacity: 25,
            name_prefix: "warden-worker-".to_string(),
            keep_alive_ms: 60_000,
        }
    }
}

impl PoolConfig {
    pub fn new(core_size: usize, max_size: usize, queue_capacity: usize) -> Self {
        Self {
            core_size,
            max_size,
            queue_capacity,
            ..Self::default()
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = keep_alive.as_millis() as u64;
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.core_size == 0 {
            return Err(PoolError::InvalidConfig(
                "core_size must be at least 1".to_string(),
            ));
        }
        if self.max_size < self.core_size {
            return Err(PoolError::InvalidConfig(format!(
                "max_size ({}) must not be below core_size ({})",
                self.max_size, self.core_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_the_email_executor() {
        let config = PoolConfig::default();
        assert_eq!(config.core_size, 5);
        assert_eq!(config.max_size, 10);
        assert_eq!(config.queue_capacity, 25);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::no_core(PoolConfig::new(0, 4, 10))]
    #[case::max_below_core(PoolConfig::new(4, 2, 10))]
    fn invalid_sizes_are_rejected(#[case] config: PoolConfig) {
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn zero_capacity_is_allowed() {
        assert!(PoolConfig::new(1, 1, 0).validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: PoolConfig = toml::from_str("core_size = 2\nmax_size = 3").unwrap();
        assert_eq!(config.core_size, 2);
        assert_eq!(config.queue_capacity, 25);
        assert_eq!(config.name_prefix, "warden-worker-");
    }
}
