//! Configuration - defaults → TOML → 環境変数 の順に重ねる
//!
//! 時間はすべてミリ秒で表現します（ファイルでも環境変数でも同じ）。
//!
//! | env | field |
//! |-----|-------|
//! | `WARDEN_POOL_CORE_SIZE` | `pool.core_size` |
//! | `WARDEN_POOL_MAX_SIZE` | `pool.max_size` |
//! | `WARDEN_POOL_QUEUE_CAPACITY` | `pool.queue_capacity` |
//! | `WARDEN_POOL_NAME_PREFIX` | `pool.name_prefix` |
//! | `WARDEN_LOCK_PREFIX` | `dispatch.lock_prefix` |
//! | `WARDEN_LOCK_WAIT_MS` | `dispatch.wait_ms` |
//! | `WARDEN_LOCK_HOLD_MS` | `dispatch.hold_ms` |
//! | `WARDEN_COORDINATOR` | `coordinator.backend` (`memory` / `redis`) |
//! | `WARDEN_REDIS_URL` | `coordinator.redis_url` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::dispatch::DispatchConfig;
use crate::pool::PoolConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: impl Into<String>, reason: impl fmt::Display) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorBackend {
    /// Single-process only.
    #[default]
    Memory,
    Redis,
}

impl FromStr for CoordinatorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CoordinatorBackend::Memory),
            "redis" => Ok(CoordinatorBackend::Redis),
            other => Err(format!("unknown backend '{other}', expected memory or redis")),
        }
    }
}

impl fmt::Display for CoordinatorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorBackend::Memory => f.write_str("memory"),
            CoordinatorBackend::Redis => f.write_str("redis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub backend: CoordinatorBackend,
    pub redis_url: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            backend: CoordinatorBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Everything needed to wire an `App`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub pool: PoolConfig,
    pub dispatch: DispatchConfig,
    pub coordinator: CoordinatorConfig,
}

impl WardenConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::invalid("config", "<toml>", e))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::invalid("config_file", path.display().to_string(), format!("failed to read file: {e}"))
        })?;
        toml::from_str(&contents).map_err(|e| {
            ConfigError::invalid("config_file", path.display().to_string(), format!("failed to parse TOML: {e}"))
        })
    }

    /// Defaults, then `path` if given, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading configuration file");
                Self::from_toml_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `WARDEN_*` overrides read through `lookup`. Unset keys keep their value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        macro_rules! apply_override {
            ($($field:ident).+, $env:literal) => {
                if let Some(raw) = lookup($env) {
                    self.$($field).+ = parse_env($env, &raw)?;
                }
            };
        }

        apply_override!(pool.core_size, "WARDEN_POOL_CORE_SIZE");
        apply_override!(pool.max_size, "WARDEN_POOL_MAX_SIZE");
        apply_override!(pool.queue_capacity, "WARDEN_POOL_QUEUE_CAPACITY");
        apply_override!(pool.name_prefix, "WARDEN_POOL_NAME_PREFIX");
        apply_override!(dispatch.lock_prefix, "WARDEN_LOCK_PREFIX");
        apply_override!(dispatch.wait_ms, "WARDEN_LOCK_WAIT_MS");
        apply_override!(dispatch.hold_ms, "WARDEN_LOCK_HOLD_MS");
        apply_override!(coordinator.backend, "WARDEN_COORDINATOR");
        apply_override!(coordinator.redis_url, "WARDEN_REDIS_URL");

        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, raw, e))
}
