//! ValueCache port - 単純な key/value キャッシュ
//!
//! dispatch の正しさには関与しない周辺機能です。値は JSON で保持し、
//! TTL を指定した場合はその時間だけキャッシュされます。

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unreachable: {0}")]
    Unreachable(String),

    #[error("cached value for {key} is not valid JSON: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait ValueCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    /// `ttl = None` keeps it until deleted.
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}
