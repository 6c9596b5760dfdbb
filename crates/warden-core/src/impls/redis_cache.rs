//! Redis value cache: JSON strings under plain keys, optional `PX` expiry.

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use std::time::Duration;

use crate::ports::{CacheError, ValueCache};

#[derive(Clone)]
pub struct RedisValueCache {
    conn: MultiplexedConnection,
}

impl RedisValueCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url).map_err(|e| map_redis_error(e, url))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error(e, url))?;
        Ok(Self { conn })
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn map_redis_error(err: ::redis::RedisError, key: &str) -> CacheError {
    CacheError::Unreachable(format!("Redis error for {key}: {err}"))
}

#[async_trait]
impl ValueCache for RedisValueCache {
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let data = value.to_string();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(data);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg((ttl.as_millis() as u64).max(1));
        }
        let _: () = cmd
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let raw: Option<String> = self
            .conn
            .clone()
            .get(key)
            .await
            .map_err(|e| map_redis_error(e, key))?;

        raw.map(|s| {
            serde_json::from_str(&s).map_err(|source| CacheError::Corrupted {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed: i64 = self
            .conn
            .clone()
            .del(key)
            .await
            .map_err(|e| map_redis_error(e, key))?;
        Ok(removed > 0)
    }
}
