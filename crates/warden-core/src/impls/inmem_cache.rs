//! InMemoryValueCache - 開発用の key/value キャッシュ
//!
//! 期限切れは読み出し時に遅延削除します（GC ループは持たない）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::ports::{CacheError, Clock, SystemClock, ValueCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
}

pub struct InMemoryValueCache<C = SystemClock> {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: C,
}

impl InMemoryValueCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryValueCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryValueCache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().filter(|e| is_live(e, now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_live(entry: &CacheEntry, now: DateTime<Utc>) -> bool {
    entry.expires_at.is_none_or(|at| at > now)
}

#[async_trait]
impl<C: Clock> ValueCache for InMemoryValueCache<C> {
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = self.clock.now();
        let expires_at = ttl.map(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if is_live(entry, now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(key).is_some_and(|e| is_live(&e, now)))
    }
}
