//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryLockCoordinator**: 単一プロセス用（開発・テスト）
//! - **InMemoryValueCache**: 開発用キャッシュ
//! - **RedisLockCoordinator** / **RedisValueCache**: 本番用（`redis` feature）

pub mod inmem_cache;
pub mod inmem_lock;
#[cfg(feature = "redis")]
pub mod redis_cache;
#[cfg(feature = "redis")]
pub mod redis_lock;

pub use self::inmem_cache::InMemoryValueCache;
pub use self::inmem_lock::InMemoryLockCoordinator;
#[cfg(feature = "redis")]
pub use self::redis_cache::RedisValueCache;
#[cfg(feature = "redis")]
pub use self::redis_lock::RedisLockCoordinator;
