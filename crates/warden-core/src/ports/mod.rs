//! Ports - 抽象化レイヤー
//!
//! 外部システム（ロックサービス、キャッシュ、時計）へのインターフェースです。
//! 実装は `impls` にあります。
//!
//! # 設計原則
//! - ロックサービスは mutual exclusion の唯一の正本（TTL の範囲で信頼する）
//! - キャッシュは dispatch の正しさに関与しない

pub mod clock;
pub mod id_generator;
pub mod lock_coordinator;
pub mod value_cache;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lock_coordinator::{CoordinatorError, LockCoordinator, ReleaseStatus};
pub use self::value_cache::{CacheError, ValueCache};
