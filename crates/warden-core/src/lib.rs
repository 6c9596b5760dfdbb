//! warden-core
//!
//! Lock-guarded, deduplicating task dispatch on tokio.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, lease, outcome, batch, errors）
//! - **ports**: 抽象化レイヤー（LockCoordinator, ValueCache, Clock, IdGenerator）
//! - **impls**: 実装（InMemory 系は開発・テスト用、Redis 系は `redis` feature）
//! - **pool**: 有界 Worker Pool
//! - **dispatch**: Dispatcher（1 タスク）と Result Aggregator（バッチ）
//! - **app**: AppBuilder / App（submission interface）
//! - **config**: 設定の読み込み（defaults → TOML → env）

pub mod app;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod impls;
pub mod pool;
pub mod ports;

pub use app::{App, AppBuilder, BuildError};
pub use config::{ConfigError, CoordinatorBackend, CoordinatorConfig, WardenConfig};
pub use dispatch::{DispatchConfig, Dispatcher, InvalidDispatchConfig};
pub use domain::{DispatchBatch, InvalidTaskKey, Outcome, OutcomeKind, Task, TaskKey};
pub use pool::{PoolConfig, PoolError, PoolStatus, WorkerPool};
