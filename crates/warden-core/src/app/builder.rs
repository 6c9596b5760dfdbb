//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 設計原則
//! - 起動時検証（Fail-fast）：コーディネータ未設定、Pool / Dispatch 設定の誤りは build() で弾く
//! - ワイヤリングは一箇所に集める（Dispatcher / WorkerPool を呼び出し側で組み立てない）

use std::future::Future;
use std::sync::Arc;

use crate::config::WardenConfig;
use crate::dispatch::{DispatchConfig, Dispatcher, InvalidDispatchConfig};
use crate::domain::{BodyResult, DispatchBatch, InvalidTaskKey, Task, TaskKey};
use crate::pool::{PoolConfig, PoolError, PoolStatus, WorkerPool};
use crate::ports::{IdGenerator, LockCoordinator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .coordinator(Arc::new(InMemoryLockCoordinator::new()))
///     .pool_config(PoolConfig::default())
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    coordinator: Option<Arc<dyn LockCoordinator>>,
    pool_config: PoolConfig,
    dispatch_config: DispatchConfig,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no lock coordinator configured; call AppBuilder::coordinator() before build()")]
    MissingCoordinator,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Dispatch(#[from] InvalidDispatchConfig),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool and dispatch sections of a loaded config. The coordinator is wired separately.
    pub fn from_config(config: &WardenConfig) -> Self {
        Self::new()
            .pool_config(config.pool.clone())
            .dispatch_config(config.dispatch.clone())
    }

    pub fn coordinator(mut self, coordinator: Arc<dyn LockCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch_config = config;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate and start the worker pool. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<App, BuildError> {
        let coordinator = self.coordinator.ok_or(BuildError::MissingCoordinator)?;
        self.dispatch_config.validate()?;
        let pool = Arc::new(WorkerPool::start(self.pool_config)?);

        let mut dispatcher = Dispatcher::new(coordinator, Arc::clone(&pool), self.dispatch_config);
        if let Some(ids) = self.ids {
            dispatcher = dispatcher.with_id_generator(ids);
        }

        Ok(App { dispatcher, pool })
    }
}

/// App は submission interface
///
/// keys の列を受け取り、位置が揃った outcome メッセージの列を返します。
pub struct App {
    dispatcher: Dispatcher,
    pool: Arc<WorkerPool>,
}

impl App {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Build one task per key with `body_factory` and dispatch them all.
    ///
    /// Every key is validated before anything is dispatched; one blank key
    /// rejects the whole submission.
    pub async fn submit_batch<F, Fut>(
        &self,
        keys: Vec<String>,
        body_factory: F,
    ) -> Result<DispatchBatch, InvalidTaskKey>
    where
        F: Fn(&TaskKey) -> Fut,
        Fut: Future<Output = BodyResult> + Send + 'static,
    {
        let keys = keys
            .into_iter()
            .map(TaskKey::new)
            .collect::<Result<Vec<_>, _>>()?;

        let tasks = keys
            .into_iter()
            .map(|key| {
                let body = body_factory(&key);
                Task::new(key, move || body)
            })
            .collect();

        Ok(self.dispatcher.dispatch_all(tasks).await)
    }

    /// Like `submit_batch`, returning the ordered human-readable messages.
    pub async fn submit<F, Fut>(
        &self,
        keys: Vec<String>,
        body_factory: F,
    ) -> Result<Vec<String>, InvalidTaskKey>
    where
        F: Fn(&TaskKey) -> Fut,
        Fut: Future<Output = BodyResult> + Send + 'static,
    {
        Ok(self.submit_batch(keys, body_factory).await?.messages())
    }

    /// Stop accepting work and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown_and_join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryLockCoordinator;
    use rstest::rstest;
    use std::time::Duration;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_build_success() {
        let app = AppBuilder::new()
            .coordinator(Arc::new(InMemoryLockCoordinator::new()))
            .build();
        assert!(app.is_ok());
    }

    #[tokio::test]
    async fn test_build_missing_coordinator() {
        let app = AppBuilder::new().build();
        assert!(matches!(app, Err(BuildError::MissingCoordinator)));
    }

    #[tokio::test]
    async fn test_build_invalid_pool_config() {
        let app = AppBuilder::new()
            .coordinator(Arc::new(InMemoryLockCoordinator::new()))
            .pool_config(PoolConfig::new(0, 0, 0))
            .build();
        assert!(matches!(app, Err(BuildError::Pool(PoolError::InvalidConfig(_)))));
    }

    #[rstest]
    #[case::zero_hold(DispatchConfig::default().with_hold(Duration::ZERO))]
    #[case::zero_hold_ms(DispatchConfig { hold_ms: 0, ..DispatchConfig::default() })]
    #[tokio::test]
    async fn test_build_invalid_dispatch_config(#[case] config: DispatchConfig) {
        let app = AppBuilder::new()
            .coordinator(Arc::new(InMemoryLockCoordinator::new()))
            .dispatch_config(config)
            .build();
        assert!(matches!(app, Err(BuildError::Dispatch(_))));
    }

    #[tokio::test]
    async fn from_config_carries_pool_and_dispatch_sections() {
        let mut config = WardenConfig::default();
        config.pool.name_prefix = "EmailAsync-".to_string();
        config.dispatch.lock_prefix = "lock:email:".to_string();

        let app = AppBuilder::from_config(&config)
            .coordinator(Arc::new(InMemoryLockCoordinator::new()))
            .build()
            .unwrap();

        assert_eq!(app.dispatcher().pool().config().name_prefix, "EmailAsync-");
        assert_eq!(app.dispatcher().config().lock_prefix, "lock:email:");
    }

    #[tokio::test]
    async fn submit_returns_one_message_per_key_in_order() {
        let app = AppBuilder::new()
            .coordinator(Arc::new(InMemoryLockCoordinator::new()))
            .build()
            .unwrap();

        let messages = app
            .submit(keys(&["a@x.com", "b@x.com", "c@x.com"]), |key| {
                let key = key.clone();
                async move { Ok(format!("email sent: {key}")) }
            })
            .await
            .unwrap();

        assert_eq!(
            messages,
            vec![
                "completed: email sent: a@x.com",
                "completed: email sent: b@x.com",
                "completed: email sent: c@x.com",
            ]
        );
        app.shutdown().await;
        assert!(app.pool_status().shut_down);
    }

    #[tokio::test]
    async fn blank_key_rejects_the_whole_submission() {
        let app = AppBuilder::new()
            .coordinator(Arc::new(InMemoryLockCoordinator::new()))
            .build()
            .unwrap();

        let result = app
            .submit(keys(&["a@x.com", "  "]), |_| async { Ok("sent".to_string()) })
            .await;

        assert_eq!(result, Err(InvalidTaskKey));
        assert_eq!(app.pool_status().completed, 0);
    }
}
