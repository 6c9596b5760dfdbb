use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Error type a task body may fail with. Only its message survives into the `Outcome`.
pub type BodyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result produced by a task body: the outcome message on success.
pub type BodyResult = Result<String, BodyError>;

/// Zero-argument unit of work, consumed exactly once.
pub type TaskBody = Box<dyn FnOnce() -> BoxFuture<'static, BodyResult> + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task key must not be empty")]
pub struct InvalidTaskKey;

/// Identity of a task (e.g. a recipient address). Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidTaskKey> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(InvalidTaskKey);
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskKey {
    type Error = InvalidTaskKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskKey> for String {
    fn from(key: TaskKey) -> Self {
        key.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Task key + body. Immutable once built; the dispatcher takes it by value.
pub struct Task {
    key: TaskKey,
    body: TaskBody,
}

impl Task {
    pub fn new<F, Fut>(key: TaskKey, body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BodyResult> + Send + 'static,
    {
        Self {
            key,
            body: Box::new(move || body().boxed()),
        }
    }

    /// `TaskKey::new` + `Task::new` in one step.
    pub fn try_new<F, Fut>(key: impl Into<String>, body: F) -> Result<Self, InvalidTaskKey>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BodyResult> + Send + 'static,
    {
        Ok(Self::new(TaskKey::new(key)?, body))
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn into_parts(self) -> (TaskKey, TaskBody) {
        (self.key, self.body)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty("")]
    #[case::spaces("   ")]
    #[case::newline("\n")]
    fn blank_keys_are_rejected(#[case] raw: &str) {
        assert_eq!(TaskKey::new(raw), Err(InvalidTaskKey));
    }

    #[test]
    fn key_keeps_its_text() {
        let key = TaskKey::new("a@x.com").unwrap();
        assert_eq!(key.as_str(), "a@x.com");
        assert_eq!(key.to_string(), "a@x.com");
    }

    #[test]
    fn key_deserialization_validates() {
        let ok: TaskKey = serde_json::from_str("\"b@x.com\"").unwrap();
        assert_eq!(ok.as_str(), "b@x.com");

        let err = serde_json::from_str::<TaskKey>("\"\"");
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn body_runs_once_and_yields_message() {
        let task = Task::new(TaskKey::new("c@x.com").unwrap(), || async {
            Ok("sent".to_string())
        });
        let (key, body) = task.into_parts();

        assert_eq!(key.as_str(), "c@x.com");
        assert_eq!(body().await.unwrap(), "sent");
    }
}
