//! Outcome model: the result of one dispatch attempt.
//!
//! Exactly one `Outcome` is produced per submitted task. Control flow never
//! leaves the dispatcher as an error; every branch ends up here.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DispatchError;

/// Coarse classification, serialized as COMPLETED / SKIPPED / FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Completed,
    Skipped,
    Failed,
}

/// Why a task ended in `Failed`. Lets callers tell overload from logic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CoordinatorUnreachable,
    TaskBody,
    PoolSaturated,
    PoolShutdown,
    /// The body panicked on its worker.
    WorkerLost,
    /// The dispatch task died before reporting; whether the body ran is unknown.
    DispatchLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The body ran and returned this message.
    Completed { message: String },

    /// The lock was held elsewhere; the body did not run.
    Skipped { reason: String },

    Failed { failure: FailureKind, message: String },
}

impl Outcome {
    pub fn completed(message: impl Into<String>) -> Self {
        Outcome::Completed {
            message: message.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(failure: FailureKind, message: impl Into<String>) -> Self {
        Outcome::Failed {
            failure,
            message: message.into(),
        }
    }

    /// Fold a per-task error into its slot. Lock contention is not a failure.
    pub fn from_error(err: &DispatchError) -> Self {
        let failure = match err {
            DispatchError::LockUnavailable { .. } => return Outcome::skipped(err.to_string()),
            DispatchError::CoordinatorUnreachable(_) => FailureKind::CoordinatorUnreachable,
            DispatchError::TaskBody(_) => FailureKind::TaskBody,
            DispatchError::PoolSaturated(_) => FailureKind::PoolSaturated,
            DispatchError::PoolShutdown => FailureKind::PoolShutdown,
            DispatchError::WorkerLost(_) => FailureKind::WorkerLost,
            DispatchError::DispatchLost(_) => FailureKind::DispatchLost,
        };
        Outcome::failed(failure, err.to_string())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Completed { .. } => OutcomeKind::Completed,
            Outcome::Skipped { .. } => OutcomeKind::Skipped,
            Outcome::Failed { .. } => OutcomeKind::Failed,
        }
    }

    /// True when the task body is known to have started (it completed, or failed while running).
    /// `DispatchLost` is excluded: the dispatch may have died before submitting the body.
    pub fn ran_body(&self) -> bool {
        matches!(
            self,
            Outcome::Completed { .. }
                | Outcome::Failed {
                    failure: FailureKind::TaskBody | FailureKind::WorkerLost,
                    ..
                }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Outcome::Failed { failure, .. } => Some(*failure),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed { message } => write!(f, "completed: {message}"),
            Outcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            Outcome::Failed { message, .. } => write!(f, "failed: {message}"),
        }
    }
}
