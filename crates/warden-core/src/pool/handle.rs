//! JobHandle: the caller's only view of a submitted job.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::PoolError;

/// Resolves when the job finishes on its worker.
///
/// Dropping the handle does not cancel the job.
#[must_use = "a JobHandle does nothing unless awaited"]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T, String>>,
}

impl<T> JobHandle<T> {
    pub(super) fn new(rx: oneshot::Receiver<Result<T, String>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(panic))) => Poll::Ready(Err(PoolError::WorkerLost(panic))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(PoolError::WorkerLost(
                "job dropped before completion".to_string(),
            ))),
        }
    }
}
