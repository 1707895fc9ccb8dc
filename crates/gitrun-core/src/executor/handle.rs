use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::error::{GitError, GitResult};

/// Awaitable outcome of a pushed task.
///
/// Dropping the handle does not cancel the task; it still runs in chain order.
#[must_use = "the task runs regardless, but its outcome is only observable through the handle"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<GitResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<GitResult<T>>) -> Self {
        Self { rx }
    }

    /// Non-blocking check; `None` while the task is still pending.
    pub fn try_result(&mut self) -> Option<GitResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(producer_gone())),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = GitResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(producer_gone())))
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

fn producer_gone() -> GitError {
    GitError::Internal("task dropped before producing a result".into())
}
