use std::sync::{Arc, Mutex, PoisonError};

use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, error};

use super::{
    ExecutorInner, TaskHandle,
    invocation::{self, Settled},
};
use crate::{
    error::{GitError, GitResult},
    events::{EventBus, EventKind, ExecEvent, InvocationId},
    task::Task,
};

/// Settlement of one chain link: `Err` carries an internal fault every queued task inherits.
type Link = oneshot::Receiver<Result<(), GitError>>;

/// Strictly ordered sequence of tasks for one logical caller.
///
/// Task N+1 does not request a slot until task N settled. Chains of the same executor share its
/// scheduler and plugins and nothing else. Clones push onto the same sequence.
#[derive(Clone)]
pub struct ExecutorChain {
    executor: Arc<ExecutorInner>,
    tail: Arc<Mutex<Option<Link>>>,
}

impl ExecutorChain {
    pub(crate) fn new(executor: Arc<ExecutorInner>) -> Self {
        Self {
            executor,
            tail: Arc::default(),
        }
    }

    /// Queue `task` behind every task already pushed on this chain.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn push<T>(&self, task: Task<T>) -> TaskHandle<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(task, move |result| {
            let _ = tx.send(result);
        });
        TaskHandle::new(rx)
    }

    /// Like [`ExecutorChain::push`], delivering the outcome to `callback` instead of a handle.
    pub fn push_with<T, F>(&self, task: Task<T>, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(GitResult<T>) + Send + 'static,
    {
        self.enqueue(task, callback);
    }

    fn enqueue<T, F>(&self, task: Task<T>, deliver: F)
    where
        T: Send + 'static,
        F: FnOnce(GitResult<T>) + Send + 'static,
    {
        let id = InvocationId::new();
        let pushed = Instant::now();
        let (settle, link) = oneshot::channel();
        let previous = self
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(link);
        debug!(target: "gitrun.core.chain", invocation = %id, method = task.method(), queued = previous.is_some(), "task pushed");

        let executor = Arc::clone(&self.executor);
        let tail = Arc::clone(&self.tail);
        tokio::spawn(async move {
            let method = task.method().to_owned();
            let events = executor.events.clone();

            if let Some(previous) = previous
                && let Ok(Err(fault)) = previous.await
            {
                debug!(target: "gitrun.core.chain", invocation = %id, %method, "inherited fault of a previous task");
                publish_failed(&events, id, &method, &fault, pushed);
                let _ = settle.send(Err(fault.clone()));
                deliver(Err(fault));
                return;
            }

            let settled = match tokio::spawn(invocation::run(executor, id, task, pushed)).await {
                Ok(settled) => settled,
                Err(join) => {
                    let fault = GitError::Internal(format!("invocation of `{method}` panicked: {join}"));
                    publish_failed(&events, id, &method, &fault, pushed);
                    Settled::Fault(fault)
                }
            };

            let result = match settled {
                Settled::Done(result) => {
                    let _ = settle.send(Ok(()));
                    result
                }
                Settled::Fault(fault) => {
                    error!(target: "gitrun.core.chain", invocation = %id, %method, error = %fault, "internal fault, resetting chain");
                    tail.lock().unwrap_or_else(PoisonError::into_inner).take();
                    let _ = settle.send(Err(fault.clone()));
                    Err(fault)
                }
            };
            deliver(result);
        });
    }
}

fn publish_failed(events: &EventBus, id: InvocationId, method: &str, fault: &GitError, pushed: Instant) {
    events.publish(
        ExecEvent::new(EventKind::Failed, id, method)
            .with_outcome(fault.outcome())
            .with_reason(fault.to_string())
            .with_elapsed(pushed.elapsed()),
    );
}

impl std::fmt::Debug for ExecutorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorChain").finish_non_exhaustive()
    }
}
