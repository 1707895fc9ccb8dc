//! Global admission control for process invocations.
//!
//! The scheduler knows nothing about processes: it hands out at most `concurrency` [`Slot`]s at a
//! time, strictly in the order [`Scheduler::next`] was called. A slot returns to the pool when it is
//! released, either explicitly or by being dropped, and each release admits the oldest waiting
//! request.
//!
//! ## Invariants
//! - The number of live slots never exceeds the configured concurrency.
//! - Slots are granted in request order, independent of release order.
//! - A request dropped before its grant is skipped; it never holds a unit.
use std::{
    collections::VecDeque,
    future::Future,
    num::NonZeroUsize,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{GitError, GitResult};

/// Counting/queueing admission primitive shared by every chain of an executor.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

struct Shared {
    concurrency: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Waiter>,
    running: Vec<u64>,
    next_id: u64,
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<Slot>,
}

impl Scheduler {
    pub fn new(concurrency: NonZeroUsize) -> Self {
        Self {
            shared: Arc::new(Shared {
                concurrency: concurrency.get(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Queue a request for a slot.
    ///
    /// The request takes its place in the queue when this method is called, not when the returned
    /// future is first polled.
    pub fn next(&self) -> SlotRequest {
        let (grant, rx) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back(Waiter { id, grant });
            trace!(
                target: "gitrun.core.scheduler",
                slot = id,
                pending = state.pending.len(),
                running = state.running.len(),
                "slot requested"
            );
        }
        self.shared.admit();
        SlotRequest { rx }
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    /// Number of slots currently granted and not yet released.
    pub fn running(&self) -> usize {
        self.shared.lock().running.len()
    }

    /// Number of requests waiting for a grant.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(self: &Arc<Self>) {
        loop {
            let (id, grant) = {
                let mut state = self.lock();
                if state.running.len() >= self.concurrency {
                    return;
                }
                let Some(waiter) = state.pending.pop_front() else {
                    return;
                };
                if waiter.grant.is_closed() {
                    trace!(target: "gitrun.core.scheduler", slot = waiter.id, "skipping abandoned request");
                    continue;
                }
                state.running.push(waiter.id);
                (waiter.id, waiter.grant)
            };

            trace!(target: "gitrun.core.scheduler", slot = id, "slot granted");
            let slot = Slot {
                id,
                shared: Arc::clone(self),
            };
            // The receiver vanished between the check and the send; dropping the slot releases it
            // and re-enters admission with the lock already released.
            if let Err(slot) = grant.send(slot) {
                drop(slot);
            }
        }
    }

    fn release(self: &Arc<Self>, id: u64) {
        {
            let mut state = self.lock();
            state.running.retain(|running| *running != id);
            trace!(
                target: "gitrun.core.scheduler",
                slot = id,
                pending = state.pending.len(),
                running = state.running.len(),
                "slot released"
            );
        }
        self.admit();
    }
}

/// One unit of permission to have an invocation alive.
///
/// Released by [`Slot::release`] or on drop.
pub struct Slot {
    id: u64,
    shared: Arc<Shared>,
}

impl Slot {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.shared.release(self.id);
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("id", &self.id).finish()
    }
}

/// Pending slot request returned by [`Scheduler::next`].
pub struct SlotRequest {
    rx: oneshot::Receiver<Slot>,
}

impl SlotRequest {
    /// Take the slot if it has already been granted.
    pub fn try_take(&mut self) -> Option<Slot> {
        self.rx.try_recv().ok()
    }
}

impl Future for SlotRequest {
    type Output = GitResult<Slot>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| GitError::Internal("scheduler dropped a slot request".into())))
    }
}
