//! Invocation lifecycle events and their fan-out to subscribers.
//!
//! Every subscriber gets its own bounded queue and worker task, so a slow subscriber only ever
//! loses its own events and never stalls an invocation.
use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use gitrun_model::InvocationOutcome;
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::error::{GitError, GitResult};

/// Identifier of one pushed task, shared by every event it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationId(Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The task asked the scheduler for a slot.
    SlotRequested,
    SlotGranted,
    /// The process is alive.
    Spawned,
    /// A termination notification arrived with no output buffered; the grace timer is armed.
    CompletionDeferred,
    /// A plugin killed the process.
    Killed,
    /// The task resolved successfully.
    Completed,
    /// The task resolved with an error.
    Failed,
    /// A subscriber queue was full and an event was dropped for it.
    SubscriberOverflow,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SlotRequested => "slot_requested",
            EventKind::SlotGranted => "slot_granted",
            EventKind::Spawned => "spawned",
            EventKind::CompletionDeferred => "completion_deferred",
            EventKind::Killed => "killed",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::SubscriberOverflow => "subscriber_overflow",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecEvent {
    pub kind: EventKind,
    pub invocation: InvocationId,
    pub method: String,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub outcome: Option<InvocationOutcome>,
    pub reason: Option<String>,
    /// Time since the task was pushed.
    pub elapsed: Option<Duration>,
    pub at: SystemTime,
}

impl ExecEvent {
    pub fn new(kind: EventKind, invocation: InvocationId, method: impl Into<String>) -> Self {
        Self {
            kind,
            invocation,
            method: method.into(),
            pid: None,
            exit_code: None,
            outcome: None,
            reason: None,
            elapsed: None,
            at: SystemTime::now(),
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_outcome(mut self, outcome: InvocationOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

/// Consumer of executor events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &ExecEvent);

    fn name(&self) -> &'static str;

    /// Capacity of the queue feeding this subscriber; events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

struct SubscriberQueue {
    name: &'static str,
    tx: mpsc::Sender<Arc<ExecEvent>>,
}

/// Fan-out of events to subscribers. Cheap to clone; publishing never blocks.
#[derive(Clone, Default)]
pub struct EventBus {
    queues: Arc<Vec<SubscriberQueue>>,
}

impl EventBus {
    /// Start one worker per subscriber. Needs a Tokio runtime unless `subscribers` is empty.
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> GitResult<Self> {
        if subscribers.is_empty() {
            return Ok(Self::default());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            GitError::Config("event subscribers require a running Tokio runtime".into())
        })?;

        let mut queues = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let (tx, mut rx) = mpsc::channel::<Arc<ExecEvent>>(subscriber.queue_capacity().max(1));
            let name = subscriber.name();
            runtime.spawn(async move {
                while let Some(event) = rx.recv().await {
                    subscriber.on_event(&event).await;
                }
                trace!(target: "gitrun.core.events", subscriber = name, "subscriber worker stopped");
            });
            queues.push(SubscriberQueue { name, tx });
        }
        Ok(Self {
            queues: Arc::new(queues),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn publish(&self, event: ExecEvent) {
        if self.queues.is_empty() {
            return;
        }
        let event = Arc::new(event);
        let mut overflowed = Vec::new();
        for queue in self.queues.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = queue.tx.try_send(Arc::clone(&event)) {
                warn!(
                    target: "gitrun.core.events",
                    subscriber = queue.name,
                    kind = event.kind.as_str(),
                    "subscriber queue full, dropping event"
                );
                overflowed.push(queue.name);
            }
        }

        for name in overflowed {
            let notice = Arc::new(
                ExecEvent::new(EventKind::SubscriberOverflow, event.invocation, event.method.clone())
                    .with_reason(name),
            );
            for queue in self.queues.iter().filter(|q| q.name != name) {
                let _ = queue.tx.try_send(Arc::clone(&notice));
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.queues.iter().map(|q| q.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    struct Stalled;

    #[async_trait]
    impl Subscribe for Stalled {
        async fn on_event(&self, _event: &ExecEvent) {
            std::future::pending::<()>().await;
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    fn event(kind: EventKind) -> ExecEvent {
        ExecEvent::new(kind, InvocationId::new(), "status")
    }

    #[test]
    fn bus_without_subscribers_needs_no_runtime() {
        let bus = EventBus::new(Vec::new()).unwrap();
        assert!(bus.is_empty());
        bus.publish(event(EventKind::Spawned));
    }

    #[test]
    fn subscribers_outside_a_runtime_are_rejected() {
        let err = EventBus::new(vec![Recorder::new() as Arc<dyn Subscribe>]).unwrap_err();
        assert!(matches!(err, GitError::Config(_)));
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let recorder = Recorder::new();
        let bus = EventBus::new(vec![recorder.clone() as Arc<dyn Subscribe>]).unwrap();

        bus.publish(event(EventKind::SlotRequested));
        bus.publish(event(EventKind::SlotGranted));
        bus.publish(event(EventKind::Completed));

        recorder.wait_for(3).await;
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::SlotRequested, EventKind::SlotGranted, EventKind::Completed]
        );
    }

    #[tokio::test]
    async fn overflow_drops_for_the_slow_subscriber_only() {
        let recorder = Recorder::new();
        let bus = EventBus::new(vec![
            Arc::new(Stalled) as Arc<dyn Subscribe>,
            recorder.clone(),
        ]).unwrap();

        bus.publish(event(EventKind::SlotRequested));
        bus.publish(event(EventKind::SlotGranted));
        bus.publish(event(EventKind::Spawned));

        recorder.wait_for(5).await;
        let kinds = recorder.kinds();
        assert_eq!(
            &kinds[..3],
            &[EventKind::SlotRequested, EventKind::SlotGranted, EventKind::SubscriberOverflow]
        );
        assert!(kinds.contains(&EventKind::Spawned));
    }
}
