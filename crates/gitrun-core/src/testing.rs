//! Scripted process layer and harnesses for unit tests.
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{GitError, GitResult},
    events::{EventKind, ExecEvent, Subscribe},
    plugin::{Killer, OutputObservers, SpawnContext},
    process::{OutputStream, ProcessControl, ProcessEvent, SpawnRequest, SpawnedProcess, Spawner},
};

/// Exit code reported by killed fake processes.
pub(crate) const KILLED_EXIT_CODE: i32 = 137;

struct Reply {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
}

/// In-memory [`Spawner`].
///
/// Spawns consume queued replies in order; once none are queued, each spawn yields a
/// [`FakeProcess`] through [`FakeSpawner::next_process`] for the test to drive by hand.
#[derive(Clone)]
pub(crate) struct FakeSpawner {
    shared: Arc<Shared>,
}

struct Shared {
    requests: Mutex<Vec<SpawnRequest>>,
    replies: Mutex<VecDeque<Reply>>,
    fail_next: AtomicBool,
    next_pid: AtomicU32,
    manual_tx: mpsc::UnboundedSender<FakeProcess>,
    manual_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FakeProcess>>,
}

impl FakeSpawner {
    pub(crate) fn new() -> Self {
        let (manual_tx, manual_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                requests: Mutex::new(Vec::new()),
                replies: Mutex::new(VecDeque::new()),
                fail_next: AtomicBool::new(false),
                next_pid: AtomicU32::new(1000),
                manual_tx,
                manual_rx: tokio::sync::Mutex::new(manual_rx),
            }),
        }
    }

    /// Queue a process that writes `stdout`/`stderr` and exits with `exit_code`.
    pub(crate) fn reply(&self, stdout: &[u8], stderr: &[u8], exit_code: i32) -> &Self {
        self.shared.replies.lock().unwrap().push_back(Reply {
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            exit_code,
        });
        self
    }

    pub(crate) fn ok(&self, stdout: &str) -> &Self {
        self.reply(stdout.as_bytes(), b"", 0)
    }

    pub(crate) fn fail_next_spawn(&self) {
        self.shared.fail_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn spawned(&self) -> usize {
        self.shared.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<SpawnRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// Next hand-driven process, waiting up to a second for it to be spawned.
    pub(crate) async fn next_process(&self) -> FakeProcess {
        let mut rx = self.shared.manual_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no process spawned in time")
            .expect("spawner dropped")
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, request: SpawnRequest) -> GitResult<SpawnedProcess> {
        if self.shared.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GitError::Spawn(format!("cannot run {}", request.program)));
        }
        self.shared.requests.lock().unwrap().push(request.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(FakeControl {
            pid: self.shared.next_pid.fetch_add(1, Ordering::SeqCst),
            kills: AtomicUsize::new(0),
            events: tx.downgrade(),
        });

        let reply = self.shared.replies.lock().unwrap().pop_front();
        match reply {
            Some(reply) => {
                if !reply.stdout.is_empty() {
                    let _ = tx.send(ProcessEvent::Output(OutputStream::Stdout, reply.stdout));
                }
                if !reply.stderr.is_empty() {
                    let _ = tx.send(ProcessEvent::Output(OutputStream::Stderr, reply.stderr));
                }
                let _ = tx.send(ProcessEvent::Exit(reply.exit_code));
                let _ = tx.send(ProcessEvent::Close(reply.exit_code));
            }
            None => {
                let _ = self.shared.manual_tx.send(FakeProcess {
                    request,
                    events: tx,
                    control: Arc::clone(&control),
                });
            }
        }

        Ok(SpawnedProcess {
            events: rx,
            control,
        })
    }
}

/// Kill switch of a fake process; a kill makes the process terminate like a signalled one.
pub(crate) struct FakeControl {
    pid: u32,
    kills: AtomicUsize,
    events: mpsc::WeakUnboundedSender<ProcessEvent>,
}

impl FakeControl {
    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessControl for FakeControl {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn kill(&self) {
        if self.kills.fetch_add(1, Ordering::SeqCst) > 0 {
            return;
        }
        if let Some(tx) = self.events.upgrade() {
            let _ = tx.send(ProcessEvent::Exit(KILLED_EXIT_CODE));
            let _ = tx.send(ProcessEvent::Close(KILLED_EXIT_CODE));
        }
    }
}

/// Hand-driven fake process. Dropping it without a termination notification closes the event
/// stream.
pub(crate) struct FakeProcess {
    pub(crate) request: SpawnRequest,
    pub(crate) control: Arc<FakeControl>,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl FakeProcess {
    pub(crate) fn stdout(&self, chunk: &[u8]) {
        let _ = self
            .events
            .send(ProcessEvent::Output(OutputStream::Stdout, chunk.to_vec()));
    }

    pub(crate) fn stderr(&self, chunk: &[u8]) {
        let _ = self
            .events
            .send(ProcessEvent::Output(OutputStream::Stderr, chunk.to_vec()));
    }

    pub(crate) fn exit(&self, code: i32) {
        let _ = self.events.send(ProcessEvent::Exit(code));
    }

    pub(crate) fn close(&self, code: i32) {
        let _ = self.events.send(ProcessEvent::Close(code));
    }

    /// Exit then close, the usual order of a real process.
    pub(crate) fn finish(self, code: i32) {
        self.exit(code);
        self.close(code);
    }
}

/// [`ProcessControl`] that only counts kills.
#[derive(Default)]
pub(crate) struct CountingControl {
    kills: AtomicUsize,
}

impl CountingControl {
    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessControl for CountingControl {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}

/// A `spawn.after` context over a [`CountingControl`], with handles to drive it.
pub(crate) struct Harness {
    pub(crate) ctx: SpawnContext,
    pub(crate) control: Arc<CountingControl>,
    pub(crate) observers: OutputObservers,
    pub(crate) settled: CancellationToken,
}

pub(crate) fn spawn_context(method: &str) -> Harness {
    let control = Arc::new(CountingControl::default());
    let settled = CancellationToken::new();
    let observers = OutputObservers::default();
    let killer = Killer::new(control.clone(), settled.clone());
    let ctx = SpawnContext::new(
        method.to_owned(),
        vec![method.to_owned()],
        killer,
        observers.clone(),
        settled.clone(),
    );
    Harness {
        ctx,
        control,
        observers,
        settled,
    }
}

/// Subscriber that keeps every event it receives.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<ExecEvent>>,
}

impl Recorder {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<ExecEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Yield until at least `count` events arrived.
    pub(crate) async fn wait_for(&self, count: usize) {
        for _ in 0..10_000 {
            if self.events.lock().unwrap().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} events, got {:?}", self.kinds());
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &ExecEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}
