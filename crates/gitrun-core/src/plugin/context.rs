use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::GitError,
    process::{OutputStream, ProcessControl},
};

/// Context of a `spawn.args` handler.
#[derive(Debug, Clone, Copy)]
pub struct ArgsContext<'a> {
    pub method: &'a str,
    /// Arguments as the task declared them, before any handler rewrote them.
    pub argv: &'a [String],
}

/// Context of a `task.error` handler: the finished invocation's buffered output.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub method: &'a str,
    pub argv: &'a [String],
    pub stdout: &'a [u8],
    pub stderr: &'a [u8],
    pub exit_code: i32,
}

/// Context of a `spawn.after` handler, valid for the lifetime of one live process.
pub struct SpawnContext {
    method: String,
    argv: Vec<String>,
    killer: Killer,
    observers: OutputObservers,
    settled: CancellationToken,
}

impl SpawnContext {
    pub(crate) fn new(
        method: String,
        argv: Vec<String>,
        killer: Killer,
        observers: OutputObservers,
        settled: CancellationToken,
    ) -> Self {
        Self {
            method,
            argv,
            killer,
            observers,
            settled,
        }
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Arguments the process was spawned with.
    #[inline]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn pid(&self) -> Option<u32> {
        self.killer.control.id()
    }

    /// Kill the process and fail the invocation with `reason`.
    pub fn kill(&self, reason: GitError) {
        self.killer.kill(reason);
    }

    /// Detached kill switch for timers and watchers that outlive the handler call.
    pub fn killer(&self) -> Killer {
        self.killer.clone()
    }

    /// Observe every stdout/stderr chunk from now on.
    pub fn on_output<F>(&self, observer: F)
    where
        F: Fn(OutputStream, &[u8]) + Send + Sync + 'static,
    {
        self.observers.register(observer);
    }

    /// Cancelled once the invocation completed; background work tied to this process should stop.
    pub fn settled(&self) -> CancellationToken {
        self.settled.clone()
    }
}

impl std::fmt::Debug for SpawnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnContext")
            .field("method", &self.method)
            .field("argv", &self.argv)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

/// Kills one live process and records why.
///
/// The first reason wins, except that an abort overrides any earlier non-abort reason. Killing
/// after the invocation completed is ignored.
#[derive(Clone)]
pub struct Killer {
    control: Arc<dyn ProcessControl>,
    rejection: Arc<Mutex<Option<GitError>>>,
    settled: CancellationToken,
}

impl Killer {
    pub(crate) fn new(control: Arc<dyn ProcessControl>, settled: CancellationToken) -> Self {
        Self {
            control,
            rejection: Arc::new(Mutex::new(None)),
            settled,
        }
    }

    pub fn kill(&self, reason: GitError) {
        if self.settled.is_cancelled() {
            return;
        }
        {
            let mut rejection = self.rejection.lock().unwrap_or_else(PoisonError::into_inner);
            match rejection.as_ref() {
                Some(current) if current.is_abort() || !reason.is_abort() => {}
                _ => {
                    debug!(target: "gitrun.core.plugin", pid = ?self.control.id(), %reason, "killing process");
                    *rejection = Some(reason);
                }
            }
        }
        self.control.kill();
    }

    pub fn is_killed(&self) -> bool {
        self.rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn take_rejection(&self) -> Option<GitError> {
        self.rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

type Observer = dyn Fn(OutputStream, &[u8]) + Send + Sync;

/// Output observers registered by `spawn.after` handlers of one invocation.
#[derive(Clone, Default)]
pub(crate) struct OutputObservers {
    inner: Arc<Mutex<Vec<Arc<Observer>>>>,
}

impl OutputObservers {
    fn register<F>(&self, observer: F)
    where
        F: Fn(OutputStream, &[u8]) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub(crate) fn notify(&self, stream: OutputStream, chunk: &[u8]) {
        let observers = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(stream, chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::testing::CountingControl;

    #[test]
    fn first_reason_wins() {
        let control = Arc::new(CountingControl::default());
        let killer = Killer::new(control.clone(), CancellationToken::new());

        killer.kill(GitError::Timeout { block_ms: 10 });
        killer.kill(GitError::plugin("other", "later"));

        assert_eq!(killer.take_rejection(), Some(GitError::Timeout { block_ms: 10 }));
        assert_eq!(control.kills(), 2);
    }

    #[test]
    fn abort_overrides_earlier_reason() {
        let killer = Killer::new(Arc::new(CountingControl::default()), CancellationToken::new());

        killer.kill(GitError::Timeout { block_ms: 10 });
        killer.kill(GitError::aborted("cancelled"));
        killer.kill(GitError::Timeout { block_ms: 10 });

        assert_eq!(killer.take_rejection(), Some(GitError::aborted("cancelled")));
    }

    #[test]
    fn kill_after_settle_is_ignored() {
        let control = Arc::new(CountingControl::default());
        let settled = CancellationToken::new();
        let killer = Killer::new(control.clone(), settled.clone());

        settled.cancel();
        killer.kill(GitError::aborted("late"));

        assert!(!killer.is_killed());
        assert_eq!(control.kills(), 0);
    }

    #[test]
    fn observers_see_every_chunk() {
        let observers = OutputObservers::default();
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = seen.clone();
            observers.register(move |_, chunk| {
                seen.fetch_add(chunk.len(), Ordering::SeqCst);
            });
        }

        observers.notify(OutputStream::Stdout, b"abc");
        observers.notify(OutputStream::Stderr, b"de");
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
