//! Drives one task from slot request to parsed result.
use std::sync::Arc;

use gitrun_model::{CompletionConfig, InvocationOutcome};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::ExecutorInner;
use crate::{
    completion::{CompletionDetector, DetectorState, Termination, Transition},
    error::{GitError, GitResult},
    events::{EventKind, ExecEvent, InvocationId},
    plugin::{ABORT_REASON, ArgsContext, ErrorContext, Killer, OutputObservers, SpawnContext},
    process::{OutputStream, ProcessEvent, SpawnRequest},
    task::{ErrorHandler, Parser, RawOutput, Task, TaskBody},
};

/// Failure of the execution machinery itself, never of the task or its producer.
#[derive(Debug)]
pub(super) struct Fault(GitError);

impl Fault {
    fn new(reason: impl Into<String>) -> Self {
        Self(GitError::Internal(reason.into()))
    }
}

/// How one invocation ended, as seen by its chain.
#[derive(Debug)]
pub(super) enum Settled<T> {
    /// The task produced its own outcome; later tasks of the chain are unaffected.
    Done(GitResult<T>),
    /// The machinery failed; every task already queued behind inherits the error.
    Fault(GitError),
}

impl<T> Settled<T> {
    fn error(&self) -> Option<&GitError> {
        match self {
            Settled::Done(Ok(_)) => None,
            Settled::Done(Err(err)) | Settled::Fault(err) => Some(err),
        }
    }
}

type Ran<T> = Result<(GitResult<T>, Option<i32>), Fault>;

/// Run `task` to completion and report its final event.
pub(super) async fn run<T>(
    exec: Arc<ExecutorInner>,
    id: InvocationId,
    task: Task<T>,
    pushed: Instant,
) -> Settled<T> {
    let method = task.method().to_owned();
    let ran: Ran<T> = match task.into_body() {
        TaskBody::Invalid(err) => Ok((Err(err), None)),
        TaskBody::Empty(resolve) => Ok((resolve(), None)),
        TaskBody::Spawn {
            argv,
            parser,
            on_error,
        } => {
            let invocation = Invocation {
                exec: &exec,
                id,
                method: &method,
                argv: &argv,
            };
            invocation.run(parser, on_error).await
        }
    };

    let (settled, exit_code) = match ran {
        Ok((result, exit_code)) => (Settled::Done(result), exit_code),
        Err(Fault(err)) => (Settled::Fault(err), None),
    };

    let kind = match settled.error() {
        None => EventKind::Completed,
        Some(_) => EventKind::Failed,
    };
    let mut event = ExecEvent::new(kind, id, method.as_str()).with_elapsed(pushed.elapsed());
    if let Some(code) = exit_code {
        event = event.with_exit_code(code);
    }
    event = match settled.error() {
        None => event.with_outcome(InvocationOutcome::Succeeded),
        Some(err) => event.with_outcome(err.outcome()).with_reason(err.to_string()),
    };
    exec.events.publish(event);
    settled
}

struct Invocation<'a> {
    exec: &'a ExecutorInner,
    id: InvocationId,
    method: &'a str,
    argv: &'a [String],
}

/// Buffered output of a finished process.
struct Finished {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
}

impl Invocation<'_> {
    async fn run<T>(&self, parser: Parser<T>, on_error: Option<ErrorHandler>) -> Ran<T> {
        let abort = self.exec.abort.as_ref();
        if is_aborted(abort) {
            debug!(target: "gitrun.core.invocation", method = self.method, "aborted before requesting a slot");
            return Ok((Err(GitError::aborted(ABORT_REASON)), None));
        }

        self.publish(EventKind::SlotRequested);
        let request = self.exec.scheduler.next();
        let slot = match abort {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(target: "gitrun.core.invocation", method = self.method, "aborted while waiting for a slot");
                    return Ok((Err(GitError::aborted(ABORT_REASON)), None));
                }
                slot = request => slot,
            },
            None => request.await,
        };
        let slot = slot.map_err(Fault)?;
        trace!(target: "gitrun.core.invocation", method = self.method, slot = slot.id(), "slot granted");
        self.publish(EventKind::SlotGranted);

        let result = self.spawn_and_watch(abort, parser, on_error).await;
        slot.release();
        result
    }

    async fn spawn_and_watch<T>(
        &self,
        abort: Option<&CancellationToken>,
        parser: Parser<T>,
        on_error: Option<ErrorHandler>,
    ) -> Ran<T> {
        let args = match self.exec.plugins.run_spawn_args(
            self.argv.to_vec(),
            &ArgsContext {
                method: self.method,
                argv: self.argv,
            },
        ) {
            Ok(args) => args,
            Err(err) => return Ok((Err(err), None)),
        };
        if is_aborted(abort) {
            return Ok((Err(GitError::aborted(ABORT_REASON)), None));
        }

        let config = &self.exec.config;
        let request = SpawnRequest {
            program: config.binary.program().to_owned(),
            args: config
                .binary
                .prefix()
                .map(str::to_owned)
                .into_iter()
                .chain(args.iter().cloned())
                .collect(),
            cwd: config.base_dir.clone(),
            env: config.env.clone(),
        };
        debug!(
            target: "gitrun.core.invocation",
            program = %request.program,
            args = ?request.args,
            "spawning"
        );
        let process = match self.exec.spawner.spawn(request) {
            Ok(process) => process,
            Err(err) => return Ok((Err(err), None)),
        };
        let pid = process.control.id();
        self.exec
            .events
            .publish(ExecEvent::new(EventKind::Spawned, self.id, self.method).with_pid(pid));

        let settled = CancellationToken::new();
        let _settle_on_unwind = settled.clone().drop_guard();
        let killer = Killer::new(Arc::clone(&process.control), settled.clone());
        let observers = OutputObservers::default();
        self.exec.plugins.run_spawn_after(&SpawnContext::new(
            self.method.to_owned(),
            args.clone(),
            killer.clone(),
            observers.clone(),
            settled.clone(),
        ));

        let finished = match self
            .watch(process.events, &observers, &config.completion)
            .await
        {
            Ok(finished) => finished,
            Err(fault) => {
                settled.cancel();
                return Err(fault);
            }
        };
        settled.cancel();
        trace!(
            target: "gitrun.core.invocation",
            method = self.method,
            ?pid,
            exit_code = finished.exit_code,
            stdout = finished.stdout.len(),
            stderr = finished.stderr.len(),
            "process finished"
        );

        let rejection = killer.take_rejection();
        if let Some(reason) = &rejection {
            self.exec.events.publish(
                ExecEvent::new(EventKind::Killed, self.id, self.method)
                    .with_pid(pid)
                    .with_reason(reason.to_string()),
            );
        }
        let exit_code = finished.exit_code;
        Ok((
            self.classify(&args, finished, rejection, parser, on_error),
            Some(exit_code),
        ))
    }

    /// Feed process events to the completion detector until it finalizes, then drain whatever
    /// output is still in flight.
    async fn watch(
        &self,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
        observers: &OutputObservers,
        completion: &CompletionConfig,
    ) -> Result<Finished, Fault> {
        let mut detector = CompletionDetector::new(completion.exit_code);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut grace: Option<Instant> = None;
        let mut open = true;
        let mut closed = false;

        let mut record = |stream: OutputStream, chunk: Vec<u8>, detector: &mut CompletionDetector| {
            observers.notify(stream, &chunk);
            detector.on_output(chunk.len());
            match stream {
                OutputStream::Stdout => stdout.extend_from_slice(&chunk),
                OutputStream::Stderr => stderr.extend_from_slice(&chunk),
            }
        };

        let exit_code = loop {
            let transition = tokio::select! {
                event = events.recv(), if open => match event {
                    Some(ProcessEvent::Output(stream, chunk)) => {
                        record(stream, chunk, &mut detector);
                        Transition::None
                    }
                    Some(ProcessEvent::Exit(code)) => detector.on_termination(Termination::Exit, code),
                    Some(ProcessEvent::Close(code)) => {
                        closed = true;
                        detector.on_termination(Termination::Close, code)
                    }
                    None => {
                        open = false;
                        if detector.state() == DetectorState::WaitingFirstSignal {
                            return Err(Fault::new(
                                "process event stream ended without a termination notification",
                            ));
                        }
                        Transition::None
                    }
                },
                _ = sleep_until(grace.unwrap_or_else(Instant::now)), if grace.is_some() => {
                    grace = None;
                    detector.on_grace_elapsed()
                }
                else => {
                    return Err(Fault::new("completion detector stalled"));
                }
            };

            match transition {
                Transition::None => {}
                Transition::Defer => {
                    trace!(target: "gitrun.core.invocation", method = self.method, "no output yet, deferring completion");
                    self.publish(EventKind::CompletionDeferred);
                    grace = Some(Instant::now() + completion.grace());
                }
                Transition::Finalize { exit_code } => break exit_code,
            }
        };

        if open && !closed {
            let deadline = Instant::now() + completion.grace();
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(ProcessEvent::Output(stream, chunk)) => record(stream, chunk, &mut detector),
                        Some(ProcessEvent::Exit(_)) => {}
                        Some(ProcessEvent::Close(_)) | None => break,
                    },
                    _ = sleep_until(deadline) => break,
                }
            }
        }

        Ok(Finished {
            stdout,
            stderr,
            exit_code,
        })
    }

    fn classify<T>(
        &self,
        args: &[String],
        finished: Finished,
        rejection: Option<GitError>,
        parser: Parser<T>,
        on_error: Option<ErrorHandler>,
    ) -> GitResult<T> {
        if let Some(abort) = rejection.as_ref().filter(|err| err.is_abort()) {
            return Err(abort.clone());
        }

        let error = self.exec.plugins.run_task_error(
            rejection,
            &ErrorContext {
                method: self.method,
                argv: args,
                stdout: &finished.stdout,
                stderr: &finished.stderr,
                exit_code: finished.exit_code,
            },
        );

        let Some(error) = error else {
            return parser.run(finished.stdout, finished.stderr);
        };
        let Some(handler) = on_error else {
            return Err(error);
        };

        let raw = RawOutput {
            stdout: finished.stdout,
            stderr: finished.stderr,
            exit_code: finished.exit_code,
        };
        let stdout = handler(&raw, error)?;
        parser.run(stdout, raw.stderr)
    }

    fn publish(&self, kind: EventKind) {
        self.exec
            .events
            .publish(ExecEvent::new(kind, self.id, self.method));
    }
}

fn is_aborted(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}
