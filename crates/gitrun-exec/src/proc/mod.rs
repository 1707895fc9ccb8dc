//! [`Spawner`] backed by `tokio::process`.
//!
//! Every spawned child gets three background tasks: two pumps forwarding stdout/stderr chunks and a
//! supervisor that waits for the exit status, reports `Exit`, lets the pumps drain and reports
//! `Close`. Killing goes through a cancellation token so [`ProcessControl::kill`] never blocks.
use std::{sync::Arc, time::Duration};

use gitrun_core::{
    GitResult, OutputStream, ProcessControl, ProcessEvent, SpawnRequest, SpawnedProcess, Spawner,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::ExecError,
    util::{UNKNOWN_EXIT_CODE, cmd_program, exit_code, kill_graceful},
    utils::limits::RlimitConfig,
};

const READ_CHUNK: usize = 8 * 1024;

/// Per-spawner process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub rlimits: RlimitConfig,
    /// Time between `SIGTERM` and `SIGKILL` when a child is killed.
    pub term_grace: Duration,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            rlimits: RlimitConfig::default(),
            term_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokioSpawner {
    options: SpawnOptions,
}

impl TokioSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SpawnOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SpawnOptions {
        &self.options
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, request: SpawnRequest) -> GitResult<SpawnedProcess> {
        let handle = Handle::try_current().map_err(|_| ExecError::NoRuntime)?;

        trace!(
            target: "gitrun.exec.proc",
            program = %request.program,
            args = ?request.args,
            cwd = ?request.cwd,
            "spawn"
        );
        let mut child = cmd_program(&request, &self.options)
            .spawn()
            .map_err(|e| ExecError::Spawn {
                program: request.program.clone(),
                reason: e.to_string(),
            })?;

        // `kill_on_drop` reaps the child if a pipe is missing.
        let stdout = child.stdout.take().ok_or(ExecError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ExecError::MissingPipe("stderr"))?;
        let pid = child.id();

        let (tx, rx) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();

        let pumps = [
            handle.spawn(pump(stdout, OutputStream::Stdout, tx.clone())),
            handle.spawn(pump(stderr, OutputStream::Stderr, tx.clone())),
        ];
        handle.spawn(supervise(
            child,
            tx,
            kill.clone(),
            pumps,
            self.options.term_grace,
        ));

        debug!(target: "gitrun.exec.proc", program = %request.program, ?pid, "spawned");
        Ok(SpawnedProcess {
            events: rx,
            control: Arc::new(ChildControl { pid, kill }),
        })
    }
}

struct ChildControl {
    pid: Option<u32>,
    kill: CancellationToken,
}

impl ProcessControl for ChildControl {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn kill(&self) {
        self.kill.cancel();
    }
}

async fn pump<R>(mut reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(ProcessEvent::Output(stream, buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(target: "gitrun.exec.proc", stream = stream.as_str(), error = %e, "read failed");
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    kill: CancellationToken,
    pumps: [JoinHandle<()>; 2],
    grace: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            debug!(target: "gitrun.exec.proc", pid = ?child.id(), "kill requested");
            kill_graceful(&mut child, grace).await
        }
        _ = tx.closed() => {
            debug!(target: "gitrun.exec.proc", pid = ?child.id(), "event stream dropped; killing child");
            kill_graceful(&mut child, grace).await
        }
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(target: "gitrun.exec.proc", error = %e, "wait failed");
            UNKNOWN_EXIT_CODE
        }
    };
    trace!(target: "gitrun.exec.proc", code, "exit");
    let _ = tx.send(ProcessEvent::Exit(code));

    // A grandchild may keep the pipes open; stop draining once nobody listens.
    let [out, err] = pumps;
    let out_abort = out.abort_handle();
    let err_abort = err.abort_handle();
    tokio::select! {
        _ = async { let _ = tokio::join!(out, err); } => {
            let _ = tx.send(ProcessEvent::Close(code));
        }
        _ = tx.closed() => {
            out_abort.abort();
            err_abort.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use gitrun_model::ProcessEnv;

    use super::*;

    fn sh(script: &str) -> SpawnRequest {
        SpawnRequest {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: None,
            env: ProcessEnv::default(),
        }
    }

    /// Collects every event until the stream ends.
    async fn drain(mut proc: SpawnedProcess) -> (Vec<u8>, Vec<u8>, Vec<ProcessEvent>) {
        let (mut out, mut err, mut tail) = (Vec::new(), Vec::new(), Vec::new());
        while let Some(ev) = tokio::time::timeout(Duration::from_secs(10), proc.events.recv())
            .await
            .unwrap()
        {
            match ev {
                ProcessEvent::Output(OutputStream::Stdout, bytes) => out.extend(bytes),
                ProcessEvent::Output(OutputStream::Stderr, bytes) => err.extend(bytes),
                other => tail.push(other),
            }
        }
        (out, err, tail)
    }

    #[tokio::test]
    async fn forwards_both_streams_then_exit_and_close() {
        let proc = TokioSpawner::new()
            .spawn(sh("printf out; printf err >&2; exit 3"))
            .unwrap();
        assert!(proc.control.id().is_some());

        let (out, err, tail) = drain(proc).await;
        assert_eq!(out, b"out");
        assert_eq!(err, b"err");
        assert_eq!(tail, [ProcessEvent::Exit(3), ProcessEvent::Close(3)]);
    }

    #[tokio::test]
    async fn passes_cwd_and_env() {
        let dir = std::env::temp_dir();
        let mut request = sh("printf \"%s|%s\" \"$GITRUN_MARKER\" \"$(pwd -P)\"");
        request.cwd = Some(dir.clone());
        request.env = ProcessEnv::default().with("GITRUN_MARKER", "yes");

        let (out, _, _) = drain(TokioSpawner::new().spawn(request).unwrap()).await;
        let expected = format!("yes|{}", dir.canonicalize().unwrap().display());
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let request = SpawnRequest {
            program: "/definitely/not/here/git".into(),
            args: vec![],
            cwd: None,
            env: ProcessEnv::default(),
        };
        let err = TokioSpawner::new().spawn(request).unwrap_err();
        assert!(matches!(err, gitrun_core::GitError::Spawn(_)), "{err:?}");
    }

    #[tokio::test]
    async fn kill_terminates_a_running_child() {
        let proc = TokioSpawner::new().spawn(sh("exec sleep 30")).unwrap();
        proc.control.kill();
        proc.control.kill();

        let (_, _, tail) = drain(proc).await;
        let expected = 128 + libc::SIGTERM;
        assert_eq!(tail, [ProcessEvent::Exit(expected), ProcessEvent::Close(expected)]);
    }

    #[test]
    fn spawn_without_runtime_fails() {
        let err = TokioSpawner::new().spawn(sh("true")).unwrap_err();
        assert!(matches!(err, gitrun_core::GitError::Spawn(_)), "{err:?}");
    }
}
