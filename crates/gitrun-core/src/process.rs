//! Boundary between the execution core and whatever actually runs processes.
//!
//! A [`Spawner`] turns a [`SpawnRequest`] into a [`SpawnedProcess`]: a stream of [`ProcessEvent`]s
//! (output chunks plus the `Exit` and `Close` termination notifications) and a [`ProcessControl`]
//! used to force-kill it. Implementations must emit at least one termination notification for every
//! spawned process; dropping the event sender before that is treated as an internal fault.
use std::{path::PathBuf, sync::Arc};

use gitrun_model::ProcessEnv;
use tokio::sync::mpsc;

use crate::error::GitResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputStream, Vec<u8>),
    /// The process exited with this code.
    Exit(i32),
    /// The output streams closed; carries the exit code when known.
    Close(i32),
}

/// Fully resolved spawn call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: ProcessEnv,
}

/// Control surface of a live process.
pub trait ProcessControl: Send + Sync {
    /// OS process id, when the platform exposes one.
    fn id(&self) -> Option<u32>;

    /// Request termination. Must be idempotent and must not block.
    fn kill(&self);
}

pub struct SpawnedProcess {
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    pub control: Arc<dyn ProcessControl>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.control.id())
            .finish_non_exhaustive()
    }
}

/// Launches processes for an executor.
pub trait Spawner: Send + Sync + 'static {
    /// Spawn synchronously; output and termination are reported through the returned event stream.
    fn spawn(&self, request: SpawnRequest) -> GitResult<SpawnedProcess>;
}
