//! Execution core for driving an external version-control binary.
//!
//! ```text
//!  ExecutorChain::push(task)
//!        │  waits for the previous task of the same chain
//!        ▼
//!  Scheduler::next() ──► slot (at most N alive across every chain)
//!        │
//!        ▼
//!  spawn.args hooks ──► Spawner::spawn ──► spawn.after hooks
//!        │
//!        ▼
//!  CompletionDetector (exit / close / grace timer)
//!        │
//!        ▼
//!  task.error hooks ──► Task parser ──► TaskHandle resolves
//! ```
pub mod error;
pub use error::{GitError, GitResult};

pub mod task;
pub use task::{RawOutput, Task};

pub mod scheduler;
pub use scheduler::{Scheduler, Slot, SlotRequest};

pub mod completion;
pub use completion::{CompletionDetector, DetectorState, Termination, Transition};

pub mod process;
pub use process::{OutputStream, ProcessControl, ProcessEvent, SpawnRequest, SpawnedProcess, Spawner};

pub mod plugin;
pub use plugin::{
    ArgsContext, ErrorContext, HookType, Killer, Plugin, PluginHandle, PluginStore, ProgressEvent,
    SpawnContext,
};

pub mod events;
pub use events::{EventBus, EventKind, ExecEvent, InvocationId, Subscribe};

pub mod executor;
pub use executor::{Executor, ExecutorBuilder, ExecutorChain, TaskHandle};

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    pub use crate::error::{GitError, GitResult};
    pub use crate::executor::{Executor, ExecutorChain, TaskHandle};
    pub use crate::task::Task;
    pub use gitrun_model::{ExecConfig, OutputEncoding};
}
