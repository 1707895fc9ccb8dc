use gitrun_model::{ConfigError, InvocationOutcome};
use thiserror::Error;

/// Outcome error of a task pushed through an executor chain.
///
/// Cloneable so the same failure can be reported to every task queued behind an internal fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// The process failed, as classified by the `task.error` hooks.
    #[error("{message}")]
    Process { message: String, exit_code: i32 },
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("block timeout reached: no output for {block_ms}ms")]
    Timeout { block_ms: u64 },
    #[error("unsafe operation blocked: {0}")]
    Unsafe(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("failed to parse output: {0}")]
    Parse(String),
    /// Raised by a user plugin (killing a process, rejecting arguments, ...).
    #[error("plugin {plugin}: {message}")]
    Plugin { plugin: String, message: String },
    /// A fault inside the execution core itself.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type GitResult<T> = Result<T, GitError>;

impl GitError {
    pub fn process(message: impl Into<String>, exit_code: i32) -> Self {
        GitError::Process {
            message: message.into(),
            exit_code,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        GitError::Aborted(reason.into())
    }

    pub fn parse(reason: impl Into<String>) -> Self {
        GitError::Parse(reason.into())
    }

    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        GitError::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_abort(&self) -> bool {
        matches!(self, GitError::Aborted(_))
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, GitError::Internal(_))
    }

    /// Classification reported to observers.
    pub fn outcome(&self) -> InvocationOutcome {
        match self {
            GitError::Aborted(_) => InvocationOutcome::Aborted,
            GitError::Timeout { .. } => InvocationOutcome::TimedOut,
            GitError::Unsafe(_) | GitError::Config(_) => InvocationOutcome::Rejected,
            _ => InvocationOutcome::Failed,
        }
    }
}

impl From<ConfigError> for GitError {
    fn from(e: ConfigError) -> Self {
        GitError::Config(e.to_string())
    }
}
