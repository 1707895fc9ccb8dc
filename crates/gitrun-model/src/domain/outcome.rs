use serde::{Deserialize, Serialize};

/// Terminal classification of one invocation, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvocationOutcome {
    /// The task resolved with a parsed value.
    Succeeded,
    /// The process failed, or the parser / custom error handler rejected its output.
    Failed,
    /// An abort signal terminated (or prevented) the invocation.
    Aborted,
    /// The stall timer killed the process.
    TimedOut,
    /// Arguments were rejected before anything was spawned.
    Rejected,
}

impl InvocationOutcome {
    /// Stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            InvocationOutcome::Succeeded => "succeeded",
            InvocationOutcome::Failed => "failed",
            InvocationOutcome::Aborted => "aborted",
            InvocationOutcome::TimedOut => "timed_out",
            InvocationOutcome::Rejected => "rejected",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Succeeded)
    }
}
