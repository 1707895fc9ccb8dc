use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DurationMs;

/// Which exit code wins when both termination notifications arrive with different codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitCodePolicy {
    /// The code carried by the first notification received.
    #[default]
    First,
    /// The code carried by the most recent notification received.
    Latest,
}

/// Completion detection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionConfig {
    /// How long to wait for output after a termination notification arrived with none buffered.
    pub grace_ms: DurationMs,
    pub exit_code: ExitCodePolicy,
}

impl CompletionConfig {
    pub const DEFAULT_GRACE_MS: DurationMs = 50;

    #[inline]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            grace_ms: Self::DEFAULT_GRACE_MS,
            exit_code: ExitCodePolicy::default(),
        }
    }
}

/// Stall timeout: kill a process that stays silent for `block_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub block_ms: DurationMs,
    /// Whether stdout chunks reset the timer.
    #[serde(default = "enabled")]
    pub stdout: bool,
    /// Whether stderr chunks reset the timer.
    #[serde(default = "enabled")]
    pub stderr: bool,
}

impl TimeoutConfig {
    pub fn new(block_ms: DurationMs) -> Self {
        Self {
            block_ms,
            stdout: true,
            stderr: true,
        }
    }

    #[inline]
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }
}

fn enabled() -> bool {
    true
}

/// Default error detection tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorsConfig {
    /// Prefix the synthesized error message with stdout as well as stderr.
    pub include_stdout: bool,
}

/// Opt-ins for arguments that can execute arbitrary programs through the binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnsafeConfig {
    /// Allow `-c protocol.<name>.allow=...` overrides.
    pub allow_unsafe_protocol_override: bool,
    /// Allow `--upload-pack`, `--receive-pack`, `clone -u` and `push --exec`.
    pub allow_unsafe_pack: bool,
    /// Skip the character check on the configured binary.
    pub allow_unsafe_custom_binary: bool,
}
