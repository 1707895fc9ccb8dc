mod binary;
pub use binary::BinarySpec;

mod error;
pub use error::ConfigError;

mod sections;
pub use sections::{CompletionConfig, ErrorsConfig, ExitCodePolicy, TimeoutConfig, UnsafeConfig};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ProcessEnv;

/// Concurrency limit applied when the configuration does not name one.
pub const DEFAULT_MAX_CONCURRENT_PROCESSES: usize = 5;

/// Configuration of one executor: which binary to run, where, and how invocations are governed.
///
/// Every field has a default, so an empty document deserializes into a usable configuration:
///
/// ```
/// let cfg: gitrun_model::ExecConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(cfg.max_concurrent_processes, 5);
/// assert_eq!(cfg.binary.program(), "git");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecConfig {
    /// Binary to invoke, optionally behind a wrapper (e.g. `["wsl", "git"]`).
    pub binary: BinarySpec,
    /// Working directory of spawned processes.
    ///
    /// If `None`, processes inherit the working directory of the host process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// Variables layered over the inherited environment.
    #[serde(skip_serializing_if = "ProcessEnv::is_empty")]
    pub env: ProcessEnv,
    /// Upper bound of processes alive at once across every chain of the executor.
    pub max_concurrent_processes: usize,
    /// `key=value` entries passed to every invocation as `-c key=value`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<String>,
    pub completion: CompletionConfig,
    /// Stall timeout; disabled when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
    pub errors: ErrorsConfig,
    #[serde(rename = "unsafe")]
    pub unsafe_ops: UnsafeConfig,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            binary: BinarySpec::default(),
            base_dir: None,
            env: ProcessEnv::new(),
            max_concurrent_processes: DEFAULT_MAX_CONCURRENT_PROCESSES,
            config: Vec::new(),
            completion: CompletionConfig::default(),
            timeout: None,
            errors: ErrorsConfig::default(),
            unsafe_ops: UnsafeConfig::default(),
        }
    }
}

impl ExecConfig {
    /// Check the invariants the execution core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_processes == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.completion.grace_ms == 0 {
            return Err(ConfigError::ZeroGrace);
        }
        if let Some(timeout) = &self.timeout
            && timeout.block_ms == 0
        {
            return Err(ConfigError::ZeroTimeoutBlock);
        }
        if let Some(entry) = self.config.iter().find(|c| c.trim().is_empty()) {
            return Err(ConfigError::InvalidConfigEntry(entry.clone()));
        }
        if !self.unsafe_ops.allow_unsafe_custom_binary {
            self.binary.check_characters()?;
        }
        Ok(())
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_max_concurrent_processes(mut self, limit: usize) -> Self {
        self.max_concurrent_processes = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
