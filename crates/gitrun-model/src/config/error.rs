use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maxConcurrentProcesses must be at least 1")]
    ZeroConcurrency,
    #[error("completion grace window must be at least 1ms")]
    ZeroGrace,
    #[error("timeout block interval must be at least 1ms")]
    ZeroTimeoutBlock,
    #[error("custom binary requires one or two entries, got {0}")]
    BinaryArity(usize),
    #[error(
        "custom binary {0:?} contains restricted characters; remove them or enable allowUnsafeCustomBinary"
    )]
    UnsafeBinary(String),
    #[error("invalid config entry: {0:?}")]
    InvalidConfigEntry(String),
}
