mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use log::LOG_ENV;

/// Install the global `tracing` subscriber described by `cfg`.
///
/// Filter directives come from `GITRUN_LOG` when it is set, else from `cfg.level`.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::install(cfg)
}
