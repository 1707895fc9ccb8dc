use gitrun_core::GitError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("spawn failed: {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("child {0} was not piped")]
    MissingPipe(&'static str),
    #[error("io error: {0}")]
    Io(String),
    #[error("no tokio runtime to drive the child")]
    NoRuntime,
}

pub type ExecResult<T> = Result<T, ExecError>;

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for GitError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Spawn { program, reason } => GitError::Spawn(format!("{program}: {reason}")),
            other => GitError::Spawn(other.to_string()),
        }
    }
}
