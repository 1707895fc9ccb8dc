//! Immutable descriptions of one invocation of the binary.
//!
//! A [`Task`] is produced by a command-building layer and consumed exactly once by an
//! [`ExecutorChain`](crate::ExecutorChain). It carries the argument vector, the parser for the
//! finished invocation's output (which also fixes the [`OutputEncoding`]), and optionally a custom
//! error handler that may turn a classified failure back into a success.
use gitrun_model::OutputEncoding;

use crate::error::{GitError, GitResult};

/// Buffered result of a finished process, handed to custom error handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl RawOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

type TextParser<T> = Box<dyn FnOnce(String, String) -> GitResult<T> + Send>;
type BinaryParser<T> = Box<dyn FnOnce(Vec<u8>, Vec<u8>) -> GitResult<T> + Send>;

/// Custom failure handler: receives the raw output and the classified error and either fails
/// (returning an error) or recovers by supplying the stdout the parser should see.
pub type ErrorHandler = Box<dyn FnOnce(&RawOutput, GitError) -> GitResult<Vec<u8>> + Send>;

pub(crate) enum Parser<T> {
    Text(TextParser<T>),
    Binary(BinaryParser<T>),
}

impl<T> Parser<T> {
    pub(crate) fn encoding(&self) -> OutputEncoding {
        match self {
            Parser::Text(_) => OutputEncoding::Text,
            Parser::Binary(_) => OutputEncoding::Binary,
        }
    }

    /// Decode per the encoding and run the parser.
    pub(crate) fn run(self, stdout: Vec<u8>, stderr: Vec<u8>) -> GitResult<T> {
        match self {
            Parser::Text(parse) => parse(decode(stdout), decode(stderr)),
            Parser::Binary(parse) => parse(stdout, stderr),
        }
    }
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

pub(crate) enum TaskBody<T> {
    Spawn {
        argv: Vec<String>,
        parser: Parser<T>,
        on_error: Option<ErrorHandler>,
    },
    /// Resolves without a process or a scheduler slot.
    Empty(Box<dyn FnOnce() -> GitResult<T> + Send>),
    /// Fails before anything is scheduled.
    Invalid(GitError),
}

/// One logical operation against the binary.
pub struct Task<T> {
    body: TaskBody<T>,
}

impl<T: Send + 'static> Task<T> {
    /// Task whose stdout/stderr are decoded as UTF-8 before `parse` sees them.
    pub fn parse_text<I, S, F>(argv: I, parse: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(String, String) -> GitResult<T> + Send + 'static,
    {
        Self::spawn(argv, Parser::Text(Box::new(parse)))
    }

    /// Task whose raw stdout/stderr bytes are handed to `parse`.
    pub fn parse_binary<I, S, F>(argv: I, parse: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Vec<u8>, Vec<u8>) -> GitResult<T> + Send + 'static,
    {
        Self::spawn(argv, Parser::Binary(Box::new(parse)))
    }

    /// Task that fails with `error` without touching the scheduler or spawning anything.
    pub fn config_error(error: impl Into<GitError>) -> Self {
        let error = match error.into() {
            GitError::Config(msg) => GitError::Config(msg),
            other => GitError::Config(other.to_string()),
        };
        Self {
            body: TaskBody::Invalid(error),
        }
    }

    /// Attach a custom error handler, consulted after the `task.error` hooks classified a failure.
    ///
    /// Has no effect on tasks that never spawn.
    pub fn with_on_error<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(&RawOutput, GitError) -> GitResult<Vec<u8>> + Send + 'static,
    {
        if let TaskBody::Spawn { on_error, .. } = &mut self.body {
            *on_error = Some(Box::new(handler));
        }
        self
    }

    fn spawn<I, S>(argv: I, parser: Parser<T>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            body: TaskBody::Spawn {
                argv: argv.into_iter().map(Into::into).collect(),
                parser,
                on_error: None,
            },
        }
    }
}

impl Task<String> {
    /// Stdout as text, passed through untouched.
    pub fn text<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::parse_text(argv, |stdout, _| Ok(stdout))
    }
}

impl Task<Vec<u8>> {
    /// Stdout as raw bytes, passed through untouched.
    pub fn binary<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::parse_binary(argv, |stdout, _| Ok(stdout))
    }
}

impl Task<()> {
    /// Task that resolves immediately, in chain order, without a process.
    pub fn empty() -> Self {
        Self {
            body: TaskBody::Empty(Box::new(|| Ok(()))),
        }
    }
}

impl<T> Task<T> {
    /// Arguments passed to the binary (before any `spawn.args` hook runs).
    pub fn argv(&self) -> &[String] {
        match &self.body {
            TaskBody::Spawn { argv, .. } => argv,
            _ => &[],
        }
    }

    /// Logical command name: the first argument, or empty for tasks that never spawn.
    pub fn method(&self) -> &str {
        self.argv().first().map(String::as_str).unwrap_or_default()
    }

    /// Encoding of the output handed to the parser; `None` for tasks that never spawn.
    pub fn encoding(&self) -> Option<OutputEncoding> {
        match &self.body {
            TaskBody::Spawn { parser, .. } => Some(parser.encoding()),
            _ => None,
        }
    }

    pub fn spawns_process(&self) -> bool {
        matches!(self.body, TaskBody::Spawn { .. })
    }

    pub(crate) fn into_body(self) -> TaskBody<T> {
        self.body
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.body {
            TaskBody::Spawn { .. } => "spawn",
            TaskBody::Empty(_) => "empty",
            TaskBody::Invalid(_) => "invalid",
        };
        f.debug_struct("Task")
            .field("kind", &kind)
            .field("argv", &self.argv())
            .field("encoding", &self.encoding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_task_exposes_method_and_encoding() {
        let task = Task::text(["rev-parse", "--abbrev-ref", "HEAD"]);
        assert_eq!(task.method(), "rev-parse");
        assert_eq!(task.argv().len(), 3);
        assert_eq!(task.encoding(), Some(OutputEncoding::Text));
        assert!(task.spawns_process());
    }

    #[test]
    fn binary_task_encoding() {
        let task = Task::binary(["cat-file", "blob", "HEAD:logo.png"]);
        assert_eq!(task.encoding(), Some(OutputEncoding::Binary));
    }

    #[test]
    fn non_spawning_tasks_have_no_argv() {
        let empty = Task::empty();
        assert_eq!(empty.method(), "");
        assert!(!empty.spawns_process());

        let invalid: Task<String> = Task::config_error(GitError::Config("missing remote".into()));
        assert_eq!(invalid.encoding(), None);
        assert!(!invalid.spawns_process());
    }

    #[test]
    fn config_error_always_reports_configuration_class() {
        let task: Task<()> = Task::config_error(GitError::parse("bad"));
        match task.into_body() {
            TaskBody::Invalid(GitError::Config(msg)) => assert!(msg.contains("bad")),
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn text_parser_replaces_invalid_utf8() {
        let parser: Parser<String> = Parser::Text(Box::new(|out, _| Ok(out)));
        let parsed = parser.run(vec![b'o', b'k', 0xff], Vec::new()).unwrap();
        assert_eq!(parsed, "ok\u{fffd}");
    }

    #[test]
    fn binary_parser_keeps_bytes() {
        let parser: Parser<usize> = Parser::Binary(Box::new(|out, err| Ok(out.len() + err.len())));
        assert_eq!(parser.run(vec![0, 1, 2], vec![3]).unwrap(), 4);
    }
}
