use gitrun_model::ErrorsConfig;

use super::{ErrorContext, Plugin};
use crate::error::GitError;

/// Built-in failure classification.
///
/// A process that exited non-zero *and* wrote to stderr failed; the error message is its stderr
/// (prefixed by stdout when `include_stdout` is set). An error seeded by an earlier stage, such as a
/// timeout kill, is passed through untouched.
pub fn default_error_detection(config: ErrorsConfig) -> Plugin {
    Plugin::task_error("error-detection", move |error, ctx| {
        if error.is_some() {
            return error;
        }
        if ctx.exit_code == 0 || ctx.stderr.is_empty() {
            return None;
        }
        Some(process_error(config, ctx))
    })
}

/// Wrap a user-supplied detector registered after the default one, so it sees (and may replace)
/// its verdict.
pub fn error_detection_plugin<F>(detector: F) -> Plugin
where
    F: Fn(Option<GitError>, &ErrorContext<'_>) -> Option<GitError> + Send + Sync + 'static,
{
    Plugin::task_error("custom-error-detection", detector)
}

fn process_error(config: ErrorsConfig, ctx: &ErrorContext<'_>) -> GitError {
    let mut message = String::new();
    if config.include_stdout {
        message.push_str(&String::from_utf8_lossy(ctx.stdout));
    }
    message.push_str(&String::from_utf8_lossy(ctx.stderr));
    GitError::process(message, ctx.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginStore;

    fn classify(store: &PluginStore, stdout: &[u8], stderr: &[u8], exit_code: i32) -> Option<GitError> {
        let argv = vec!["merge".to_string()];
        let ctx = ErrorContext {
            method: "merge",
            argv: &argv,
            stdout,
            stderr,
            exit_code,
        };
        store.run_task_error(None, &ctx)
    }

    fn defaults() -> PluginStore {
        let store = PluginStore::new();
        store.add(default_error_detection(ErrorsConfig::default()));
        store
    }

    #[test]
    fn non_zero_exit_with_stderr_fails() {
        let err = classify(&defaults(), b"", b"fatal: not a git repository\n", 128).unwrap();
        assert_eq!(err, GitError::process("fatal: not a git repository\n", 128));
    }

    #[test]
    fn zero_exit_succeeds_regardless_of_output() {
        assert_eq!(classify(&defaults(), b"ok", b"warning: LF", 0), None);
        assert_eq!(classify(&defaults(), b"", b"", 0), None);
    }

    #[test]
    fn non_zero_exit_without_stderr_succeeds() {
        assert_eq!(classify(&defaults(), b"1 file changed", b"", 1), None);
    }

    #[test]
    fn stdout_is_included_when_configured() {
        let store = PluginStore::new();
        store.add(default_error_detection(ErrorsConfig {
            include_stdout: true,
        }));
        let err = classify(&store, b"CONFLICT (content)\n", b"Automatic merge failed\n", 1).unwrap();
        assert_eq!(err.to_string(), "CONFLICT (content)\nAutomatic merge failed\n");
    }

    #[test]
    fn seeded_error_is_preserved() {
        let store = defaults();
        let argv: Vec<String> = Vec::new();
        let ctx = ErrorContext {
            method: "",
            argv: &argv,
            stdout: b"",
            stderr: b"fatal",
            exit_code: 143,
        };
        let seeded = GitError::Timeout { block_ms: 5 };
        assert_eq!(store.run_task_error(Some(seeded.clone()), &ctx), Some(seeded));
    }

    #[test]
    fn custom_detector_sees_and_overrides_the_default() {
        let store = defaults();
        store.add(error_detection_plugin(|error, ctx| match error {
            Some(GitError::Process { exit_code: 1, .. }) if ctx.method == "merge" => None,
            other => other,
        }));

        assert_eq!(classify(&store, b"", b"conflict", 1), None);
        assert!(classify(&store, b"", b"fatal", 128).is_some());
    }
}
