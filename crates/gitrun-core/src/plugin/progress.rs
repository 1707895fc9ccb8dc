//! Progress extraction for long-running network and checkout commands.
//!
//! The binary reports progress on stderr as `\r`-terminated lines such as
//! `Receiving objects:  45% (123/456), 1.20 MiB | 2.00 MiB/s`. Lines may be split across chunks,
//! so each invocation keeps the unterminated tail until the next chunk arrives.
use std::sync::{Arc, Mutex, PoisonError};

use super::{ArgsContext, Plugin};
use crate::{error::GitResult, process::OutputStream};

const PROGRESS_METHODS: [&str; 5] = ["checkout", "clone", "fetch", "pull", "push"];
const PROGRESS_FLAG: &str = "--progress";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub method: String,
    /// Lowercased first word of the reported phase, e.g. `receiving` or `resolving`.
    pub stage: String,
    /// Percentage, 0 to 100.
    pub progress: u8,
    pub processed: u64,
    pub total: u64,
}

pub type ProgressHandler = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// The `spawn.args` half forces `--progress` (the binary suppresses it when stderr is not a
/// terminal); the `spawn.after` half parses stderr and reports to `handler`.
pub fn progress_plugins(handler: ProgressHandler) -> [Plugin; 2] {
    let args = Plugin::spawn_args("progress", add_progress_flag);
    let after = Plugin::spawn_after("progress", move |ctx| {
        if !PROGRESS_METHODS.contains(&ctx.method()) {
            return;
        }
        let handler = Arc::clone(&handler);
        let method = ctx.method().to_owned();
        let pending = Mutex::new(Vec::new());
        ctx.on_output(move |stream, chunk| {
            if stream != OutputStream::Stderr {
                return;
            }
            let lines = {
                let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
                split_lines(&mut pending, chunk)
            };
            for line in lines {
                if let Some(event) = parse_progress(&method, &line) {
                    handler(event);
                }
            }
        });
    });
    [args, after]
}

fn add_progress_flag(mut args: Vec<String>, ctx: &ArgsContext<'_>) -> GitResult<Vec<String>> {
    if !PROGRESS_METHODS.contains(&ctx.method) || args.iter().any(|a| a == PROGRESS_FLAG) {
        return Ok(args);
    }
    if let Some(idx) = method_index(&args, ctx.method) {
        args.insert(idx + 1, PROGRESS_FLAG.to_owned());
    }
    Ok(args)
}

/// Position of the subcommand, skipping `-c key=value` pairs placed before it.
pub(crate) fn method_index(args: &[String], method: &str) -> Option<usize> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-c" {
            i += 2;
            continue;
        }
        if args[i] == method {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Append `chunk` to `pending` and drain every `\r`/`\n` terminated line.
///
/// Bytes are kept raw until their line is complete, so a character split across reads survives.
fn split_lines(pending: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    pending.extend_from_slice(chunk);
    let Some(last) = pending.iter().rposition(|b| matches!(b, b'\r' | b'\n')) else {
        return Vec::new();
    };
    let rest = pending.split_off(last + 1);
    let complete = std::mem::replace(pending, rest);
    complete
        .split(|b| matches!(b, b'\r' | b'\n'))
        .map(String::from_utf8_lossy)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.into_owned())
        .collect()
}

fn parse_progress(method: &str, line: &str) -> Option<ProgressEvent> {
    let line = line.trim_start();
    for (idx, _) in line.match_indices(':') {
        let Some((progress, processed, total)) = parse_counts(&line[idx + 1..]) else {
            continue;
        };
        // `remote: Counting objects: 5% (1/20)` reports the `counting` stage.
        let label = &line[..idx];
        let label = label.rsplit(':').next().unwrap_or(label);
        let stage = label.split_whitespace().next()?.to_lowercase();
        return Some(ProgressEvent {
            method: method.to_owned(),
            stage,
            progress,
            processed,
            total,
        });
    }
    None
}

/// Parse ` NN% (processed/total)...`.
fn parse_counts(rest: &str) -> Option<(u8, u64, u64)> {
    let (pct, rest) = rest.trim_start().split_once("% (")?;
    let progress = pct.parse::<u8>().ok().filter(|p| *p <= 100)?;
    let (processed, rest) = rest.split_once('/')?;
    let (total, _) = rest.split_once(')')?;
    Some((progress, processed.parse().ok()?, total.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{plugin::PluginStore, testing::spawn_context};

    fn args_ctx<'a>(method: &'a str, argv: &'a [String]) -> ArgsContext<'a> {
        ArgsContext { method, argv }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_is_added_after_the_subcommand() {
        let argv = strings(&["-c", "core.quotepath=off", "fetch", "origin"]);
        let out = add_progress_flag(argv.clone(), &args_ctx("fetch", &argv)).unwrap();
        assert_eq!(
            out,
            strings(&["-c", "core.quotepath=off", "fetch", "--progress", "origin"])
        );
    }

    #[test]
    fn flag_is_not_duplicated_or_added_to_other_commands() {
        let argv = strings(&["clone", "--progress", "url"]);
        assert_eq!(add_progress_flag(argv.clone(), &args_ctx("clone", &argv)).unwrap(), argv);

        let argv = strings(&["log", "-1"]);
        assert_eq!(add_progress_flag(argv.clone(), &args_ctx("log", &argv)).unwrap(), argv);
    }

    #[test]
    fn parses_common_progress_lines() {
        let event = parse_progress("clone", "Receiving objects:  45% (123/456), 1.20 MiB").unwrap();
        assert_eq!(event.stage, "receiving");
        assert_eq!((event.progress, event.processed, event.total), (45, 123, 456));

        let remote = parse_progress("fetch", "remote: Counting objects: 100% (5/5), done.").unwrap();
        assert_eq!(remote.stage, "counting");
        assert_eq!(remote.progress, 100);

        assert!(parse_progress("fetch", "From github.com:org/repo").is_none());
        assert!(parse_progress("fetch", "Updating: 250% (1/2)").is_none());
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut pending = Vec::new();
        assert!(split_lines(&mut pending, b"Resolving deltas:  1").is_empty());
        let lines = split_lines(&mut pending, b"0% (1/10)\rResolving deltas:  2");
        assert_eq!(lines, vec!["Resolving deltas:  10% (1/10)"]);
        assert_eq!(pending, b"Resolving deltas:  2");
    }

    #[test]
    fn multibyte_characters_split_across_chunks_survive() {
        let line = "Получение объектов:  50% (5/10)\r".as_bytes();
        // Cut inside the two-byte encoding of the first letter.
        let (head, tail) = line.split_at(1);

        let mut pending = Vec::new();
        assert!(split_lines(&mut pending, head).is_empty());
        let lines = split_lines(&mut pending, tail);
        assert_eq!(lines, vec!["Получение объектов:  50% (5/10)"]);

        let event = parse_progress("fetch", &lines[0]).unwrap();
        assert_eq!(event.stage, "получение");
        assert_eq!(event.progress, 50);
    }

    #[tokio::test]
    async fn stderr_progress_reaches_the_handler() {
        let seen = Arc::new(Mutex::new(Vec::<ProgressEvent>::new()));
        let handler: ProgressHandler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |event: ProgressEvent| seen.lock().unwrap().push(event))
        };
        let store = PluginStore::new();
        for plugin in progress_plugins(handler) {
            store.add(plugin);
        }

        let harness = spawn_context("pull");
        store.run_spawn_after(&harness.ctx);
        harness
            .observers
            .notify(OutputStream::Stdout, b"Receiving objects:  10% (1/10)\r");
        harness.observers.notify(
            OutputStream::Stderr,
            b"Receiving objects:  50% (5/10)\rReceiving objects: 100% (10/10)\n",
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method, "pull");
        assert_eq!(seen[1].progress, 100);
    }
}
