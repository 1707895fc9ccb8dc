//! Guard against arguments that make the binary execute arbitrary programs.
use gitrun_model::UnsafeConfig;

use super::{ArgsContext, Plugin};
use crate::error::{GitError, GitResult};

/// Reject the invocation before anything is spawned when it carries an argument the configuration
/// does not explicitly allow.
pub fn unsafe_operations_plugin(config: UnsafeConfig) -> Plugin {
    Plugin::spawn_args("unsafe-operations", move |args, ctx| {
        check(&config, &args, ctx)?;
        Ok(args)
    })
}

fn check(config: &UnsafeConfig, args: &[String], ctx: &ArgsContext<'_>) -> GitResult<()> {
    if !config.allow_unsafe_protocol_override {
        for pair in args.windows(2) {
            if pair[0] == "-c" && is_protocol_override(&pair[1]) {
                return Err(GitError::Unsafe(format!(
                    "configuring protocol.allow is not permitted without enabling allowUnsafeProtocolOverride: {}",
                    pair[1]
                )));
            }
        }
    }

    if !config.allow_unsafe_pack {
        for arg in args {
            let lowered = arg.to_lowercase();
            if lowered.starts_with("--upload-pack") || lowered.starts_with("--receive-pack") {
                return Err(unsafe_pack(arg));
            }
            if ctx.method == "clone" && lowered.starts_with("-u") {
                return Err(unsafe_pack(arg));
            }
            if ctx.method == "push" && lowered.starts_with("--exec") {
                return Err(unsafe_pack(arg));
            }
        }
    }
    Ok(())
}

fn is_protocol_override(entry: &str) -> bool {
    let key = entry.split('=').next().unwrap_or(entry).to_lowercase();
    key.starts_with("protocol.") && key.ends_with("allow")
}

fn unsafe_pack(arg: &str) -> GitError {
    GitError::Unsafe(format!(
        "use of {arg} is not permitted without enabling allowUnsafePack"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: UnsafeConfig, argv: &[&str]) -> GitResult<()> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let method = argv.first().cloned().unwrap_or_default();
        check(&config, &argv, &ArgsContext { method: &method, argv: &argv })
    }

    #[test]
    fn protocol_override_is_blocked_by_default() {
        let err = run(UnsafeConfig::default(), &["-c", "protocol.ext.allow=always", "fetch"])
            .unwrap_err();
        assert!(matches!(err, GitError::Unsafe(_)));

        let allowed = UnsafeConfig {
            allow_unsafe_protocol_override: true,
            ..UnsafeConfig::default()
        };
        assert!(run(allowed, &["-c", "protocol.ext.allow=always", "fetch"]).is_ok());
    }

    #[test]
    fn unrelated_config_entries_pass() {
        assert!(run(UnsafeConfig::default(), &["-c", "core.quotepath=off", "status"]).is_ok());
    }

    #[test]
    fn pack_overrides_are_blocked_by_default() {
        for argv in [
            &["fetch", "--upload-pack=touch /tmp/pwn"][..],
            &["push", "--receive-pack", "evil"],
            &["clone", "-u", "evil", "url"],
            &["push", "--exec=evil"],
        ] {
            let err = run(UnsafeConfig::default(), argv).unwrap_err();
            assert!(matches!(err, GitError::Unsafe(_)), "{argv:?}");
        }
    }

    #[test]
    fn short_flags_only_matter_for_their_command() {
        assert!(run(UnsafeConfig::default(), &["commit", "-u", "-m", "msg"]).is_ok());
        assert!(run(UnsafeConfig::default(), &["clone", "--upstream-like", "url"]).is_ok());
    }

    #[test]
    fn pack_overrides_pass_when_allowed() {
        let allowed = UnsafeConfig {
            allow_unsafe_pack: true,
            ..UnsafeConfig::default()
        };
        assert!(run(allowed, &["clone", "-u", "custom-pack", "url"]).is_ok());
    }
}
