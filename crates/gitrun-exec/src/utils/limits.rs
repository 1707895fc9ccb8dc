//! POSIX rlimits applied to every spawned process.
//!
//! On Unix the limits are set in a `pre_exec` hook, in the child after `fork()` and before
//! `execve()`, so the binary never runs unrestricted. Elsewhere a non-empty configuration is logged
//! and ignored.
use tokio::process::Command;
use tracing::warn;

/// Declarative rlimits for spawned processes. `None` leaves the inherited limit untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`; writing past it delivers `SIGXFSZ`.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_CORE = 0`.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none() && self.max_file_size_bytes.is_none() && !self.disable_core_dumps
    }
}

pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach_rlimits(cmd, config);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        warn!(
            target: "gitrun.exec.limits",
            ?config,
            "rlimits requested on a non-Unix OS; ignoring"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;

    pub(super) fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
        let RlimitConfig {
            max_open_files,
            max_file_size_bytes,
            disable_core_dumps,
        } = *config;

        // SAFETY: the hook only calls async-signal-safe `setrlimit` and allocates nothing.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(nofile) = max_open_files {
                    check(libc::setrlimit(libc::RLIMIT_NOFILE, &rlimit(nofile)))?;
                }
                if let Some(fsize) = max_file_size_bytes {
                    check(libc::setrlimit(libc::RLIMIT_FSIZE, &rlimit(fsize)))?;
                }
                if disable_core_dumps {
                    check(libc::setrlimit(libc::RLIMIT_CORE, &rlimit(0)))?;
                }
                Ok(())
            });
        }
    }

    fn rlimit(value: u64) -> libc::rlimit {
        libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        }
    }

    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        assert!(RlimitConfig::default().is_empty());
        assert!(
            !RlimitConfig {
                disable_core_dumps: true,
                ..RlimitConfig::default()
            }
            .is_empty()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn limits_are_visible_inside_the_child() {
        let config = RlimitConfig {
            max_open_files: Some(64),
            max_file_size_bytes: None,
            disable_core_dumps: true,
        };
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "ulimit -n; ulimit -c"]);
        attach_rlimits(&mut cmd, &config);

        let out = cmd.output().await.unwrap();
        let text = String::from_utf8(out.stdout).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["64", "0"]);
    }
}
