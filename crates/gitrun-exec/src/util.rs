use std::{
    io,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use cfg_if::cfg_if;
use gitrun_core::SpawnRequest;
use tokio::process::{Child, Command};

use crate::{proc::SpawnOptions, utils::limits::attach_rlimits};

/// Exit code reported when the platform gives neither a code nor a signal.
pub(crate) const UNKNOWN_EXIT_CODE: i32 = -1;

pub(crate) fn cmd_program(request: &SpawnRequest, options: &SpawnOptions) -> Command {
    let mut cmd = Command::new(&request.program);
    cmd.args(request.args.iter().map(|s| s.as_str()));
    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in request.env.resolved() {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    attach_rlimits(&mut cmd, &options.rlimits);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Exit code of `status`; `128 + signal` for processes killed by a signal on Unix.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    UNKNOWN_EXIT_CODE
}

cfg_if! {
    if #[cfg(unix)] {
        /// `SIGTERM`, then `SIGKILL` if the child is still alive after `grace`.
        pub(crate) async fn kill_graceful(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
            if let Some(pid) = child.id() {
                // SAFETY: plain syscall on a pid this process spawned and has not reaped yet.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                    return status;
                }
            }
            child.kill().await?;
            child.wait().await
        }
    } else {
        pub(crate) async fn kill_graceful(child: &mut Child, _grace: Duration) -> io::Result<ExitStatus> {
            child.kill().await?;
            child.wait().await
        }
    }
}
