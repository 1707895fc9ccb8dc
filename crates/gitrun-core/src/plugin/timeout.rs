use std::sync::Arc;

use gitrun_model::TimeoutConfig;
use tokio::sync::Notify;
use tracing::debug;

use super::Plugin;
use crate::{error::GitError, process::OutputStream};

/// Kill processes that stay silent for longer than the configured block interval.
///
/// The timer starts at spawn and restarts on every chunk of a watched stream.
pub fn timeout_plugin(config: TimeoutConfig) -> Plugin {
    Plugin::spawn_after("timeout", move |ctx| {
        let activity = Arc::new(Notify::new());
        {
            let activity = Arc::clone(&activity);
            let (stdout, stderr) = (config.stdout, config.stderr);
            ctx.on_output(move |stream, _| {
                let watched = match stream {
                    OutputStream::Stdout => stdout,
                    OutputStream::Stderr => stderr,
                };
                if watched {
                    activity.notify_one();
                }
            });
        }

        let block = config.block();
        let block_ms = config.block_ms;
        let settled = ctx.settled();
        let killer = ctx.killer();
        let method = ctx.method().to_owned();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = settled.cancelled() => return,
                    _ = activity.notified() => continue,
                    _ = tokio::time::sleep(block) => {
                        debug!(target: "gitrun.core.plugin.timeout", %method, block_ms, "no output within block interval");
                        killer.kill(GitError::Timeout { block_ms });
                        return;
                    }
                }
            }
        });
    })
}
