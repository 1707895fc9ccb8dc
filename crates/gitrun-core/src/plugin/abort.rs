use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Plugin;
use crate::error::GitError;

pub(crate) const ABORT_REASON: &str = "abort token cancelled";

/// Kill live processes once `token` is cancelled.
///
/// Invocations that have not spawned yet are rejected by the chain itself; this plugin only covers
/// processes that are already running.
pub fn abort_plugin(token: CancellationToken) -> Plugin {
    Plugin::spawn_after("abort", move |ctx| {
        let token = token.clone();
        let settled = ctx.settled();
        let killer = ctx.killer();
        let method = ctx.method().to_owned();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = settled.cancelled() => {}
                _ = token.cancelled() => {
                    debug!(target: "gitrun.core.plugin.abort", %method, "aborting live process");
                    killer.kill(GitError::aborted(ABORT_REASON));
                }
            }
        });
    })
}
