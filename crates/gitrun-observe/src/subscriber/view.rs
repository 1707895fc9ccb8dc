use std::borrow::Borrow;

use gitrun_core::{EventKind, ExecEvent};
use tracing::{debug, error, info, trace, warn};

pub trait View {
    fn kind(&self) -> EventKind;
    fn as_method(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn as_outcome(&self) -> &str;
    fn invocation(&self) -> String;
    fn pid(&self) -> u32;
    fn exit_code(&self) -> i32;
    fn elapsed_ms(&self) -> u64;
}

impl<T> View for T
where
    T: Borrow<ExecEvent>,
{
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
    #[inline]
    fn as_method(&self) -> &str {
        let method = self.borrow().method.as_str();
        if method.is_empty() { "-" } else { method }
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_outcome(&self) -> &str {
        self.borrow()
            .outcome
            .as_ref()
            .map_or("unknown", |o| o.as_label())
    }
    #[inline]
    fn invocation(&self) -> String {
        self.borrow().invocation.to_string()
    }
    #[inline]
    fn pid(&self) -> u32 {
        self.borrow().pid.unwrap_or(0)
    }
    #[inline]
    fn exit_code(&self) -> i32 {
        self.borrow().exit_code.unwrap_or(-1)
    }
    #[inline]
    fn elapsed_ms(&self) -> u64 {
        self.borrow()
            .elapsed
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // scheduling
        EventKind::SlotRequested => "waiting for a process slot",
        EventKind::SlotGranted => "process slot granted",

        // process
        EventKind::Spawned => "process spawned",
        EventKind::CompletionDeferred => "termination seen with no output yet; waiting for grace",
        EventKind::Killed => "process killed by a plugin",

        // terminal
        EventKind::Completed => "invocation completed",
        EventKind::Failed => "invocation failed",

        // subscriber
        EventKind::SubscriberOverflow => "event dropped for a subscriber (queue full)",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        EventKind::SlotRequested | EventKind::SlotGranted => {
            trace!(target: "gitrun.events", invocation = %e.invocation(), method = e.as_method(), "{msg}")
        }
        EventKind::Spawned => debug!(
            target: "gitrun.events",
            invocation = %e.invocation(),
            method = e.as_method(),
            pid = e.pid(),
            "{msg}"
        ),
        EventKind::CompletionDeferred => trace!(
            target: "gitrun.events",
            invocation = %e.invocation(),
            method = e.as_method(),
            "{msg}"
        ),
        EventKind::Killed => warn!(
            target: "gitrun.events",
            invocation = %e.invocation(),
            method = e.as_method(),
            pid = e.pid(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::Completed => info!(
            target: "gitrun.events",
            invocation = %e.invocation(),
            method = e.as_method(),
            exit_code = e.exit_code(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        EventKind::Failed => {
            // Aborts are requested by the caller; everything else is worth an error line.
            if e.as_outcome() == "aborted" {
                info!(
                    target: "gitrun.events",
                    invocation = %e.invocation(),
                    method = e.as_method(),
                    reason = e.as_reason(),
                    "invocation aborted"
                );
            } else {
                error!(
                    target: "gitrun.events",
                    invocation = %e.invocation(),
                    method = e.as_method(),
                    outcome = e.as_outcome(),
                    exit_code = e.exit_code(),
                    elapsed_ms = e.elapsed_ms(),
                    reason = e.as_reason(),
                    "{msg}"
                );
            }
        }
        EventKind::SubscriberOverflow => {
            error!(target: "gitrun.events", reason = e.as_reason(), "{msg}")
        }
    }
}
