use async_trait::async_trait;
use gitrun_core::{ExecEvent, Subscribe};

use crate::subscriber::view::log_event;

/// Writes every executor event to the installed `tracing` subscriber.
#[derive(Debug, Default)]
pub struct Journal;

impl Journal {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &ExecEvent) {
        log_event(event);
    }
    fn name(&self) -> &'static str {
        "journal"
    }
    fn queue_capacity(&self) -> usize {
        2048
    }
}
