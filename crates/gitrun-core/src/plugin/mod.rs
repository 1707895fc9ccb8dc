//! Typed hook bus shared by every chain of one executor.
//!
//! ## Hook points
//! - `spawn.args`: rewrite the argument vector before spawning. May reject the invocation.
//! - `spawn.after`: observe the live process (output observers, kill watchers, timers).
//! - `task.error`: decide whether a finished invocation failed.
//!
//! ## Invariants
//! - Handlers of one hook type run in registration order, each receiving the previous result.
//! - Handlers see a read-only context and communicate only through their return value
//!   (or, for `spawn.after`, through the killer and observer registration on the context).
//! - The store belongs to one executor; independent executors never share registrations.
mod context;
pub use context::{ArgsContext, ErrorContext, Killer, SpawnContext};
pub(crate) use context::OutputObservers;

mod abort;
pub(crate) use abort::ABORT_REASON;
pub use abort::abort_plugin;

mod config_prefix;
pub use config_prefix::config_prefix_plugin;

mod error_detection;
pub use error_detection::{default_error_detection, error_detection_plugin};

mod progress;
pub use progress::{ProgressEvent, ProgressHandler, progress_plugins};

mod timeout;
pub use timeout::timeout_plugin;

mod unsafe_ops;
pub use unsafe_ops::unsafe_operations_plugin;

use std::sync::{
    Arc, PoisonError, RwLock, Weak,
    atomic::{AtomicU64, Ordering},
};

use tracing::trace;

use crate::error::{GitError, GitResult};

pub type ArgsAction = dyn Fn(Vec<String>, &ArgsContext<'_>) -> GitResult<Vec<String>> + Send + Sync;
pub type SpawnAction = dyn Fn(&SpawnContext) + Send + Sync;
pub type ErrorAction =
    dyn Fn(Option<GitError>, &ErrorContext<'_>) -> Option<GitError> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    SpawnArgs,
    SpawnAfter,
    TaskError,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::SpawnArgs => "spawn.args",
            HookType::SpawnAfter => "spawn.after",
            HookType::TaskError => "task.error",
        }
    }
}

#[derive(Clone)]
enum Action {
    SpawnArgs(Arc<ArgsAction>),
    SpawnAfter(Arc<SpawnAction>),
    TaskError(Arc<ErrorAction>),
}

/// A named handler bound to one hook point.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    action: Action,
}

impl Plugin {
    pub fn spawn_args<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Vec<String>, &ArgsContext<'_>) -> GitResult<Vec<String>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Action::SpawnArgs(Arc::new(action)),
        }
    }

    pub fn spawn_after<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&SpawnContext) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Action::SpawnAfter(Arc::new(action)),
        }
    }

    pub fn task_error<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Option<GitError>, &ErrorContext<'_>) -> Option<GitError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Action::TaskError(Arc::new(action)),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hook(&self) -> HookType {
        match self.action {
            Action::SpawnArgs(_) => HookType::SpawnArgs,
            Action::SpawnAfter(_) => HookType::SpawnAfter,
            Action::TaskError(_) => HookType::TaskError,
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("hook", &self.hook().as_str())
            .finish()
    }
}

/// Registration set owned by one executor.
#[derive(Clone, Default)]
pub struct PluginStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    registrations: RwLock<Vec<(u64, Plugin)>>,
    next_id: AtomicU64,
}

impl PluginStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` after every existing registration.
    pub fn add(&self, plugin: Plugin) -> PluginHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(
            target: "gitrun.core.plugin",
            plugin = plugin.name(),
            hook = plugin.hook().as_str(),
            "plugin registered"
        );
        self.inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, plugin));
        PluginHandle {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.read(|regs| regs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of registered plugins bound to `hook`, in execution order.
    pub fn names(&self, hook: HookType) -> Vec<String> {
        self.read(|regs| {
            regs.iter()
                .filter(|(_, p)| p.hook() == hook)
                .map(|(_, p)| p.name.clone())
                .collect()
        })
    }

    /// Thread `args` through every `spawn.args` handler.
    pub fn run_spawn_args(
        &self,
        mut args: Vec<String>,
        ctx: &ArgsContext<'_>,
    ) -> GitResult<Vec<String>> {
        for (name, action) in self.snapshot(|a| match a {
            Action::SpawnArgs(f) => Some(Arc::clone(f)),
            _ => None,
        }) {
            trace!(target: "gitrun.core.plugin", plugin = %name, hook = "spawn.args", method = ctx.method);
            args = action(args, ctx)?;
        }
        Ok(args)
    }

    pub fn run_spawn_after(&self, ctx: &SpawnContext) {
        for (name, action) in self.snapshot(|a| match a {
            Action::SpawnAfter(f) => Some(Arc::clone(f)),
            _ => None,
        }) {
            trace!(target: "gitrun.core.plugin", plugin = %name, hook = "spawn.after", method = ctx.method());
            action(ctx);
        }
    }

    /// Thread `error` through every `task.error` handler.
    pub fn run_task_error(
        &self,
        mut error: Option<GitError>,
        ctx: &ErrorContext<'_>,
    ) -> Option<GitError> {
        for (name, action) in self.snapshot(|a| match a {
            Action::TaskError(f) => Some(Arc::clone(f)),
            _ => None,
        }) {
            trace!(target: "gitrun.core.plugin", plugin = %name, hook = "task.error", method = ctx.method);
            error = action(error, ctx);
        }
        error
    }

    fn read<R>(&self, f: impl FnOnce(&[(u64, Plugin)]) -> R) -> R {
        f(&self
            .inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner))
    }

    /// Clone the matching handlers so none runs under the lock.
    fn snapshot<A>(&self, pick: impl Fn(&Action) -> Option<A>) -> Vec<(String, A)> {
        self.read(|regs| {
            regs.iter()
                .filter_map(|(_, p)| pick(&p.action).map(|a| (p.name.clone(), a)))
                .collect()
        })
    }
}

/// Deregistration handle returned by [`PluginStore::add`].
///
/// Dropping the handle keeps the plugin registered.
pub struct PluginHandle {
    id: u64,
    store: Weak<StoreInner>,
}

impl PluginHandle {
    /// Remove the plugin. Returns `false` if it was already gone.
    pub fn remove(self) -> bool {
        let Some(store) = self.store.upgrade() else {
            return false;
        };
        let mut regs = store
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = regs.len();
        regs.retain(|(id, _)| *id != self.id);
        before != regs.len()
    }
}
