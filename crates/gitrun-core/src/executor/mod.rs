//! Executor: the shared half of task execution (config, scheduler, plugins, spawner, events) and
//! the chains that push tasks through it.
mod chain;
pub use chain::ExecutorChain;

mod handle;
pub use handle::TaskHandle;

mod invocation;

use std::{num::NonZeroUsize, sync::Arc};

use gitrun_model::{ConfigError, ExecConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{GitError, GitResult},
    events::{EventBus, Subscribe},
    plugin::{
        ErrorContext, Plugin, PluginStore, ProgressEvent, abort_plugin, config_prefix_plugin,
        default_error_detection, error_detection_plugin, progress_plugins, timeout_plugin,
        unsafe_operations_plugin,
    },
    process::Spawner,
    scheduler::Scheduler,
    task::Task,
};

pub(crate) struct ExecutorInner {
    pub(crate) config: ExecConfig,
    pub(crate) scheduler: Scheduler,
    pub(crate) plugins: PluginStore,
    pub(crate) spawner: Arc<dyn Spawner>,
    pub(crate) abort: Option<CancellationToken>,
    pub(crate) events: EventBus,
}

/// Entry point of the execution core.
///
/// Cheap to clone; clones share the scheduler, plugins and default chain.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
    default_chain: ExecutorChain,
}

impl Executor {
    pub fn builder(config: ExecConfig) -> ExecutorBuilder {
        ExecutorBuilder::new(config)
    }

    /// A new, independent chain. Its tasks are ordered among themselves only.
    pub fn chain(&self) -> ExecutorChain {
        ExecutorChain::new(Arc::clone(&self.inner))
    }

    /// Push onto the executor's default chain.
    pub fn push<T>(&self, task: Task<T>) -> TaskHandle<T>
    where
        T: Send + 'static,
    {
        self.default_chain.push(task)
    }

    /// Plugin registrations; handlers may be added or removed while tasks run.
    pub fn plugins(&self) -> &PluginStore {
        &self.inner.plugins
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &ExecConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("binary", &self.inner.config.binary)
            .field("concurrency", &self.inner.scheduler.concurrency())
            .field("plugins", &self.inner.plugins.len())
            .field("subscribers", &self.inner.events)
            .finish()
    }
}

/// Builder for [`Executor`]; carries the runtime-only pieces that have no place in [`ExecConfig`].
pub struct ExecutorBuilder {
    config: ExecConfig,
    spawner: Option<Arc<dyn Spawner>>,
    abort: Option<CancellationToken>,
    progress: Option<Arc<dyn Fn(ProgressEvent) + Send + Sync>>,
    error_detector: Option<Plugin>,
    plugins: Vec<Plugin>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ExecutorBuilder {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            spawner: None,
            abort: None,
            progress: None,
            error_detector: None,
            plugins: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_spawner<S: Spawner>(mut self, spawner: S) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    /// Cancelling `token` kills live processes and fails every task that has not spawned yet.
    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.abort = Some(token);
        self
    }

    pub fn with_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(handler));
        self
    }

    /// Classifier run right after the built-in error detection, able to override its verdict.
    pub fn with_error_detector<F>(mut self, detector: F) -> Self
    where
        F: Fn(Option<GitError>, &ErrorContext<'_>) -> Option<GitError> + Send + Sync + 'static,
    {
        self.error_detector = Some(error_detection_plugin(detector));
        self
    }

    /// Registered after every built-in plugin.
    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Validate the configuration and assemble the executor.
    ///
    /// Needs a Tokio runtime when subscribers were added.
    pub fn build(self) -> GitResult<Executor> {
        let config = self.config;
        config.validate()?;
        let concurrency =
            NonZeroUsize::new(config.max_concurrent_processes).ok_or(ConfigError::ZeroConcurrency)?;
        let spawner = self
            .spawner
            .ok_or_else(|| GitError::Config("no process spawner configured".into()))?;

        let plugins = PluginStore::new();
        if !config.config.is_empty() {
            plugins.add(config_prefix_plugin(config.config.clone()));
        }
        if let Some(handler) = self.progress {
            for plugin in progress_plugins(handler) {
                plugins.add(plugin);
            }
        }
        if let Some(timeout) = config.timeout {
            plugins.add(timeout_plugin(timeout));
        }
        if let Some(token) = &self.abort {
            plugins.add(abort_plugin(token.clone()));
        }
        plugins.add(unsafe_operations_plugin(config.unsafe_ops));
        plugins.add(default_error_detection(config.errors));
        if let Some(detector) = self.error_detector {
            plugins.add(detector);
        }
        for plugin in self.plugins {
            plugins.add(plugin);
        }

        let events = EventBus::new(self.subscribers)?;
        debug!(
            target: "gitrun.core.executor",
            binary = config.binary.program(),
            concurrency = concurrency.get(),
            plugins = plugins.len(),
            "executor built"
        );

        let inner = Arc::new(ExecutorInner {
            scheduler: Scheduler::new(concurrency),
            config,
            plugins,
            spawner,
            abort: self.abort,
            events,
        });
        let default_chain = ExecutorChain::new(Arc::clone(&inner));
        Ok(Executor {
            inner,
            default_chain,
        })
    }
}
