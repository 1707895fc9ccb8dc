use async_trait::async_trait;
use gitrun_core::{EventKind, ExecEvent, Subscribe};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

/// Label used for tasks that carry no method.
const NO_METHOD: &str = "none";

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    started: IntCounterVec,
    completed: IntCounterVec,
    duration: HistogramVec,
    killed: IntCounterVec,
}

impl PrometheusMetrics {
    /// Metrics in a fresh, private registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Metrics registered into `registry`; fails if the names are already taken there.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let started = IntCounterVec::new(
            Opts::new(
                "gitrun_invocations_started_total",
                "Processes spawned by the executor",
            ),
            &["method"],
        )?;
        let completed = IntCounterVec::new(
            Opts::new(
                "gitrun_invocations_completed_total",
                "Invocations resolved, by outcome",
            ),
            &["method", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "gitrun_invocation_duration_seconds",
                "Time from push to resolution",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method"],
        )?;
        let killed = IntCounterVec::new(
            Opts::new(
                "gitrun_invocations_killed_total",
                "Processes killed by a plugin (timeout, abort)",
            ),
            &["method"],
        )?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(killed.clone()))?;

        Ok(Self {
            registry,
            started,
            completed,
            duration,
            killed,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn record(&self, event: &ExecEvent) {
        let method = if event.method.is_empty() {
            NO_METHOD
        } else {
            event.method.as_str()
        };

        match event.kind {
            EventKind::Spawned => self.started.with_label_values(&[method]).inc(),
            EventKind::Killed => self.killed.with_label_values(&[method]).inc(),
            EventKind::Completed | EventKind::Failed => {
                let outcome = match (&event.outcome, event.kind) {
                    (Some(outcome), _) => outcome.as_label(),
                    (None, EventKind::Completed) => "succeeded",
                    (None, _) => "failed",
                };
                self.completed.with_label_values(&[method, outcome]).inc();
                if let Some(elapsed) = event.elapsed {
                    self.duration
                        .with_label_values(&[method])
                        .observe(elapsed.as_secs_f64());
                }
            }
            EventKind::SlotRequested
            | EventKind::SlotGranted
            | EventKind::CompletionDeferred
            | EventKind::SubscriberOverflow => {}
        }
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

#[async_trait]
impl Subscribe for PrometheusMetrics {
    async fn on_event(&self, event: &ExecEvent) {
        self.record(event);
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}
