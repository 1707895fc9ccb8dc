//! Prometheus metrics for the gitrun executor.
//!
//! [`PrometheusMetrics`] is an event subscriber: register it with
//! [`ExecutorBuilder::with_subscriber`](gitrun_core::ExecutorBuilder::with_subscriber) and every
//! invocation is counted and timed in its own [`Registry`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use gitrun_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(PrometheusMetrics::new()?);
//! // Executor::builder(config).with_subscriber(metrics.clone())...
//! let exposition = metrics.encode_text()?;
//! # let _ = exposition;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `gitrun_invocations_started_total{method}` - Counter
//! - `gitrun_invocations_completed_total{method, outcome}` - Counter
//! - `gitrun_invocation_duration_seconds{method}` - Histogram
//! - `gitrun_invocations_killed_total{method}` - Counter
//!
//! ## HTTP Server
//! This crate does NOT serve a `/metrics` endpoint. Hand [`PrometheusMetrics::gather`] to the
//! application's HTTP framework.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
