//! # Metrics
//!
//! Two paths, both lock-free:
//!
//! - Prometheus counters, gauges and histograms through the `metrics` facade,
//!   rendered on demand by [`MetricsCollector::render`]
//! - An in-process [`MetricsSummary`] backed by atomics, for callers that want
//!   numbers without parsing the exposition format
//!
//! The Prometheus recorder is process-global and installed once. Every
//! collector shares the same handle.

use crate::aggregation::errors::OracleError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::Duration,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "using fallback Prometheus recorder, metrics may not be globally visible"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Outcome label for `oracle_responses_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Recorded,
    Dropped,
    Unknown,
}

impl ResponseOutcome {
    #[must_use]
    pub fn as_metric_str(self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Dropped => "dropped",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    rounds_started: AtomicU64,
    responses_recorded: AtomicU64,
    responses_dropped: AtomicU64,
    answers_finalized: AtomicU64,
    rounds_purged: AtomicU64,
    requests_cancelled: AtomicU64,
    actions_succeeded: AtomicU64,
    actions_failed: AtomicU64,
    transport_errors: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the in-process counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub rounds_started: u64,
    pub responses_recorded: u64,
    pub responses_dropped: u64,
    pub answers_finalized: u64,
    pub rounds_purged: u64,
    pub requests_cancelled: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub transport_errors: u64,
    pub errors: u64,
}

pub struct MetricsCollector {
    counters: Counters,
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { counters: Counters::default(), prometheus_handle: init_prometheus_recorder() }
    }

    pub fn record_round_started(&self, providers: usize) {
        self.counters.rounds_started.fetch_add(1, Ordering::Relaxed);
        counter!("oracle_rounds_started_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("oracle_round_providers").record(providers as f64);
    }

    pub fn record_response(&self, outcome: ResponseOutcome) {
        match outcome {
            ResponseOutcome::Recorded => {
                self.counters.responses_recorded.fetch_add(1, Ordering::Relaxed);
            }
            ResponseOutcome::Dropped | ResponseOutcome::Unknown => {
                self.counters.responses_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        counter!("oracle_responses_total", "outcome" => outcome.as_metric_str()).increment(1);
    }

    /// Record a finalization and how long the round took to reach quorum.
    pub fn record_finalized(&self, elapsed: Duration) {
        self.counters.answers_finalized.fetch_add(1, Ordering::Relaxed);
        counter!("oracle_answers_finalized_total").increment(1);
        histogram!("oracle_round_finalize_seconds").record(elapsed.as_secs_f64());
    }

    pub fn record_purged(&self, finalized: bool) {
        self.counters.rounds_purged.fetch_add(1, Ordering::Relaxed);
        let finalized = if finalized { "true" } else { "false" };
        counter!("oracle_rounds_purged_total", "finalized" => finalized).increment(1);
    }

    pub fn record_cancelled(&self) {
        self.counters.requests_cancelled.fetch_add(1, Ordering::Relaxed);
        counter!("oracle_requests_cancelled_total").increment(1);
    }

    pub fn record_action(&self, success: bool) {
        let outcome = if success {
            self.counters.actions_succeeded.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            self.counters.actions_failed.fetch_add(1, Ordering::Relaxed);
            "failure"
        };
        counter!("oracle_actions_total", "outcome" => outcome).increment(1);
    }

    pub fn record_transport_errors(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.counters.transport_errors.fetch_add(count as u64, Ordering::Relaxed);
        counter!("oracle_transport_errors_total").increment(count as u64);
    }

    pub fn record_error(&self, error: &OracleError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        counter!("oracle_errors_total", "kind" => error.as_metric_str()).increment(1);
    }

    pub fn record_open_rounds(&self, count: usize) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("oracle_open_rounds").set(count as f64);
    }

    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let c = &self.counters;
        MetricsSummary {
            rounds_started: c.rounds_started.load(Ordering::Relaxed),
            responses_recorded: c.responses_recorded.load(Ordering::Relaxed),
            responses_dropped: c.responses_dropped.load(Ordering::Relaxed),
            answers_finalized: c.answers_finalized.load(Ordering::Relaxed),
            rounds_purged: c.rounds_purged.load(Ordering::Relaxed),
            requests_cancelled: c.requests_cancelled.load(Ordering::Relaxed),
            actions_succeeded: c.actions_succeeded.load(Ordering::Relaxed),
            actions_failed: c.actions_failed.load(Ordering::Relaxed),
            transport_errors: c.transport_errors.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }

    /// Prometheus exposition text for every metric recorded in this process.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").field("summary", &self.summary()).finish()
    }
}
