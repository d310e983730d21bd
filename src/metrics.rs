//! Prometheus recorder setup and the `/metrics` exposition route. The
//! counters themselves are emitted from the scheduler; this module installs
//! the recorder, documents the series, and publishes the static batch-cap
//! gauge so dashboards can show utilization against the cap.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init(batch_cap: usize) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!("nurture_cycles_total", "Batch cycles started");
        describe_counter!("nurture_sends_total", "Outbound messages delivered");
        describe_counter!(
            "nurture_policy_blocks_total",
            "Actions rejected by a hard validation rule"
        );
        describe_counter!(
            "nurture_repetition_blocks_total",
            "Messages blocked as near-duplicates of recent history"
        );
        describe_counter!("nurture_escalations_total", "Leads escalated to a human");
        describe_counter!(
            "nurture_lead_errors_total",
            "Per-lead failures contained by the batch runner"
        );
        describe_gauge!("nurture_last_cycle_ts", "Unix time of the last batch cycle");
        describe_gauge!("nurture_batch_cap", "Configured per-cycle lead cap");

        gauge!("nurture_batch_cap").set(batch_cap as f64);

        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
