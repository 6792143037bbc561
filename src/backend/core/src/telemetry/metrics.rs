//! Prometheus metrics.

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::ObservabilityConfig;

/// Install the Prometheus recorder. Returns `None` when metrics are disabled.
pub fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.metrics_enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", "skyreel")
        .install_recorder()?;

    register_metric_descriptions();
    tracing::info!("Metrics initialized");

    Ok(Some(handle))
}

fn register_metric_descriptions() {
    // Jobs
    describe_counter!(
        "skyreel_jobs_total",
        "Clip job invocations by family and outcome"
    );
    describe_counter!("skyreel_commands_total", "Commands handled by name");

    // Watchdogs
    describe_counter!(
        "skyreel_watchdog_failures_total",
        "Problems found by watchdog checks"
    );
    describe_counter!(
        "skyreel_watchdog_restarts_total",
        "Stopped services restarted by a watchdog"
    );
    describe_counter!(
        "skyreel_watchdog_notifications_total",
        "Watchdog emails sent to administrators"
    );

    // Collaborators
    describe_counter!("skyreel_emails_sent_total", "Admin emails delivered");
    describe_counter!("skyreel_errors_total", "Errors by code and category");
}
