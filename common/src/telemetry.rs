// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge, histogram};
use metrics::describe_histogram;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

/// Initialize structured logging.
///
/// Log levels come from `RUST_LOG` when set, otherwise from configuration.
/// JSON output is opt-in for log aggregation; the plain formatter stays the
/// default for operators reading a terminal.
pub fn init_logging(log_level: &str, json_logs: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let registry = tracing_subscriber::registry();
    if json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_filter(env_filter),
            )
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_filter(env_filter))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level = log_level, json_logs = json_logs, "Logging initialized");
    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe all metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "execution_completed_total",
        "Total number of completed per-host executions"
    );
    describe_counter!(
        "execution_failed_total",
        "Total number of failed per-host executions"
    );
    describe_histogram!(
        "execution_duration_seconds",
        "Duration of per-host executions in seconds"
    );
    describe_counter!(
        "distribution_transfer_total",
        "Total number of per-host file transfers by outcome"
    );
    describe_gauge!("hosts_online", "Number of hosts last observed online");

    tracing::info!(metrics_port = metrics_port, "Prometheus metrics exporter initialized");
    Ok(())
}

#[inline]
pub fn record_execution_completed(host_id: &Uuid) {
    counter!("execution_completed_total", "host_id" => host_id.to_string()).increment(1);
}

#[inline]
pub fn record_execution_failed(host_id: &Uuid) {
    counter!("execution_failed_total", "host_id" => host_id.to_string()).increment(1);
}

#[inline]
pub fn record_execution_duration(duration_seconds: f64) {
    histogram!("execution_duration_seconds").record(duration_seconds);
}

#[inline]
pub fn record_transfer_outcome(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("distribution_transfer_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn set_hosts_online(count: usize) {
    gauge!("hosts_online").set(count as f64);
}
