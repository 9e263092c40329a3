//! Observability metrics for the harvesting pipeline
//!
//! Tracks upstream request volume, 429 pressure, retry behavior, and per-zip
//! failures so a long-running deployment can alert before a quarantine hits.
//!
//! - Uses the `metrics` crate for low-overhead collection
//! - Optional Prometheus scrape endpoint via `--metrics-addr`
//! - Emission degrades to no-ops when no recorder is installed

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::harvester::run::HarvestSummary;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Install the Prometheus exporter and register metric descriptions.
///
/// Idempotent; called once at startup when `--metrics-addr` is given.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics exporter on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total HTTP requests issued to the upstream API"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Total 429 rate-limit responses received"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total retry attempts across all requests"
    );
    describe_counter!(
        "zip_failures_total",
        Unit::Count,
        "Zip codes skipped after exhausting retries"
    );
    describe_counter!(
        "harvest_runs_completed_total",
        Unit::Count,
        "Harvest runs that committed a generation"
    );
    describe_gauge!(
        "harvest_unique_stores",
        Unit::Count,
        "Unique stores retained by the most recent run"
    );
    describe_gauge!(
        "harvest_offers",
        Unit::Count,
        "Offers retained by the most recent run"
    );

    *initialized = true;
    Ok(())
}

/// Record one outbound request.
pub fn record_request(endpoint: &str) {
    counter!("http_requests_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a 429 response.
pub fn record_rate_limited(endpoint: &str) {
    counter!("http_429_errors_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a retry attempt.
pub fn record_retry(endpoint: &str) {
    counter!("http_retries_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record a zip code skipped after exhausting retries.
pub fn record_zip_failure(zip: &str) {
    counter!("zip_failures_total", "zip" => zip.to_string()).increment(1);
}

/// Record the outcome of a committed run.
pub fn record_run_completed(summary: &HarvestSummary) {
    counter!("harvest_runs_completed_total").increment(1);
    gauge!("harvest_unique_stores").set(summary.unique_stores as f64);
    gauge!("harvest_offers").set(summary.offers as f64);
}
