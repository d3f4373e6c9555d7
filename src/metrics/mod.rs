//! Prometheus metrics for the spawner.
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`install_exporter`] has installed a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

pub const SPAWNS_TOTAL: &str = "swarmspawn_spawns_total";
pub const STOPS_TOTAL: &str = "swarmspawn_stops_total";
pub const TRANSIENT_ERRORS_TOTAL: &str = "swarmspawn_transient_errors_total";
pub const SPAWN_SECONDS: &str = "swarmspawn_spawn_seconds";

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Installs the global recorder with an HTTP scrape listener on `listen`.
/// Later calls are no-ops.
pub fn install_exporter(listen: SocketAddr) -> anyhow::Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus exporter on {listen}: {e}"))?;
    let _ = INSTALLED.set(listen);

    describe_counter!(SPAWNS_TOTAL, Unit::Count, "Start calls by outcome");
    describe_counter!(STOPS_TOTAL, Unit::Count, "Stop calls by outcome");
    describe_counter!(
        TRANSIENT_ERRORS_TOTAL,
        Unit::Count,
        "Orchestrator errors retried while polling"
    );
    describe_histogram!(SPAWN_SECONDS, Unit::Seconds, "Time from start request to ready endpoint");

    info!(
        component = "metrics",
        event = "exporter_installed",
        listen = %listen,
        "prometheus exporter listening"
    );
    Ok(())
}

/// Counts a finished start; successful ones also feed the latency histogram.
pub fn record_spawn(outcome: &'static str, elapsed: Duration) {
    counter!(SPAWNS_TOTAL, "outcome" => outcome).increment(1);
    if outcome == "ready" {
        histogram!(SPAWN_SECONDS).record(elapsed.as_secs_f64());
    }
}

pub fn record_stop(outcome: &'static str) {
    counter!(STOPS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn add_transient_errors(value: u64) {
    counter!(TRANSIENT_ERRORS_TOTAL).increment(value);
}
