//! Metrics collection and exposition.
//!
//! # Metrics
//! - `reconciler_events_total` (counter): events received, by kind
//! - `reconciler_passes_total` (counter): passes by outcome
//! - `reconciler_pass_duration_seconds` (histogram): time per pass
//! - `reconciler_reloads_total` (counter): apply attempts by result
//! - `reconciler_backends` (gauge): registry size
//! - `reconciler_orphaned_backends` (gauge): backends targeting unknown services
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event(kind: &'static str) {
    counter!("reconciler_events_total", "kind" => kind).increment(1);
}

pub fn record_pass(outcome: &'static str, started: Instant) {
    counter!("reconciler_passes_total", "outcome" => outcome).increment(1);
    histogram!("reconciler_pass_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_reload(result: &'static str) {
    counter!("reconciler_reloads_total", "result" => result).increment(1);
}

pub fn record_backends(total: usize, orphaned: usize) {
    gauge!("reconciler_backends").set(total as f64);
    gauge!("reconciler_orphaned_backends").set(orphaned as f64);
}
