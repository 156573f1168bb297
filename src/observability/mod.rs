//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reconciler passes, reload steps, admin requests
//!     → logging.rs (tracing subscriber: fmt or JSON on stdout)
//!     → metrics.rs (event/pass/reload counters, registry gauges)
//!         → Prometheus exporter when `observability.metrics_enabled`
//! ```
//!
//! # Design Decisions
//! - Log lines carry service, source and fingerprint as fields, not prose
//! - The generated monitoring password is logged once, at generation

pub mod logging;
pub mod metrics;
