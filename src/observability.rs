use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking requests. Labels: outcome (`admitted` or an error label).
pub const ADMISSIONS_TOTAL: &str = "spacebook_admissions_total";

/// Histogram: admission latency in seconds, lock wait included.
pub const ADMISSION_DURATION_SECONDS: &str = "spacebook_admission_duration_seconds";

/// Counter: approve/reject calls. Labels: to, outcome.
pub const TRANSITIONS_TOTAL: &str = "spacebook_transitions_total";

/// Counter: notifications that failed to emit and were discarded.
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "spacebook_notifications_dropped_total";

// ── USE metrics (storage) ───────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "spacebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "spacebook_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "spacebook_wal_compactions_total";

/// Install the fmt subscriber (filtered by `RUST_LOG`, default `info`) and,
/// when a port is given, the Prometheus exporter. Safe to call twice.
pub fn init(metrics_port: Option<u16>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let Some(port) = metrics_port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
