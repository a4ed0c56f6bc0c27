use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations applied. Labels: op.
pub const OPS_TOTAL: &str = "slotbook_ops_total";

/// Counter: booking requests refused at admission. Labels: reason.
pub const REQUESTS_REFUSED_TOTAL: &str = "slotbook_requests_refused_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: instructor calendars on the ledger.
pub const CALENDARS_ACTIVE: &str = "slotbook_calendars_active";

/// Counter: lessons swept to completed by the reaper.
pub const LESSONS_COMPLETED_TOTAL: &str = "slotbook_lessons_completed_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install the fmt tracing subscriber. Call once at process start,
/// before opening the scheduler.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map an admission refusal to a short label for metrics.
pub fn refusal_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::CapacityExceeded { .. } => "capacity_exceeded",
        EngineError::SlotClosed { .. } => "slot_closed",
        EngineError::OutOfHorizon { .. } => "out_of_horizon",
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::InvalidState { .. } => "invalid_state",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::WalError(_) => "wal_error",
    }
}
