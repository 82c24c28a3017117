use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Requests ────────────────────────────────────────────────────

/// Counter: wire requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "slotdesk_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "slotdesk_request_duration_seconds";

// ── Booking domain ──────────────────────────────────────────────

/// Counter: booking attempts. Labels: outcome (booked or an error kind).
pub const BOOKINGS_TOTAL: &str = "slotdesk_bookings_total";

/// Counter: applied lifecycle transitions. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "slotdesk_transitions_total";

/// Counter: notification deliveries. Labels: outcome (sent, failed, timeout, dropped).
pub const NOTIFICATIONS_TOTAL: &str = "slotdesk_notifications_total";

// ── Connections ─────────────────────────────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "slotdesk_connections_active";

pub const CONNECTIONS_TOTAL: &str = "slotdesk_connections_total";

pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotdesk_connections_rejected_total";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotdesk_wal_flush_duration_seconds";

/// Histogram: records per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotdesk_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `None`.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
