//! Prometheus metrics for the blackjack server.
//!
//! Metrics are exposed in Prometheus text format at `http://<METRICS_BIND>/metrics`
//! when a metrics address is configured. Without an installed recorder every
//! helper here is a no-op.
//!
//! # Metrics
//!
//! - `websocket_connections_active` / `websocket_connections_total`
//! - `websocket_messages_received` / `websocket_messages_sent`
//! - `commands_rejected_total{command}`
//! - `rounds_settled_total`, `seated_players`

use metrics_exporter_prometheus::PrometheusBuilder;
use private_blackjack::{Phase, TableEvent};
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// A client connected.
pub fn websocket_connected() {
    metrics::counter!("websocket_connections_total").increment(1);
    metrics::gauge!("websocket_connections_active").increment(1.0);
}

/// A client went away.
pub fn websocket_disconnected() {
    metrics::gauge!("websocket_connections_active").decrement(1.0);
}

/// Increment WebSocket messages received counter.
pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

/// Increment WebSocket messages sent counter.
pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

// ============================================================================
// Game Metrics
// ============================================================================

/// The table refused a client command.
pub fn commands_rejected_total(command: &'static str) {
    metrics::counter!("commands_rejected_total", "command" => command).increment(1);
}

pub fn rounds_settled_total() {
    metrics::counter!("rounds_settled_total").increment(1);
}

pub fn seated_players(count: usize) {
    metrics::gauge!("seated_players").set(count as f64);
}

/// Follow a table's event stream and record game metrics until it closes.
///
/// Returns the number of settled rounds seen.
pub async fn track_table(mut events: mpsc::Receiver<TableEvent>) -> u64 {
    let mut settled = 0;
    let mut last_settled_round = None;

    while let Some(event) = events.recv().await {
        let TableEvent::Snapshot(snapshot) = event else {
            continue;
        };
        seated_players(snapshot.seats.len());
        if snapshot.phase == Phase::Settlement
            && last_settled_round != Some(snapshot.round_number)
        {
            last_settled_round = Some(snapshot.round_number);
            settled += 1;
            rounds_settled_total();
        }
    }

    settled
}
