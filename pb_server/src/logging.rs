//! Structured logging setup.
//!
//! The library logs through the `log` facade; the subscriber installed here
//! picks those records up alongside the server's own `tracing` events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize logging. `RUST_LOG` overrides the default filter.
///
/// # Example
///
/// ```no_run
/// use pb_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a command the table refused, with the player and the reason
pub fn log_rejected_command(player_id: &str, command: &str, reason: &str) {
    tracing::debug!(
        player_id = player_id,
        command = command,
        reason = reason,
        "Command rejected"
    );
}

/// Log a failed account store call made outside the table actor
pub fn log_store_error(operation: &str, player_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(
        operation = operation,
        player_id = player_id,
        error = %error,
        "Account store error"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_log_helpers_without_subscriber() {
        log_rejected_command("alice", "hit", "not your turn");
        log_store_error("account", "bob", &"connection refused");
    }
}
