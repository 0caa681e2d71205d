//! Table view handler.
//!
//! ```bash
//! curl http://localhost:6969/api/table
//! ```

use axum::{Json, extract::State, http::StatusCode};
use private_blackjack::TableSnapshot;

use super::{ApiError, AppState, api_error};

/// Current table snapshot, hole card hidden.
///
/// # Errors
///
/// - `503 Service Unavailable`: The table actor has stopped
pub async fn get_table(State(state): State<AppState>) -> Result<Json<TableSnapshot>, ApiError> {
    state
        .table
        .snapshot()
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))
}
