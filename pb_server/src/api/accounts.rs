//! Account API handlers.
//!
//! # Examples
//!
//! ```bash
//! curl http://localhost:6969/api/accounts/alice
//! curl http://localhost:6969/api/accounts/alice/history?limit=10
//! curl -X POST http://localhost:6969/api/accounts/alice/bonus
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use private_blackjack::{
    RoundResult, TableMessage, TableResponse, Username,
    wallet::{Account, BonusClaim},
};
use serde::Deserialize;

use super::{ApiError, AppState, api_error};
use crate::logging;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Balance and lifetime statistics. Unknown players are created with the
/// starting balance, matching what joining the table would do.
///
/// # Errors
///
/// - `500 Internal Server Error`: Account store failure
pub async fn get_account(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let player_id = Username::new(&player_id);
    state.store.account(&player_id).await.map(Json).map_err(|e| {
        logging::log_store_error("account", player_id.as_str(), &e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.client_message())
    })
}

/// Most recent settled rounds first, at most `limit` (default 20, capped at 100).
///
/// # Errors
///
/// - `500 Internal Server Error`: Account store failure
pub async fn get_history(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<RoundResult>>, ApiError> {
    let player_id = Username::new(&player_id);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    state
        .store
        .round_history(&player_id, limit)
        .await
        .map(Json)
        .map_err(|e| {
            logging::log_store_error("round_history", player_id.as_str(), &e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.client_message())
        })
}

/// Claim the daily bonus.
///
/// Goes through the table so a seated claimant sees the credit on their seat.
///
/// # Errors
///
/// - `409 Conflict`: No claims left in the current window
/// - `503 Service Unavailable`: The table actor has stopped
pub async fn claim_bonus(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> Result<Json<BonusClaim>, ApiError> {
    let player_id = Username::new(&player_id);
    let response = state
        .table
        .request(|response| TableMessage::ClaimBonus {
            player_id,
            response,
        })
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))?;

    match response {
        TableResponse::BonusClaimed(claim) => Ok(Json(claim)),
        other => Err(api_error(
            StatusCode::CONFLICT,
            other
                .error_message()
                .unwrap_or_else(|| "Unexpected response".to_string()),
        )),
    }
}
