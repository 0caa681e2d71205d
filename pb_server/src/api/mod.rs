//! HTTP/WebSocket API for the blackjack server.
//!
//! Play happens over the WebSocket; the HTTP routes are read-only views of
//! the table and of player accounts, plus the daily bonus.
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                               - Server health status
//! GET  /ws?player_id=<id>                    - WebSocket for live play
//! GET  /api/table                            - Current table snapshot
//! GET  /api/accounts/{player_id}             - Balance and statistics
//! GET  /api/accounts/{player_id}/history     - Recent round results
//! POST /api/accounts/{player_id}/bonus       - Claim the daily bonus
//! ```
//!
//! Player identity is taken as given; credential checks belong in front
//! of this server.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use pb_server::api::{create_router, AppState};
//! use private_blackjack::{TableActor, TableConfig, wallet::{AccountPolicy, MemoryAccountStore}};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryAccountStore::new(AccountPolicy::default()));
//! let (actor, table) = TableActor::new(TableConfig::default(), store.clone());
//! tokio::spawn(actor.run());
//!
//! let app = create_router(AppState::new(table, store));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod accounts;
pub mod tables;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use private_blackjack::{AccountStore, TableHandle};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use websocket::ConnectionCounts;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    /// The one table this server hosts
    pub table: TableHandle,
    /// Read-side access to accounts; the table writes through its own handle
    pub store: Arc<dyn AccountStore>,
    /// Open sockets per player
    pub connections: Arc<ConnectionCounts>,
}

impl AppState {
    pub fn new(table: TableHandle, store: Arc<dyn AccountStore>) -> Self {
        Self {
            table,
            store,
            connections: Arc::new(ConnectionCounts::default()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/table", get(tables::get_table))
        .route("/accounts/{player_id}", get(accounts::get_account))
        .route("/accounts/{player_id}/history", get(accounts::get_history))
        .route("/accounts/{player_id}/bonus", post(accounts::claim_bonus));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` while the table actor answers, `503 Service Unavailable`
/// once it has stopped.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","table":{"phase":"Lobby","seats":0,"round":0},...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.table.snapshot().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "table": {
                    "phase": snapshot.phase,
                    "seats": snapshot.seats.len(),
                    "round": snapshot.round_number,
                },
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "version": env!("CARGO_PKG_VERSION"),
                "error": e,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        ),
    }
}
