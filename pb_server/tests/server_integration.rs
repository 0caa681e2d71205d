//! Integration tests for the HTTP routes.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pb_server::api::{AppState, create_router};
use private_blackjack::{
    TableActor, TableConfig, TableHandle, TableMessage, Username,
    wallet::{AccountPolicy, AccountStore, MemoryAccountStore},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

/// Helper to create a test server around a fresh table and memory store
fn create_test_server() -> (axum::Router, TableHandle, Arc<MemoryAccountStore>) {
    let store = Arc::new(MemoryAccountStore::new(AccountPolicy::default()));
    let (actor, table) = TableActor::new(TableConfig::default(), store.clone());
    tokio::spawn(actor.run());

    let app = create_router(AppState::new(table.clone(), store.clone()));
    (app, table, store)
}

async fn call(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_check_reports_table() {
    let (app, _table, _store) = create_test_server();
    let (status, body) = call(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["table"]["phase"], "Lobby");
    assert_eq!(body["table"]["seats"], 0);
}

#[tokio::test]
async fn test_health_check_after_close() {
    let (app, table, _store) = create_test_server();
    table
        .request(|response| TableMessage::Close { response })
        .await
        .unwrap();
    tokio::task::yield_now().await;

    let (status, body) = call(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_table_snapshot_lists_seats() {
    let (app, table, _store) = create_test_server();
    table
        .join(Username::new("alice"), "Alice".to_string())
        .await
        .unwrap();

    let (status, body) = call(&app, "GET", "/api/table").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "Lobby");
    assert_eq!(body["seats"][0]["player_id"], "alice");
    assert_eq!(body["seats"][0]["display_name"], "Alice");
    assert_eq!(body["seats"][0]["balance"], 1000);
}

#[tokio::test]
async fn test_unknown_account_gets_starting_balance() {
    let (app, _table, _store) = create_test_server();
    let (status, body) = call(&app, "GET", "/api/accounts/newcomer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["player_id"], "newcomer");
    assert_eq!(body["balance"], 1000);
    assert_eq!(body["total_games"], 0);
}

#[tokio::test]
async fn test_history_is_empty_for_new_player() {
    let (app, _table, _store) = create_test_server();
    let (status, body) = call(&app, "GET", "/api/accounts/bob/history?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Array(vec![]));
}

#[tokio::test]
async fn test_bonus_until_daily_limit() {
    let (app, _table, store) = create_test_server();

    for claim in 1..=3 {
        let (status, body) = call(&app, "POST", "/api/accounts/carol/bonus").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], 500);
        assert_eq!(body["claims_in_window"], claim);
    }

    let (status, body) = call(&app, "POST", "/api/accounts/carol/bonus").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Daily bonus limit"));

    let balance = store.get_balance(&Username::new("carol")).await.unwrap();
    assert_eq!(balance, 2500);
}

#[tokio::test]
async fn test_bonus_credits_seated_player() {
    let (app, table, _store) = create_test_server();
    table
        .join(Username::new("dave"), "Dave".to_string())
        .await
        .unwrap();

    let (status, _) = call(&app, "POST", "/api/accounts/dave/bonus").await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = table.snapshot().await.unwrap();
    assert_eq!(snapshot.seats[0].balance, 1500);
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _table, _store) = create_test_server();
    let (status, _) = call(&app, "GET", "/api/tables/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
