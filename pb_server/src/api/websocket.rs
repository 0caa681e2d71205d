//! WebSocket handler for live play.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws?player_id=<id>`
//! 2. The connection subscribes to the table; the current snapshot arrives first
//! 3. Table events and command responses are pushed as they happen
//! 4. On disconnect the subscription is dropped; the player leaves the table
//!    once their last open connection closes
//!
//! # Client Messages
//!
//! ```json
//! {"type": "join", "name": "Alice"}
//! {"type": "start_betting"}
//! {"type": "place_bet", "amount": 25}
//! {"type": "confirm_bet"}
//! {"type": "clear_bet"}
//! {"type": "hit"} / {"type": "stand"} / {"type": "double"} / {"type": "split"}
//! {"type": "new_round"}
//! {"type": "leave"}
//! {"type": "claim_bonus"}
//! ```
//!
//! # Server Messages
//!
//! - `game_state`: full table snapshot after every change
//! - `betting_timer`: one betting countdown tick
//! - `notification`: human-readable table event
//! - `success` / `error`: reply to the client's own command
//!
//! # Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:6969/ws?player_id=alice');
//! ws.onopen = () => ws.send(JSON.stringify({ type: "join", name: "Alice" }));
//! ws.onmessage = (event) => {
//!   const data = JSON.parse(event.data);
//!   if (data.type === "game_state") renderTable(data.state);
//! };
//! ```

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use private_blackjack::{
    Action, TableEvent, TableMessage, TableResponse, TableSnapshot, Usd, Username,
    wallet::BonusClaim,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::AppState;
use crate::{logging, metrics};

/// Capacity of the per-connection event queue
const EVENT_BUFFER: usize = 64;

/// Open WebSocket connections per player.
///
/// A player may hold more than one socket; the seat is only given up when
/// the last one closes.
#[derive(Debug, Default)]
pub struct ConnectionCounts {
    open: Mutex<HashMap<Username, usize>>,
}

impl ConnectionCounts {
    /// Register a connection. Returns how many the player now has open.
    pub fn open(&self, player_id: &Username) -> usize {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        let count = open.entry(player_id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop a connection. Returns `true` when it was the player's last one.
    pub fn close(&self, player_id: &Username) -> bool {
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        match open.get_mut(player_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                open.remove(player_id);
                true
            }
            None => true,
        }
    }

    #[must_use]
    pub fn count(&self, player_id: &Username) -> usize {
        self.open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(player_id)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    player_id: String,
}

/// Client messages received via WebSocket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat; the display name defaults to the player id
    Join { name: Option<String> },
    StartBetting,
    PlaceBet { amount: Usd },
    ConfirmBet,
    ClearBet,
    Hit,
    Stand,
    Double,
    Split,
    NewRound,
    Leave,
    ClaimBonus,
}

impl ClientMessage {
    /// Short name used for logs and metric labels
    pub fn command(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::StartBetting => "start_betting",
            ClientMessage::PlaceBet { .. } => "place_bet",
            ClientMessage::ConfirmBet => "confirm_bet",
            ClientMessage::ClearBet => "clear_bet",
            ClientMessage::Hit => "hit",
            ClientMessage::Stand => "stand",
            ClientMessage::Double => "double",
            ClientMessage::Split => "split",
            ClientMessage::NewRound => "new_round",
            ClientMessage::Leave => "leave",
            ClientMessage::ClaimBonus => "claim_bonus",
        }
    }
}

/// Messages sent to the client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState { state: Arc<TableSnapshot> },
    BettingTimer { seconds_left: u32 },
    Notification { message: String },
    Success { message: String },
    Joined { seat_index: usize, balance: Usd },
    BonusClaimed { claim: BonusClaim },
    Error { message: String },
}

impl From<TableEvent> for ServerMessage {
    fn from(event: TableEvent) -> Self {
        match event {
            TableEvent::Snapshot(state) => ServerMessage::GameState { state },
            TableEvent::Countdown { seconds_left } => ServerMessage::BettingTimer { seconds_left },
            TableEvent::Notice(message) => ServerMessage::Notification { message },
        }
    }
}

impl From<TableResponse> for ServerMessage {
    fn from(response: TableResponse) -> Self {
        match response {
            TableResponse::Success => ServerMessage::Success {
                message: "OK".to_string(),
            },
            TableResponse::Joined {
                seat_index,
                balance,
            } => ServerMessage::Joined {
                seat_index,
                balance,
            },
            TableResponse::BetPlaced { bet } => ServerMessage::Success {
                message: format!("Bet is now ${bet}"),
            },
            TableResponse::BetCleared { refunded } => ServerMessage::Success {
                message: format!("Returned ${refunded}"),
            },
            TableResponse::Left { balance } => ServerMessage::Success {
                message: format!("Left the table with ${balance}"),
            },
            TableResponse::BonusClaimed(claim) => ServerMessage::BonusClaimed { claim },
            TableResponse::Rejected(e) => ServerMessage::Error {
                message: e.to_string(),
            },
            TableResponse::Error(message) => ServerMessage::Error { message },
        }
    }
}

/// Upgrade HTTP connection to WebSocket for live play.
///
/// Returns `400 Bad Request` when `player_id` is blank.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let player_id = Username::new(&query.player_id);
    if player_id.as_str().is_empty() {
        return (StatusCode::BAD_REQUEST, "player_id is required").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, player_id, state))
}

/// Handle an established WebSocket connection.
///
/// Table events and command responses share one outgoing task so frames
/// are never interleaved.
async fn handle_socket(socket: WebSocket, player_id: Username, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let subscriber_id = Uuid::new_v4();

    let open = state.connections.open(&player_id);
    info!("WebSocket connected: player={} connections={}", player_id, open);
    metrics::websocket_connected();

    let mut events = match state.table.subscribe(subscriber_id, EVENT_BUFFER).await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to subscribe {} to the table: {}", player_id, e);
            state.connections.close(&player_id);
            metrics::websocket_disconnected();
            return;
        }
    };

    let (response_tx, mut response_rx) = mpsc::channel::<ServerMessage>(32);

    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(event) = events.recv() => ServerMessage::from(event),
                Some(response) = response_rx.recv() => response,
                else => break,
            };

            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            metrics::websocket_messages_sent();
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => handle_client_message(client_msg, &player_id, &state).await,
                    Err(e) => {
                        warn!("Failed to parse message from {}: {}", player_id, e);
                        ServerMessage::Error {
                            message: "Invalid message format".to_string(),
                        }
                    }
                };

                if response_tx.send(response).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket close frame from {}", player_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error for {}: {}", player_id, e);
                break;
            }
            _ => {}
        }
    }

    send_task.abort();

    let _ = state
        .table
        .send(TableMessage::Unsubscribe { subscriber_id })
        .await;

    leave_on_disconnect(&player_id, &state).await;

    metrics::websocket_disconnected();
    info!("WebSocket disconnected: player={}", player_id);
}

/// Release one connection and give up the seat if no other connection for
/// the same player is still open. Returns the balance the player left with.
pub async fn leave_on_disconnect(player_id: &Username, state: &AppState) -> Option<Usd> {
    if !state.connections.close(player_id) {
        debug!("{} still has open connections; keeping the seat", player_id);
        return None;
    }

    // Best effort: the player may never have taken a seat.
    match state
        .table
        .request(|response| TableMessage::LeaveTable {
            player_id: player_id.clone(),
            response,
        })
        .await
    {
        Ok(TableResponse::Left { balance }) => {
            info!("{} left the table on disconnect with ${}", player_id, balance);
            Some(balance)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to leave table for {} on disconnect: {}", player_id, e);
            None
        }
    }
}

/// Forward one client command to the table and turn the reply into a message.
pub async fn handle_client_message(
    msg: ClientMessage,
    player_id: &Username,
    state: &AppState,
) -> ServerMessage {
    let command = msg.command();
    let player_id = player_id.clone();

    let result = match msg {
        ClientMessage::Join { name } => {
            let name = name.unwrap_or_else(|| player_id.to_string());
            state.table.join(player_id.clone(), name).await
        }
        ClientMessage::StartBetting => {
            state
                .table
                .request(|response| TableMessage::StartBetting {
                    player_id: player_id.clone(),
                    response,
                })
                .await
        }
        ClientMessage::PlaceBet { amount } => state.table.place_bet(player_id.clone(), amount).await,
        ClientMessage::ConfirmBet => {
            state
                .table
                .request(|response| TableMessage::ConfirmBet {
                    player_id: player_id.clone(),
                    response,
                })
                .await
        }
        ClientMessage::ClearBet => {
            state
                .table
                .request(|response| TableMessage::ClearBet {
                    player_id: player_id.clone(),
                    response,
                })
                .await
        }
        ClientMessage::Hit => state.table.take_action(player_id.clone(), Action::Hit).await,
        ClientMessage::Stand => state.table.take_action(player_id.clone(), Action::Stand).await,
        ClientMessage::Double => state.table.take_action(player_id.clone(), Action::Double).await,
        ClientMessage::Split => state.table.take_action(player_id.clone(), Action::Split).await,
        ClientMessage::NewRound => {
            state
                .table
                .request(|response| TableMessage::NewRound {
                    player_id: player_id.clone(),
                    response,
                })
                .await
        }
        ClientMessage::Leave => {
            state
                .table
                .request(|response| TableMessage::LeaveTable {
                    player_id: player_id.clone(),
                    response,
                })
                .await
        }
        ClientMessage::ClaimBonus => {
            state
                .table
                .request(|response| TableMessage::ClaimBonus {
                    player_id: player_id.clone(),
                    response,
                })
                .await
        }
    };

    match result {
        Ok(response) => {
            if let Some(reason) = response.error_message() {
                metrics::commands_rejected_total(command);
                logging::log_rejected_command(player_id.as_str(), command, &reason);
            }
            response.into()
        }
        Err(e) => {
            error!("Table unavailable for {} ({}): {}", player_id, command, e);
            ServerMessage::Error { message: e }
        }
    }
}
