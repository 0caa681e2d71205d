//! Table actor implementation with async message handling.

use super::{
    config::TableConfig,
    messages::{TableEvent, TableMessage, TableResponse},
};
use crate::{
    game::{
        AccountUpdate, GameEvent, RoundEngine, Timer, UserError,
        entities::{Action, Phase, Shoe, TableSnapshot, Usd, Username},
    },
    wallet::AccountStore,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Table actor handle for sending messages
#[derive(Clone)]
pub struct TableHandle {
    sender: mpsc::Sender<TableMessage>,
}

impl TableHandle {
    /// Create a new table handle
    pub fn new(sender: mpsc::Sender<TableMessage>) -> Self {
        Self { sender }
    }

    /// Send a message to the table
    pub async fn send(&self, message: TableMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .await
            .map_err(|_| "Table is closed".to_string())
    }

    /// Send a message built around a fresh responder and wait for the reply
    pub async fn request<F>(&self, make: F) -> Result<TableResponse, String>
    where
        F: FnOnce(oneshot::Sender<TableResponse>) -> TableMessage,
    {
        let (response, reply) = oneshot::channel();
        self.send(make(response)).await?;
        reply
            .await
            .map_err(|_| "Table dropped the request".to_string())
    }

    pub async fn join(&self, player_id: Username, name: String) -> Result<TableResponse, String> {
        self.request(|response| TableMessage::Join {
            player_id,
            name,
            response,
        })
        .await
    }

    pub async fn place_bet(
        &self,
        player_id: Username,
        amount: Usd,
    ) -> Result<TableResponse, String> {
        self.request(|response| TableMessage::PlaceBet {
            player_id,
            amount,
            response,
        })
        .await
    }

    pub async fn take_action(
        &self,
        player_id: Username,
        action: Action,
    ) -> Result<TableResponse, String> {
        self.request(|response| TableMessage::TakeAction {
            player_id,
            action,
            response,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<TableSnapshot, String> {
        let (response, reply) = oneshot::channel();
        self.send(TableMessage::GetSnapshot { response }).await?;
        reply
            .await
            .map_err(|_| "Table dropped the request".to_string())
    }

    /// Register for table events. The current snapshot arrives first.
    pub async fn subscribe(
        &self,
        subscriber_id: Uuid,
        capacity: usize,
    ) -> Result<mpsc::Receiver<TableEvent>, String> {
        let (sender, events) = mpsc::channel(capacity);
        self.send(TableMessage::Subscribe {
            subscriber_id,
            sender,
        })
        .await?;
        Ok(events)
    }
}

/// Table actor owning the round engine of a single blackjack table
pub struct TableActor {
    /// Table configuration
    config: TableConfig,

    /// Round state machine
    engine: RoundEngine,

    /// Message inbox
    inbox: mpsc::Receiver<TableMessage>,

    /// Timers post back through this; they never keep the table alive
    timer_sender: mpsc::WeakSender<TableMessage>,

    /// Balance and history persistence
    store: Arc<dyn AccountStore>,

    /// Is table closed
    is_closed: bool,

    /// Subscribers for table events
    subscribers: HashMap<Uuid, mpsc::Sender<TableEvent>>,
}

impl TableActor {
    /// Create a new table actor
    ///
    /// # Returns
    ///
    /// * `(TableActor, TableHandle)` - Actor and handle for sending messages
    pub fn new(config: TableConfig, store: Arc<dyn AccountStore>) -> (Self, TableHandle) {
        let shoe = Shoe::new(config.num_decks);
        Self::with_shoe(config, store, shoe)
    }

    /// Create a table that deals from `shoe`
    pub fn with_shoe(
        config: TableConfig,
        store: Arc<dyn AccountStore>,
        shoe: Shoe,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::channel(100);

        let actor = Self {
            engine: RoundEngine::with_shoe(config.game_settings(), shoe),
            config,
            inbox,
            timer_sender: sender.downgrade(),
            store,
            is_closed: false,
            subscribers: HashMap::new(),
        };

        (actor, TableHandle::new(sender))
    }

    /// Run the table actor event loop
    pub async fn run(mut self) {
        log::info!(
            "Table '{}' starting ({} seats, {} decks, {} speed)",
            self.config.name,
            self.config.max_seats,
            self.config.num_decks,
            self.config.speed
        );

        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message).await;

            if self.is_closed {
                break;
            }
        }

        log::info!("Table '{}' closed", self.config.name);
    }

    /// Handle a table message
    async fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Join {
                player_id,
                name,
                response,
            } => {
                let result = self.handle_join(player_id, name).await;
                let _ = response.send(result);
            }

            TableMessage::StartBetting {
                player_id,
                response,
            } => {
                let result = self.engine.start_betting(&player_id);
                let _ = response.send(self.apply(result, |()| TableResponse::Success).await);
            }

            TableMessage::PlaceBet {
                player_id,
                amount,
                response,
            } => {
                let result = self.engine.place_bet(&player_id, amount);
                let _ = response.send(self.apply(result, |bet| TableResponse::BetPlaced { bet }).await);
            }

            TableMessage::ConfirmBet {
                player_id,
                response,
            } => {
                let result = self.engine.confirm_bet(&player_id);
                let _ = response.send(self.apply(result, |()| TableResponse::Success).await);
            }

            TableMessage::ClearBet {
                player_id,
                response,
            } => {
                let result = self.engine.clear_bet(&player_id);
                let _ = response.send(
                    self.apply(result, |refunded| TableResponse::BetCleared { refunded })
                        .await,
                );
            }

            TableMessage::TakeAction {
                player_id,
                action,
                response,
            } => {
                let result = self.engine.take_action(&player_id, action);
                let _ = response.send(self.apply(result, |()| TableResponse::Success).await);
            }

            TableMessage::NewRound {
                player_id,
                response,
            } => {
                let result = self.engine.new_round(&player_id);
                let _ = response.send(self.apply(result, |()| TableResponse::Success).await);
            }

            TableMessage::LeaveTable {
                player_id,
                response,
            } => {
                let result = self.engine.leave(&player_id);
                if result.is_ok() {
                    log::info!("{} left table '{}'", player_id, self.config.name);
                }
                let _ = response.send(
                    self.apply(result, |seat| TableResponse::Left {
                        balance: seat.balance,
                    })
                    .await,
                );
            }

            TableMessage::ClaimBonus {
                player_id,
                response,
            } => {
                let result = self.handle_claim_bonus(player_id).await;
                let _ = response.send(result);
            }

            TableMessage::GetSnapshot { response } => {
                let _ = response.send(self.engine.snapshot());
            }

            TableMessage::Subscribe {
                subscriber_id,
                sender,
            } => {
                let snapshot = TableEvent::Snapshot(Arc::new(self.engine.snapshot()));
                if sender.try_send(snapshot).is_ok() {
                    self.subscribers.insert(subscriber_id, sender);
                    log::debug!("{} subscribed to table '{}'", subscriber_id, self.config.name);
                }
            }

            TableMessage::Unsubscribe { subscriber_id } => {
                self.subscribers.remove(&subscriber_id);
                log::debug!(
                    "{} unsubscribed from table '{}'",
                    subscriber_id,
                    self.config.name
                );
            }

            TableMessage::Close { response } => {
                self.handle_close().await;
                let _ = response.send(TableResponse::Success);
            }

            TableMessage::Timer(timer) => match self.engine.fire(timer) {
                Ok(true) => self.publish().await,
                Ok(false) => {}
                Err(e) => {
                    log::error!(
                        "Table '{}': {:?} timer failed: {}",
                        self.config.name,
                        timer.kind,
                        e
                    );
                    self.publish().await;
                }
            },
        }
    }

    /// Turn an engine result into a response, publishing whatever changed.
    ///
    /// A shoe running dry aborts the round inside the engine, so that
    /// rejection still has state to publish.
    async fn apply<T>(
        &mut self,
        result: Result<T, UserError>,
        on_success: impl FnOnce(T) -> TableResponse,
    ) -> TableResponse {
        match result {
            Ok(value) => {
                self.publish().await;
                on_success(value)
            }
            Err(UserError::ShoeExhausted) => {
                self.publish().await;
                TableResponse::Rejected(UserError::ShoeExhausted)
            }
            Err(e) => {
                log::debug!("Table '{}': rejected: {}", self.config.name, e);
                TableResponse::Rejected(e)
            }
        }
    }

    /// Handle join table request
    async fn handle_join(&mut self, player_id: Username, name: String) -> TableResponse {
        if self.engine.table().seat(&player_id).is_some() {
            return UserError::UserAlreadyExists.into();
        }

        let balance = match self.store.get_balance(&player_id).await {
            Ok(balance) => balance,
            Err(e) => {
                log::error!("Failed to load balance for {}: {}", player_id, e);
                return TableResponse::Error(e.client_message());
            }
        };

        let result = self.engine.join(player_id.clone(), &name, balance);
        if let Ok(seat_index) = result {
            log::info!(
                "{} joined table '{}' at seat {} with ${}",
                player_id,
                self.config.name,
                seat_index,
                balance
            );
        }
        self.apply(result, |seat_index| TableResponse::Joined {
            seat_index,
            balance,
        })
        .await
    }

    /// Handle bonus claim, crediting the seat as well if the claimant is seated
    async fn handle_claim_bonus(&mut self, player_id: Username) -> TableResponse {
        let mut claim = match self.store.claim_bonus(&player_id).await {
            Ok(claim) => claim,
            Err(e) => {
                log::info!("Bonus refused for {}: {}", player_id, e);
                return TableResponse::Error(e.client_message());
            }
        };

        if self.engine.table().seat(&player_id).is_some() {
            match self.engine.credit(&player_id, claim.amount) {
                Ok(balance) => claim.balance = balance,
                Err(e) => {
                    log::error!("Failed to credit bonus to seat of {}: {}", player_id, e);
                }
            }
            self.publish().await;
        }
        log::info!(
            "{} claimed ${} bonus ({} left today)",
            player_id,
            claim.amount,
            claim.claims_remaining
        );
        TableResponse::BonusClaimed(claim)
    }

    /// Return every stake and write every balance before shutting down
    async fn handle_close(&mut self) {
        if !matches!(self.engine.phase(), Phase::Lobby | Phase::Settlement) {
            self.engine.abort_round();
        }
        self.engine.flush_balances();
        self.publish().await;
        self.is_closed = true;
    }

    /// Start timers, write accounts and broadcast everything the engine queued
    async fn publish(&mut self) {
        for timer in self.engine.drain_timers() {
            self.schedule(timer);
        }

        for update in self.engine.drain_account_updates() {
            self.persist(update).await;
        }

        for event in self.engine.drain_events() {
            let event = match event {
                GameEvent::Countdown(seconds_left) => TableEvent::Countdown { seconds_left },
                other => TableEvent::Notice(other.to_string()),
            };
            self.broadcast(event);
        }

        let snapshot = Arc::new(self.engine.snapshot());
        self.broadcast(TableEvent::Snapshot(snapshot));
    }

    /// Deliver `timer` back to this actor once its delay has passed
    fn schedule(&self, timer: Timer) {
        let sender = self.timer_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timer.delay).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(TableMessage::Timer(timer)).await;
            }
        });
    }

    /// Store failures are logged; the table keeps its own view of balances.
    async fn persist(&self, update: AccountUpdate) {
        let result = match &update {
            AccountUpdate::SetBalance { player_id, balance } => {
                self.store.set_balance(player_id, *balance).await
            }
            AccountUpdate::RecordResult(result) => self.store.record_round_result(result).await,
        };
        if let Err(e) = result {
            log::error!(
                "Table '{}': failed to persist {:?}: {}",
                self.config.name,
                update,
                e
            );
        }
    }

    /// Broadcast an event to all subscribers
    fn broadcast(&mut self, event: TableEvent) {
        self.subscribers.retain(|subscriber_id, sender| {
            match sender.try_send(event.clone()) {
                Ok(_) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("Subscriber {} channel full, dropping event", subscriber_id);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("Subscriber {} disconnected, removing", subscriber_id);
                    false
                }
            }
        });
    }
}
