//! Blackjack round state machine.
//!
//! The [`RoundEngine`] is the only thing that mutates a [`Table`]. It is
//! synchronous: every call either applies completely or returns a
//! [`UserError`] without touching state. Work that has to happen later
//! (countdown ticks, dealing, pacing between turns, dealer draws) is queued
//! as a [`Timer`] that the owner must deliver back through
//! [`RoundEngine::fire`] once its delay has elapsed. Balance writes and
//! round history are queued as [`AccountUpdate`]s for the owner to persist.

use chrono::Utc;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, time::Duration};
use thiserror::Error;
use uuid::Uuid;

use super::{
    constants::{
        BLACKJACK, DEALER_STANDS_ON, DEFAULT_BETTING_WINDOW_SECS, DEFAULT_NUM_DECKS,
        DEFAULT_PACE_MS, MAX_BET, MAX_SEATS, MAX_USER_INPUT_LENGTH, MIN_BET,
    },
    entities::{
        Action, Card, Hand, Phase, SeatIndex, Shoe, ShoeView, TableSnapshot, Usd, Username,
    },
    functional,
    settlement::{Outcome, RoundResult, settle_seat},
    table::{Seat, Table},
};

/// Errors that can occur during user operations
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum UserError {
    #[error("table is full")]
    CapacityReached,
    #[error("round already in progress")]
    GameAlreadyInProgress,
    #[error("already seated")]
    UserAlreadyExists,
    #[error("not seated at this table")]
    UserDoesNotExist,
    #[error("need at least one seated player")]
    NotEnoughPlayers,
    #[error("not allowed during {0}")]
    WrongPhase(Phase),
    #[error("not your turn")]
    OutOfTurnAction,
    #[error("invalid action")]
    InvalidAction,
    #[error("bet must be a positive amount")]
    InvalidBet,
    #[error("minimum bet is ${min}")]
    BetTooSmall { min: Usd },
    #[error("maximum bet is ${max}")]
    BetTooLarge { max: Usd },
    #[error("need ${required}, have ${available}")]
    InsufficientFunds { required: Usd, available: Usd },
    #[error("bet already confirmed")]
    BetAlreadyConfirmed,
    #[error("not playing this round")]
    UserNotPlaying,
    #[error("invalid game state: shoe exhausted")]
    ShoeExhausted,
    #[error("invalid game state: internal consistency error")]
    InternalStateError,
}

/// Events that occur during gameplay
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum GameEvent {
    Joined(String),
    Left(String),
    BettingOpened { seconds: u32 },
    Countdown(u32),
    BetConfirmed(String, Usd),
    SatOut(String),
    BettingClosed { players: usize },
    Reshuffled,
    Blackjack(String),
    Acted(String, Action),
    Busted(String),
    DealerReveals(u8),
    DealerDraws(u8),
    DealerBusts(u8),
    Settled(String, String),
    RoundAborted,
    Credited(String, Usd),
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Joined(name) => format!("{name} joined the table"),
            Self::Left(name) => format!("{name} left the table"),
            Self::BettingOpened { seconds } => format!("place your bets ({seconds}s)"),
            Self::Countdown(seconds) => format!("{seconds}s left to bet"),
            Self::BetConfirmed(name, amount) => format!("{name} confirmed ${amount}"),
            Self::SatOut(name) => format!("{name} sits out this round"),
            Self::BettingClosed { players } => format!("bets closed, dealing to {players}"),
            Self::Reshuffled => "shoe reshuffled".to_string(),
            Self::Blackjack(name) => format!("{name} has blackjack"),
            Self::Acted(name, action) => format!("{name} {action}"),
            Self::Busted(name) => format!("{name} busts"),
            Self::DealerReveals(total) => format!("dealer reveals {total}"),
            Self::DealerDraws(total) => format!("dealer draws to {total}"),
            Self::DealerBusts(total) => format!("dealer busts with {total}"),
            Self::Settled(name, label) => format!("{name}: {label}"),
            Self::RoundAborted => "round aborted, bets returned".to_string(),
            Self::Credited(name, amount) => format!("{name} received ${amount}"),
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TimerKind {
    BettingTick,
    DealCards,
    AdvanceTurn,
    DealerDraw,
    Settle,
}

/// A follow-up command to deliver after `delay`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timer {
    pub token: u64,
    pub kind: TimerKind,
    pub delay: Duration,
}

/// Writes the account store has to see.
#[derive(Clone, Debug, PartialEq)]
pub enum AccountUpdate {
    SetBalance { player_id: Username, balance: Usd },
    RecordResult(RoundResult),
}

/// Game configuration settings
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameSettings {
    pub max_seats: usize,
    pub num_decks: usize,
    pub min_bet: Usd,
    pub max_bet: Usd,
    pub betting_window_secs: u32,
    /// Delay between automatic steps. Standing waits half of it.
    pub pace: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_seats: MAX_SEATS,
            num_decks: DEFAULT_NUM_DECKS,
            min_bet: MIN_BET,
            max_bet: MAX_BET,
            betting_window_secs: DEFAULT_BETTING_WINDOW_SECS,
            pace: Duration::from_millis(DEFAULT_PACE_MS),
        }
    }
}

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RoundEngine {
    table: Table,
    settings: GameSettings,
    round_id: Uuid,
    /// The active hand finished and the turn moves on once the pending
    /// `AdvanceTurn` timer fires.
    awaiting_advance: bool,
    events: VecDeque<GameEvent>,
    timers: VecDeque<Timer>,
    account_updates: VecDeque<AccountUpdate>,
}

impl Default for RoundEngine {
    fn default() -> Self {
        Self::new(GameSettings::default())
    }
}

impl RoundEngine {
    #[must_use]
    pub fn new(settings: GameSettings) -> Self {
        let shoe = Shoe::new(settings.num_decks);
        Self::with_shoe(settings, shoe)
    }

    #[must_use]
    pub fn with_shoe(settings: GameSettings, shoe: Shoe) -> Self {
        Self {
            table: Table::new(settings.max_seats, shoe),
            settings,
            round_id: Uuid::new_v4(),
            awaiting_advance: false,
            events: VecDeque::new(),
            timers: VecDeque::new(),
            account_updates: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    #[must_use]
    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.table.phase
    }

    #[must_use]
    pub fn round_token(&self) -> u64 {
        self.table.round_token
    }

    #[must_use]
    pub fn is_awaiting_advance(&self) -> bool {
        self.awaiting_advance
    }

    pub fn drain_events(&mut self) -> VecDeque<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_timers(&mut self) -> VecDeque<Timer> {
        std::mem::take(&mut self.timers)
    }

    pub fn drain_account_updates(&mut self) -> VecDeque<AccountUpdate> {
        std::mem::take(&mut self.account_updates)
    }

    #[must_use]
    pub fn snapshot(&self) -> TableSnapshot {
        let table = &self.table;
        let betting = table.phase == Phase::Betting;
        TableSnapshot {
            round_number: table.round_number,
            phase: table.phase,
            seats: table.seats.iter().map(Seat::view).collect(),
            active_seat_index: (table.phase == Phase::PlayerTurns)
                .then_some(table.active_seat_index),
            dealer: (&table.dealer_hand).into(),
            shoe: ShoeView {
                remaining: table.shoe.remaining(),
                drawn: table.shoe.drawn(),
                total: table.shoe.total(),
            },
            betting_time_left: betting.then_some(table.betting_time_left),
            betting_deadline: if betting { table.betting_deadline } else { None },
        }
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.timers.push_back(Timer {
            token: self.table.round_token,
            kind,
            delay,
        });
    }

    fn require_phase(&self, phase: Phase) -> Result<(), UserError> {
        if self.table.phase == phase {
            Ok(())
        } else {
            Err(UserError::WrongPhase(self.table.phase))
        }
    }

    fn seat_mut(&mut self, player_id: &Username) -> Result<&mut Seat, UserError> {
        self.table
            .seat_mut(player_id)
            .ok_or(UserError::UserDoesNotExist)
    }

    fn draw(&mut self) -> Result<Card, UserError> {
        self.table.shoe.draw().map_err(|e| {
            error!("Round {}: {}", self.table.round_number, e);
            UserError::ShoeExhausted
        })
    }

    fn ensure_cards(&self, needed: usize) -> Result<(), UserError> {
        if self.table.shoe.remaining() < needed {
            error!(
                "Round {}: need {} cards, shoe has {}",
                self.table.round_number,
                needed,
                self.table.shoe.remaining()
            );
            return Err(UserError::ShoeExhausted);
        }
        Ok(())
    }

    fn set_balance_update(&mut self, seat_idx: SeatIndex) {
        let seat = &self.table.seats[seat_idx];
        self.account_updates.push_back(AccountUpdate::SetBalance {
            player_id: seat.player_id.clone(),
            balance: seat.balance,
        });
    }

    // === Seating ===

    pub fn join(
        &mut self,
        player_id: Username,
        display_name: &str,
        balance: Usd,
    ) -> Result<SeatIndex, UserError> {
        let display_name: String = display_name
            .trim()
            .chars()
            .take(MAX_USER_INPUT_LENGTH)
            .collect();
        let display_name = if display_name.is_empty() {
            player_id.to_string()
        } else {
            display_name
        };
        let idx = self
            .table
            .add_seat(player_id, display_name.clone(), balance)?;
        self.events.push_back(GameEvent::Joined(display_name));
        Ok(idx)
    }

    /// Remove a seat in any phase.
    ///
    /// An unconfirmed bet goes back to the balance. A confirmed bet, or the
    /// stake of a dealt hand, is forfeited and recorded as such.
    pub fn leave(&mut self, player_id: &Username) -> Result<Seat, UserError> {
        let phase = self.table.phase;
        let (idx, seat) = self.table.remove_seat(player_id)?;

        let committed = (phase == Phase::Betting && seat.bet_confirmed)
            || (phase.is_mid_round() && seat.in_round);
        if committed {
            let stake = seat.stake();
            self.account_updates
                .push_back(AccountUpdate::RecordResult(RoundResult {
                    round_id: self.round_id,
                    round_number: self.table.round_number,
                    player_id: seat.player_id.clone(),
                    bet: stake,
                    payout: 0,
                    net: -i64::from(stake),
                    outcome: Outcome::Forfeit,
                    settled_at: Utc::now(),
                }));
        }
        self.account_updates.push_back(AccountUpdate::SetBalance {
            player_id: seat.player_id.clone(),
            balance: seat.balance,
        });
        self.events
            .push_back(GameEvent::Left(seat.display_name.clone()));

        match phase {
            Phase::Betting => {
                if self.table.seats.is_empty() || self.all_bets_confirmed() {
                    self.close_betting();
                }
            }
            Phase::PlayerTurns => {
                if idx < self.table.active_seat_index {
                    self.table.active_seat_index -= 1;
                } else if idx == self.table.active_seat_index {
                    // Whoever slid into this index plays next; any pending
                    // advance belonged to the departed seat.
                    self.table.bump_token();
                    self.awaiting_advance = false;
                    self.begin_turns_from(idx);
                }
            }
            Phase::Settlement if self.table.seats.is_empty() => {
                self.table.set_phase(Phase::Lobby);
            }
            _ => {}
        }
        Ok(seat)
    }

    /// Add money to a seated player outside of settlement.
    pub fn credit(&mut self, player_id: &Username, amount: Usd) -> Result<Usd, UserError> {
        let seat = self.seat_mut(player_id)?;
        seat.balance = seat.balance.saturating_add(amount);
        let balance = seat.balance;
        let name = seat.display_name.clone();
        self.events.push_back(GameEvent::Credited(name, amount));
        Ok(balance)
    }

    // === Betting ===

    pub fn start_betting(&mut self, player_id: &Username) -> Result<(), UserError> {
        self.require_phase(Phase::Lobby)?;
        if self.table.seats.is_empty() {
            return Err(UserError::NotEnoughPlayers);
        }
        if self.table.seat_index(player_id).is_none() {
            return Err(UserError::UserDoesNotExist);
        }
        self.enter_betting();
        Ok(())
    }

    pub fn new_round(&mut self, player_id: &Username) -> Result<(), UserError> {
        self.require_phase(Phase::Settlement)?;
        if self.table.seat_index(player_id).is_none() {
            return Err(UserError::UserDoesNotExist);
        }
        self.enter_betting();
        Ok(())
    }

    fn enter_betting(&mut self) {
        let table = &mut self.table;
        if table.shoe.is_empty() || table.shoe.needs_reshuffle() {
            table.shoe.reshuffle();
            self.events.push_back(GameEvent::Reshuffled);
        }
        for seat in &mut table.seats {
            seat.reset();
        }
        table.dealer_hand = Hand::new();
        table.active_seat_index = 0;
        table.round_number += 1;
        table.betting_time_left = self.settings.betting_window_secs;
        table.betting_deadline = Some(
            Utc::now() + chrono::Duration::seconds(i64::from(self.settings.betting_window_secs)),
        );
        table.set_phase(Phase::Betting);
        self.round_id = Uuid::new_v4();
        self.awaiting_advance = false;
        info!(
            "Round {} betting opened for {} seat(s)",
            self.table.round_number,
            self.table.seats.len()
        );
        self.events.push_back(GameEvent::BettingOpened {
            seconds: self.settings.betting_window_secs,
        });
        self.schedule(TimerKind::BettingTick, TICK);
    }

    pub fn place_bet(&mut self, player_id: &Username, amount: Usd) -> Result<Usd, UserError> {
        self.require_phase(Phase::Betting)?;
        let max_bet = self.settings.max_bet;
        let seat = self.seat_mut(player_id)?;
        if seat.bet_confirmed {
            return Err(UserError::BetAlreadyConfirmed);
        }
        if amount == 0 {
            return Err(UserError::InvalidBet);
        }
        if amount > seat.balance {
            return Err(UserError::InsufficientFunds {
                required: amount,
                available: seat.balance,
            });
        }
        if seat.bet.saturating_add(amount) > max_bet {
            return Err(UserError::BetTooLarge { max: max_bet });
        }
        seat.bet += amount;
        seat.balance -= amount;
        Ok(seat.bet)
    }

    pub fn confirm_bet(&mut self, player_id: &Username) -> Result<(), UserError> {
        self.require_phase(Phase::Betting)?;
        let min_bet = self.settings.min_bet;
        let idx = self
            .table
            .seat_index(player_id)
            .ok_or(UserError::UserDoesNotExist)?;
        let seat = &mut self.table.seats[idx];
        if seat.bet_confirmed {
            return Err(UserError::BetAlreadyConfirmed);
        }
        if seat.bet < min_bet {
            return Err(UserError::BetTooSmall { min: min_bet });
        }
        seat.bet_confirmed = true;
        self.events.push_back(GameEvent::BetConfirmed(
            seat.display_name.clone(),
            seat.bet,
        ));
        self.set_balance_update(idx);
        if self.all_bets_confirmed() {
            self.close_betting();
        }
        Ok(())
    }

    pub fn clear_bet(&mut self, player_id: &Username) -> Result<Usd, UserError> {
        self.require_phase(Phase::Betting)?;
        let seat = self.seat_mut(player_id)?;
        if seat.bet_confirmed {
            return Err(UserError::BetAlreadyConfirmed);
        }
        Ok(seat.refund_pending_bet())
    }

    fn all_bets_confirmed(&self) -> bool {
        !self.table.seats.is_empty() && self.table.seats.iter().all(|s| s.bet_confirmed)
    }

    fn on_betting_tick(&mut self) {
        let table = &mut self.table;
        table.betting_time_left = table.betting_time_left.saturating_sub(1);
        let left = table.betting_time_left;
        self.events.push_back(GameEvent::Countdown(left));
        if left == 0 {
            self.close_betting();
        } else {
            self.schedule(TimerKind::BettingTick, TICK);
        }
    }

    fn close_betting(&mut self) {
        let mut players = 0;
        for seat in &mut self.table.seats {
            if seat.bet_confirmed {
                seat.in_round = true;
                players += 1;
            } else {
                seat.refund_pending_bet();
                self.events
                    .push_back(GameEvent::SatOut(seat.display_name.clone()));
            }
        }
        self.table.betting_deadline = None;
        self.table.betting_time_left = 0;

        if players == 0 {
            info!(
                "Round {} closed without bets, back to lobby",
                self.table.round_number
            );
            self.table.set_phase(Phase::Lobby);
            return;
        }
        self.events.push_back(GameEvent::BettingClosed { players });
        self.table.set_phase(Phase::Dealing);
        self.schedule(TimerKind::DealCards, self.settings.pace);
    }

    // === Dealing and turns ===

    fn deal(&mut self) -> Result<(), UserError> {
        let participants = self.table.participants().count();
        self.ensure_cards(2 * participants + 2)?;

        for idx in 0..self.table.seats.len() {
            if !self.table.seats[idx].in_round {
                continue;
            }
            let mut hand = Hand::new();
            hand.push(self.draw()?);
            hand.push(self.draw()?);
            if functional::is_natural(&hand.cards) {
                hand.is_natural = true;
                hand.standing = true;
                self.events.push_back(GameEvent::Blackjack(
                    self.table.seats[idx].display_name.clone(),
                ));
            }
            let seat = &mut self.table.seats[idx];
            seat.hands = vec![hand];
            seat.active_hand_index = 0;
        }

        let up = self.draw()?;
        let hole = self.draw()?.face_down();
        let mut dealer = Hand::new();
        dealer.push(up);
        dealer.push(hole);
        self.table.dealer_hand = dealer;

        debug!(
            "Round {} dealt to {} seat(s), dealer shows {}",
            self.table.round_number, participants, self.table.dealer_hand.total
        );
        self.table.set_phase(Phase::PlayerTurns);
        self.begin_turns_from(0);
        Ok(())
    }

    /// Hand the turn to the first participant at or after `from` with an
    /// open hand, or to the dealer if there is none.
    fn begin_turns_from(&mut self, from: SeatIndex) {
        let next = (from..self.table.seats.len()).find(|&i| {
            let seat = &self.table.seats[i];
            seat.in_round && seat.has_open_hand()
        });
        match next {
            Some(idx) => {
                let seat = &mut self.table.seats[idx];
                seat.active_hand_index = seat.next_open_hand(0).unwrap_or(0);
                self.table.active_seat_index = idx;
                self.awaiting_advance = false;
            }
            None => self.start_dealer_turn(),
        }
    }

    /// Validate that `player_id` holds the turn and return their seat index.
    fn active_seat_for(&self, player_id: &Username) -> Result<SeatIndex, UserError> {
        self.require_phase(Phase::PlayerTurns)?;
        let idx = self
            .table
            .seat_index(player_id)
            .ok_or(UserError::UserDoesNotExist)?;
        let seat = &self.table.seats[idx];
        if !seat.in_round {
            return Err(UserError::UserNotPlaying);
        }
        if idx != self.table.active_seat_index || self.awaiting_advance {
            return Err(UserError::OutOfTurnAction);
        }
        match seat.active_hand() {
            Some(hand) if !hand.is_finished() => Ok(idx),
            _ => Err(UserError::InvalidAction),
        }
    }

    pub fn take_action(&mut self, player_id: &Username, action: Action) -> Result<(), UserError> {
        let idx = self.active_seat_for(player_id)?;
        let result = match action {
            Action::Hit => self.hit(idx),
            Action::Stand => {
                self.stand(idx);
                Ok(())
            }
            Action::Double => self.double(idx),
            Action::Split => self.split(idx),
        };
        match result {
            Ok(()) => {
                let name = self.table.seats[idx].display_name.clone();
                self.events.push_back(GameEvent::Acted(name, action));
                Ok(())
            }
            Err(UserError::ShoeExhausted) => {
                self.abort_round();
                Err(UserError::ShoeExhausted)
            }
            Err(e) => Err(e),
        }
    }

    fn hit(&mut self, idx: SeatIndex) -> Result<(), UserError> {
        let card = self.draw()?;
        let seat = &mut self.table.seats[idx];
        let name = seat.display_name.clone();
        let Some(hand) = seat.active_hand_mut() else {
            return Err(UserError::InternalStateError);
        };
        hand.push(card);
        if hand.busted {
            self.events.push_back(GameEvent::Busted(name));
        } else if hand.total == BLACKJACK {
            hand.standing = true;
        }
        if hand.is_finished() {
            self.finish_hand(idx, self.settings.pace);
        }
        Ok(())
    }

    fn stand(&mut self, idx: SeatIndex) {
        if let Some(hand) = self.table.seats[idx].active_hand_mut() {
            hand.standing = true;
        }
        self.finish_hand(idx, self.settings.pace / 2);
    }

    fn double(&mut self, idx: SeatIndex) -> Result<(), UserError> {
        let seat = &self.table.seats[idx];
        if !seat.can_double() {
            if seat.balance < seat.bet {
                return Err(UserError::InsufficientFunds {
                    required: seat.bet,
                    available: seat.balance,
                });
            }
            return Err(UserError::InvalidAction);
        }
        let card = self.draw()?;
        let seat = &mut self.table.seats[idx];
        let name = seat.display_name.clone();
        seat.balance -= seat.bet;
        seat.bet *= 2;
        let hand = &mut seat.hands[0];
        hand.doubled = true;
        hand.push(card);
        hand.standing = true;
        if hand.busted {
            self.events.push_back(GameEvent::Busted(name));
        }
        self.set_balance_update(idx);
        self.finish_hand(idx, self.settings.pace);
        Ok(())
    }

    fn split(&mut self, idx: SeatIndex) -> Result<(), UserError> {
        let seat = &self.table.seats[idx];
        if !seat.can_split() {
            if seat.balance < seat.bet {
                return Err(UserError::InsufficientFunds {
                    required: seat.bet,
                    available: seat.balance,
                });
            }
            return Err(UserError::InvalidAction);
        }
        self.ensure_cards(2)?;
        let first_draw = self.draw()?;
        let second_draw = self.draw()?;

        let seat = &mut self.table.seats[idx];
        seat.balance -= seat.bet;
        let Some(moved) = seat.hands[0].cards.pop() else {
            return Err(UserError::InternalStateError);
        };
        let mut second = Hand::new();
        second.push(moved);
        second.push(second_draw);
        seat.hands[0].push(first_draw);
        seat.hands.push(second);
        for hand in &mut seat.hands {
            hand.is_natural = false;
            if hand.total == BLACKJACK {
                hand.standing = true;
            }
        }
        seat.active_hand_index = 0;
        self.set_balance_update(idx);

        if self.table.seats[idx].hands[0].is_finished() {
            self.finish_hand(idx, self.settings.pace);
        }
        Ok(())
    }

    /// The active hand can take no more cards. Move to the seat's next open
    /// hand straight away, or schedule the turn to pass on.
    fn finish_hand(&mut self, idx: SeatIndex, delay: Duration) {
        let seat = &mut self.table.seats[idx];
        if let Some(next) = seat.next_open_hand(seat.active_hand_index + 1) {
            seat.active_hand_index = next;
            return;
        }
        self.awaiting_advance = true;
        self.schedule(TimerKind::AdvanceTurn, delay);
    }

    fn on_advance_turn(&mut self) {
        self.awaiting_advance = false;
        self.begin_turns_from(self.table.active_seat_index + 1);
    }

    // === Dealer ===

    fn start_dealer_turn(&mut self) {
        self.table.set_phase(Phase::DealerTurn);
        self.awaiting_advance = false;
        self.table.dealer_hand.reveal();
        let total = self.table.dealer_hand.total;
        self.events.push_back(GameEvent::DealerReveals(total));
        if total < DEALER_STANDS_ON {
            self.schedule(TimerKind::DealerDraw, self.settings.pace);
        } else {
            self.schedule(TimerKind::Settle, self.settings.pace);
        }
    }

    fn on_dealer_draw(&mut self) -> Result<(), UserError> {
        if self.table.dealer_hand.total < DEALER_STANDS_ON {
            let card = self.draw()?;
            self.table.dealer_hand.push(card);
            self.events
                .push_back(GameEvent::DealerDraws(self.table.dealer_hand.total));
        }
        let total = self.table.dealer_hand.total;
        if total < DEALER_STANDS_ON {
            self.schedule(TimerKind::DealerDraw, self.settings.pace);
        } else {
            if total > BLACKJACK {
                self.events.push_back(GameEvent::DealerBusts(total));
            }
            self.schedule(TimerKind::Settle, self.settings.pace);
        }
        Ok(())
    }

    // === Settlement ===

    fn settle(&mut self) {
        let dealer_total = self.table.dealer_hand.total;
        let settled_at = Utc::now();
        for idx in 0..self.table.seats.len() {
            let seat = &mut self.table.seats[idx];
            if !seat.in_round {
                continue;
            }
            let settlement = settle_seat(&seat.hands, seat.bet, dealer_total);
            seat.balance += settlement.payout;
            seat.last_win = settlement.profit();
            let label = settlement.label();
            seat.result = Some(label.clone());
            let record = RoundResult {
                round_id: self.round_id,
                round_number: self.table.round_number,
                player_id: seat.player_id.clone(),
                bet: settlement.wagered,
                payout: settlement.payout,
                net: settlement.net(),
                outcome: settlement.outcome,
                settled_at,
            };
            self.events
                .push_back(GameEvent::Settled(seat.display_name.clone(), label));
            self.set_balance_update(idx);
            self.account_updates
                .push_back(AccountUpdate::RecordResult(record));
        }
        info!(
            "Round {} settled against dealer {}",
            self.table.round_number, dealer_total
        );
        if self.table.seats.is_empty() {
            self.table.set_phase(Phase::Lobby);
        } else {
            self.table.set_phase(Phase::Settlement);
        }
    }

    /// Give every participant their full stake back and return to the lobby.
    pub fn abort_round(&mut self) {
        error!(
            "Round {} aborted in {}",
            self.table.round_number, self.table.phase
        );
        for idx in 0..self.table.seats.len() {
            let seat = &mut self.table.seats[idx];
            let refund = if seat.in_round || seat.bet_confirmed {
                seat.stake()
            } else {
                seat.bet
            };
            seat.balance += refund;
            seat.reset();
            if refund > 0 {
                self.set_balance_update(idx);
            }
        }
        self.table.dealer_hand = Hand::new();
        self.table.betting_deadline = None;
        self.table.betting_time_left = 0;
        self.table.shoe.reshuffle();
        self.awaiting_advance = false;
        self.table.set_phase(Phase::Lobby);
        self.events.push_back(GameEvent::RoundAborted);
    }

    /// Queue a balance write for every seat.
    pub fn flush_balances(&mut self) {
        for idx in 0..self.table.seats.len() {
            self.set_balance_update(idx);
        }
    }

    // === Timers ===

    /// Deliver a timer. Returns `Ok(false)` for timers that went stale.
    pub fn fire(&mut self, timer: Timer) -> Result<bool, UserError> {
        if timer.token != self.table.round_token {
            debug!(
                "Ignoring stale {:?} timer (token {} != {})",
                timer.kind, timer.token, self.table.round_token
            );
            return Ok(false);
        }
        let phase = self.table.phase;
        let result = match (timer.kind, phase) {
            (TimerKind::BettingTick, Phase::Betting) => {
                self.on_betting_tick();
                Ok(())
            }
            (TimerKind::DealCards, Phase::Dealing) => self.deal(),
            (TimerKind::AdvanceTurn, Phase::PlayerTurns) if self.awaiting_advance => {
                self.on_advance_turn();
                Ok(())
            }
            (TimerKind::DealerDraw, Phase::DealerTurn) => self.on_dealer_draw(),
            (TimerKind::Settle, Phase::DealerTurn) => {
                self.settle();
                Ok(())
            }
            (kind, phase) => {
                error!("{kind:?} timer fired with a current token during {phase}");
                Err(UserError::InternalStateError)
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(UserError::ShoeExhausted) => {
                self.abort_round();
                Err(UserError::ShoeExhausted)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{Rank, Suit};

    fn card(rank: Rank) -> Card {
        Card::new(rank, Suit::Club)
    }

    fn engine_with(cards: &[Rank]) -> RoundEngine {
        let mut stacked: Vec<Card> = cards.iter().map(|&r| card(r)).collect();
        // Padding keeps the stacked shoe under the reshuffle threshold.
        stacked.extend(std::iter::repeat_n(card(Rank::Two), 4 * cards.len() + 8));
        RoundEngine::with_shoe(GameSettings::default(), Shoe::stacked(stacked))
    }

    fn fire_next(engine: &mut RoundEngine, kind: TimerKind) {
        let timer = engine
            .drain_timers()
            .into_iter()
            .rev()
            .find(|t| t.kind == kind)
            .unwrap_or_else(|| panic!("no {kind:?} timer scheduled"));
        assert!(engine.fire(timer).unwrap());
    }

    fn dealt(cards: &[Rank], players: &[&str]) -> RoundEngine {
        let mut engine = engine_with(cards);
        for &name in players {
            engine.join(name.into(), name, 1000).unwrap();
        }
        engine.start_betting(&players[0].into()).unwrap();
        for &name in players {
            let id = Username::from(name);
            engine.place_bet(&id, 10).unwrap();
            engine.confirm_bet(&id).unwrap();
        }
        fire_next(&mut engine, TimerKind::DealCards);
        engine
    }

    #[test]
    fn test_start_betting_requires_seat() {
        let mut engine = RoundEngine::default();
        assert_eq!(
            engine.start_betting(&"nobody".into()),
            Err(UserError::NotEnoughPlayers)
        );
        engine.join("ann".into(), "Ann", 100).unwrap();
        assert_eq!(
            engine.start_betting(&"nobody".into()),
            Err(UserError::UserDoesNotExist)
        );
        engine.start_betting(&"ann".into()).unwrap();
        assert_eq!(engine.phase(), Phase::Betting);
        assert_eq!(engine.snapshot().betting_time_left, Some(30));
    }

    #[test]
    fn test_place_bet_limits() {
        let mut engine = RoundEngine::default();
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 600).unwrap();
        engine.start_betting(&ann).unwrap();

        assert_eq!(engine.place_bet(&ann, 0), Err(UserError::InvalidBet));
        assert_eq!(engine.place_bet(&ann, 400), Ok(400));
        assert_eq!(
            engine.place_bet(&ann, 101),
            Err(UserError::BetTooLarge { max: 500 })
        );
        assert_eq!(
            engine.place_bet(&ann, 201),
            Err(UserError::InsufficientFunds {
                required: 201,
                available: 200
            })
        );
        assert_eq!(engine.table().seats[0].balance, 200);
    }

    #[test]
    fn test_confirm_requires_minimum() {
        let mut engine = RoundEngine::default();
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 600).unwrap();
        engine.join("bob".into(), "Bob", 600).unwrap();
        engine.start_betting(&ann).unwrap();
        engine.place_bet(&ann, 4).unwrap();
        assert_eq!(
            engine.confirm_bet(&ann),
            Err(UserError::BetTooSmall { min: 5 })
        );
        engine.place_bet(&ann, 1).unwrap();
        engine.confirm_bet(&ann).unwrap();
        assert_eq!(engine.place_bet(&ann, 5), Err(UserError::BetAlreadyConfirmed));
        assert_eq!(engine.clear_bet(&ann), Err(UserError::BetAlreadyConfirmed));

        let updates = engine.drain_account_updates();
        assert_eq!(
            updates.back(),
            Some(&AccountUpdate::SetBalance {
                player_id: ann,
                balance: 595
            })
        );
    }

    #[test]
    fn test_clear_bet_refunds() {
        let mut engine = RoundEngine::default();
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 600).unwrap();
        engine.start_betting(&ann).unwrap();
        engine.place_bet(&ann, 50).unwrap();
        assert_eq!(engine.clear_bet(&ann), Ok(50));
        assert_eq!(engine.table().seats[0].balance, 600);
        assert_eq!(engine.table().seats[0].bet, 0);
    }

    #[test]
    fn test_everyone_confirmed_closes_betting_early() {
        let mut engine = engine_with(&[]);
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 100).unwrap();
        engine.start_betting(&ann).unwrap();
        engine.place_bet(&ann, 10).unwrap();
        engine.confirm_bet(&ann).unwrap();
        assert_eq!(engine.phase(), Phase::Dealing);
    }

    #[test]
    fn test_countdown_expiry_without_bets_returns_to_lobby() {
        let mut engine = RoundEngine::default();
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 600).unwrap();
        engine.start_betting(&ann).unwrap();
        engine.place_bet(&ann, 25).unwrap();
        for _ in 0..30 {
            fire_next(&mut engine, TimerKind::BettingTick);
        }
        assert_eq!(engine.phase(), Phase::Lobby);
        assert_eq!(engine.table().seats[0].balance, 600);
        assert!(engine.drain_timers().is_empty());
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut engine = RoundEngine::default();
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 600).unwrap();
        engine.start_betting(&ann).unwrap();
        let tick = engine.drain_timers().pop_front().unwrap();
        engine.place_bet(&ann, 10).unwrap();
        engine.confirm_bet(&ann).unwrap();
        assert_eq!(engine.fire(tick), Ok(false));
        assert_eq!(engine.phase(), Phase::Dealing);
    }

    #[test]
    fn test_natural_is_skipped() {
        // ann: A K, bob: 9 7, dealer: 10 8
        let engine = dealt(
            &[
                Rank::Ace,
                Rank::King,
                Rank::Nine,
                Rank::Seven,
                Rank::Ten,
                Rank::Eight,
            ],
            &["ann", "bob"],
        );
        assert_eq!(engine.phase(), Phase::PlayerTurns);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.active_seat_index, Some(1));
        assert!(snapshot.seats[0].hands[0].is_natural);
        assert!(snapshot.seats[0].hands[0].standing);
        assert_eq!(snapshot.dealer.total, 10);
    }

    #[test]
    fn test_out_of_turn_rejected() {
        let mut engine = dealt(
            &[
                Rank::Ten,
                Rank::Six,
                Rank::Nine,
                Rank::Seven,
                Rank::Ten,
                Rank::Eight,
            ],
            &["ann", "bob"],
        );
        let before = engine.snapshot();
        assert_eq!(
            engine.take_action(&"bob".into(), Action::Hit),
            Err(UserError::OutOfTurnAction)
        );
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn test_split_then_play_both_hands() {
        // ann: 8 8, dealer: 10 7, split draws 3 and K
        let mut engine = dealt(
            &[
                Rank::Eight,
                Rank::Eight,
                Rank::Ten,
                Rank::Seven,
                Rank::Three,
                Rank::King,
            ],
            &["ann"],
        );
        let ann = Username::new("ann");
        engine.take_action(&ann, Action::Split).unwrap();
        let seat = &engine.table().seats[0];
        assert_eq!(seat.hands.len(), 2);
        assert_eq!(seat.hands[0].total, 11);
        assert_eq!(seat.hands[1].total, 18);
        assert_eq!(seat.balance, 980);

        engine.take_action(&ann, Action::Stand).unwrap();
        assert_eq!(engine.table().seats[0].active_hand_index, 1);
        assert!(!engine.is_awaiting_advance());
        engine.take_action(&ann, Action::Stand).unwrap();
        assert!(engine.is_awaiting_advance());
        assert_eq!(
            engine.take_action(&ann, Action::Hit),
            Err(UserError::OutOfTurnAction)
        );
    }

    #[test]
    fn test_double_takes_one_card() {
        // ann: 6 5, dealer: 10 7, double draws 9
        let mut engine = dealt(
            &[
                Rank::Six,
                Rank::Five,
                Rank::Ten,
                Rank::Seven,
                Rank::Nine,
            ],
            &["ann"],
        );
        let ann = Username::new("ann");
        engine.take_action(&ann, Action::Double).unwrap();
        let seat = &engine.table().seats[0];
        assert_eq!(seat.bet, 20);
        assert_eq!(seat.balance, 980);
        assert_eq!(seat.hands[0].total, 20);
        assert!(seat.hands[0].doubled);
        assert!(engine.is_awaiting_advance());

        fire_next(&mut engine, TimerKind::AdvanceTurn);
        assert_eq!(engine.phase(), Phase::DealerTurn);
        fire_next(&mut engine, TimerKind::Settle);
        assert_eq!(engine.phase(), Phase::Settlement);
        let seat = &engine.table().seats[0];
        assert_eq!(seat.balance, 1020);
        assert_eq!(seat.result.as_deref(), Some("WIN +$20"));
    }

    #[test]
    fn test_hit_to_21_auto_stands() {
        // ann: 10 5, dealer: 10 7, hit draws 6
        let mut engine = dealt(
            &[Rank::Ten, Rank::Five, Rank::Ten, Rank::Seven, Rank::Six],
            &["ann"],
        );
        engine.take_action(&"ann".into(), Action::Hit).unwrap();
        assert!(engine.table().seats[0].hands[0].standing);
        assert!(engine.is_awaiting_advance());
    }

    #[test]
    fn test_leaving_active_seat_passes_turn() {
        let mut engine = dealt(
            &[
                Rank::Ten,
                Rank::Six,
                Rank::Nine,
                Rank::Seven,
                Rank::Ten,
                Rank::Eight,
            ],
            &["ann", "bob"],
        );
        let token = engine.round_token();
        let seat = engine.leave(&"ann".into()).unwrap();
        assert_eq!(seat.balance, 990);
        assert!(engine.round_token() > token);
        assert_eq!(engine.snapshot().active_seat_index, Some(0));
        engine.take_action(&"bob".into(), Action::Stand).unwrap();

        let updates = engine.drain_account_updates();
        assert!(updates.iter().any(|u| matches!(
            u,
            AccountUpdate::RecordResult(r) if r.outcome == Outcome::Forfeit && r.net == -10
        )));
    }

    #[test]
    fn test_exhausted_shoe_aborts_round() {
        // Exactly enough for the deal, nothing left to hit with.
        let cards = [Rank::Ten, Rank::Six, Rank::Ten, Rank::Seven]
            .iter()
            .map(|&r| card(r))
            .collect();
        let mut engine = RoundEngine::with_shoe(GameSettings::default(), Shoe::stacked(cards));
        let ann = Username::new("ann");
        engine.join(ann.clone(), "Ann", 100).unwrap();
        engine.start_betting(&ann).unwrap();
        engine.place_bet(&ann, 10).unwrap();
        engine.confirm_bet(&ann).unwrap();
        fire_next(&mut engine, TimerKind::DealCards);

        assert_eq!(
            engine.take_action(&ann, Action::Hit),
            Err(UserError::ShoeExhausted)
        );
        assert_eq!(engine.phase(), Phase::Lobby);
        assert_eq!(engine.table().seats[0].balance, 100);
        assert_eq!(engine.table().shoe.remaining(), 52);
    }
}
