//! # Private Blackjack
//!
//! A multiplayer blackjack table engine. Up to seven seats play against a
//! dealer from a shared multi-deck shoe.
//!
//! ## Architecture
//!
//! A round moves through these phases:
//!
//! - **Lobby**: Seats may join; any seated player can open betting
//! - **Betting**: A countdown during which bets are placed and confirmed
//! - **Dealing**: Two cards to every confirmed seat, then the dealer
//! - **PlayerTurns**: Seats act in order (hit, stand, double, split)
//! - **DealerTurn**: Hole card revealed, dealer draws to 17
//! - **Settlement**: Payouts applied, results shown until the next round
//!
//! Each table is owned by a single [`table::TableActor`] task that applies
//! client commands and timer callbacks one at a time. Balances and round
//! history live behind the [`wallet::AccountStore`] trait.
//!
//! ## Core Modules
//!
//! - [`game`]: Cards, the shoe, hand evaluation, settlement and the round
//!   state machine
//! - [`table`]: Actor wrapper, table configuration and messages
//! - [`wallet`]: Account persistence (memory, JSON file, PostgreSQL)
//! - [`db`]: PostgreSQL connection pool
//!
//! ## Example
//!
//! ```
//! use private_blackjack::{RoundEngine, Username};
//!
//! let mut engine = RoundEngine::default();
//! let alice = Username::new("alice");
//! engine.join(alice.clone(), "Alice", 1000).unwrap();
//! engine.start_betting(&alice).unwrap();
//! engine.place_bet(&alice, 25).unwrap();
//! ```

/// Core game logic, entities, and state machine.
pub mod game;
pub use game::{
    AccountUpdate, GameEvent, GameSettings, RoundEngine, UserError,
    constants::{self, MAX_SEATS},
    entities::{
        self, Action, Card, Hand, Phase, Rank, Shoe, Suit, TableSnapshot, Usd, Username,
    },
    functional,
    settlement::{self, Outcome, RoundResult},
};

/// PostgreSQL connection pooling.
pub mod db;

/// Per-table actors and their message protocol.
pub mod table;
pub use table::{
    TableActor, TableConfig, TableEvent, TableHandle, TableMessage, TableResponse, TableSpeed,
};

/// Account balances, history and the daily bonus.
pub mod wallet;
pub use wallet::{AccountStore, WalletError};
