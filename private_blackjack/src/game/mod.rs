//! Blackjack game engine - cards, hand evaluation, settlement and the
//! round state machine.
//!
//! Nothing in here is async. The [`state_machine::RoundEngine`] queues
//! timers and account writes for its owner (see [`crate::table`]) to
//! carry out.

pub mod constants;
pub mod entities;
pub mod functional;
pub mod settlement;
pub mod state_machine;
pub mod table;

pub use state_machine::{
    AccountUpdate, GameEvent, GameSettings, RoundEngine, Timer, TimerKind, UserError,
};
