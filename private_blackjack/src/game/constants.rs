//! Table-wide rule constants.

use super::entities::Usd;

/// Seats available at one table.
pub const MAX_SEATS: usize = 7;

/// Decks shuffled together into one shoe.
pub const DEFAULT_NUM_DECKS: usize = 6;

pub const MIN_BET: Usd = 5;
pub const MAX_BET: Usd = 500;

/// Stake given to accounts the store has never seen.
pub const DEFAULT_STARTING_BALANCE: Usd = 1000;

/// Seconds players get to place and confirm bets.
pub const DEFAULT_BETTING_WINDOW_SECS: u32 = 30;

/// Base pacing delay between automatic steps, in milliseconds.
pub const DEFAULT_PACE_MS: u64 = 2000;

/// The dealer draws while below this total.
pub const DEALER_STANDS_ON: u8 = 17;

pub const BLACKJACK: u8 = 21;

/// Usernames and display names are truncated to this many characters.
pub const MAX_USER_INPUT_LENGTH: usize = 32;

pub const DEFAULT_BONUS_AMOUNT: Usd = 500;
pub const DEFAULT_BONUS_DAILY_LIMIT: u32 = 3;
