//! Table configuration models.

use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::game::{
    GameSettings,
    constants::{
        DEFAULT_BETTING_WINDOW_SECS, DEFAULT_NUM_DECKS, DEFAULT_STARTING_BALANCE, MAX_BET,
        MAX_SEATS, MIN_BET,
    },
    entities::Usd,
};

/// Table speed variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSpeed {
    #[default]
    Normal,
    Turbo,
    Hyper,
}

impl std::fmt::Display for TableSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSpeed::Normal => write!(f, "normal"),
            TableSpeed::Turbo => write!(f, "turbo"),
            TableSpeed::Hyper => write!(f, "hyper"),
        }
    }
}

impl FromStr for TableSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(TableSpeed::Normal),
            "turbo" => Ok(TableSpeed::Turbo),
            "hyper" => Ok(TableSpeed::Hyper),
            other => Err(format!("unknown table speed '{other}'")),
        }
    }
}

/// Table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Table name
    pub name: String,

    /// Maximum number of seats (default: 7)
    pub max_seats: usize,

    /// Decks in the shoe
    pub num_decks: usize,

    pub min_bet: Usd,
    pub max_bet: Usd,

    /// Balance given to players the account store has never seen
    pub starting_balance: Usd,

    /// Length of the betting countdown
    pub betting_window_secs: u32,

    /// Table speed
    pub speed: TableSpeed,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Main Table".to_string(),
            max_seats: MAX_SEATS,
            num_decks: DEFAULT_NUM_DECKS,
            min_bet: MIN_BET,
            max_bet: MAX_BET,
            starting_balance: DEFAULT_STARTING_BALANCE,
            betting_window_secs: DEFAULT_BETTING_WINDOW_SECS,
            speed: TableSpeed::Normal,
        }
    }
}

impl TableConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_seats == 0 || self.max_seats > MAX_SEATS {
            return Err(format!("Max seats must be between 1 and {MAX_SEATS}"));
        }

        if self.num_decks == 0 || self.num_decks > 8 {
            return Err("Number of decks must be between 1 and 8".to_string());
        }

        if self.min_bet == 0 {
            return Err("Minimum bet must be positive".to_string());
        }

        if self.max_bet < self.min_bet {
            return Err("Max bet must be at least the min bet".to_string());
        }

        if self.betting_window_secs == 0 {
            return Err("Betting window must be at least one second".to_string());
        }

        Ok(())
    }

    /// Delay between automatic steps (dealing, turn hand-off, dealer draws)
    pub fn pace(&self) -> Duration {
        match self.speed {
            TableSpeed::Normal => Duration::from_millis(2000),
            TableSpeed::Turbo => Duration::from_millis(1000),
            TableSpeed::Hyper => Duration::from_millis(500),
        }
    }

    pub fn game_settings(&self) -> GameSettings {
        GameSettings {
            max_seats: self.max_seats,
            num_decks: self.num_decks,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            betting_window_secs: self.betting_window_secs,
            pace: self.pace(),
        }
    }
}
