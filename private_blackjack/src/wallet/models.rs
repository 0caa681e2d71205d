//! Wallet data models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{
    constants::{DEFAULT_BONUS_AMOUNT, DEFAULT_BONUS_DAILY_LIMIT, DEFAULT_STARTING_BALANCE},
    entities::{Usd, Username},
};

/// Account model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub player_id: Username,
    pub balance: Usd,
    pub total_games: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_pushes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn new(player_id: Username, balance: Usd, now: DateTime<Utc>) -> Self {
        Self {
            player_id,
            balance,
            total_games: 0,
            total_wins: 0,
            total_losses: 0,
            total_pushes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Count a settled round by the sign of its net.
    pub fn record_net(&mut self, net: i64, now: DateTime<Utc>) {
        self.total_games += 1;
        match net {
            n if n > 0 => self.total_wins += 1,
            n if n < 0 => self.total_losses += 1,
            _ => self.total_pushes += 1,
        }
        self.updated_at = now;
    }
}

/// Bonus claim result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusClaim {
    pub amount: Usd,
    pub balance: Usd,
    /// Claims used in the current window, this one included.
    pub claims_in_window: u32,
    pub claims_remaining: u32,
    pub window_resets_at: DateTime<Utc>,
}

/// How new accounts are funded and how generous the daily bonus is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPolicy {
    pub starting_balance: Usd,
    pub bonus_amount: Usd,
    pub bonus_daily_limit: u32,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            starting_balance: DEFAULT_STARTING_BALANCE,
            bonus_amount: DEFAULT_BONUS_AMOUNT,
            bonus_daily_limit: DEFAULT_BONUS_DAILY_LIMIT,
        }
    }
}

/// Claims within 24 hours of the previous one share a count. The count
/// starts over once a full day passes without a claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusWindow {
    pub last_claim_at: Option<DateTime<Utc>>,
    pub claims: u32,
}

impl BonusWindow {
    pub const LENGTH_HOURS: i64 = 24;

    /// Use one claim. On refusal returns when the window resets.
    pub fn claim(&mut self, now: DateTime<Utc>, limit: u32) -> Result<(), DateTime<Utc>> {
        let length = Duration::hours(Self::LENGTH_HOURS);
        match self.last_claim_at {
            Some(last) if now < last + length => {
                if self.claims >= limit {
                    return Err(last + length);
                }
            }
            _ => self.claims = 0,
        }
        self.claims += 1;
        self.last_claim_at = Some(now);
        Ok(())
    }

    #[must_use]
    pub fn resets_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_claim_at.unwrap_or(now) + Duration::hours(Self::LENGTH_HOURS)
    }
}
