//! Payout computation for finished hands.
//!
//! Bets are taken out of a seat's balance when they are placed, so a payout
//! is the full amount credited back: zero for a loss, the stake for a push,
//! twice the stake for a win and stake plus floored 3:2 for a blackjack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::{
    constants::BLACKJACK,
    entities::{Hand, Usd, Username},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Blackjack,
    Win,
    Push,
    Loss,
    Bust,
    /// The player left before the round was settled.
    Forfeit,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Blackjack => "blackjack",
            Self::Win => "win",
            Self::Push => "push",
            Self::Loss => "loss",
            Self::Bust => "bust",
            Self::Forfeit => "forfeit",
        };
        write!(f, "{repr}")
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blackjack" => Ok(Self::Blackjack),
            "win" => Ok(Self::Win),
            "push" => Ok(Self::Push),
            "loss" => Ok(Self::Loss),
            "bust" => Ok(Self::Bust),
            "forfeit" => Ok(Self::Forfeit),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandSettlement {
    pub bet: Usd,
    pub payout: Usd,
    pub outcome: Outcome,
}

impl HandSettlement {
    #[must_use]
    pub fn net(&self) -> i64 {
        i64::from(self.payout) - i64::from(self.bet)
    }
}

/// Settle one hand against the dealer's final total.
#[must_use]
pub fn settle_hand(hand: &Hand, bet: Usd, dealer_total: u8) -> HandSettlement {
    let (payout, outcome) = if hand.busted {
        (0, Outcome::Bust)
    } else if hand.is_natural && dealer_total != BLACKJACK {
        (bet + bet * 3 / 2, Outcome::Blackjack)
    } else if dealer_total > BLACKJACK || hand.total > dealer_total {
        (bet * 2, Outcome::Win)
    } else if hand.total == dealer_total {
        (bet, Outcome::Push)
    } else {
        (0, Outcome::Loss)
    };
    HandSettlement {
        bet,
        payout,
        outcome,
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SeatSettlement {
    pub hands: Vec<HandSettlement>,
    pub wagered: Usd,
    pub payout: Usd,
    pub outcome: Outcome,
}

impl SeatSettlement {
    #[must_use]
    pub fn net(&self) -> i64 {
        i64::from(self.payout) - i64::from(self.wagered)
    }

    /// Winnings above the amount wagered, zero on a loss or push.
    #[must_use]
    pub fn profit(&self) -> Usd {
        self.payout.saturating_sub(self.wagered)
    }

    /// Human-readable result shown next to the seat.
    #[must_use]
    pub fn label(&self) -> String {
        let net = self.net();
        match self.outcome {
            Outcome::Blackjack => format!("BLACKJACK +${net}"),
            Outcome::Push => "PUSH".to_string(),
            Outcome::Bust => format!("BUST -${}", net.unsigned_abs()),
            Outcome::Forfeit => format!("FORFEIT -${}", net.unsigned_abs()),
            _ if net > 0 => format!("WIN +${net}"),
            _ if net == 0 => "PUSH".to_string(),
            _ => format!("LOSS -${}", net.unsigned_abs()),
        }
    }
}

/// Settle every hand of a seat with the same per-hand `bet`.
///
/// A single hand gives its own outcome to the seat. A split seat is labelled
/// by the sign of its combined net.
#[must_use]
pub fn settle_seat(hands: &[Hand], bet: Usd, dealer_total: u8) -> SeatSettlement {
    let settled: Vec<HandSettlement> = hands
        .iter()
        .map(|hand| settle_hand(hand, bet, dealer_total))
        .collect();
    let wagered = settled.iter().map(|h| h.bet).sum();
    let payout = settled.iter().map(|h| h.payout).sum();
    let outcome = match settled.as_slice() {
        [single] => single.outcome,
        _ => match i64::from(payout) - i64::from(wagered) {
            n if n > 0 => Outcome::Win,
            0 => Outcome::Push,
            _ => Outcome::Loss,
        },
    };
    SeatSettlement {
        hands: settled,
        wagered,
        payout,
        outcome,
    }
}

/// One settled (or forfeited) seat, as kept in a player's history.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RoundResult {
    pub round_id: Uuid,
    pub round_number: u64,
    pub player_id: Username,
    /// Total wagered across every hand of the seat.
    pub bet: Usd,
    pub payout: Usd,
    pub net: i64,
    pub outcome: Outcome,
    pub settled_at: DateTime<Utc>,
}
