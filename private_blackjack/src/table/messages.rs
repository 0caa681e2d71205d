//! Table actor message types.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::{
    game::{
        Timer, UserError,
        entities::{Action, SeatIndex, TableSnapshot, Usd, Username},
    },
    wallet::BonusClaim,
};

/// Messages that can be sent to a TableActor
#[derive(Debug)]
pub enum TableMessage {
    /// Take a seat, loading the balance from the account store
    Join {
        player_id: Username,
        name: String,
        response: oneshot::Sender<TableResponse>,
    },

    /// Open the betting window (lobby only)
    StartBetting {
        player_id: Username,
        response: oneshot::Sender<TableResponse>,
    },

    /// Add to the pending bet
    PlaceBet {
        player_id: Username,
        amount: Usd,
        response: oneshot::Sender<TableResponse>,
    },

    ConfirmBet {
        player_id: Username,
        response: oneshot::Sender<TableResponse>,
    },

    /// Return an unconfirmed bet to the balance
    ClearBet {
        player_id: Username,
        response: oneshot::Sender<TableResponse>,
    },

    /// Hit, stand, double or split on the active hand
    TakeAction {
        player_id: Username,
        action: Action,
        response: oneshot::Sender<TableResponse>,
    },

    /// Start the next betting window after settlement
    NewRound {
        player_id: Username,
        response: oneshot::Sender<TableResponse>,
    },

    LeaveTable {
        player_id: Username,
        response: oneshot::Sender<TableResponse>,
    },

    /// Daily bonus from the account store
    ClaimBonus {
        player_id: Username,
        response: oneshot::Sender<TableResponse>,
    },

    GetSnapshot {
        response: oneshot::Sender<TableSnapshot>,
    },

    /// Subscribe to table events
    Subscribe {
        subscriber_id: Uuid,
        sender: mpsc::Sender<TableEvent>,
    },

    /// Unsubscribe from table events
    Unsubscribe { subscriber_id: Uuid },

    /// Close table, returning stakes and flushing balances
    Close {
        response: oneshot::Sender<TableResponse>,
    },

    /// Internal: a scheduled step came due
    Timer(Timer),
}

/// Pushed to every subscriber
#[derive(Debug, Clone)]
pub enum TableEvent {
    /// Full table state after a change
    Snapshot(Arc<TableSnapshot>),
    /// One betting countdown tick
    Countdown { seconds_left: u32 },
    /// Human-readable event text
    Notice(String),
}

/// Response from table operations
#[derive(Debug, Clone, PartialEq)]
pub enum TableResponse {
    /// Operation succeeded
    Success,

    /// Seated with the balance loaded from the account store
    Joined { seat_index: SeatIndex, balance: Usd },

    /// Pending bet after the addition
    BetPlaced { bet: Usd },

    BetCleared { refunded: Usd },

    /// Final balance of the seat that left
    Left { balance: Usd },

    BonusClaimed(BonusClaim),

    /// The game refused the request; nothing changed
    Rejected(UserError),

    /// Operation failed
    Error(String),
}

impl TableResponse {
    /// Check if response is success
    pub fn is_success(&self) -> bool {
        !matches!(self, TableResponse::Rejected(_) | TableResponse::Error(_))
    }

    /// Get error message if response is error
    pub fn error_message(&self) -> Option<String> {
        match self {
            TableResponse::Rejected(e) => Some(e.to_string()),
            TableResponse::Error(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

impl From<UserError> for TableResponse {
    fn from(error: UserError) -> Self {
        TableResponse::Rejected(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Phase;

    #[test]
    fn test_error_messages() {
        assert_eq!(TableResponse::Success.error_message(), None);
        assert!(TableResponse::BetPlaced { bet: 10 }.is_success());

        let rejected = TableResponse::from(UserError::OutOfTurnAction);
        assert!(!rejected.is_success());
        assert_eq!(rejected.error_message().as_deref(), Some("not your turn"));
    }

    #[test]
    fn test_rejection_can_be_cloned() {
        let rejected = TableResponse::Rejected(UserError::WrongPhase(Phase::Betting));
        assert_eq!(rejected.clone(), rejected);
        assert_eq!(
            rejected.error_message().as_deref(),
            Some("not allowed during betting")
        );
    }
}
