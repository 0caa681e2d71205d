//! Wallet error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Reading or writing the accounts file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The accounts file could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored balance does not fit the table's money type
    #[error("Balance out of range: {0}")]
    BalanceOutOfRange(i64),

    /// A stored row could not be understood
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Daily bonus limit reached
    #[error("Bonus not available until {0}")]
    BonusNotAvailable(DateTime<Utc>),
}

impl WalletError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Database(_)
            | WalletError::Io(_)
            | WalletError::Serialization(_)
            | WalletError::BalanceOutOfRange(_)
            | WalletError::CorruptRecord(_) => "Internal server error".to_string(),
            WalletError::BonusNotAvailable(at) => {
                format!("Daily bonus limit reached, next claim at {}", at.format("%H:%M UTC"))
            }
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_internals() {
        let err = WalletError::Io(std::io::Error::other("/var/lib/accounts.json: denied"));
        assert_eq!(err.client_message(), "Internal server error");

        let err = WalletError::CorruptRecord("outcome 'x' for alice".to_string());
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_bonus_message_names_next_claim() {
        let at = DateTime::parse_from_rfc3339("2025-01-02T15:04:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = WalletError::BonusNotAvailable(at);
        assert!(err.client_message().contains("15:04 UTC"));
    }
}
