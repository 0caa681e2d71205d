//! The persistence seam between tables and player accounts.

use async_trait::async_trait;

use super::{
    errors::WalletResult,
    models::{Account, BonusClaim},
};
use crate::game::{
    entities::{Usd, Username},
    settlement::RoundResult,
};

/// Trait for account storage operations
///
/// Unknown players are created with the store's starting balance by any
/// call that reads or writes their account.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Current balance
    async fn get_balance(&self, player_id: &Username) -> WalletResult<Usd>;

    /// Overwrite the balance with the table's view of it
    async fn set_balance(&self, player_id: &Username, balance: Usd) -> WalletResult<()>;

    /// Append to the player's history and update their statistics
    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<()>;

    /// Balance and statistics
    async fn account(&self, player_id: &Username) -> WalletResult<Account>;

    /// Credit the daily bonus if the player has claims left in the window
    async fn claim_bonus(&self, player_id: &Username) -> WalletResult<BonusClaim>;

    /// Most recent results first
    async fn round_history(
        &self,
        player_id: &Username,
        limit: usize,
    ) -> WalletResult<Vec<RoundResult>>;
}
