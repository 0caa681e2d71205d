//! Process-local account store. Everything is lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    errors::WalletResult,
    ledger::Ledger,
    models::{Account, AccountPolicy, BonusClaim},
    store::AccountStore,
};
use crate::game::{
    entities::{Usd, Username},
    settlement::RoundResult,
};

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    policy: AccountPolicy,
    ledger: Mutex<Ledger>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new(policy: AccountPolicy) -> Self {
        Self {
            policy,
            ledger: Mutex::new(Ledger::default()),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_balance(&self, player_id: &Username) -> WalletResult<Usd> {
        let mut ledger = self.ledger.lock().await;
        Ok(ledger.entry(player_id, &self.policy, Utc::now()).account.balance)
    }

    async fn set_balance(&self, player_id: &Username, balance: Usd) -> WalletResult<()> {
        let mut ledger = self.ledger.lock().await;
        ledger.set_balance(player_id, balance, &self.policy, Utc::now());
        Ok(())
    }

    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<()> {
        let mut ledger = self.ledger.lock().await;
        ledger.record(result, &self.policy, Utc::now());
        Ok(())
    }

    async fn account(&self, player_id: &Username) -> WalletResult<Account> {
        let mut ledger = self.ledger.lock().await;
        Ok(ledger
            .entry(player_id, &self.policy, Utc::now())
            .account
            .clone())
    }

    async fn claim_bonus(&self, player_id: &Username) -> WalletResult<BonusClaim> {
        let mut ledger = self.ledger.lock().await;
        ledger.claim_bonus(player_id, &self.policy, Utc::now())
    }

    async fn round_history(
        &self,
        player_id: &Username,
        limit: usize,
    ) -> WalletResult<Vec<RoundResult>> {
        Ok(self.ledger.lock().await.history(player_id, limit))
    }
}
