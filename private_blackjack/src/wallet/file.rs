//! Flat-file account store.
//!
//! The whole ledger is kept in memory and rewritten as pretty-printed JSON
//! after every change. Writes go to a sibling temp file first and are then
//! renamed over the original. A change reaches the in-memory ledger only
//! once it is on disk.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};

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

#[derive(Debug)]
pub struct FileAccountStore {
    path: PathBuf,
    policy: AccountPolicy,
    ledger: Mutex<Ledger>,
}

impl FileAccountStore {
    /// Load `path`, starting empty if it doesn't exist yet.
    pub async fn open(path: impl AsRef<Path>, policy: AccountPolicy) -> WalletResult<Self> {
        let path = path.as_ref().to_path_buf();
        let ledger = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            "Loaded {} account(s) from {}",
            ledger.accounts.len(),
            path.display()
        );
        Ok(Self {
            path,
            policy,
            ledger: Mutex::new(ledger),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the ledger, write it, then keep it.
    async fn update<T>(
        &self,
        change: impl FnOnce(&mut Ledger) -> WalletResult<T>,
    ) -> WalletResult<T> {
        let mut ledger = self.ledger.lock().await;
        let mut next = ledger.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *ledger = next;
        Ok(value)
    }

    async fn persist(&self, ledger: &Ledger) -> WalletResult<()> {
        let bytes = serde_json::to_vec_pretty(ledger)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn get_balance(&self, player_id: &Username) -> WalletResult<Usd> {
        Ok(self.account(player_id).await?.balance)
    }

    async fn set_balance(&self, player_id: &Username, balance: Usd) -> WalletResult<()> {
        self.update(|ledger| {
            ledger.set_balance(player_id, balance, &self.policy, Utc::now());
            Ok(())
        })
        .await
    }

    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<()> {
        self.update(|ledger| {
            ledger.record(result, &self.policy, Utc::now());
            Ok(())
        })
        .await
    }

    async fn account(&self, player_id: &Username) -> WalletResult<Account> {
        let existing = self
            .ledger
            .lock()
            .await
            .accounts
            .get(player_id)
            .map(|record| record.account.clone());
        if let Some(account) = existing {
            return Ok(account);
        }
        self.update(|ledger| {
            Ok(ledger
                .entry(player_id, &self.policy, Utc::now())
                .account
                .clone())
        })
        .await
    }

    async fn claim_bonus(&self, player_id: &Username) -> WalletResult<BonusClaim> {
        self.update(|ledger| ledger.claim_bonus(player_id, &self.policy, Utc::now()))
            .await
    }

    async fn round_history(
        &self,
        player_id: &Username,
        limit: usize,
    ) -> WalletResult<Vec<RoundResult>> {
        Ok(self.ledger.lock().await.history(player_id, limit))
    }
}
