//! Account state shared by the in-process stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    errors::{WalletError, WalletResult},
    models::{Account, AccountPolicy, BonusClaim, BonusWindow},
};
use crate::game::{
    entities::{Usd, Username},
    settlement::RoundResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: Account,
    #[serde(default)]
    pub bonus: BonusWindow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub accounts: BTreeMap<Username, AccountRecord>,
    #[serde(default)]
    pub history: Vec<RoundResult>,
}

impl Ledger {
    pub fn entry(
        &mut self,
        player_id: &Username,
        policy: &AccountPolicy,
        now: DateTime<Utc>,
    ) -> &mut AccountRecord {
        self.accounts
            .entry(player_id.clone())
            .or_insert_with(|| AccountRecord {
                account: Account::new(player_id.clone(), policy.starting_balance, now),
                bonus: BonusWindow::default(),
            })
    }

    pub fn set_balance(
        &mut self,
        player_id: &Username,
        balance: Usd,
        policy: &AccountPolicy,
        now: DateTime<Utc>,
    ) {
        let record = self.entry(player_id, policy, now);
        record.account.balance = balance;
        record.account.updated_at = now;
    }

    pub fn record(&mut self, result: &RoundResult, policy: &AccountPolicy, now: DateTime<Utc>) {
        self.entry(&result.player_id, policy, now)
            .account
            .record_net(result.net, now);
        self.history.push(result.clone());
    }

    pub fn claim_bonus(
        &mut self,
        player_id: &Username,
        policy: &AccountPolicy,
        now: DateTime<Utc>,
    ) -> WalletResult<BonusClaim> {
        let record = self.entry(player_id, policy, now);
        record
            .bonus
            .claim(now, policy.bonus_daily_limit)
            .map_err(WalletError::BonusNotAvailable)?;
        record.account.balance = record.account.balance.saturating_add(policy.bonus_amount);
        record.account.updated_at = now;
        Ok(BonusClaim {
            amount: policy.bonus_amount,
            balance: record.account.balance,
            claims_in_window: record.bonus.claims,
            claims_remaining: policy.bonus_daily_limit.saturating_sub(record.bonus.claims),
            window_resets_at: record.bonus.resets_at(now),
        })
    }

    pub fn history(&self, player_id: &Username, limit: usize) -> Vec<RoundResult> {
        self.history
            .iter()
            .rev()
            .filter(|r| &r.player_id == player_id)
            .take(limit)
            .cloned()
            .collect()
    }
}
