//! PostgreSQL account store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{
    errors::{WalletError, WalletResult},
    models::{Account, AccountPolicy, BonusClaim, BonusWindow},
    store::AccountStore,
};
use crate::{
    db::Database,
    game::{
        entities::{Usd, Username},
        settlement::{Outcome, RoundResult},
    },
};

const CREATE_ACCOUNTS: &str = "CREATE TABLE IF NOT EXISTS accounts (
    player_id TEXT PRIMARY KEY,
    balance BIGINT NOT NULL CHECK (balance >= 0),
    total_games BIGINT NOT NULL DEFAULT 0,
    total_wins BIGINT NOT NULL DEFAULT 0,
    total_losses BIGINT NOT NULL DEFAULT 0,
    total_pushes BIGINT NOT NULL DEFAULT 0,
    bonus_last_claim TIMESTAMPTZ,
    bonus_claims INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

const CREATE_ROUND_RESULTS: &str = "CREATE TABLE IF NOT EXISTS round_results (
    id BIGSERIAL PRIMARY KEY,
    round_id UUID NOT NULL,
    round_number BIGINT NOT NULL,
    player_id TEXT NOT NULL REFERENCES accounts (player_id),
    bet BIGINT NOT NULL,
    payout BIGINT NOT NULL,
    net BIGINT NOT NULL,
    outcome TEXT NOT NULL,
    settled_at TIMESTAMPTZ NOT NULL
)";

const CREATE_ROUND_RESULTS_INDEX: &str = "CREATE INDEX IF NOT EXISTS round_results_player_idx
    ON round_results (player_id, settled_at DESC)";

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
    policy: AccountPolicy,
}

fn to_usd(value: i64) -> WalletResult<Usd> {
    Usd::try_from(value).map_err(|_| WalletError::BalanceOutOfRange(value))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn account_from_row(row: &PgRow) -> WalletResult<Account> {
    Ok(Account {
        player_id: Username::new(row.get::<String, _>("player_id").as_str()),
        balance: to_usd(row.get("balance"))?,
        total_games: to_count(row.get("total_games")),
        total_wins: to_count(row.get("total_wins")),
        total_losses: to_count(row.get("total_losses")),
        total_pushes: to_count(row.get("total_pushes")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn result_from_row(row: &PgRow) -> WalletResult<RoundResult> {
    let outcome: String = row.get("outcome");
    Ok(RoundResult {
        round_id: row.get("round_id"),
        round_number: to_count(row.get("round_number")),
        player_id: Username::new(row.get::<String, _>("player_id").as_str()),
        bet: to_usd(row.get("bet"))?,
        payout: to_usd(row.get("payout"))?,
        net: row.get("net"),
        outcome: outcome
            .parse::<Outcome>()
            .map_err(WalletError::CorruptRecord)?,
        settled_at: row.get("settled_at"),
    })
}

impl PgAccountStore {
    #[must_use]
    pub fn new(db: &Database, policy: AccountPolicy) -> Self {
        Self {
            pool: db.pool().clone(),
            policy,
        }
    }

    /// Create the tables this store needs if they are missing.
    pub async fn ensure_schema(&self) -> WalletResult<()> {
        for statement in [
            CREATE_ACCOUNTS,
            CREATE_ROUND_RESULTS,
            CREATE_ROUND_RESULTS_INDEX,
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Account schema ready");
        Ok(())
    }

    async fn ensure_account(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        player_id: &Username,
    ) -> WalletResult<()> {
        sqlx::query(
            "INSERT INTO accounts (player_id, balance) VALUES ($1, $2)
             ON CONFLICT (player_id) DO NOTHING",
        )
        .bind(player_id.as_str())
        .bind(i64::from(self.policy.starting_balance))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get_balance(&self, player_id: &Username) -> WalletResult<Usd> {
        let mut tx = self.pool.begin().await?;
        self.ensure_account(&mut tx, player_id).await?;
        let row = sqlx::query("SELECT balance FROM accounts WHERE player_id = $1")
            .bind(player_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        to_usd(row.get("balance"))
    }

    async fn set_balance(&self, player_id: &Username, balance: Usd) -> WalletResult<()> {
        sqlx::query(
            "INSERT INTO accounts (player_id, balance) VALUES ($1, $2)
             ON CONFLICT (player_id)
             DO UPDATE SET balance = EXCLUDED.balance, updated_at = NOW()",
        )
        .bind(player_id.as_str())
        .bind(i64::from(balance))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_round_result(&self, result: &RoundResult) -> WalletResult<()> {
        let (wins, losses, pushes): (i64, i64, i64) = match result.net {
            n if n > 0 => (1, 0, 0),
            n if n < 0 => (0, 1, 0),
            _ => (0, 0, 1),
        };
        let mut tx = self.pool.begin().await?;
        self.ensure_account(&mut tx, &result.player_id).await?;
        sqlx::query(
            "INSERT INTO round_results
                (round_id, round_number, player_id, bet, payout, net, outcome, settled_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(result.round_id)
        .bind(i64::try_from(result.round_number).unwrap_or(i64::MAX))
        .bind(result.player_id.as_str())
        .bind(i64::from(result.bet))
        .bind(i64::from(result.payout))
        .bind(result.net)
        .bind(result.outcome.to_string())
        .bind(result.settled_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE accounts SET
                total_games = total_games + 1,
                total_wins = total_wins + $2,
                total_losses = total_losses + $3,
                total_pushes = total_pushes + $4,
                updated_at = NOW()
             WHERE player_id = $1",
        )
        .bind(result.player_id.as_str())
        .bind(wins)
        .bind(losses)
        .bind(pushes)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn account(&self, player_id: &Username) -> WalletResult<Account> {
        let mut tx = self.pool.begin().await?;
        self.ensure_account(&mut tx, player_id).await?;
        let row = sqlx::query("SELECT * FROM accounts WHERE player_id = $1")
            .bind(player_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        account_from_row(&row)
    }

    async fn claim_bonus(&self, player_id: &Username) -> WalletResult<BonusClaim> {
        let mut tx = self.pool.begin().await?;
        self.ensure_account(&mut tx, player_id).await?;

        // Row lock so concurrent claims see each other's window
        let row = sqlx::query(
            "SELECT balance, bonus_last_claim, bonus_claims FROM accounts
             WHERE player_id = $1 FOR UPDATE",
        )
        .bind(player_id.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        let mut window = BonusWindow {
            last_claim_at: row.get::<Option<DateTime<Utc>>, _>("bonus_last_claim"),
            claims: u32::try_from(row.get::<i32, _>("bonus_claims")).unwrap_or(0),
        };
        window
            .claim(now, self.policy.bonus_daily_limit)
            .map_err(WalletError::BonusNotAvailable)?;
        let balance = to_usd(row.get("balance"))?.saturating_add(self.policy.bonus_amount);

        sqlx::query(
            "UPDATE accounts SET balance = $2, bonus_last_claim = $3, bonus_claims = $4,
                updated_at = NOW()
             WHERE player_id = $1",
        )
        .bind(player_id.as_str())
        .bind(i64::from(balance))
        .bind(window.last_claim_at)
        .bind(i32::try_from(window.claims).unwrap_or(i32::MAX))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(BonusClaim {
            amount: self.policy.bonus_amount,
            balance,
            claims_in_window: window.claims,
            claims_remaining: self
                .policy
                .bonus_daily_limit
                .saturating_sub(window.claims),
            window_resets_at: window.resets_at(now),
        })
    }

    async fn round_history(
        &self,
        player_id: &Username,
        limit: usize,
    ) -> WalletResult<Vec<RoundResult>> {
        let rows = sqlx::query(
            "SELECT round_id, round_number, player_id, bet, payout, net, outcome, settled_at
             FROM round_results WHERE player_id = $1
             ORDER BY settled_at DESC, id DESC LIMIT $2",
        )
        .bind(player_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(result_from_row).collect()
    }
}
