//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use private_blackjack::{
    TableConfig, TableSpeed,
    db::DatabaseConfig,
    wallet::AccountPolicy,
};
use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr};

const DEFAULT_ACCOUNTS_FILE: &str = "accounts.json";

/// Where player accounts are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreKind {
    /// Lost on restart
    #[default]
    Memory,
    /// One JSON document on disk
    File,
    Postgres,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Memory => write!(f, "memory"),
            StoreKind::File => write!(f, "file"),
            StoreKind::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "file" | "json" => Ok(StoreKind::File),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            other => Err(format!("unknown account store '{other}'")),
        }
    }
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Prometheus scrape endpoint, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    pub store: StoreKind,
    /// Used by the file store
    pub accounts_file: PathBuf,
    /// Used by the postgres store
    pub database: DatabaseConfig,
    /// The table this server hosts
    pub table: TableConfig,
    /// Starting stake and daily bonus
    pub accounts: AccountPolicy,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `store_override` - Optional account store override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but unparseable, or if the
    /// postgres store is selected without a database URL.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        store_override: Option<StoreKind>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_strict("SERVER_BIND")?.unwrap_or(default_bind()),
        };
        let metrics_bind = parse_env_strict("METRICS_BIND")?;

        let store = match store_override {
            Some(store) => store,
            None => parse_env_strict("ACCOUNT_STORE")?.unwrap_or_default(),
        };

        let accounts_file = std::env::var("ACCOUNTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ACCOUNTS_FILE));

        let database_url = database_url_override.or_else(|| std::env::var("DATABASE_URL").ok());
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Set it or choose ACCOUNT_STORE=memory|file".to_string(),
            });
        }

        let development = DatabaseConfig::development();
        let database = DatabaseConfig {
            database_url: database_url.unwrap_or(development.database_url),
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", development.max_connections),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", development.min_connections),
            connection_timeout_secs: parse_env_or(
                "DB_CONNECTION_TIMEOUT_SECS",
                development.connection_timeout_secs,
            ),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", development.idle_timeout_secs),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", development.max_lifetime_secs),
        };

        let defaults = TableConfig::default();
        let speed: TableSpeed = parse_env_strict("TABLE_SPEED")?.unwrap_or_default();
        let starting_balance = parse_env_or("STARTING_BALANCE", defaults.starting_balance);
        let table = TableConfig {
            name: std::env::var("TABLE_NAME").unwrap_or(defaults.name),
            max_seats: parse_env_or("TABLE_MAX_SEATS", defaults.max_seats),
            num_decks: parse_env_or("TABLE_NUM_DECKS", defaults.num_decks),
            min_bet: parse_env_or("TABLE_MIN_BET", defaults.min_bet),
            max_bet: parse_env_or("TABLE_MAX_BET", defaults.max_bet),
            starting_balance,
            betting_window_secs: parse_env_or(
                "TABLE_BETTING_WINDOW_SECS",
                defaults.betting_window_secs,
            ),
            speed,
        };

        let policy = AccountPolicy::default();
        let accounts = AccountPolicy {
            starting_balance,
            bonus_amount: parse_env_or("BONUS_AMOUNT", policy.bonus_amount),
            bonus_daily_limit: parse_env_or("BONUS_DAILY_LIMIT", policy.bonus_daily_limit),
        };

        Ok(ServerConfig {
            bind,
            metrics_bind,
            store,
            accounts_file,
            database,
            table,
            accounts,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table.validate().map_err(|reason| ConfigError::Invalid {
            var: "TABLE_*".to_string(),
            reason,
        })?;

        if self.accounts.starting_balance < self.table.min_bet {
            return Err(ConfigError::Invalid {
                var: "STARTING_BALANCE".to_string(),
                reason: format!(
                    "Must cover at least the minimum bet ({})",
                    self.table.min_bet
                ),
            });
        }

        if self.accounts.bonus_daily_limit > 0 && self.accounts.bonus_amount == 0 {
            return Err(ConfigError::Invalid {
                var: "BONUS_AMOUNT".to_string(),
                reason: "Must be greater than 0 while bonuses are enabled".to_string(),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server address ({})", self.bind),
            });
        }

        if self.store == StoreKind::Postgres
            && self.database.min_connections > self.database.max_connections
        {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6969))
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_env_or`], but a value that is set and fails to parse is an error
fn parse_env_strict<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}
