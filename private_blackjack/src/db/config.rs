//! Database pool settings.

use serde::{Deserialize, Serialize};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Defaults for a local development database
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/blackjack".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }

    /// The URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        match (self.database_url.find("://"), self.database_url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let credentials = &self.database_url[scheme_end + 3..at];
                match credentials.split_once(':') {
                    Some((user, _)) => format!(
                        "{}{}:***{}",
                        &self.database_url[..scheme_end + 3],
                        user,
                        &self.database_url[at..]
                    ),
                    None => self.database_url.clone(),
                }
            }
            _ => self.database_url.clone(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_url_hides_password() {
        let config = DatabaseConfig {
            database_url: "postgres://dealer:hunter2@db:5432/blackjack".to_string(),
            ..DatabaseConfig::default()
        };
        assert_eq!(config.redacted_url(), "postgres://dealer:***@db:5432/blackjack");
    }

    #[test]
    fn test_redacted_url_without_password() {
        let config = DatabaseConfig::development();
        assert_eq!(config.redacted_url(), "postgres://postgres@localhost/blackjack");
    }
}
