//! Wallet module: player balances, round history and the daily bonus.
//!
//! Tables talk to persistence only through the [`AccountStore`] trait.
//! Three implementations are provided:
//!
//! - [`MemoryAccountStore`] for tests and throwaway servers
//! - [`FileAccountStore`] keeping every account in one JSON file
//! - [`PgAccountStore`] on top of the [`crate::db`] connection pool
//!
//! ## Example
//!
//! ```
//! use private_blackjack::Username;
//! use private_blackjack::wallet::{AccountPolicy, AccountStore, MemoryAccountStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryAccountStore::new(AccountPolicy::default());
//!     let alice = Username::new("alice");
//!     assert_eq!(store.get_balance(&alice).await.unwrap(), 1000);
//!
//!     let claim = store.claim_bonus(&alice).await.unwrap();
//!     assert_eq!(claim.balance, 1500);
//! }
//! ```

pub mod errors;
mod ledger;
pub mod file;
pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

pub use errors::{WalletError, WalletResult};
pub use file::FileAccountStore;
pub use memory::MemoryAccountStore;
pub use models::{Account, AccountPolicy, BonusClaim, BonusWindow};
pub use pg::PgAccountStore;
pub use store::AccountStore;
