//! Table module running a blackjack table as an async actor.
//!
//! Each table runs in its own Tokio task with an mpsc message inbox. Client
//! commands and timer callbacks arrive through the same inbox, so only one
//! mutation is ever in flight. Subscribers receive a full snapshot after
//! every change.
//!
//! ## Example
//!
//! ```
//! use private_blackjack::table::{TableActor, TableConfig, TableResponse};
//! use private_blackjack::wallet::{AccountPolicy, MemoryAccountStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryAccountStore::new(AccountPolicy::default()));
//!     let (actor, handle) = TableActor::new(TableConfig::default(), store);
//!     tokio::spawn(actor.run());
//!
//!     let response = handle.join("alice".into(), "Alice".to_string()).await.unwrap();
//!     assert!(matches!(response, TableResponse::Joined { seat_index: 0, .. }));
//! }
//! ```

pub mod actor;
pub mod config;
pub mod messages;

pub use actor::{TableActor, TableHandle};
pub use config::{TableConfig, TableSpeed};
pub use messages::{TableEvent, TableMessage, TableResponse};
