//! Blackjack server using the async actor model.
//!
//! Hosts a single table actor and exposes it over HTTP and WebSocket.

use std::sync::Arc;

use anyhow::{Context, Error};
use log::{error, info};
use pb_server::{
    api,
    config::{ServerConfig, StoreKind},
    logging, metrics,
};
use pico_args::Arguments;
use private_blackjack::{
    AccountStore, TableActor, TableMessage,
    db::Database,
    wallet::{FileAccountStore, MemoryAccountStore, PgAccountStore},
};
use uuid::Uuid;

const HELP: &str = "\
Run a private blackjack server

USAGE:
  pb_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --store      KIND        Account store: memory, file or postgres  [default: env ACCOUNT_STORE or memory]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  METRICS_BIND             Prometheus scrape address, metrics disabled when unset
  ACCOUNT_STORE            memory | file | postgres
  ACCOUNTS_FILE            JSON file used by the file store  [default: accounts.json]
  DATABASE_URL             PostgreSQL connection string
  TABLE_SPEED              normal | turbo | hyper
  STARTING_BALANCE         Balance given to new players
  BONUS_AMOUNT             Daily bonus credit
  BONUS_DAILY_LIMIT        Bonus claims per 24 hours
  (See .env file for all configuration options)
";

/// Capacity of the metrics tracker's event queue
const TRACKER_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind = pargs.opt_value_from_str("--bind")?;
    let store_kind: Option<StoreKind> = pargs.opt_value_from_str("--store")?;
    let database_url = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind, store_kind, database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Prometheus metrics at http://{}/metrics", addr);
    }

    let (store, database) = open_store(&config).await?;

    let (actor, table) = TableActor::new(config.table.clone(), store.clone());
    let table_task = tokio::spawn(actor.run());

    let events = table
        .subscribe(Uuid::new_v4(), TRACKER_BUFFER)
        .await
        .map_err(Error::msg)?;
    tokio::spawn(metrics::track_table(events));

    let app = api::create_router(api::AppState::new(table.clone(), store));

    info!("Starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");

    // Stakes still on the felt go back to their owners before exit.
    match table
        .request(|response| TableMessage::Close { response })
        .await
    {
        Ok(_) => {
            if let Err(e) = table_task.await {
                error!("Table task failed: {}", e);
            }
        }
        Err(e) => error!("Failed to close table: {}", e),
    }

    if let Some(database) = database {
        database.close().await;
    }

    Ok(())
}

/// Build the configured account store, keeping the pool around for shutdown
async fn open_store(
    config: &ServerConfig,
) -> Result<(Arc<dyn AccountStore>, Option<Database>), Error> {
    match config.store {
        StoreKind::Memory => {
            info!("Using in-memory accounts; balances are lost on restart");
            Ok((Arc::new(MemoryAccountStore::new(config.accounts)), None))
        }
        StoreKind::File => {
            info!("Using accounts file {}", config.accounts_file.display());
            let store = FileAccountStore::open(&config.accounts_file, config.accounts)
                .await
                .with_context(|| {
                    format!("Failed to open {}", config.accounts_file.display())
                })?;
            Ok((Arc::new(store), None))
        }
        StoreKind::Postgres => {
            let database = Database::new(&config.database)
                .await
                .context("Failed to connect to database")?;
            let store = PgAccountStore::new(&database, config.accounts);
            store
                .ensure_schema()
                .await
                .context("Failed to prepare account tables")?;
            info!("Database connected successfully");
            Ok((Arc::new(store), Some(database)))
        }
    }
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
