//! Command line and environment configuration.

use crate::interfaces::http::DEFAULT_LISTEN;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Wallet ledger service for betting balances", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the HTTP/JSON endpoints
    Serve {
        #[arg(long, env = "WALLET_LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
        listen: SocketAddr,
    },
    /// Apply a JSON-lines request file and print one reply per request
    Replay {
        /// Input requests file, one `{"op": ..., ...}` object per line
        input: PathBuf,
    },
    /// Print the balance of one account
    Balance { user_id: String },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct StoreArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "WALLET_LEDGER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// MySQL connection URL (optional). Takes precedence over --db-path.
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// CSV file (`user_id,balance`) used to seed the local store.
    #[arg(long, global = true, env = "WALLET_LEDGER_ACCOUNTS")]
    pub accounts: Option<PathBuf>,

    /// Upper bound for each store round-trip, in milliseconds.
    #[arg(long, global = true, env = "WALLET_LEDGER_STORE_TIMEOUT_MS", default_value_t = 5000)]
    pub store_timeout_ms: u64,
}

impl StoreArgs {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct LoggingArgs {
    #[arg(long, global = true, env = "WALLET_LEDGER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default filter when RUST_LOG is unset.
    #[arg(long, global = true, env = "WALLET_LEDGER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
