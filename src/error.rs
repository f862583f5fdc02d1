use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Failures a caller of the ledger can observe.
///
/// Store-layer errors never cross the engine boundary as-is: the engine rolls
/// back, releases the connection and translates them into one of these kinds.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Missing parameter: {0}")]
    #[diagnostic(code(ledger::missing_parameter))]
    MissingParameter(&'static str),
    #[error("Invalid argument: {0}")]
    #[diagnostic(code(ledger::invalid_argument))]
    InvalidArgument(String),
    #[error("Account not found: {0}")]
    #[diagnostic(code(ledger::account_not_found))]
    AccountNotFound(String),
    #[error("Store unavailable: {0}")]
    #[diagnostic(code(ledger::store_unavailable))]
    StoreUnavailable(String),
    #[error("Transaction failed: {0}")]
    #[diagnostic(code(ledger::transaction_failed))]
    TransactionFailed(String),
}

impl LedgerError {
    /// HTTP-style status code for the reference JSON binding.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingParameter(_) | Self::InvalidArgument(_) => 400,
            Self::AccountNotFound(_) => 404,
            Self::StoreUnavailable(_) | Self::TransactionFailed(_) => 500,
        }
    }

    /// Short machine-parsable reason, stable across releases.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AccountNotFound(_) => "account_not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::TransactionFailed(_) => "transaction_failed",
        }
    }
}

/// Raw failures reported by a store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Transaction state error: {0}")]
    State(String),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[cfg(feature = "storage-mysql")]
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),
}

/// Failures reading batch input (account seeds, request files).
#[derive(Error, Debug)]
pub enum InputError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Line {line}: {source}")]
    JsonError {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
}
