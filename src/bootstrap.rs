//! Store selection and seeding for the binary.

use crate::config::StoreArgs;
use crate::domain::ports::ConnectionProviderRef;
use crate::infrastructure::in_memory::InMemoryStore;
use crate::infrastructure::row_lock::{LockingStore, RecordBackend};
use crate::interfaces::csv::account_reader::AccountReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Opens the store selected by the arguments: MySQL, then RocksDB, then memory.
///
/// A backend whose cargo feature is disabled falls back to the in-memory store
/// with a warning.
pub async fn open_store(args: &StoreArgs) -> Result<ConnectionProviderRef> {
    if let Some(database_url) = &args.database_url {
        #[cfg(feature = "storage-mysql")]
        {
            if args.accounts.is_some() {
                eprintln!("WARNING: --accounts is ignored when --database-url is set.");
            }
            let store = crate::infrastructure::mysql::MySqlStore::connect(database_url)
                .await
                .into_diagnostic()?;
            info!("Using MySQL storage");
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "storage-mysql"))]
        {
            let _ = database_url;
            eprintln!(
                "WARNING: MySQL storage requested via --database-url, but 'storage-mysql' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    if let Some(db_path) = &args.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = crate::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?;
            seed(&store, args.accounts.as_deref()).await?;
            info!(path = %db_path.display(), "Using RocksDB storage");
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    let store = InMemoryStore::new();
    seed(&store, args.accounts.as_deref()).await?;
    Ok(Arc::new(store))
}

/// Provisions every readable row of an accounts CSV. Bad rows are reported and skipped.
pub async fn seed<B: RecordBackend>(store: &LockingStore<B>, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let file = File::open(path).into_diagnostic()?;
    let mut seeded = 0usize;
    for account in AccountReader::new(file).accounts() {
        match account {
            Ok(account) => {
                store.provision(account).await.into_diagnostic()?;
                seeded += 1;
            }
            Err(e) => eprintln!("Error reading account: {}", e),
        }
    }
    info!(seeded, path = %path.display(), "Seeded accounts");
    Ok(())
}
