use super::row_lock::{LockingStore, RecordBackend};
use crate::domain::account::{Account, Money, UserId};
use crate::error::StoreError;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;

/// Column Family for storing account balances.
pub const CF_ACCOUNTS: &str = "accounts";

/// Committed balances persisted in RocksDB.
///
/// Keys are the raw user id bytes, values the JSON-encoded `Account`. A commit
/// lands as one `WriteBatch`, so a transaction is durable as a whole or not at all.
pub struct RocksDbBackend {
    db: DB,
}

impl RocksDbBackend {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "accounts" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts])?;

        Ok(Self { db })
    }

    fn accounts_cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| StoreError::Connection("Accounts column family not found".to_string()))
    }
}

#[async_trait]
impl RecordBackend for RocksDbBackend {
    async fn load(&self, user_id: &UserId) -> Result<Option<Money>, StoreError> {
        let cf = self.accounts_cf()?;
        match self.db.get_cf(cf, user_id.as_str().as_bytes())? {
            Some(bytes) => {
                let account: Account = serde_json::from_slice(&bytes)?;
                Ok(Some(account.balance))
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, writes: Vec<Account>) -> Result<(), StoreError> {
        let cf = self.accounts_cf()?;
        let mut batch = WriteBatch::default();
        for account in &writes {
            batch.put_cf(cf, account.user_id.as_str().as_bytes(), serde_json::to_vec(account)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Account>, StoreError> {
        let cf = self.accounts_cf()?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(serde_json::from_slice(&value)?);
        }
        Ok(accounts)
    }
}

pub type RocksDbStore = LockingStore<RocksDbBackend>;

impl RocksDbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::with_backend(RocksDbBackend::open(path)?))
    }
}
