use crate::domain::account::{Account, Money, UserId};
use crate::domain::ports::{Connection, ConnectionBox, ConnectionProvider, QueryOutput, Statement};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive per-row locks keyed by account.
///
/// Rows of different users never contend. A guard is held by the transaction
/// that took it until commit, rollback or release. An entry lives only while a
/// guard or a waiter refers to it; [`RowLocks::unlock`] drops idle entries.
#[derive(Clone, Default)]
pub struct RowLocks {
    rows: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        let row = self.rows.entry(user_id.clone()).or_default().clone();
        let mut wait = PendingWait {
            locks: self,
            user_id,
            armed: true,
        };
        let guard = row.lock_owned().await;
        wait.armed = false;
        guard
    }

    fn forget_if_idle(&self, user_id: &UserId) {
        // Waiters hold their own clone of the mutex, so a count of one means idle.
        self.rows.remove_if(user_id, |_, row| Arc::strong_count(row) == 1);
    }

    /// Drops the guard and forgets the row unless another task holds or awaits it.
    pub fn unlock(&self, user_id: &UserId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.forget_if_idle(user_id);
    }

    /// Number of rows currently tracked.
    pub fn tracked(&self) -> usize {
        self.rows.len()
    }
}

// Cleans up after a lock wait that was dropped before it got the guard.
struct PendingWait<'a> {
    locks: &'a RowLocks,
    user_id: &'a UserId,
    armed: bool,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.locks.forget_if_idle(self.user_id);
        }
    }
}

/// Committed account state behind a [`LockingStore`].
#[async_trait]
pub trait RecordBackend: Send + Sync + 'static {
    async fn load(&self, user_id: &UserId) -> Result<Option<Money>, StoreError>;
    /// Applies every write or none of them.
    async fn persist(&self, writes: Vec<Account>) -> Result<(), StoreError>;
    async fn load_all(&self) -> Result<Vec<Account>, StoreError>;
}

/// A transactional store built from row locks and a backend.
///
/// Writes made inside a transaction are buffered and handed to the backend in
/// one `persist` call at commit; rollback drops the buffer.
pub struct LockingStore<B> {
    backend: Arc<B>,
    locks: RowLocks,
}

impl<B> Clone for LockingStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<B: RecordBackend> LockingStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            locks: RowLocks::new(),
        }
    }

    /// Creates or overwrites an account outside of any transaction.
    pub async fn provision(&self, account: Account) -> Result<(), StoreError> {
        let user_id = account.user_id.clone();
        let row = self.locks.lock(&user_id).await;
        let persisted = self.backend.persist(vec![account]).await;
        self.locks.unlock(&user_id, row);
        persisted
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts = self.backend.load_all().await?;
        accounts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(accounts)
    }

    /// Committed balance of one account, ignoring any open transaction.
    pub async fn balance(&self, user_id: &UserId) -> Option<Money> {
        self.backend.load(user_id).await.ok().flatten()
    }

    /// Rows with a live lock entry. Zero whenever no transaction is open.
    pub fn locked_rows(&self) -> usize {
        self.locks.tracked()
    }
}

#[async_trait]
impl<B: RecordBackend> ConnectionProvider for LockingStore<B> {
    async fn acquire(&self) -> Result<ConnectionBox, StoreError> {
        Ok(Box::new(LockingConnection {
            backend: self.backend.clone(),
            locks: self.locks.clone(),
            transaction: None,
            released: false,
        }))
    }
}

#[derive(Default)]
struct OpenTransaction {
    guards: HashMap<UserId, OwnedMutexGuard<()>>,
    writes: BTreeMap<UserId, Money>,
}

pub struct LockingConnection<B> {
    backend: Arc<B>,
    locks: RowLocks,
    transaction: Option<OpenTransaction>,
    released: bool,
}

impl<B> LockingConnection<B> {
    /// Ends the open transaction, if any, releasing its row locks.
    fn close_transaction(&mut self) {
        if let Some(tx) = self.transaction.take() {
            for (user_id, guard) in tx.guards {
                self.locks.unlock(&user_id, guard);
            }
        }
    }
}

// A connection dropped without `release` still gives its rows back.
impl<B> Drop for LockingConnection<B> {
    fn drop(&mut self) {
        self.close_transaction();
    }
}

impl<B: RecordBackend> LockingConnection<B> {
    fn ensure_usable(&self) -> Result<(), StoreError> {
        if self.released {
            Err(StoreError::State("connection already released".to_string()))
        } else {
            Ok(())
        }
    }

    async fn read(&self, user_id: &UserId) -> Result<Option<Money>, StoreError> {
        if let Some(tx) = &self.transaction
            && let Some(pending) = tx.writes.get(user_id)
        {
            return Ok(Some(*pending));
        }
        self.backend.load(user_id).await
    }

    async fn lock_row(&mut self, user_id: &UserId) -> Result<(), StoreError> {
        let held = match &self.transaction {
            Some(tx) => tx.guards.contains_key(user_id),
            None => {
                return Err(StoreError::State(
                    "locking statement outside a transaction".to_string(),
                ));
            }
        };
        if !held {
            let guard = self.locks.lock(user_id).await;
            match self.transaction.as_mut() {
                Some(tx) => {
                    tx.guards.insert(user_id.clone(), guard);
                }
                None => self.locks.unlock(user_id, guard),
            }
        }
        Ok(())
    }

    async fn autocommit(&self, user_id: &UserId, balance: Money) -> Result<u64, StoreError> {
        if self.backend.load(user_id).await?.is_none() {
            return Ok(0);
        }
        self.backend
            .persist(vec![Account::new(user_id.clone(), balance)])
            .await?;
        Ok(1)
    }

    async fn update(&mut self, user_id: &UserId, balance: Money) -> Result<u64, StoreError> {
        if self.transaction.is_none() {
            // Autocommit: a single locked write.
            let row = self.locks.lock(user_id).await;
            let written = self.autocommit(user_id, balance).await;
            self.locks.unlock(user_id, row);
            return written;
        }

        self.lock_row(user_id).await?;
        if self.read(user_id).await?.is_none() {
            return Ok(0);
        }
        if let Some(tx) = self.transaction.as_mut() {
            tx.writes.insert(user_id.clone(), balance);
        }
        Ok(1)
    }
}

#[async_trait]
impl<B: RecordBackend> Connection for LockingConnection<B> {
    async fn begin(&mut self) -> Result<(), StoreError> {
        self.ensure_usable()?;
        if self.transaction.is_some() {
            return Err(StoreError::State("transaction already open".to_string()));
        }
        self.transaction = Some(OpenTransaction::default());
        Ok(())
    }

    async fn query(&mut self, statement: &Statement) -> Result<QueryOutput, StoreError> {
        self.ensure_usable()?;
        match statement {
            Statement::SelectBalance { user_id } => {
                Ok(QueryOutput::rows(self.read(user_id).await?.into_iter().collect()))
            }
            Statement::SelectBalanceForUpdate { user_id } => {
                self.lock_row(user_id).await?;
                Ok(QueryOutput::rows(self.read(user_id).await?.into_iter().collect()))
            }
            Statement::UpdateBalance { user_id, balance } => {
                Ok(QueryOutput::affected(self.update(user_id, *balance).await?))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_usable()?;
        let tx = self
            .transaction
            .as_ref()
            .ok_or_else(|| StoreError::State("no open transaction".to_string()))?;
        let writes: Vec<Account> = tx
            .writes
            .iter()
            .map(|(user_id, balance)| Account::new(user_id.clone(), *balance))
            .collect();
        let persisted = if writes.is_empty() {
            Ok(())
        } else {
            self.backend.persist(writes).await
        };
        // Locks are released only after the writes are durable. A failed
        // persist still ends the transaction.
        self.close_transaction();
        persisted
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_usable()?;
        self.close_transaction();
        Ok(())
    }

    async fn release(&mut self) -> Result<(), StoreError> {
        self.ensure_usable()?;
        self.close_transaction();
        self.released = true;
        Ok(())
    }
}
