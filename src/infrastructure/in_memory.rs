use super::row_lock::{LockingStore, RecordBackend};
use crate::domain::account::{Account, Money, UserId};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Committed balances held in memory.
///
/// Ideal for testing, or for a ledger that is seeded at startup and does not
/// need to survive a restart.
#[derive(Default)]
pub struct InMemoryBackend {
    accounts: RwLock<HashMap<UserId, Money>>,
}

#[async_trait]
impl RecordBackend for InMemoryBackend {
    async fn load(&self, user_id: &UserId) -> Result<Option<Money>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(user_id).copied())
    }

    async fn persist(&self, writes: Vec<Account>) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        for account in writes {
            accounts.insert(account.user_id, account.balance);
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .map(|(user_id, balance)| Account::new(user_id.clone(), *balance))
            .collect())
    }
}

pub type InMemoryStore = LockingStore<InMemoryBackend>;

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::with_backend(InMemoryBackend::default())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ConnectionProviderRef;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn user(id: &str) -> UserId {
        UserId::parse(Some(id)).unwrap()
    }

    #[tokio::test]
    async fn test_provision_and_read_back() {
        let store = InMemoryStore::new();
        store
            .provision(Account::new(user("5551234"), Money::new(dec!(100.0))))
            .await
            .unwrap();

        assert_eq!(
            store.balance(&user("5551234")).await,
            Some(Money::new(dec!(100.0)))
        );
        assert_eq!(store.balance(&user("5550000")).await, None);
    }

    #[tokio::test]
    async fn test_accounts_are_sorted() {
        let store = InMemoryStore::new();
        for (id, amount) in [("3", dec!(3)), ("1", dec!(1)), ("2", dec!(2))] {
            store
                .provision(Account::new(user(id), Money::new(amount)))
                .await
                .unwrap();
        }

        let accounts = store.accounts().await.unwrap();
        let ids: Vec<&str> = accounts.iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_store_as_trait_object() {
        let store = InMemoryStore::new();
        store
            .provision(Account::new(user("1"), Money::new(dec!(5))))
            .await
            .unwrap();
        let provider: ConnectionProviderRef = Arc::new(store);

        // Verify Send + Sync by spawning tasks
        let handle = tokio::spawn(async move {
            let mut conn = provider.acquire().await.unwrap();
            let read = conn
                .query(&crate::domain::ports::Statement::SelectBalance { user_id: user("1") })
                .await
                .unwrap();
            conn.release().await.unwrap();
            read.first()
        });

        assert_eq!(handle.await.unwrap(), Some(Money::new(dec!(5))));
    }
}
