use super::account::{Money, UserId};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// The statements the ledger issues against a store.
///
/// Every statement is parameterized; adapters translate them into their own
/// query language (SQL, key lookups, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Plain read of one balance. Takes no lock.
    SelectBalance { user_id: UserId },
    /// Read of one balance that locks the row until commit or rollback.
    SelectBalanceForUpdate { user_id: UserId },
    UpdateBalance { user_id: UserId, balance: Money },
}

/// Result of a [`Statement`]: the balance rows read and the rows written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub rows: Vec<Money>,
    pub rows_affected: u64,
}

impl QueryOutput {
    pub fn rows(rows: Vec<Money>) -> Self {
        Self {
            rows,
            rows_affected: 0,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }

    pub fn first(&self) -> Option<Money> {
        self.rows.first().copied()
    }
}

/// A connection checked out from a store.
///
/// The caller owns the transaction lifecycle: `begin`, any number of `query`
/// calls, then `commit` or `rollback`, and finally `release` exactly once.
#[async_trait]
pub trait Connection: Send {
    async fn begin(&mut self) -> Result<(), StoreError>;
    async fn query(&mut self, statement: &Statement) -> Result<QueryOutput, StoreError>;
    async fn commit(&mut self) -> Result<(), StoreError>;
    async fn rollback(&mut self) -> Result<(), StoreError>;
    /// Returns the connection to its pool. An open transaction is rolled back.
    async fn release(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self) -> Result<ConnectionBox, StoreError>;
}

pub type ConnectionBox = Box<dyn Connection>;
pub type ConnectionProviderRef = Arc<dyn ConnectionProvider>;
