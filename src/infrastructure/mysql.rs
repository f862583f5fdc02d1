use crate::domain::account::Money;
use crate::domain::ports::{Connection, ConnectionBox, ConnectionProvider, QueryOutput, Statement};
use crate::error::StoreError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlPool};
use sqlx::pool::PoolConnection;

// `money` is read at the column's own scale so the write-back never rounds it.
const SELECT_BALANCE: &str = "SELECT money FROM users WHERE phone = ?";
const SELECT_BALANCE_FOR_UPDATE: &str = "SELECT money FROM users WHERE phone = ? FOR UPDATE";
const UPDATE_BALANCE: &str = "UPDATE users SET money = ? WHERE phone = ?";

/// The `users(phone, money)` table of a MySQL database.
///
/// InnoDB's `SELECT ... FOR UPDATE` provides the row lock that serializes
/// concurrent mutations of one account. `money` must be a `DECIMAL` column: a
/// floating-point column fails to decode instead of being rounded.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPool::connect(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConnectionProvider for MySqlStore {
    async fn acquire(&self) -> Result<ConnectionBox, StoreError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(MySqlConnection {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

pub struct MySqlConnection {
    conn: Option<PoolConnection<MySql>>,
    in_transaction: bool,
}

impl MySqlConnection {
    fn live(&mut self) -> Result<&mut PoolConnection<MySql>, StoreError> {
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::State("connection already released".to_string()))
    }

    async fn execute_raw(&mut self, sql: &'static str) -> Result<(), StoreError> {
        let conn = self.live()?;
        sqlx::raw_sql(sql).execute(&mut **conn).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            return Err(StoreError::State("transaction already open".to_string()));
        }
        self.execute_raw("START TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn query(&mut self, statement: &Statement) -> Result<QueryOutput, StoreError> {
        let conn = self.live()?;
        match statement {
            Statement::SelectBalance { user_id } | Statement::SelectBalanceForUpdate { user_id } => {
                let sql = if matches!(statement, Statement::SelectBalance { .. }) {
                    SELECT_BALANCE
                } else {
                    SELECT_BALANCE_FOR_UPDATE
                };
                let rows: Vec<Decimal> = sqlx::query_scalar(sql)
                    .bind(user_id.as_str())
                    .fetch_all(&mut **conn)
                    .await?;
                Ok(QueryOutput::rows(rows.into_iter().map(Money::new).collect()))
            }
            Statement::UpdateBalance { user_id, balance } => {
                let result = sqlx::query(UPDATE_BALANCE)
                    .bind(balance.value())
                    .bind(user_id.as_str())
                    .execute(&mut **conn)
                    .await?;
                Ok(QueryOutput::affected(result.rows_affected()))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::State("no open transaction".to_string()));
        }
        self.execute_raw("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.execute_raw("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), StoreError> {
        let rolled_back = if self.in_transaction {
            self.rollback().await
        } else {
            Ok(())
        };
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::State("connection already released".to_string()))?;
        // A connection whose transaction state is unknown must not go back to the pool.
        if rolled_back.is_err() {
            conn.close_on_drop();
        }
        drop(conn);
        rolled_back
    }
}
