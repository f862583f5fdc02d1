use crate::domain::account::Money;
use crate::domain::mutation::{BalanceQuery, Mutation, MutationKind, MutationRequest, account_of};
use crate::domain::ports::{ConnectionBox, ConnectionProviderRef, Statement};
use crate::error::{LedgerError, Result, StoreError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{Instrument, debug, info, warn};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a mutation request is in its lifecycle.
///
/// Failure after `TransactionOpen` always ends in `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Validated,
    TransactionOpen,
    BalanceRead,
    BalanceComputed,
    BalanceWritten,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub previous_balance: Money,
    pub new_balance: Money,
}

/// The Balance Reader and Balance Transaction Engine.
///
/// Holds no in-process locks: exclusion between concurrent mutations of the
/// same account is the store's row lock, taken by the locking read.
#[derive(Clone)]
pub struct LedgerEngine {
    provider: ConnectionProviderRef,
    store_timeout: Duration,
}

impl LedgerEngine {
    pub fn new(provider: ConnectionProviderRef) -> Self {
        Self {
            provider,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bounds every store round-trip (acquire, begin, query, commit, rollback, release).
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Reads the current balance of an account. Single query, no transaction.
    pub async fn get_balance(&self, query: BalanceQuery) -> Result<Money> {
        let user_id = account_of(query.user_id.as_ref())?;
        let limit = self.store_timeout;

        let mut conn = timed(limit, self.provider.acquire())
            .await
            .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?;
        let read = timed(
            limit,
            conn.query(&Statement::SelectBalance {
                user_id: user_id.clone(),
            }),
        )
        .await;
        if let Err(e) = timed(limit, conn.release()).await {
            warn!(user_id = %user_id, error = %e, "Failed to release connection");
        }

        read.map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?
            .first()
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))
    }

    /// Applies one balance mutation atomically.
    ///
    /// Validation runs before any store access. The transaction runs on its own
    /// task: if this future is dropped, the task notices at the next stage
    /// boundary, rolls back and releases the connection.
    pub async fn apply(&self, request: MutationRequest) -> Result<MutationOutcome> {
        let kind = request.kind_name();
        let mutation = request.validate().inspect_err(|e| {
            debug!(kind, error = %e, "Rejected mutation request");
        })?;

        if let MutationKind::CancelSessionBet { offline: true, .. } = mutation.kind {
            debug!(user_id = %mutation.user_id, "offline flag set on cancelSessionBet; it has no effect");
        }

        let (caller_alive, caller) = oneshot::channel::<()>();
        let span = tracing::info_span!("balance_transaction", kind, user_id = %mutation.user_id);
        let task = tokio::spawn(
            run_transaction(self.provider.clone(), self.store_timeout, caller, mutation)
                .instrument(span),
        );

        let outcome = task
            .await
            .map_err(|e| LedgerError::TransactionFailed(format!("transaction task failed: {e}")))?;
        drop(caller_alive);
        outcome
    }
}

async fn timed<T>(
    limit: Duration,
    operation: impl Future<Output = std::result::Result<T, StoreError>>,
) -> std::result::Result<T, StoreError> {
    tokio::time::timeout(limit, operation)
        .await
        .unwrap_or(Err(StoreError::Timeout(limit)))
}

fn failed(step: &'static str) -> impl FnOnce(StoreError) -> LedgerError {
    move |e| LedgerError::TransactionFailed(format!("{step}: {e}"))
}

async fn run_transaction(
    provider: ConnectionProviderRef,
    store_timeout: Duration,
    caller: oneshot::Receiver<()>,
    mutation: Mutation,
) -> Result<MutationOutcome> {
    let conn = timed(store_timeout, provider.acquire())
        .await
        .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?;

    let mut transaction = BalanceTransaction {
        conn,
        stage: Stage::Validated,
        store_timeout,
        caller,
    };
    let result = transaction.execute(&mutation).await;
    transaction.finish(result).await
}

/// One checked-out connection driving a single read-modify-write cycle.
struct BalanceTransaction {
    conn: ConnectionBox,
    stage: Stage,
    store_timeout: Duration,
    caller: oneshot::Receiver<()>,
}

impl BalanceTransaction {
    async fn execute(&mut self, mutation: &Mutation) -> Result<MutationOutcome> {
        let limit = self.store_timeout;
        let user_id = &mutation.user_id;

        self.checkpoint()?;
        timed(limit, self.conn.begin())
            .await
            .map_err(failed("begin transaction"))?;
        self.advance(Stage::TransactionOpen);

        self.checkpoint()?;
        let read = timed(
            limit,
            self.conn.query(&Statement::SelectBalanceForUpdate {
                user_id: user_id.clone(),
            }),
        )
        .await
        .map_err(failed("read balance"))?;
        let current = read
            .first()
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))?;
        self.advance(Stage::BalanceRead);

        let new_balance = mutation.apply(current)?;
        self.advance(Stage::BalanceComputed);

        self.checkpoint()?;
        let written = timed(
            limit,
            self.conn.query(&Statement::UpdateBalance {
                user_id: user_id.clone(),
                balance: new_balance,
            }),
        )
        .await
        .map_err(failed("update balance"))?;
        debug!(rows_affected = written.rows_affected, "Balance written");
        self.advance(Stage::BalanceWritten);

        self.checkpoint()?;
        timed(limit, self.conn.commit())
            .await
            .map_err(failed("commit"))?;
        self.advance(Stage::Committed);

        info!(
            previous = %current,
            new = %new_balance,
            "Balance committed"
        );
        Ok(MutationOutcome {
            previous_balance: current,
            new_balance,
        })
    }

    /// Rolls back when the transaction did not commit, then releases. Consumes
    /// the transaction so the connection is released exactly once.
    async fn finish(mut self, result: Result<MutationOutcome>) -> Result<MutationOutcome> {
        let limit = self.store_timeout;

        if let Err(error) = &result {
            if self.stage >= Stage::TransactionOpen && self.stage < Stage::Committed {
                match timed(limit, self.conn.rollback()).await {
                    Ok(()) => self.advance(Stage::RolledBack),
                    Err(e) => warn!(error = %e, "Rollback failed"),
                }
            }
            debug!(stage = ?self.stage, error = %error, "Mutation failed");
        }

        if let Err(e) = timed(limit, self.conn.release()).await {
            warn!(error = %e, "Failed to release connection");
        }
        result
    }

    fn advance(&mut self, stage: Stage) {
        debug!(from = ?self.stage, to = ?stage, "Stage transition");
        self.stage = stage;
    }

    // The sender is never used; it only closes when the caller goes away.
    fn checkpoint(&mut self) -> Result<()> {
        match self.caller.try_recv() {
            Err(TryRecvError::Closed) => Err(LedgerError::TransactionFailed(
                "request cancelled by caller".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
