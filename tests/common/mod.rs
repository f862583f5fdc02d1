#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use wallet_ledger::domain::account::{Account, Money, UserId};
use wallet_ledger::domain::mutation::{
    BetRequest, CancelBetRequest, CancelSessionBetRequest, MutationRequest, Reference,
    SessionBetRequest,
};
use wallet_ledger::domain::ports::{
    Connection, ConnectionBox, ConnectionProvider, QueryOutput, Statement,
};
use wallet_ledger::error::StoreError;
use wallet_ledger::infrastructure::in_memory::InMemoryStore;

pub fn user(id: &str) -> UserId {
    UserId::parse(Some(id)).unwrap()
}

pub async fn seeded(accounts: &[(&str, Decimal)]) -> InMemoryStore {
    let store = InMemoryStore::new();
    for (id, balance) in accounts {
        store
            .provision(Account::new(user(id), Money::new(*balance)))
            .await
            .unwrap();
    }
    store
}

pub fn bet(user_id: &str, bet: Decimal, winlose: Decimal) -> MutationRequest {
    MutationRequest::Bet(BetRequest {
        user_id: Some(user_id.into()),
        bet_amount: Some(Money::new(bet)),
        winlose_amount: Some(Money::new(winlose)),
    })
}

pub fn session_bet(user_id: &str, bet: Decimal, winlose: Decimal, session_type: i64) -> MutationRequest {
    MutationRequest::SessionBet(SessionBetRequest {
        user_id: Some(user_id.into()),
        bet_amount: Some(Money::new(bet)),
        winlose_amount: Some(Money::new(winlose)),
        session_id: Some(Reference::new("session-1")),
        session_type: Some(session_type),
    })
}

pub fn cancel_bet(user_id: &str, bet: Decimal, winlose: Decimal) -> MutationRequest {
    MutationRequest::CancelBet(CancelBetRequest {
        user_id: Some(user_id.into()),
        bet_amount: Some(Money::new(bet)),
        winlose_amount: Some(Money::new(winlose)),
        round: Some(Reference::new("1")),
    })
}

pub fn cancel_session_bet(
    user_id: &str,
    bet: Decimal,
    winlose: Decimal,
    session_type: i64,
    preserve: Option<Decimal>,
) -> MutationRequest {
    MutationRequest::CancelSessionBet(CancelSessionBetRequest {
        user_id: Some(user_id.into()),
        bet_amount: Some(Money::new(bet)),
        winlose_amount: Some(Money::new(winlose)),
        session_id: Some(Reference::new("session-1")),
        session_type: Some(session_type),
        preserve: preserve.map(Money::new),
        offline: None,
    })
}

/// Store round-trips a test can fail or hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Acquire,
    Begin,
    Read,
    Update,
    Commit,
    Rollback,
    Release,
}

#[derive(Default)]
pub struct Stats {
    acquired: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    released: AtomicUsize,
}

impl Stats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }
    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Wraps an in-memory store, injecting failures and pauses at chosen steps.
///
/// Every call yields to the scheduler first so concurrent requests interleave.
#[derive(Clone)]
pub struct FaultyProvider {
    inner: InMemoryStore,
    fail_on: Vec<Step>,
    gate: Option<(Step, Arc<Semaphore>)>,
    stats: Arc<Stats>,
}

impl FaultyProvider {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            fail_on: Vec::new(),
            gate: None,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn fail_on(mut self, step: Step) -> Self {
        self.fail_on.push(step);
        self
    }

    /// Blocks every connection before `step` until the semaphore hands out a permit.
    pub fn gate_before(mut self, step: Step, gate: Arc<Semaphore>) -> Self {
        self.gate = Some((step, gate));
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }
}

fn injected(step: Step) -> StoreError {
    StoreError::Query(format!("injected {step:?} failure"))
}

#[async_trait]
impl ConnectionProvider for FaultyProvider {
    async fn acquire(&self) -> Result<ConnectionBox, StoreError> {
        tokio::task::yield_now().await;
        if self.fail_on.contains(&Step::Acquire) {
            return Err(injected(Step::Acquire));
        }
        let inner = self.inner.acquire().await?;
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FaultyConnection {
            inner,
            fail_on: self.fail_on.clone(),
            gate: self.gate.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct FaultyConnection {
    inner: ConnectionBox,
    fail_on: Vec<Step>,
    gate: Option<(Step, Arc<Semaphore>)>,
    stats: Arc<Stats>,
}

impl FaultyConnection {
    async fn enter(&mut self, step: Step) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        if let Some((gated, gate)) = &self.gate
            && *gated == step
        {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| StoreError::Connection("gate closed".to_string()))?;
            permit.forget();
        }
        if self.fail_on.contains(&step) {
            return Err(injected(step));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for FaultyConnection {
    async fn begin(&mut self) -> Result<(), StoreError> {
        self.enter(Step::Begin).await?;
        self.inner.begin().await
    }

    async fn query(&mut self, statement: &Statement) -> Result<QueryOutput, StoreError> {
        let step = match statement {
            Statement::UpdateBalance { .. } => Step::Update,
            _ => Step::Read,
        };
        self.enter(step).await?;
        self.inner.query(statement).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.enter(Step::Commit).await?;
        self.inner.commit().await?;
        self.stats.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.enter(Step::Rollback).await?;
        self.inner.rollback().await?;
        self.stats.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&mut self) -> Result<(), StoreError> {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        // The underlying connection is always returned, even when the failure is injected.
        self.inner.release().await?;
        if self.fail_on.contains(&Step::Release) {
            return Err(injected(Step::Release));
        }
        Ok(())
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
