use crate::application::engine::LedgerEngine;
use crate::domain::account::Money;
use crate::domain::mutation::{BalanceQuery, MutationRequest};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value, json};
use std::fmt;
use std::str::FromStr;
use tracing::{Instrument, info};
use uuid::Uuid;

/// The inbound operations, named as callers address them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetUserBalance,
    Bet,
    SessionBet,
    CancelBet,
    CancelSessionBet,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::GetUserBalance,
        Operation::Bet,
        Operation::SessionBet,
        Operation::CancelBet,
        Operation::CancelSessionBet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetUserBalance => "getUserBalance",
            Self::Bet => "bet",
            Self::SessionBet => "sessionBet",
            Self::CancelBet => "cancelBet",
            Self::CancelSessionBet => "cancelSessionBet",
        }
    }
}

impl FromStr for Operation {
    type Err = LedgerError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown operation '{name}'")))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A transport-agnostic response: HTTP-style status plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(error: &LedgerError) -> Self {
        Self {
            status: error.status_code(),
            body: json!({
                "error": error.reason(),
                "message": error.to_string(),
            }),
        }
    }
}

/// Renders a balance as a JSON number when one represents it exactly.
///
/// JSON numbers travel as `f64`, which holds about 15 significant digits; a
/// balance it would round is rendered as a decimal string instead.
pub fn money_json(money: Money) -> Value {
    let text = money.to_string();
    match Number::from_str(&text) {
        Ok(number)
            if Decimal::from_str(&number.to_string()).is_ok_and(|exact| exact == money.value()) =>
        {
            Value::Number(number)
        }
        _ => Value::String(text),
    }
}

/// Maps an operation name and its JSON payload onto the engine.
#[derive(Clone)]
pub struct Dispatcher {
    engine: LedgerEngine,
}

impl Dispatcher {
    pub fn new(engine: LedgerEngine) -> Self {
        Self { engine }
    }

    /// Runs one request inside its own logging span and never fails: every
    /// error becomes a [`Reply`] with the matching status.
    pub async fn dispatch(&self, operation: Operation, payload: Value) -> Reply {
        let span = tracing::info_span!(
            "request",
            endpoint = operation.name(),
            request_id = %Uuid::new_v4(),
        );
        async move {
            info!(payload = %payload, "Incoming request");
            let reply = match self.route(operation, payload).await {
                Ok(body) => Reply::ok(body),
                Err(e) => Reply::error(&e),
            };
            info!(status = reply.status, body = %reply.body, "Outgoing response");
            reply
        }
        .instrument(span)
        .await
    }

    async fn route(&self, operation: Operation, payload: Value) -> Result<Value> {
        let request = match operation {
            Operation::GetUserBalance => {
                let query: BalanceQuery = parse(payload)?;
                let balance = self.engine.get_balance(query).await?;
                return Ok(json!({ "balance": money_json(balance) }));
            }
            Operation::Bet => MutationRequest::Bet(parse(payload)?),
            Operation::SessionBet => MutationRequest::SessionBet(parse(payload)?),
            Operation::CancelBet => MutationRequest::CancelBet(parse(payload)?),
            Operation::CancelSessionBet => MutationRequest::CancelSessionBet(parse(payload)?),
        };
        let outcome = self.engine.apply(request).await?;
        Ok(json!({ "newBalance": money_json(outcome.new_balance) }))
    }
}

// An absent body is treated as an empty object so field checks report what is missing.
fn parse<T: DeserializeOwned>(payload: Value) -> Result<T> {
    let payload = match payload {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(payload)
        .map_err(|e| LedgerError::InvalidArgument(format!("malformed request: {e}")))
}
