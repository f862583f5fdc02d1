use super::account::{Money, UserId};
use crate::error::{LedgerError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};
use std::fmt;

/// An opaque caller-side token (`userId`, `sessionId`, `round`).
///
/// Callers send these either as JSON strings or as integers; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawReference")]
pub struct Reference(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawReference> for Reference {
    fn from(raw: RawReference) -> Self {
        match raw {
            RawReference::Text(text) => Self(text),
            RawReference::Number(number) => Self(number.to_string()),
        }
    }
}

impl Reference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BalanceQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    pub user_id: Option<Reference>,
    pub bet_amount: Option<Money>,
    pub winlose_amount: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBetRequest {
    pub user_id: Option<Reference>,
    pub bet_amount: Option<Money>,
    pub winlose_amount: Option<Money>,
    pub session_id: Option<Reference>,
    #[serde(rename = "type", default, deserialize_with = "integral_code")]
    pub session_type: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBetRequest {
    pub user_id: Option<Reference>,
    pub bet_amount: Option<Money>,
    pub winlose_amount: Option<Money>,
    pub round: Option<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSessionBetRequest {
    pub user_id: Option<Reference>,
    pub bet_amount: Option<Money>,
    pub winlose_amount: Option<Money>,
    pub session_id: Option<Reference>,
    #[serde(rename = "type", default, deserialize_with = "integral_code")]
    pub session_type: Option<i64>,
    pub preserve: Option<Money>,
    pub offline: Option<Value>,
}

// Integral floats (`1.0`) are the same code as the integer; `1.5` is malformed.
fn integral_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let Some(number) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(code) = number.as_i64() {
        return Ok(Some(code));
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Ok(Some(value as i64))
        }
        _ => Err(D::Error::custom(format!(
            "type must be an integer, got {number}"
        ))),
    }
}

/// One inbound balance change, exactly as the caller sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    Bet(BetRequest),
    SessionBet(SessionBetRequest),
    CancelBet(CancelBetRequest),
    CancelSessionBet(CancelSessionBetRequest),
}

/// Which leg of a session bet an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// `type = 1`: the stake is debited.
    Place,
    /// `type = 2`: the payout is credited.
    Settle,
}

impl SessionPhase {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::Place),
            2 => Ok(Self::Settle),
            other => Err(LedgerError::InvalidArgument(format!(
                "type must be 1 or 2, got {other}"
            ))),
        }
    }
}

/// Kind-specific parameters of a validated mutation.
///
/// `session_type` stays a raw code here: an unknown code is only rejected once
/// the transaction is open, when the formula is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    Bet,
    SessionBet {
        session_id: Reference,
        session_type: i64,
    },
    CancelBet {
        round: Reference,
    },
    CancelSessionBet {
        session_id: Reference,
        session_type: i64,
        preserve: Option<Money>,
        offline: bool,
    },
}

/// A balance change whose required fields are all present.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub user_id: UserId,
    pub bet_amount: Money,
    pub winlose_amount: Money,
    pub kind: MutationKind,
}

impl Mutation {
    /// Derives the new balance from the current one. Pure; never touches a store.
    pub fn apply(&self, current: Money) -> Result<Money> {
        match &self.kind {
            MutationKind::Bet => current
                .checked_sub(self.bet_amount)?
                .checked_add(self.winlose_amount),
            MutationKind::CancelBet { .. } => current
                .checked_add(self.bet_amount)?
                .checked_sub(self.winlose_amount),
            MutationKind::SessionBet { session_type, .. } => {
                self.session_leg(current, *session_type)
            }
            MutationKind::CancelSessionBet {
                session_type,
                preserve,
                ..
            } => {
                let balance = self.session_leg(current, *session_type)?;
                match preserve {
                    Some(preserve) => balance.checked_add(*preserve),
                    None => Ok(balance),
                }
            }
        }
    }

    fn session_leg(&self, current: Money, session_type: i64) -> Result<Money> {
        match SessionPhase::from_code(session_type)? {
            SessionPhase::Place => current.checked_sub(self.bet_amount),
            SessionPhase::Settle => current.checked_add(self.winlose_amount),
        }
    }
}

/// The account a request names. Blank counts as missing.
pub(crate) fn account_of(raw: Option<&Reference>) -> Result<UserId> {
    UserId::parse(raw.map(Reference::as_str))
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or(LedgerError::MissingParameter(field))
}

// Mirrors the loose truthiness callers expect from the `offline` flag.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl MutationRequest {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bet(_) => "bet",
            Self::SessionBet(_) => "sessionBet",
            Self::CancelBet(_) => "cancelBet",
            Self::CancelSessionBet(_) => "cancelSessionBet",
        }
    }

    /// Checks that every field the kind requires is present.
    ///
    /// Fails with `MissingParameter` naming the first absent field.
    pub fn validate(self) -> Result<Mutation> {
        match self {
            Self::Bet(r) => Ok(Mutation {
                user_id: account_of(r.user_id.as_ref())?,
                bet_amount: required(r.bet_amount, "betAmount")?,
                winlose_amount: required(r.winlose_amount, "winloseAmount")?,
                kind: MutationKind::Bet,
            }),
            Self::SessionBet(r) => Ok(Mutation {
                user_id: account_of(r.user_id.as_ref())?,
                bet_amount: required(r.bet_amount, "betAmount")?,
                winlose_amount: required(r.winlose_amount, "winloseAmount")?,
                kind: MutationKind::SessionBet {
                    session_id: required(r.session_id, "sessionId")?,
                    session_type: required(r.session_type, "type")?,
                },
            }),
            Self::CancelBet(r) => Ok(Mutation {
                user_id: account_of(r.user_id.as_ref())?,
                bet_amount: required(r.bet_amount, "betAmount")?,
                winlose_amount: required(r.winlose_amount, "winloseAmount")?,
                kind: MutationKind::CancelBet {
                    round: required(r.round, "round")?,
                },
            }),
            Self::CancelSessionBet(r) => Ok(Mutation {
                user_id: account_of(r.user_id.as_ref())?,
                bet_amount: required(r.bet_amount, "betAmount")?,
                winlose_amount: required(r.winlose_amount, "winloseAmount")?,
                kind: MutationKind::CancelSessionBet {
                    session_id: required(r.session_id, "sessionId")?,
                    session_type: required(r.session_type, "type")?,
                    preserve: r.preserve.filter(|p| !p.is_zero()),
                    offline: r.offline.as_ref().is_some_and(is_truthy),
                },
            }),
        }
    }
}
