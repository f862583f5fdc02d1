//! The reference HTTP/JSON binding.
//!
//! Routes mirror the operation names: `GET /getUserBalance?userId=...` and
//! `POST /bet`, `/sessionBet`, `/cancelBet`, `/cancelSessionBet` with a JSON body.

use super::dispatch::{Dispatcher, Operation, Reply};
use crate::error::LedgerError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:3002";

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/getUserBalance", get(get_user_balance))
        .route("/bet", post(bet))
        .route("/sessionBet", post(session_bet))
        .route("/cancelBet", post(cancel_bet))
        .route("/cancelSessionBet", post(cancel_session_bet))
        .with_state(Arc::new(dispatcher))
}

/// Serves the router until ctrl-c.
pub async fn serve(listen: SocketAddr, dispatcher: Dispatcher) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(address = %listener.local_addr()?, "Wallet ledger listening");
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}

async fn health_check() -> &'static str {
    "OK"
}

async fn get_user_balance(
    State(dispatcher): State<Arc<Dispatcher>>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    let payload = serde_json::to_value(params).unwrap_or(Value::Null);
    dispatcher.dispatch(Operation::GetUserBalance, payload).await
}

async fn mutate(
    dispatcher: &Dispatcher,
    operation: Operation,
    body: Result<Json<Value>, JsonRejection>,
) -> Reply {
    match body {
        Ok(Json(payload)) => dispatcher.dispatch(operation, payload).await,
        Err(rejection) => Reply::error(&LedgerError::InvalidArgument(rejection.body_text())),
    }
}

async fn bet(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Reply {
    mutate(&dispatcher, Operation::Bet, body).await
}

async fn session_bet(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Reply {
    mutate(&dispatcher, Operation::SessionBet, body).await
}

async fn cancel_bet(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Reply {
    mutate(&dispatcher, Operation::CancelBet, body).await
}

async fn cancel_session_bet(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Reply {
    mutate(&dispatcher, Operation::CancelSessionBet, body).await
}
