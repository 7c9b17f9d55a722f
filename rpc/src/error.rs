//! RPC error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use dareduel_battle::BattleError;
use dareduel_ledger::LedgerError;
use dareduel_types::DuelError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Battle(#[from] BattleError),

    #[error("missing or invalid caller identity: {0}")]
    Unauthenticated(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    Server(String),
}

impl From<LedgerError> for RpcError {
    fn from(e: LedgerError) -> Self {
        Self::Battle(e.into())
    }
}

impl From<DuelError> for RpcError {
    fn from(e: DuelError) -> Self {
        Self::Battle(e.into())
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl RpcError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Battle(e) => e.code(),
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthenticated" => StatusCode::UNAUTHORIZED,
            "not_participant" | "not_invitee" | "not_winner" => StatusCode::FORBIDDEN,
            "already_paid" | "already_resolved" | "already_staked" | "account_exists"
            | "wrong_status" => StatusCode::CONFLICT,
            "insufficient_funds" => StatusCode::PAYMENT_REQUIRED,
            "transaction_conflict" => StatusCode::SERVICE_UNAVAILABLE,
            "storage" | "overflow" | "amount_mismatch" | "server_error" => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dareduel_types::{BattleId, Coins, UserId};

    #[test]
    fn balance_failures_are_distinguishable() {
        let e: RpcError = LedgerError::InsufficientFunds {
            user: UserId::parse("x").unwrap(),
            needed: Coins::new(20),
            available: Coins::new(5),
        }
        .into();
        assert_eq!(e.code(), "insufficient_funds");
        assert_eq!(e.status(), StatusCode::PAYMENT_REQUIRED);

        let e: RpcError = LedgerError::BattleNotFound(BattleId::new([0; 16])).into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);

        let e: RpcError = LedgerError::TransactionConflict {
            op: "payout",
            attempts: 5,
        }
        .into();
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
