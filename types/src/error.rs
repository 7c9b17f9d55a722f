//! Top-level error type shared across crates.

use thiserror::Error;

/// Validation errors for the fundamental DareDuel types.
#[derive(Debug, Error)]
pub enum DuelError {
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid dare: {0}")]
    InvalidDare(String),

    #[error("invalid media reference: {0}")]
    InvalidMediaRef(String),

    #[error("invalid utc offset: {0} minutes")]
    InvalidUtcOffset(i32),
}
