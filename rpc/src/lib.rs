//! JSON-over-HTTP API for DareDuel.
//!
//! Accounts, invites, battles, proof submissions, payout claims and
//! per-player dispositions, plus the Prometheus scrape endpoint. The
//! caller is identified by the `x-user-id` header on every request that
//! acts for a player.

pub mod caller;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod server;

pub use caller::{caller, NAME_HEADER, USER_HEADER};
pub use error::{ErrorBody, RpcError};
pub use server::{router, RpcServer, RpcState};
