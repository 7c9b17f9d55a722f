//! Axum-based RPC server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use prometheus::Registry;
use tokio::net::TcpListener;

use dareduel_battle::BattleLifecycle;
use dareduel_store::DuelStore;
use dareduel_types::Coins;

use crate::error::RpcError;
use crate::handlers;

/// Everything a handler can reach.
pub struct RpcState<S: ?Sized> {
    pub lifecycle: Arc<BattleLifecycle<S>>,
    /// Coins granted to every new account.
    pub signup_grant: Coins,
    /// Prefix for resolving stored media references into URLs.
    pub media_base_url: Option<String>,
    /// Exported at `GET /metrics`.
    pub registry: Registry,
}

impl<S: ?Sized> Clone for RpcState<S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            signup_grant: self.signup_grant,
            media_base_url: self.media_base_url.clone(),
            registry: self.registry.clone(),
        }
    }
}

pub fn router<S: DuelStore + ?Sized + 'static>(state: RpcState<S>) -> Router {
    Router::new()
        .route("/accounts", post(handlers::open_account::<S>))
        .route("/accounts/:user", get(handlers::get_account::<S>))
        .route("/invites", post(handlers::create_invite::<S>))
        .route("/battles/:id", get(handlers::get_battle::<S>))
        .route("/battles/:id/accept", post(handlers::accept_invite::<S>))
        .route("/battles/:id/decline", post(handlers::decline_invite::<S>))
        .route(
            "/battles/:id/submissions",
            post(handlers::submit_proof::<S>).get(handlers::list_submissions::<S>),
        )
        .route("/battles/:id/claim", post(handlers::claim_payout::<S>))
        .route(
            "/battles/:id/disposition",
            post(handlers::set_disposition::<S>),
        )
        .route("/players/:user/battles", get(handlers::player_battles::<S>))
        .route("/players/:user/pins", get(handlers::player_pins::<S>))
        .route("/metrics", get(handlers::metrics::<S>))
        .with_state(state)
}

pub struct RpcServer {
    pub port: u16,
    app: Router,
}

impl RpcServer {
    pub fn new<S: DuelStore + ?Sized + 'static>(port: u16, state: RpcState<S>) -> Self {
        Self {
            port,
            app: router(state),
        }
    }

    /// Bind and serve until the task is dropped.
    pub async fn start(self) -> Result<(), RpcError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        tracing::info!(%addr, "RPC server listening");
        axum::serve(listener, self.app)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
