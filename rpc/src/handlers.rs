//! RPC request handlers.
//!
//! Every handler that acts on behalf of a player builds its
//! [`UserContext`](dareduel_types::UserContext) from the request headers
//! and passes it down explicitly.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};

use dareduel_battle::Payout;
use dareduel_ledger::LedgerError;
use dareduel_store::{
    Battle, DuelStore, ProfilePin, StoreError, Submission, UserAccount,
};
use dareduel_types::{
    BattleId, Coins, Dare, PlayerDisposition, SubmissionId, Timestamp, UserId,
};

use crate::caller::caller;
use crate::pagination::{paginate, PaginationMeta, PaginationParams};
use crate::{RpcError, RpcState};

// ── Requests ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct OpenAccountRequest {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub invitee: UserId,
    pub dare: String,
    /// Further dares. When present the dare becomes a backlog.
    #[serde(default)]
    pub more_dares: Vec<String>,
    pub stake_coins: u64,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub dare: String,
    #[serde(default)]
    pub more_dares: Vec<String>,
    pub stake_coins: u64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitProofRequest {
    pub media_ref: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub next_dare: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    /// Whose submissions; defaults to the caller.
    pub user: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct DispositionRequest {
    pub disposition: PlayerDisposition,
}

// ── Responses ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub id: SubmissionId,
    pub battle_id: BattleId,
    pub user_id: UserId,
    pub media_url: String,
    pub caption: String,
    pub dare: Option<String>,
    pub submitted_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct BattlesPage {
    pub battles: Vec<Battle>,
    #[serde(flatten)]
    pub meta: PaginationMeta,
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn parse_battle_id(raw: &str) -> Result<BattleId, RpcError> {
    raw.parse()
        .map_err(|_| RpcError::InvalidRequest(format!("malformed battle id: {raw}")))
}

fn parse_user(raw: String) -> Result<UserId, RpcError> {
    UserId::parse(raw).map_err(|e| RpcError::InvalidRequest(e.to_string()))
}

fn dare_from(first: String, more: Vec<String>) -> Result<Dare, RpcError> {
    let dare = if more.is_empty() {
        Dare::single(first)?
    } else {
        Dare::backlog(std::iter::once(first).chain(more))?
    };
    Ok(dare)
}

/// Resolve a stored media reference against the configured media base URL.
/// Absolute URLs pass through untouched.
pub fn media_url(base: Option<&str>, media_ref: &str) -> String {
    if media_ref.starts_with("http://") || media_ref.starts_with("https://") {
        return media_ref.to_string();
    }
    match base {
        Some(base) if !base.is_empty() => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            media_ref.trim_start_matches('/')
        ),
        _ => media_ref.to_string(),
    }
}

fn submission_view(base: Option<&str>, s: Submission) -> SubmissionView {
    SubmissionView {
        media_url: media_url(base, &s.media_ref),
        id: s.id,
        battle_id: s.battle_id,
        user_id: s.user_id,
        caption: s.caption,
        dare: s.dare,
        submitted_at: s.submitted_at,
    }
}

// ── Accounts ─────────────────────────────────────────────────────────────

pub async fn open_account<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Json(req): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<UserAccount>), RpcError> {
    let ctx = caller(&headers)?;
    let display_name = req.display_name.unwrap_or(ctx.display_name);
    let account = state
        .lifecycle
        .ledger()
        .open_account(&ctx.user_id, &display_name, state.signup_grant)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    Path(user): Path<String>,
) -> Result<Json<UserAccount>, RpcError> {
    let user = parse_user(user)?;
    match state.lifecycle.ledger().store().get_account(&user) {
        Ok(stored) => Ok(Json(stored.value)),
        Err(StoreError::NotFound(_)) => Err(LedgerError::AccountNotFound(user).into()),
        Err(e) => Err(LedgerError::from(e).into()),
    }
}

// ── Invites ──────────────────────────────────────────────────────────────

pub async fn create_invite<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<Battle>), RpcError> {
    let ctx = caller(&headers)?;
    let dare = dare_from(req.dare, req.more_dares)?;
    let battle = state
        .lifecycle
        .create_from_invite(&ctx, &req.invitee, dare, Coins::new(req.stake_coins))
        .await?;
    Ok((StatusCode::CREATED, Json(battle)))
}

pub async fn accept_invite<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<Battle>, RpcError> {
    let ctx = caller(&headers)?;
    let id = parse_battle_id(&id)?;
    let dare = dare_from(req.dare, req.more_dares)?;
    let battle = state
        .lifecycle
        .accept_invite(&ctx, &id, dare, Coins::new(req.stake_coins))
        .await?;
    Ok(Json(battle))
}

pub async fn decline_invite<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Battle>, RpcError> {
    let ctx = caller(&headers)?;
    let id = parse_battle_id(&id)?;
    Ok(Json(state.lifecycle.decline_invite(&ctx, &id).await?))
}

// ── Battles ──────────────────────────────────────────────────────────────

pub async fn get_battle<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    Path(id): Path<String>,
) -> Result<Json<Battle>, RpcError> {
    let id = parse_battle_id(&id)?;
    Ok(Json(state.lifecycle.get_battle(&id)?))
}

pub async fn submit_proof<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SubmitProofRequest>,
) -> Result<(StatusCode, Json<SubmissionView>), RpcError> {
    let ctx = caller(&headers)?;
    let id = parse_battle_id(&id)?;
    let submission = state
        .lifecycle
        .submit_proof(&ctx, &id, &req.media_ref, &req.caption, req.next_dare)
        .await?;
    let view = submission_view(state.media_base_url.as_deref(), submission);
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_submissions<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<SubmissionsQuery>,
) -> Result<Json<Vec<SubmissionView>>, RpcError> {
    let id = parse_battle_id(&id)?;
    let user = match query.user {
        Some(user) => user,
        None => caller(&headers)?.user_id,
    };
    // 404 for unknown battles rather than an empty list.
    state.lifecycle.get_battle(&id)?;
    let base = state.media_base_url.as_deref();
    let views = state
        .lifecycle
        .submissions(&id, &user)?
        .into_iter()
        .map(|s| submission_view(base, s))
        .collect();
    Ok(Json(views))
}

pub async fn claim_payout<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payout>, RpcError> {
    let ctx = caller(&headers)?;
    let id = parse_battle_id(&id)?;
    Ok(Json(state.lifecycle.claim_payout(&ctx, &id).await?))
}

pub async fn set_disposition<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<DispositionRequest>,
) -> Result<Json<Battle>, RpcError> {
    let ctx = caller(&headers)?;
    let id = parse_battle_id(&id)?;
    let battle = state
        .lifecycle
        .resolve_personal(&ctx, &id, req.disposition)
        .await?;
    Ok(Json(battle))
}

// ── Players ──────────────────────────────────────────────────────────────

pub async fn player_battles<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    Path(user): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<BattlesPage>, RpcError> {
    let user = parse_user(user)?;
    let (battles, meta) = paginate(state.lifecycle.battles_for(&user)?, &params);
    Ok(Json(BattlesPage { battles, meta }))
}

pub async fn player_pins<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
    Path(user): Path<String>,
) -> Result<Json<Vec<ProfilePin>>, RpcError> {
    let user = parse_user(user)?;
    Ok(Json(state.lifecycle.pins(&user)?))
}

// ── Telemetry ────────────────────────────────────────────────────────────

pub async fn metrics<S: DuelStore + ?Sized + 'static>(
    State(state): State<RpcState<S>>,
) -> Result<impl IntoResponse, RpcError> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buf)
        .map_err(|e| RpcError::Server(e.to_string()))?;
    let body = String::from_utf8(buf).map_err(|e| RpcError::Server(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_refs_resolve_against_the_base_url() {
        assert_eq!(
            media_url(Some("https://cdn.example/media/"), "/b1/x.jpg"),
            "https://cdn.example/media/b1/x.jpg"
        );
        assert_eq!(media_url(None, "b1/x.jpg"), "b1/x.jpg");
        assert_eq!(
            media_url(Some("https://cdn.example"), "https://other/x.jpg"),
            "https://other/x.jpg"
        );
    }

    #[test]
    fn extra_dares_make_a_backlog() {
        assert!(!dare_from("run".into(), vec![]).unwrap().is_backlog());
        let backlog = dare_from("run".into(), vec!["swim".into()]).unwrap();
        assert_eq!(backlog.current(), Some("run"));
        assert!(backlog.is_backlog());
        assert!(dare_from(" ".into(), vec![]).is_err());
    }
}
