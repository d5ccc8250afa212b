//! Token login and logout.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use super::views::parse_body;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{LoginRequest, RequestContext};
use crate::policy::authenticated;

#[derive(Debug, Serialize)]
pub struct TokenView {
    pub token: String,
    pub user_id: u64,
    pub expires_in: u64,
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> AppResult<Json<TokenView>> {
    let req: LoginRequest = parse_body(&body)?;
    let auth = state.auth.clone();
    // Argon2 verification is CPU-bound
    let resp = tokio::task::spawn_blocking(move || auth.login(&req))
        .await
        .map_err(|e| AppError::internal("login_task".to_string(), e.to_string()))??;
    let s = resp.session;
    Ok(Json(TokenView { token: s.token.clone(), user_id: s.user_id, expires_in: s.remaining().as_secs() }))
}

/// Revoke the token the caller authenticated with.
pub async fn logout(State(state): State<AppState>, ctx: RequestContext) -> AppResult<StatusCode> {
    let actor = authenticated(&ctx.identity)?;
    if let Some(token) = ctx.token.as_deref() {
        state.sessions.logout(token);
    }
    info!(target: "lims::auth", request_id = %ctx.request_id, user_id = actor.id, "logout");
    Ok(StatusCode::NO_CONTENT)
}
