//! `/users/` handlers.
//!
//! Every handler checks authentication before touching the store, then
//! resolves the target (404), then asks the policy about that instance (404
//! masking or 403), and only then parses the body (400).

use std::collections::{BTreeSet, HashMap};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use super::pagination::{paginate, Page, PageParams};
use super::views::{parse_body, parse_id, UserCreateBody, UserSummary, UserUpdateBody, UserView};
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{Identity, RequestContext, Role, BASELINE_GROUP};
use crate::policy::{authenticated, authorize, Action, Owned, ResourceKind};
use crate::security::hash_password;
use crate::storage::{GroupId, NewUser, Store, UserChanges, UserRecord};

const KIND: ResourceKind = <UserRecord as Owned>::KIND;

/// Map group names to ids; any unknown name rejects the whole request.
fn resolve_groups(store: &Store, names: &[String]) -> AppResult<BTreeSet<GroupId>> {
    names
        .iter()
        .map(|n| {
            store
                .group_by_name(n)
                .map(|g| g.id)
                .ok_or_else(|| AppError::user("unknown_group".to_string(), format!("group '{n}' does not exist")))
        })
        .collect()
}

fn grants_role(name: &str) -> bool { Role::for_group(name).is_some() }

fn require_password(pw: &str) -> AppResult<()> {
    if pw.is_empty() {
        return Err(AppError::user("required", "password may not be blank"));
    }
    Ok(())
}

/// Argon2 hashing is CPU-bound; keep it off the async workers.
async fn hash_off_runtime(state: &AppState, password: String) -> AppResult<String> {
    let cfg = state.store.hashing();
    let phc = tokio::task::spawn_blocking(move || hash_password(&password, &cfg))
        .await
        .map_err(|e| AppError::internal("hash_task".to_string(), e.to_string()))??;
    Ok(phc)
}

pub async fn list_users(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(q): Query<HashMap<String, String>>,
) -> AppResult<Json<Page<UserView>>> {
    let scope = authorize(&ctx.identity, Action::List, KIND, None)?;
    let params = PageParams::from_query(&q)?;
    let store = state.store.read();
    let views = store.users_in(scope).into_iter().map(|u| UserView::new(&store, u)).collect();
    Ok(Json(paginate(views, params)))
}

/// Shared by admin create and self-registration: baseline group plus the
/// requested ones.
async fn create_account(state: &AppState, ctx: &RequestContext, body: UserCreateBody) -> AppResult<(StatusCode, Json<UserView>)> {
    require_password(&body.password)?;
    let phc = hash_off_runtime(state, body.password.clone()).await?;
    let view = state.store.mutate(|s| {
        let mut groups = resolve_groups(s, &body.groups)?;
        groups.insert(s.ensure_group(BASELINE_GROUP)?);
        let rec = s.create_user(NewUser {
            username: body.username,
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            password_hash: Some(phc),
            is_active: true,
            groups,
            addresses: Vec::new(),
        })?;
        Ok(UserView::new(s, &rec))
    })?;
    info!(target: "lims::users", request_id = %ctx.request_id, id = view.id, username = %view.username, "account created");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn create_user(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> AppResult<(StatusCode, Json<UserView>)> {
    authorize(&ctx.identity, Action::Create, KIND, None)?;
    let body: UserCreateBody = parse_body(&body)?;
    create_account(&state, &ctx, body).await
}

pub async fn register(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> AppResult<(StatusCode, Json<UserView>)> {
    authorize(&ctx.identity, Action::Register, KIND, None)?;
    let body: UserCreateBody = parse_body(&body)?;
    // Only admins may register an account straight into a role-granting group
    let is_admin = ctx.identity.actor().is_some_and(|a| a.is_admin());
    if !is_admin && body.groups.iter().any(|g| grants_role(g)) {
        return Err(AppError::forbidden("permission_denied", "registration cannot grant staff or admin membership"));
    }
    create_account(&state, &ctx, body).await
}

pub async fn get_user(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>) -> AppResult<Json<UserView>> {
    authenticated(&ctx.identity)?;
    let id = parse_id(&raw)?;
    let store = state.store.read();
    let user = store.user(id).ok_or_else(|| AppError::not_found("not_found", "not found"))?;
    authorize(&ctx.identity, Action::Read, KIND, user.owner_id())?;
    Ok(Json(UserView::new(&store, user)))
}

/// 404 when missing, then the policy's verdict for `action` on that user.
fn gate_existing(state: &AppState, identity: &Identity, action: Action, raw: &str) -> AppResult<u64> {
    authenticated(identity)?;
    let id = parse_id(raw)?;
    let owner = state.store.read().user(id).map(|u| u.owner_id());
    let Some(owner) = owner else { return Err(AppError::not_found("not_found", "not found")); };
    authorize(identity, action, KIND, owner)?;
    Ok(id)
}

async fn update(state: AppState, ctx: RequestContext, raw: String, body: Bytes, replace: bool) -> AppResult<Json<UserView>> {
    let id = gate_existing(&state, &ctx.identity, Action::Update, &raw)?;
    let body: UserUpdateBody = parse_body(&body)?;
    if replace && body.username.is_none() {
        return Err(AppError::user("required", "username is required"));
    }
    if body.groups.is_some() {
        // Membership changes are group writes; self-service edits cannot escalate
        authorize(&ctx.identity, Action::Update, ResourceKind::Group, None)?;
    }
    let password_hash = match body.password.as_deref() {
        Some(pw) => {
            require_password(pw)?;
            Some(hash_off_runtime(&state, pw.to_string()).await?)
        }
        None => None,
    };
    let view = state.store.mutate(|s| {
        let groups = body.groups.as_deref().map(|names| resolve_groups(s, names)).transpose()?;
        let changes = UserChanges {
            username: body.username,
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            password_hash,
            is_active: body.is_active,
            groups,
        };
        let rec = s.update_user(id, changes)?;
        Ok(UserView::new(s, &rec))
    })?;
    if !view.is_active {
        state.sessions.revoke_user(id);
    }
    Ok(Json(view))
}

pub async fn put_user(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>, body: Bytes) -> AppResult<Json<UserView>> {
    update(state, ctx, raw, body, true).await
}

pub async fn patch_user(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>, body: Bytes) -> AppResult<Json<UserView>> {
    update(state, ctx, raw, body, false).await
}

pub async fn delete_user(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>) -> AppResult<StatusCode> {
    let id = gate_existing(&state, &ctx.identity, Action::Delete, &raw)?;
    let removed = state.store.mutate(|s| Ok(s.delete_user(id)))?;
    if !removed {
        return Err(AppError::not_found("not_found", "not found"));
    }
    let revoked = state.sessions.revoke_user(id);
    info!(target: "lims::users", request_id = %ctx.request_id, id, revoked, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Every active account holding the staff role, regardless of who asks.
pub async fn list_staff(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<UserSummary>>> {
    let scope = authorize(&ctx.identity, Action::ListStaff, KIND, None)?;
    let store = state.store.read();
    let staff = store
        .users_in(scope)
        .into_iter()
        .filter(|u| u.is_active)
        .filter(|u| store.group_names(&u.groups).iter().any(|g| Role::for_group(g) == Some(Role::Staff)))
        .map(UserSummary::from)
        .collect();
    Ok(Json(staff))
}

/// Case-insensitive username substring match within the caller's visibility.
pub async fn autocomplete(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(q): Query<HashMap<String, String>>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let scope = authorize(&ctx.identity, Action::Autocomplete, KIND, None)?;
    let needle = q.get("q").map(|s| s.trim().to_lowercase()).unwrap_or_default();
    let store = state.store.read();
    let hits = store
        .users_in(scope)
        .into_iter()
        .filter(|u| u.username.to_lowercase().contains(&needle))
        .map(UserSummary::from)
        .collect();
    Ok(Json(hits))
}
