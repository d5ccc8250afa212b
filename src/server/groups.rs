//! `/groups/` handlers. Reads are open to any authenticated caller; writes
//! are admin-only.

use std::collections::{BTreeSet, HashMap};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use super::pagination::{paginate, Page, PageParams};
use super::views::{parse_body, parse_id, required, GroupBody, GroupView};
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{Identity, RequestContext};
use crate::policy::{authenticated, authorize, Action, Owned, ResourceKind};
use crate::storage::{GroupChanges, GroupRecord, PermissionId, Store};

const KIND: ResourceKind = <GroupRecord as Owned>::KIND;

/// Permissions are named by display name, which is not unique across content
/// types; a name must match exactly one permission.
fn resolve_permissions(store: &Store, names: &[String]) -> AppResult<BTreeSet<PermissionId>> {
    let mut ids = BTreeSet::new();
    for n in names {
        match store.permissions_named(n).as_slice() {
            [one] => { ids.insert(one.id); }
            [] => return Err(AppError::user("unknown_permission".to_string(), format!("permission '{n}' does not exist"))),
            _ => return Err(AppError::user("ambiguous_permission".to_string(), format!("permission name '{n}' matches more than one permission"))),
        }
    }
    Ok(ids)
}

fn gate_existing(state: &AppState, identity: &Identity, action: Action, raw: &str) -> AppResult<u64> {
    authenticated(identity)?;
    let id = parse_id(raw)?;
    let owner = state.store.read().group(id).map(|g| g.owner_id());
    let Some(owner) = owner else { return Err(AppError::not_found("not_found", "not found")); };
    authorize(identity, action, KIND, owner)?;
    Ok(id)
}

pub async fn list_groups(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(q): Query<HashMap<String, String>>,
) -> AppResult<Json<Page<GroupView>>> {
    let scope = authorize(&ctx.identity, Action::List, KIND, None)?;
    let params = PageParams::from_query(&q)?;
    let store = state.store.read();
    let views = store
        .groups()
        .into_iter()
        .filter(|g| scope.admits(g.owner_id()))
        .map(|g| GroupView::new(&store, g))
        .collect();
    Ok(Json(paginate(views, params)))
}

pub async fn create_group(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> AppResult<(StatusCode, Json<GroupView>)> {
    authorize(&ctx.identity, Action::Create, KIND, None)?;
    let body: GroupBody = parse_body(&body)?;
    let name = required("name", body.name)?;
    let view = state.store.mutate(|s| {
        let perms = resolve_permissions(s, body.permissions.as_deref().unwrap_or_default())?;
        let rec = s.create_group(&name, perms)?;
        Ok(GroupView::new(s, &rec))
    })?;
    info!(target: "lims::groups", request_id = %ctx.request_id, id = view.id, name = %view.name, "group created");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_group(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>) -> AppResult<Json<GroupView>> {
    let id = gate_existing(&state, &ctx.identity, Action::Read, &raw)?;
    let store = state.store.read();
    let group = store.group(id).ok_or_else(|| AppError::not_found("not_found", "not found"))?;
    Ok(Json(GroupView::new(&store, group)))
}

async fn update(state: AppState, ctx: RequestContext, raw: String, body: Bytes, replace: bool) -> AppResult<Json<GroupView>> {
    let id = gate_existing(&state, &ctx.identity, Action::Update, &raw)?;
    let body: GroupBody = parse_body(&body)?;
    if replace && body.name.is_none() {
        return Err(AppError::user("required", "name is required"));
    }
    let view = state.store.mutate(|s| {
        let permissions = body.permissions.as_deref().map(|names| resolve_permissions(s, names)).transpose()?;
        let rec = s.update_group(id, GroupChanges { name: body.name, permissions })?;
        Ok(GroupView::new(s, &rec))
    })?;
    Ok(Json(view))
}

pub async fn put_group(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>, body: Bytes) -> AppResult<Json<GroupView>> {
    update(state, ctx, raw, body, true).await
}

pub async fn patch_group(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>, body: Bytes) -> AppResult<Json<GroupView>> {
    update(state, ctx, raw, body, false).await
}

pub async fn delete_group(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>) -> AppResult<StatusCode> {
    let id = gate_existing(&state, &ctx.identity, Action::Delete, &raw)?;
    if !state.store.mutate(|s| Ok(s.delete_group(id)))? {
        return Err(AppError::not_found("not_found", "not found"));
    }
    info!(target: "lims::groups", request_id = %ctx.request_id, id, "group deleted");
    Ok(StatusCode::NO_CONTENT)
}
