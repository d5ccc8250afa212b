//! `/permissions/` handlers.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use super::pagination::{paginate, Page, PageParams};
use super::views::{parse_body, parse_id, required, PermissionBody, PermissionView};
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{Identity, RequestContext};
use crate::policy::{authenticated, authorize, Action, Owned, ResourceKind};
use crate::storage::{NewPermission, PermissionChanges, PermissionRecord};

const KIND: ResourceKind = <PermissionRecord as Owned>::KIND;

fn gate_existing(state: &AppState, identity: &Identity, action: Action, raw: &str) -> AppResult<u64> {
    authenticated(identity)?;
    let id = parse_id(raw)?;
    let owner = state.store.read().permission(id).map(|p| p.owner_id());
    let Some(owner) = owner else { return Err(AppError::not_found("not_found", "not found")); };
    authorize(identity, action, KIND, owner)?;
    Ok(id)
}

pub async fn list_permissions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(q): Query<HashMap<String, String>>,
) -> AppResult<Json<Page<PermissionView>>> {
    let scope = authorize(&ctx.identity, Action::List, KIND, None)?;
    let params = PageParams::from_query(&q)?;
    let store = state.store.read();
    let views = store
        .permissions()
        .into_iter()
        .filter(|p| scope.admits(p.owner_id()))
        .map(PermissionView::from)
        .collect();
    Ok(Json(paginate(views, params)))
}

pub async fn create_permission(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> AppResult<(StatusCode, Json<PermissionView>)> {
    authorize(&ctx.identity, Action::Create, KIND, None)?;
    let body: PermissionBody = parse_body(&body)?;
    let new = NewPermission {
        name: required("name", body.name)?,
        codename: required("codename", body.codename)?,
        content_type: body
            .content_type
            .ok_or_else(|| AppError::user("required", "content_type is required"))?,
    };
    let rec = state.store.mutate(|s| s.create_permission(new))?;
    info!(target: "lims::permissions", request_id = %ctx.request_id, id = rec.id, codename = %rec.codename, "permission created");
    Ok((StatusCode::CREATED, Json(PermissionView::from(&rec))))
}

pub async fn get_permission(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>) -> AppResult<Json<PermissionView>> {
    let id = gate_existing(&state, &ctx.identity, Action::Read, &raw)?;
    let store = state.store.read();
    let perm = store.permission(id).ok_or_else(|| AppError::not_found("not_found", "not found"))?;
    Ok(Json(PermissionView::from(perm)))
}

async fn update(state: AppState, ctx: RequestContext, raw: String, body: Bytes, replace: bool) -> AppResult<Json<PermissionView>> {
    let id = gate_existing(&state, &ctx.identity, Action::Update, &raw)?;
    let body: PermissionBody = parse_body(&body)?;
    if replace && (body.name.is_none() || body.codename.is_none() || body.content_type.is_none()) {
        return Err(AppError::user("required", "name, codename and content_type are required"));
    }
    let changes = PermissionChanges { name: body.name, codename: body.codename, content_type: body.content_type };
    let rec = state.store.mutate(|s| s.update_permission(id, changes))?;
    Ok(Json(PermissionView::from(&rec)))
}

pub async fn put_permission(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>, body: Bytes) -> AppResult<Json<PermissionView>> {
    update(state, ctx, raw, body, true).await
}

pub async fn patch_permission(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>, body: Bytes) -> AppResult<Json<PermissionView>> {
    update(state, ctx, raw, body, false).await
}

pub async fn delete_permission(State(state): State<AppState>, ctx: RequestContext, Path(raw): Path<String>) -> AppResult<StatusCode> {
    let id = gate_existing(&state, &ctx.identity, Action::Delete, &raw)?;
    if !state.store.mutate(|s| Ok(s.delete_permission(id)))? {
        return Err(AppError::not_found("not_found", "not found"));
    }
    info!(target: "lims::permissions", request_id = %ctx.request_id, id, "permission deleted");
    Ok(StatusCode::NO_CONTENT)
}
