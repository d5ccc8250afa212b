//! Wire representations and request bodies.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::storage::{Address, ContentTypeId, GroupRecord, PermissionRecord, Store, UserRecord};

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub groups: Vec<String>,
    pub addresses: Vec<Address>,
}

impl UserView {
    pub fn new(store: &Store, u: &UserRecord) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            is_active: u.is_active,
            date_joined: u.date_joined,
            groups: store.group_names(&u.groups),
            addresses: u.addresses.clone(),
        }
    }
}

/// Compact form used by the staff roster and autocomplete.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: u64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&UserRecord> for UserSummary {
    fn from(u: &UserRecord) -> Self {
        Self { id: u.id, username: u.username.clone(), first_name: u.first_name.clone(), last_name: u.last_name.clone() }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: u64,
    pub name: String,
    pub permissions: Vec<String>,
}

impl GroupView {
    pub fn new(store: &Store, g: &GroupRecord) -> Self {
        Self { id: g.id, name: g.name.clone(), permissions: store.permission_names(&g.permissions) }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionView {
    pub id: u64,
    pub name: String,
    pub codename: String,
    pub content_type: ContentTypeId,
}

impl From<&PermissionRecord> for PermissionView {
    fn from(p: &PermissionRecord) -> Self {
        Self { id: p.id, name: p.name.clone(), codename: p.codename.clone(), content_type: p.content_type }
    }
}

/// Body of `POST /users/` and `/users/register/`.
#[derive(Debug, Deserialize)]
pub struct UserCreateBody {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Body of `PUT`/`PATCH /users/{id}/`; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct UserUpdateBody {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupBody {
    pub name: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionBody {
    pub name: Option<String>,
    pub codename: Option<String>,
    pub content_type: Option<ContentTypeId>,
}

/// Decode a JSON body. An empty body reads as `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };
    serde_json::from_slice(raw).map_err(|e| AppError::user("invalid_body".to_string(), format!("invalid request body: {e}")))
}

/// Path ids that do not parse cannot name anything, so they read as missing.
pub fn parse_id(raw: &str) -> AppResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| AppError::not_found("not_found", "not found"))
}

pub fn required(field: &str, value: Option<String>) -> AppResult<String> {
    value.ok_or_else(|| AppError::user("required".to_string(), format!("{field} is required")))
}
