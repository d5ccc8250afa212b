use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::policy::{Owned, ResourceKind};

pub type GroupId = u64;
pub type PermissionId = u64;
pub type ContentTypeId = u64;
pub type AddressId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub id: AddressId,
    pub institution_name: String,
    pub address_1: String,
    #[serde(default)]
    pub address_2: String,
    pub city: String,
    pub postcode: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAddress {
    pub institution_name: String,
    pub address_1: String,
    #[serde(default)]
    pub address_2: String,
    pub city: String,
    pub postcode: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// PHC string; `None` means the account cannot log in.
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    #[serde(default)]
    pub groups: BTreeSet<GroupId>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

fn default_true() -> bool { true }

impl Owned for UserRecord {
    const KIND: ResourceKind = ResourceKind::User;
    fn owner_id(&self) -> Option<UserId> { Some(self.id) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<PermissionId>,
}

impl Owned for GroupRecord {
    const KIND: ResourceKind = ResourceKind::Group;
    fn owner_id(&self) -> Option<UserId> { None }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub name: String,
    pub codename: String,
    pub content_type: ContentTypeId,
}

impl Owned for PermissionRecord {
    const KIND: ResourceKind = ResourceKind::Permission;
    fn owner_id(&self) -> Option<UserId> { None }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentType {
    pub id: ContentTypeId,
    pub app_label: String,
    pub model: String,
}

/// Insert payload for a user. The password is hashed before it gets here.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub groups: BTreeSet<GroupId>,
    pub addresses: Vec<NewAddress>,
}

/// Field-wise update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub groups: Option<BTreeSet<GroupId>>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub permissions: Option<BTreeSet<PermissionId>>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub codename: String,
    pub content_type: ContentTypeId,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub codename: Option<String>,
    pub content_type: Option<ContentTypeId>,
}
