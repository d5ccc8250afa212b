//!
//! lims storage module
//! -------------------
//! In-memory directory of users, groups, permissions and content types, plus the
//! schema catalog maintained by the migration engine. The whole directory can be
//! snapshotted to `<data dir>/lims.json` and reloaded on start.
//!
//! Key responsibilities:
//! - Id allocation (never reused) and uniqueness constraints.
//! - Scope-filtered listing for the policy evaluator's FILTER decisions.
//! - Referential cleanup: deleting a group or permission detaches it everywhere.
//!
//! `Store` is not synchronised itself; it is shared as `SharedStore`
//! (`Arc<RwLock<Store>>`) and every write goes through `SharedStore::mutate`,
//! which applies the change atomically and persists it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::identity::{Actor, UserId};
use crate::migrations::SchemaCatalog;
use crate::policy::{Owned, Scope};
use crate::security::HashingConfig;

pub mod model;
mod snapshot;

pub use model::{
    Address, AddressId, ContentType, ContentTypeId, GroupChanges, GroupId, GroupRecord, NewAddress,
    NewPermission, NewUser, PermissionChanges, PermissionId, PermissionRecord, UserChanges, UserRecord,
};

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+\- ]{1,150}$").expect("static regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sequences {
    user: u64,
    group: u64,
    permission: u64,
    content_type: u64,
    address: u64,
}

fn next(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

/// Everything that is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    #[serde(default)]
    users: BTreeMap<UserId, UserRecord>,
    #[serde(default)]
    groups: BTreeMap<GroupId, GroupRecord>,
    #[serde(default)]
    permissions: BTreeMap<PermissionId, PermissionRecord>,
    #[serde(default)]
    content_types: BTreeMap<ContentTypeId, ContentType>,
    #[serde(default)]
    seq: Sequences,
    #[serde(default)]
    catalog: SchemaCatalog,
}

pub struct Store {
    /// Data directory for snapshots; `None` keeps everything in memory.
    root: Option<PathBuf>,
    hashing: HashingConfig,
    tables: Tables,
}

pub fn validate_username(name: &str) -> AppResult<()> {
    if USERNAME_RE.is_match(name) && !name.trim().is_empty() {
        Ok(())
    } else {
        Err(AppError::user("invalid_username", "usernames are 1-150 letters, digits, spaces and @/./+/-/_"))
    }
}

fn require_text(field: &str, value: &str, max: usize) -> AppResult<()> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::user("required".to_string(), format!("{field} may not be blank")));
    }
    if v.chars().count() > max {
        return Err(AppError::user("too_long".to_string(), format!("{field} is longer than {max} characters")));
    }
    Ok(())
}

impl Store {
    pub fn in_memory() -> Self {
        Self { root: None, hashing: HashingConfig::default(), tables: Tables::default() }
    }

    /// Open a store persisted under `root`, loading the snapshot if one exists.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let tables = snapshot::load(&root)?.unwrap_or_default();
        Ok(Self { root: Some(root), hashing: HashingConfig::default(), tables })
    }

    pub fn with_hashing(mut self, hashing: HashingConfig) -> Self {
        self.hashing = hashing;
        self
    }

    pub fn hashing(&self) -> HashingConfig { self.hashing }

    pub fn save(&self) -> Result<()> {
        match &self.root {
            Some(root) => snapshot::save(root, &self.tables),
            None => Ok(()),
        }
    }

    // ---- users ----

    pub fn user(&self, id: UserId) -> Option<&UserRecord> { self.tables.users.get(&id) }

    pub fn user_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.tables.users.values().find(|u| u.username == username)
    }

    pub fn users_in(&self, scope: Scope) -> Vec<&UserRecord> {
        self.tables.users.values().filter(|u| scope.admits(u.owner_id())).collect()
    }

    pub fn user_count(&self) -> usize { self.tables.users.len() }

    /// Users belonging to the named group, across the whole directory.
    pub fn members_of(&self, group_name: &str) -> Vec<&UserRecord> {
        let Some(gid) = self.group_by_name(group_name).map(|g| g.id) else { return Vec::new(); };
        self.tables.users.values().filter(|u| u.groups.contains(&gid)).collect()
    }

    /// Build the actor for a live account; inactive or missing accounts yield `None`.
    pub fn actor_for(&self, id: UserId) -> Option<Actor> {
        let u = self.user(id).filter(|u| u.is_active)?;
        Some(Actor::from_groups(u.id, u.username.clone(), self.group_names(&u.groups).iter().map(String::as_str)))
    }

    pub fn group_names(&self, ids: &BTreeSet<GroupId>) -> Vec<String> {
        ids.iter().filter_map(|id| self.tables.groups.get(id)).map(|g| g.name.clone()).collect()
    }

    pub fn create_user(&mut self, new: NewUser) -> AppResult<UserRecord> {
        validate_username(&new.username)?;
        if self.user_by_username(&new.username).is_some() {
            return Err(AppError::conflict("duplicate_username".to_string(), format!("a user named '{}' already exists", new.username)));
        }
        self.check_groups(&new.groups)?;
        let addresses = new
            .addresses
            .into_iter()
            .map(|a| Address {
                id: next(&mut self.tables.seq.address),
                institution_name: a.institution_name,
                address_1: a.address_1,
                address_2: a.address_2,
                city: a.city,
                postcode: a.postcode,
                country: a.country,
            })
            .collect();
        let rec = UserRecord {
            id: next(&mut self.tables.seq.user),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            password_hash: new.password_hash,
            is_active: new.is_active,
            date_joined: Utc::now(),
            groups: new.groups,
            addresses,
        };
        debug!(target: "lims::storage", id = rec.id, username = %rec.username, "user created");
        self.tables.users.insert(rec.id, rec.clone());
        Ok(rec)
    }

    pub fn update_user(&mut self, id: UserId, changes: UserChanges) -> AppResult<UserRecord> {
        if !self.tables.users.contains_key(&id) {
            return Err(AppError::not_found("not_found", "no such user"));
        }
        if let Some(name) = &changes.username {
            validate_username(name)?;
            if self.user_by_username(name).is_some_and(|u| u.id != id) {
                return Err(AppError::conflict("duplicate_username".to_string(), format!("a user named '{name}' already exists")));
            }
        }
        if let Some(groups) = &changes.groups {
            self.check_groups(groups)?;
        }
        let Some(rec) = self.tables.users.get_mut(&id) else {
            return Err(AppError::not_found("not_found", "no such user"));
        };
        if let Some(v) = changes.username { rec.username = v; }
        if let Some(v) = changes.email { rec.email = v; }
        if let Some(v) = changes.first_name { rec.first_name = v; }
        if let Some(v) = changes.last_name { rec.last_name = v; }
        if let Some(v) = changes.password_hash { rec.password_hash = Some(v); }
        if let Some(v) = changes.is_active { rec.is_active = v; }
        if let Some(v) = changes.groups { rec.groups = v; }
        debug!(target: "lims::storage", id, "user updated");
        Ok(rec.clone())
    }

    pub fn delete_user(&mut self, id: UserId) -> bool {
        let removed = self.tables.users.remove(&id).is_some();
        if removed { debug!(target: "lims::storage", id, "user deleted"); }
        removed
    }

    fn check_groups(&self, ids: &BTreeSet<GroupId>) -> AppResult<()> {
        match ids.iter().find(|id| !self.tables.groups.contains_key(id)) {
            Some(missing) => Err(AppError::user("unknown_group".to_string(), format!("group {missing} does not exist"))),
            None => Ok(()),
        }
    }

    // ---- groups ----

    pub fn group(&self, id: GroupId) -> Option<&GroupRecord> { self.tables.groups.get(&id) }

    pub fn group_by_name(&self, name: &str) -> Option<&GroupRecord> {
        self.tables.groups.values().find(|g| g.name == name)
    }

    pub fn groups(&self) -> Vec<&GroupRecord> { self.tables.groups.values().collect() }

    pub fn create_group(&mut self, name: &str, permissions: BTreeSet<PermissionId>) -> AppResult<GroupRecord> {
        require_text("name", name, 150)?;
        if self.group_by_name(name).is_some() {
            return Err(AppError::conflict("duplicate_group".to_string(), format!("a group named '{name}' already exists")));
        }
        self.check_permissions(&permissions)?;
        let rec = GroupRecord { id: next(&mut self.tables.seq.group), name: name.to_string(), permissions };
        debug!(target: "lims::storage", id = rec.id, name = %rec.name, "group created");
        self.tables.groups.insert(rec.id, rec.clone());
        Ok(rec)
    }

    /// Id of the named group, creating it when absent.
    pub fn ensure_group(&mut self, name: &str) -> AppResult<GroupId> {
        match self.group_by_name(name) {
            Some(g) => Ok(g.id),
            None => Ok(self.create_group(name, BTreeSet::new())?.id),
        }
    }

    pub fn update_group(&mut self, id: GroupId, changes: GroupChanges) -> AppResult<GroupRecord> {
        if !self.tables.groups.contains_key(&id) {
            return Err(AppError::not_found("not_found", "no such group"));
        }
        if let Some(name) = &changes.name {
            require_text("name", name, 150)?;
            if self.group_by_name(name).is_some_and(|g| g.id != id) {
                return Err(AppError::conflict("duplicate_group".to_string(), format!("a group named '{name}' already exists")));
            }
        }
        if let Some(perms) = &changes.permissions {
            self.check_permissions(perms)?;
        }
        let Some(rec) = self.tables.groups.get_mut(&id) else {
            return Err(AppError::not_found("not_found", "no such group"));
        };
        if let Some(v) = changes.name { rec.name = v; }
        if let Some(v) = changes.permissions { rec.permissions = v; }
        debug!(target: "lims::storage", id, "group updated");
        Ok(rec.clone())
    }

    /// Remove a group and every membership in it.
    pub fn delete_group(&mut self, id: GroupId) -> bool {
        if self.tables.groups.remove(&id).is_none() { return false; }
        for u in self.tables.users.values_mut() {
            u.groups.remove(&id);
        }
        debug!(target: "lims::storage", id, "group deleted");
        true
    }

    fn check_permissions(&self, ids: &BTreeSet<PermissionId>) -> AppResult<()> {
        match ids.iter().find(|id| !self.tables.permissions.contains_key(id)) {
            Some(missing) => Err(AppError::user("unknown_permission".to_string(), format!("permission {missing} does not exist"))),
            None => Ok(()),
        }
    }

    // ---- permissions ----

    pub fn permission(&self, id: PermissionId) -> Option<&PermissionRecord> { self.tables.permissions.get(&id) }

    pub fn permissions(&self) -> Vec<&PermissionRecord> { self.tables.permissions.values().collect() }

    pub fn permissions_named(&self, name: &str) -> Vec<&PermissionRecord> {
        self.tables.permissions.values().filter(|p| p.name == name).collect()
    }

    pub fn permission_for(&self, content_type: ContentTypeId, codename: &str) -> Option<&PermissionRecord> {
        self.tables.permissions.values().find(|p| p.content_type == content_type && p.codename == codename)
    }

    pub fn permission_names(&self, ids: &BTreeSet<PermissionId>) -> Vec<String> {
        ids.iter().filter_map(|id| self.tables.permissions.get(id)).map(|p| p.name.clone()).collect()
    }

    pub fn create_permission(&mut self, new: NewPermission) -> AppResult<PermissionRecord> {
        require_text("name", &new.name, 255)?;
        require_text("codename", &new.codename, 100)?;
        self.check_content_type(new.content_type)?;
        if self.permission_for(new.content_type, &new.codename).is_some() {
            return Err(AppError::conflict("duplicate_permission".to_string(), format!("codename '{}' already exists for this content type", new.codename)));
        }
        let rec = PermissionRecord {
            id: next(&mut self.tables.seq.permission),
            name: new.name,
            codename: new.codename,
            content_type: new.content_type,
        };
        debug!(target: "lims::storage", id = rec.id, codename = %rec.codename, "permission created");
        self.tables.permissions.insert(rec.id, rec.clone());
        Ok(rec)
    }

    /// Id of the permission `(content_type, codename)`, creating it when absent.
    pub fn ensure_permission(&mut self, content_type: ContentTypeId, codename: &str, name: &str) -> AppResult<PermissionId> {
        if let Some(p) = self.permission_for(content_type, codename) {
            return Ok(p.id);
        }
        let new = NewPermission { name: name.to_string(), codename: codename.to_string(), content_type };
        Ok(self.create_permission(new)?.id)
    }

    pub fn update_permission(&mut self, id: PermissionId, changes: PermissionChanges) -> AppResult<PermissionRecord> {
        let Some(current) = self.tables.permissions.get(&id).cloned() else {
            return Err(AppError::not_found("not_found", "no such permission"));
        };
        if let Some(n) = &changes.name { require_text("name", n, 255)?; }
        if let Some(c) = &changes.codename { require_text("codename", c, 100)?; }
        if let Some(ct) = changes.content_type { self.check_content_type(ct)?; }
        let ct = changes.content_type.unwrap_or(current.content_type);
        let codename = changes.codename.clone().unwrap_or(current.codename.clone());
        if self.permission_for(ct, &codename).is_some_and(|p| p.id != id) {
            return Err(AppError::conflict("duplicate_permission".to_string(), format!("codename '{codename}' already exists for this content type")));
        }
        let Some(rec) = self.tables.permissions.get_mut(&id) else {
            return Err(AppError::not_found("not_found", "no such permission"));
        };
        if let Some(v) = changes.name { rec.name = v; }
        rec.codename = codename;
        rec.content_type = ct;
        debug!(target: "lims::storage", id, "permission updated");
        Ok(rec.clone())
    }

    /// Remove a permission and detach it from every group.
    pub fn delete_permission(&mut self, id: PermissionId) -> bool {
        if self.tables.permissions.remove(&id).is_none() { return false; }
        for g in self.tables.groups.values_mut() {
            g.permissions.remove(&id);
        }
        debug!(target: "lims::storage", id, "permission deleted");
        true
    }

    // ---- content types ----

    pub fn content_types(&self) -> Vec<&ContentType> { self.tables.content_types.values().collect() }

    pub fn content_type_for(&self, app_label: &str, model: &str) -> Option<&ContentType> {
        self.tables.content_types.values().find(|c| c.app_label == app_label && c.model == model)
    }

    pub fn ensure_content_type(&mut self, app_label: &str, model: &str) -> ContentTypeId {
        if let Some(c) = self.content_type_for(app_label, model) {
            return c.id;
        }
        let ct = ContentType { id: next(&mut self.tables.seq.content_type), app_label: app_label.to_string(), model: model.to_string() };
        let id = ct.id;
        self.tables.content_types.insert(id, ct);
        id
    }

    fn check_content_type(&self, id: ContentTypeId) -> AppResult<()> {
        if self.tables.content_types.contains_key(&id) {
            Ok(())
        } else {
            Err(AppError::user("unknown_content_type".to_string(), format!("content type {id} does not exist")))
        }
    }

    // ---- schema catalog ----

    pub fn catalog(&self) -> &SchemaCatalog { &self.tables.catalog }
    pub fn catalog_mut(&mut self) -> &mut SchemaCatalog { &mut self.tables.catalog }
}

/// Thread-safe handle shared by all request handlers.
#[derive(Clone)]
pub struct SharedStore(pub Arc<RwLock<Store>>);

impl SharedStore {
    pub fn new(store: Store) -> Self { Self(Arc::new(RwLock::new(store))) }

    pub fn read(&self) -> RwLockReadGuard<'_, Store> { self.0.read() }

    pub fn hashing(&self) -> HashingConfig { self.0.read().hashing() }

    /// Apply a change under one write guard. On error the directory is restored,
    /// so a rejected write never leaves partial state; on success it is persisted.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut Store) -> AppResult<T>) -> AppResult<T> {
        let mut guard = self.0.write();
        let before = guard.tables.clone();
        match f(&mut *guard) {
            Ok(out) => {
                if let Err(e) = guard.save() {
                    guard.tables = before;
                    return Err(e.into());
                }
                Ok(out)
            }
            Err(e) => {
                guard.tables = before;
                Err(e)
            }
        }
    }
}
