use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub type UserId = u64;

/// Group every account is placed in on creation.
pub const BASELINE_GROUP: &str = "user";
/// Membership in this group grants the staff role.
pub const STAFF_GROUP: &str = "staff";
/// Membership in this group grants unrestricted access.
pub const ADMIN_GROUP: &str = "admin";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Regular,
    Staff,
    Admin,
}

impl Role {
    /// Role conferred by membership in a group of this name, if any.
    pub fn for_group(name: &str) -> Option<Role> {
        if name.eq_ignore_ascii_case(ADMIN_GROUP) {
            Some(Role::Admin)
        } else if name.eq_ignore_ascii_case(STAFF_GROUP) {
            Some(Role::Staff)
        } else {
            None
        }
    }
}

/// An authenticated caller. Built once per request and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub username: String,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(id: UserId, username: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        let mut roles: BTreeSet<Role> = roles.into_iter().collect();
        roles.insert(Role::Regular);
        Self { id, username: username.into(), roles }
    }

    /// Derive the role set from group memberships.
    pub fn from_groups<'a>(id: UserId, username: impl Into<String>, groups: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(id, username, groups.into_iter().filter_map(Role::for_group))
    }

    pub fn has_role(&self, role: Role) -> bool { self.roles.contains(&role) }
    pub fn is_admin(&self) -> bool { self.has_role(Role::Admin) }
    pub fn is_staff(&self) -> bool { self.has_role(Role::Staff) }
}

/// Authentication state of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No credentials were presented.
    Anonymous,
    /// Credentials were presented but did not resolve to a live account.
    Invalid,
    Authenticated(Actor),
}

impl Identity {
    pub fn actor(&self) -> Option<&Actor> {
        match self {
            Identity::Authenticated(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool { self.actor().is_some() }
}
