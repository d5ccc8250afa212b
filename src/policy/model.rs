use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// What the caller is trying to do. `Register`, `ListStaff` and `Autocomplete`
/// are distinct actions rather than flavours of `Create`/`List`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
    Register,
    ListStaff,
    Autocomplete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Register => "register",
            Action::ListStaff => "list_staff",
            Action::Autocomplete => "autocomplete",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    User,
    Group,
    Permission,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Group => "group",
            ResourceKind::Permission => "permission",
        }
    }
}

/// Why a request was refused, in precedence order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    Unauthorized,
    NotFound,
    Forbidden,
}

/// Visibility predicate handed to the store for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    All,
    OwnedBy(UserId),
}

impl Scope {
    /// Does an instance with this owner fall inside the scope?
    /// Ownerless instances are only visible under `All`.
    pub fn admits(&self, owner: Option<UserId>) -> bool {
        match self {
            Scope::All => true,
            Scope::OwnedBy(id) => owner == Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
    Filter(Scope),
}

impl Decision {
    /// Collapse into the scope the caller may operate on, or the denial.
    pub fn into_scope(self) -> Result<Scope, Denial> {
        match self {
            Decision::Allow => Ok(Scope::All),
            Decision::Filter(scope) => Ok(scope),
            Decision::Deny(denial) => Err(denial),
        }
    }

    pub fn is_allow(&self) -> bool { matches!(self, Decision::Allow) }
}

/// Per-kind ownership. Users own themselves; groups and permissions have no
/// per-instance owner and are therefore admin-only for writes.
pub trait Owned {
    const KIND: ResourceKind;
    fn owner_id(&self) -> Option<UserId>;
}
