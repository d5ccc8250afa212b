//! Role-scoped visibility and authorization policy.
//! `decide` is a pure function of its inputs; `authorize` wraps it with logging
//! for request handlers.

use tracing::debug;

use super::model::{Action, Decision, Denial, ResourceKind, Scope};
use crate::identity::{Actor, Identity, UserId};

fn allow() -> Decision { Decision::Allow }
fn deny(d: Denial) -> Decision { Decision::Deny(d) }
fn own_only(actor: &Actor) -> Decision { Decision::Filter(Scope::OwnedBy(actor.id)) }

/// Decide whether `identity` may perform `action` on an instance of `kind`
/// owned by `owner` (`None` for listings and ownerless kinds).
pub fn decide(identity: &Identity, action: Action, kind: ResourceKind, owner: Option<UserId>) -> Decision {
    // Registration is the one action open to anonymous callers
    if action == Action::Register && kind == ResourceKind::User {
        return match identity {
            Identity::Invalid => deny(Denial::Unauthorized),
            Identity::Anonymous | Identity::Authenticated(_) => allow(),
        };
    }
    let Identity::Authenticated(actor) = identity else {
        return deny(Denial::Unauthorized);
    };
    if actor.is_admin() {
        return allow();
    }
    match kind {
        ResourceKind::User => decide_user(actor, action, owner),
        ResourceKind::Group | ResourceKind::Permission => decide_shared(action),
    }
}

fn decide_user(actor: &Actor, action: Action, owner: Option<UserId>) -> Decision {
    let owns = owner == Some(actor.id);
    match action {
        Action::List | Action::Autocomplete => own_only(actor),
        Action::ListStaff => allow(),
        Action::Read if owns => allow(),
        // Masked: the instance is outside the caller's visibility
        Action::Read => deny(Denial::NotFound),
        Action::Update | Action::Delete if owns => allow(),
        Action::Update | Action::Delete => deny(Denial::Forbidden),
        Action::Create | Action::Register => deny(Denial::Forbidden),
    }
}

fn decide_shared(action: Action) -> Decision {
    match action {
        Action::List | Action::Read => allow(),
        _ => deny(Denial::Forbidden),
    }
}

/// Require an authenticated actor, before any resource lookup happens.
pub fn authenticated(identity: &Identity) -> Result<&Actor, Denial> {
    identity.actor().ok_or(Denial::Unauthorized)
}

/// Handler-facing gate: evaluate and log denials.
pub fn authorize(identity: &Identity, action: Action, kind: ResourceKind, owner: Option<UserId>) -> Result<Scope, Denial> {
    let decision = decide(identity, action, kind, owner);
    if let Decision::Deny(denial) = decision {
        debug!(
            target: "lims::policy",
            actor = ?identity.actor().map(|a| a.id),
            action = action.as_str(),
            kind = kind.as_str(),
            owner = ?owner,
            denial = ?denial,
            "request denied"
        );
    }
    decision.into_scope()
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod policy_tests;
