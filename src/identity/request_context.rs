use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::actor::Identity;
use super::session::SessionManager;
use crate::server::AppState;
use crate::storage::SharedStore;

/// Correlation id stamped on each request by the tracing middleware.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Per-request caller identity plus a correlation id for logs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: Identity,
    /// Token presented by the caller, whether or not it resolved.
    pub token: Option<String>,
    pub request_id: String,
}

/// Token carried by an `Authorization` header, if any. `Bearer` and the
/// DRF-style `Token` schemes are both accepted.
fn presented_token(headers: &HeaderMap) -> Option<Result<String, ()>> {
    let raw = headers.get(AUTHORIZATION)?;
    let Ok(value) = raw.to_str() else { return Some(Err(())); };
    let mut parts = value.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().map(str::trim).unwrap_or_default();
    if token.is_empty() || !(scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token")) {
        return Some(Err(()));
    }
    Some(Ok(token.to_string()))
}

/// Bearer token from the `Authorization` header, when well formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    presented_token(headers).and_then(Result::ok)
}

/// Resolve the caller. No header means anonymous; a header that does not map
/// to a live session on an active account means invalid.
pub fn resolve_identity(headers: &HeaderMap, sessions: &SessionManager, store: &SharedStore) -> Identity {
    let token = match presented_token(headers) {
        None => return Identity::Anonymous,
        Some(Err(())) => return Identity::Invalid,
        Some(Ok(t)) => t,
    };
    resolve_token(&token, sessions, store)
}

fn resolve_token(token: &str, sessions: &SessionManager, store: &SharedStore) -> Identity {
    let Some(user_id) = sessions.validate(token) else { return Identity::Invalid; };
    match store.read().actor_for(user_id) {
        Some(actor) => Identity::Authenticated(actor),
        None => Identity::Invalid,
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let request_id = match parts.extensions.get::<RequestId>() {
            Some(RequestId(id)) => id.clone(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok(RequestContext {
            identity: resolve_identity(&parts.headers, &state.sessions, &state.store),
            token: bearer_token(&parts.headers),
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use crate::storage::{NewUser, Store};

    fn setup() -> (SharedStore, SessionManager, u64) {
        let store = SharedStore::new(Store::in_memory());
        let joe = store
            .mutate(|s| s.create_user(NewUser { username: "joe".into(), is_active: true, ..Default::default() }))
            .unwrap();
        (store, SessionManager::default(), joe.id)
    }

    fn with_auth(v: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        h
    }

    #[test]
    fn missing_header_is_anonymous() {
        let (store, sm, _) = setup();
        assert_eq!(resolve_identity(&HeaderMap::new(), &sm, &store), Identity::Anonymous);
    }

    #[test]
    fn bearer_and_token_schemes_resolve() {
        let (store, sm, joe) = setup();
        let s = sm.issue(joe);
        for scheme in ["Bearer", "Token", "bearer"] {
            let id = resolve_identity(&with_auth(&format!("{scheme} {}", s.token)), &sm, &store);
            assert_eq!(id.actor().map(|a| a.id), Some(joe), "{scheme}");
        }
    }

    #[test]
    fn bad_credentials_are_invalid() {
        let (store, sm, joe) = setup();
        assert_eq!(resolve_identity(&with_auth("Bearer nope"), &sm, &store), Identity::Invalid);
        assert_eq!(resolve_identity(&with_auth("Basic abc"), &sm, &store), Identity::Invalid);
        assert_eq!(resolve_identity(&with_auth("Bearer"), &sm, &store), Identity::Invalid);

        let s = sm.issue(joe);
        store
            .mutate(|st| st.update_user(joe, crate::storage::UserChanges { is_active: Some(false), ..Default::default() }))
            .unwrap();
        assert_eq!(resolve_identity(&with_auth(&format!("Bearer {}", s.token)), &sm, &store), Identity::Invalid);
    }

    #[tokio::test]
    async fn context_carries_middleware_request_id() {
        let (store, sm, joe) = setup();
        let token = sm.issue(joe).token;
        let state = AppState::new(store, sm);
        let req = axum::http::Request::builder()
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .extension(RequestId("req-42".to_string()))
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.identity.actor().map(|a| a.id), Some(joe));
        assert_eq!(ctx.token.as_deref(), Some(token.as_str()));
    }
}
