//! In-process harness: a seeded directory behind the real router.

#![allow(dead_code)]

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lims::config::ServerConfig;
use lims::fixtures::{DEMO_ADMIN_USERNAME, JANE_USERNAME, JOE_USERNAME};
use lims::identity::{SessionManager, UserId};
use lims::security::HashingConfig;
use lims::server::{bootstrap, router, AppState};
use lims::storage::{SharedStore, Store};

pub const BOGUS_TOKEN: &str = "not-a-real-token";

pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub joe: UserId,
    pub jane: UserId,
    pub admin: UserId,
}

/// Who is calling.
#[derive(Debug, Clone, Copy)]
pub enum As<'a> {
    Anonymous,
    Invalid,
    Token(&'a str),
}

pub fn harness() -> Result<Harness> {
    let mut store = Store::in_memory().with_hashing(HashingConfig::minimal());
    let cfg = ServerConfig { seed_demo: true, ..Default::default() };
    bootstrap(&mut store, &cfg)?;
    let id_of = |name: &str| store.user_by_username(name).map(|u| u.id).ok_or_else(|| anyhow::anyhow!("missing {name}"));
    let (joe, jane, admin) = (id_of(JOE_USERNAME)?, id_of(JANE_USERNAME)?, id_of(DEMO_ADMIN_USERNAME)?);
    let state = AppState::new(SharedStore::new(store), SessionManager::default());
    Ok(Harness { app: router(state.clone()), state, joe, jane, admin })
}

impl Harness {
    /// Issue a session directly, bypassing password login.
    pub fn token(&self, user: UserId) -> String { self.state.sessions.issue(user).token }

    pub async fn call(&self, method: Method, uri: &str, who: As<'_>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut req = Request::builder().method(method).uri(uri);
        match who {
            As::Anonymous => {}
            As::Invalid => req = req.header(header::AUTHORIZATION, format!("Bearer {BOGUS_TOKEN}")),
            As::Token(t) => req = req.header(header::AUTHORIZATION, format!("Bearer {t}")),
        }
        let req = match body {
            Some(v) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(serde_json::to_vec(&v)?))?,
            None => req.body(Body::empty())?,
        };
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> Result<(StatusCode, Value)> {
        let resp = self.app.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = resp.into_body().collect().await?.to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str, who: As<'_>) -> Result<(StatusCode, Value)> {
        self.call(Method::GET, uri, who, None).await
    }
}

pub fn names(v: &Value) -> Vec<String> {
    let mut out: Vec<String> = v.as_array().into_iter().flatten().filter_map(|x| x.as_str().map(String::from)).collect();
    out.sort();
    out
}
