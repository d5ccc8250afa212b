//!
//! lims HTTP server
//! ----------------
//! Axum router for the Users, Groups and Permissions resources plus token
//! login/logout.
//!
//! Responsibilities:
//! - Opening the store, applying pending migrations and bootstrap data.
//! - Stamping every request with a request id on its tracing span.
//! - Mounting the resource handlers, each of which consults the policy
//!   evaluator before reading or writing anything.
//! - Sweeping expired sessions in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, info, info_span, Instrument};

use crate::config::ServerConfig;
use crate::fixtures::{ensure_baseline, seed_demo};
use crate::identity::{AuthProvider, LocalAuthProvider, RequestId, SessionManager};
use crate::migrations::Migrator;
use crate::storage::{SharedStore, Store};

pub mod auth;
pub mod groups;
pub mod pagination;
pub mod permissions;
pub mod users;
pub mod views;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: SessionManager,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// State with password login against `store`.
    pub fn new(store: SharedStore, sessions: SessionManager) -> Self {
        let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuthProvider::new(store.clone(), sessions.clone()));
        Self { store, sessions, auth }
    }
}

async fn trace_request(mut req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));
    let span = info_span!("request", request_id = %request_id, method = %req.method(), path = %req.uri().path());
    async move {
        let resp = next.run(req).await;
        debug!(status = resp.status().as_u16(), "handled");
        resp
    }
    .instrument(span)
    .await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "lims ok" }))
        .route("/auth/login/", post(auth::login))
        .route("/auth/logout/", post(auth::logout))
        .route("/users/", get(users::list_users).post(users::create_user))
        .route("/users/register/", post(users::register))
        .route("/users/staff/", get(users::list_staff))
        .route("/users/autocomplete/", get(users::autocomplete))
        .route(
            "/users/{id}/",
            get(users::get_user).put(users::put_user).patch(users::patch_user).delete(users::delete_user),
        )
        .route("/groups/", get(groups::list_groups).post(groups::create_group))
        .route(
            "/groups/{id}/",
            get(groups::get_group).put(groups::put_group).patch(groups::patch_group).delete(groups::delete_group),
        )
        .route("/permissions/", get(permissions::list_permissions).post(permissions::create_permission))
        .route(
            "/permissions/{id}/",
            get(permissions::get_permission)
                .put(permissions::put_permission)
                .patch(permissions::patch_permission)
                .delete(permissions::delete_permission),
        )
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

/// Open (or create) the store and bring it up to date.
pub fn prepare_store(cfg: &ServerConfig) -> anyhow::Result<Store> {
    let mut store = match &cfg.data_dir {
        Some(dir) => Store::open(dir).with_context(|| format!("opening data dir {}", dir.display()))?,
        None => Store::in_memory(),
    };
    bootstrap(&mut store, cfg)?;
    Ok(store)
}

/// Apply pending migrations, the baseline groups and admin, and the demo
/// directory when asked for, then persist. Safe to repeat.
pub fn bootstrap(store: &mut Store, cfg: &ServerConfig) -> anyhow::Result<()> {
    let applied = Migrator::bundled().apply(store).context("applying migrations")?;
    if !applied.is_empty() {
        info!(target: "startup", "applied migrations: {}", applied.join(", "));
    }
    if cfg.seed_demo {
        seed_demo(store).context("loading demo directory")?;
    }
    ensure_baseline(store, &cfg.admin_password).context("bootstrapping groups and admin")?;
    store.save().context("writing snapshot")?;
    Ok(())
}

/// Start the lims HTTP server and block until it stops.
pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "lims starting: http_port={}, data_dir={:?}, session_ttl_secs={}, seed_demo={}",
        cfg.http_port, cfg.data_dir, cfg.session_ttl.as_secs(), cfg.seed_demo
    );
    let store = prepare_store(&cfg)?;
    info!(target: "startup", users = store.user_count(), groups = store.groups().len(), permissions = store.permissions().len(), "directory ready");

    let sessions = SessionManager::with_ttl(cfg.session_ttl);
    {
        let sweeper = sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                let removed = sweeper.sweep_expired();
                if removed > 0 { debug!(removed, "session_sweep"); }
            }
        });
    }

    let app = router(AppState::new(SharedStore::new(store), sessions));
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
