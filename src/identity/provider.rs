use tracing::info;

use super::session::{Session, SessionManager};
use crate::error::{AppError, AppResult};
use crate::security::verify_password;
use crate::storage::SharedStore;
use crate::tprintln;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

/// Exchanges credentials for a session.
pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse>;
}

fn bad_credentials() -> AppError {
    AppError::auth("invalid_credentials", "unable to log in with the provided credentials")
}

/// Password login against the user directory.
pub struct LocalAuthProvider {
    pub store: SharedStore,
    pub sm: SessionManager,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore, sm: SessionManager) -> Self { Self { store, sm } }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        // Copy what we need out of the guard; argon2 runs unlocked
        let (user_id, phc) = {
            let store = self.store.read();
            let Some(user) = store.user_by_username(&req.username) else { return Err(bad_credentials()); };
            if !user.is_active {
                return Err(bad_credentials());
            }
            let Some(phc) = user.password_hash.clone() else { return Err(bad_credentials()); };
            (user.id, phc)
        };
        if !verify_password(&phc, &req.password) {
            return Err(bad_credentials());
        }
        let session = self.sm.issue(user_id);
        info!(target: "lims::auth", user_id, username = %req.username, "login");
        tprintln!("auth.login user={} sid={}", req.username, session.session_id);
        Ok(LoginResponse { session })
    }
}
