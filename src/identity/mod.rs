//! Caller identity: accounts' roles, bearer-token sessions, password login and
//! per-request resolution of the `Authorization` header.

mod actor;
mod provider;
mod request_context;
mod session;

pub use actor::{Actor, Identity, Role, UserId, ADMIN_GROUP, BASELINE_GROUP, STAFF_GROUP};
pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse};
pub use request_context::{bearer_token, resolve_identity, RequestContext, RequestId};
pub use session::{Session, SessionManager, SessionToken};
