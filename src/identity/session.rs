use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use super::actor::UserId;
use crate::tprintln;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub user_id: UserId,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Default)]
struct SessionTables {
    by_token: HashMap<SessionToken, Session>,
    by_user: HashMap<UserId, HashSet<SessionToken>>,
}

fn gen_id() -> String {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    if getrandom::getrandom(&mut buf).is_err() {
        // Fall back to two v4 uuids so a token is never all zeroes
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        buf[..16].copy_from_slice(a.as_bytes());
        buf[16..].copy_from_slice(b.as_bytes());
    }
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Bearer-token sessions. Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    tables: Arc<RwLock<SessionTables>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::with_ttl(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, tables: Arc::new(RwLock::new(SessionTables::default())) }
    }

    pub fn issue(&self, user_id: UserId) -> Session {
        let now = Instant::now();
        let sess = Session {
            session_id: gen_id(),
            token: gen_id(),
            user_id,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        {
            let mut t = self.tables.write();
            t.by_token.insert(sess.token.clone(), sess.clone());
            t.by_user.entry(user_id).or_default().insert(sess.token.clone());
        }
        tprintln!("session.issue user={} sid={} ttl_secs={}", user_id, sess.session_id, self.ttl.as_secs());
        sess
    }

    /// Resolve a token to its user, dropping it if expired.
    pub fn validate(&self, token: &str) -> Option<UserId> {
        let now = Instant::now();
        let expired = {
            let t = self.tables.read();
            match t.by_token.get(token) {
                Some(s) if s.expires_at > now => return Some(s.user_id),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.logout(token);
        }
        None
    }

    pub fn logout(&self, token: &str) -> bool {
        let mut t = self.tables.write();
        let Some(sess) = t.by_token.remove(token) else { return false; };
        if let Some(set) = t.by_user.get_mut(&sess.user_id) {
            set.remove(token);
            if set.is_empty() { t.by_user.remove(&sess.user_id); }
        }
        true
    }

    pub fn revoke_user(&self, user_id: UserId) -> usize {
        let mut t = self.tables.write();
        let tokens = t.by_user.remove(&user_id).unwrap_or_default();
        let mut count = 0usize;
        for tok in tokens.iter() {
            if t.by_token.remove(tok).is_some() { count += 1; }
        }
        tprintln!("session.revoke user={} count={}", user_id, count);
        count
    }

    /// Drop every expired session; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut t = self.tables.write();
        let expired: Vec<(SessionToken, UserId)> = t
            .by_token
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(tok, s)| (tok.clone(), s.user_id))
            .collect();
        for (tok, uid) in expired.iter() {
            t.by_token.remove(tok);
            if let Some(set) = t.by_user.get_mut(uid) {
                set.remove(tok);
                if set.is_empty() { t.by_user.remove(uid); }
            }
        }
        expired.len()
    }

    pub fn active_count(&self) -> usize { self.tables.read().by_token.len() }
}
