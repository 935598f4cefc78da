use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use crate::tprintln;

use super::principal::Identity;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub identity: Identity,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_token() -> String {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Token -> identity map with a fixed TTL. Expiry is evaluated lazily on
/// `resolve`; concurrent sessions for the same identity are independent and
/// all valid. The map is owned by the manager (cloned handles share it), so
/// there is no process-global session state.
#[derive(Clone)]
pub struct SessionManager {
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<SessionToken, Session>>>,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Bind an authenticated identity to a fresh token.
    pub fn issue(&self, identity: Identity) -> Session {
        let now = Instant::now();
        let token = gen_token();
        let sess = Session {
            token: token.clone(),
            identity,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(token, sess.clone());
        tprintln!(
            "session.issue orcid={} ttl_secs={}",
            sess.identity.orcid,
            self.ttl.as_secs()
        );
        sess
    }

    /// Resolve a token to its identity, dropping the entry if expired.
    pub fn resolve(&self, token: &str) -> Option<Identity> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            match map.get(token) {
                Some(sess) if sess.expires_at > now => Some(sess.identity.clone()),
                Some(_) => {
                    drop_key = Some(token.to_string());
                    None
                }
                None => None,
            }
        };
        if let Some(k) = drop_key {
            self.sessions.write().remove(&k);
        }
        out
    }

    /// Drop every expired session, returning the swept tokens so per-session
    /// satellites (flash alerts) can be cleared as well. Without a periodic
    /// sweep, sessions whose token is never presented again would sit in the
    /// map forever.
    pub fn sweep_expired(&self) -> Vec<SessionToken> {
        let now = Instant::now();
        let mut map = self.sessions.write();
        let stale: Vec<SessionToken> = map
            .iter()
            .filter(|(_, sess)| sess.expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &stale {
            map.remove(token);
        }
        if !stale.is_empty() {
            tprintln!("session.sweep removed={}", stale.len());
        }
        stale
    }

    /// End a session (logout, post-deletion clear, thank-you acknowledgment).
    pub fn end(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token).is_some();
        if removed {
            tprintln!("session.end token_prefix={}", &token[..token.len().min(8)]);
        }
        removed
    }
}
