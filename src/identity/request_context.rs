use super::authorizer::Role;
use super::principal::Identity;
use super::session::SessionToken;

/// Per-request view of who is asking: the session token (if a cookie was
/// presented and still valid), the resolved identity, and the role derived
/// for this request. Assembled fresh for every request; nothing here is
/// shared across requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub token: Option<SessionToken>,
    pub identity: Option<Identity>,
    pub role: Role,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { token: None, identity: None, role: Role::Visitor }
    }
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
