//! Central identity and session management for the signature service.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod flash;
mod request_context;
mod authorizer;

pub use principal::Identity;
pub use session::{Session, SessionManager, SessionToken};
pub use provider::OrcidApi;
pub use flash::{Alert, AlertLevel, FlashStore};
pub use request_context::RequestContext;
pub use authorizer::{
    can_edit, check_action, check_admin_mutation, confirmation_matches, resolve_role,
    role_from_level, Action, AdminMutation, Policy, Role,
};
