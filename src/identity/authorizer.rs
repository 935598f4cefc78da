//! Role resolution and the central authorization gate.
//!
//! Roles are derived per request from (identity option, admin-record option,
//! policy) by one pure function and never cached, so an administration change
//! takes effect on the resolved user's very next request. The decision table
//! lives in `check_action`; campaign ownership goes through the single
//! `can_edit` predicate used by every campaign mutation.

use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::storage::admins::AdminRecord;

use super::principal::Identity;

/// Literal confirmation required by every destructive action.
pub const CONFIRMATION_TOKEN: &str = "delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Visitor,
    Signer,
    Editor,
    Administrator,
}

/// Global authorization policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Policy {
    /// When set, an identity without an admin record resolves to Editor.
    /// A deliberate toggle: no record is created for such identities.
    pub everyone_is_editor: bool,
}

/// Map a stored admin role level to a role. Level 1 is a tombstone left by
/// "remove admin status" and behaves exactly like Signer.
pub fn role_from_level(level: i64) -> Role {
    match level {
        3 => Role::Administrator,
        2 => Role::Editor,
        _ => Role::Signer,
    }
}

/// Pure role resolver, re-run on every request.
pub fn resolve_role(
    identity: Option<&Identity>,
    admin: Option<&AdminRecord>,
    policy: &Policy,
) -> Role {
    let Some(_identity) = identity else { return Role::Visitor };
    match admin {
        Some(rec) => role_from_level(rec.role_level),
        None if policy.everyone_is_editor => Role::Editor,
        None => Role::Signer,
    }
}

/// Operations gated by the decision table. `EditCampaign` covers metadata
/// edits, the active/closed toggle, creation-date reset, deletion and the
/// signature export of one campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewCampaign,
    SignOwn,
    DeleteOwnSignature,
    CreateCampaign,
    EditCampaign,
    ManageAdmins,
    BulkDeleteSignatures,
}

/// Central decision table. `owns_campaign` only matters for Editor on
/// `EditCampaign`; Administrators may touch any campaign.
pub fn check_action(role: Role, action: Action, owns_campaign: bool) -> bool {
    match (role, action) {
        (_, Action::ViewCampaign) => true,
        (Role::Visitor, _) => false,
        (_, Action::SignOwn) | (_, Action::DeleteOwnSignature) => true,
        (Role::Editor | Role::Administrator, Action::CreateCampaign) => true,
        (Role::Administrator, Action::EditCampaign) => true,
        (Role::Editor, Action::EditCampaign) => owns_campaign,
        (Role::Administrator, Action::ManageAdmins | Action::BulkDeleteSignatures) => true,
        _ => false,
    }
}

/// Ownership predicate for campaign mutations: the owning Editor or any
/// Administrator.
pub fn can_edit(role: Role, campaign_owner: &str, identity: Option<&Identity>) -> bool {
    let owns = identity.map(|i| i.orcid == campaign_owner).unwrap_or(false);
    check_action(role, Action::EditCampaign, owns)
}

/// Case-insensitive match against the literal confirmation token.
pub fn confirmation_matches(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(CONFIRMATION_TOKEN)
}

/// Mutations on the admin-management surface, each with its own edge rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminMutation {
    /// Create/update/remove an admin record.
    ModifyRecord,
    /// Bulk-delete (and optionally ban) an identity's signatures.
    DeleteBanIdentity,
}

/// Guards for the admin surface. An Administrator may never act on their own
/// record, and bulk deletion refuses identities that still hold admin status
/// (level 2 or 3; status must be removed first). A level-1 tombstone does
/// not count as status, otherwise a removed admin could never be bulk-deleted.
pub fn check_admin_mutation(
    acting: &Identity,
    target_orcid: &str,
    target_admin: Option<&AdminRecord>,
    mutation: AdminMutation,
) -> AppResult<()> {
    if acting.orcid == target_orcid {
        return Err(AppError::insufficient(
            "administrators may not modify their own record",
        ));
    }
    if mutation == AdminMutation::DeleteBanIdentity
        && target_admin.map_or(false, |rec| rec.role_level >= 2)
    {
        return Err(AppError::insufficient(
            "identity holds admin status; remove admin status first",
        ));
    }
    Ok(())
}
