//!
//! signatories HTTP server
//! -----------------------
//! This module defines the Axum-based HTTP surface of the signature service.
//! Handlers assemble view-model JSON for the (external) rendering layer and
//! drive the repositories; mutations arrive as a single mode-dispatched form
//! POST per campaign, mirroring the deployed route shape.
//!
//! Responsibilities:
//! - Session cookie handling and per-request role resolution.
//! - The identity-exchange callback that turns an authorization code into a
//!   durable session.
//! - Role/ownership gating of every campaign and signature mutation.
//! - One-shot alert messages carried across redirects via the per-session
//!   flash store (never a process-wide variable).
//! - ODS export and raw database backup downloads.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::AppError;
use crate::export;
use crate::identity::{
    can_edit, check_action, check_admin_mutation, confirmation_matches, resolve_role, Action,
    AdminMutation, Alert, FlashStore, OrcidApi, Policy, RequestContext, Role, SessionManager,
};
use crate::orcid;
use crate::storage::campaigns::{CampaignEdit, NewCampaign};
use crate::storage::SharedStore;

pub const SESSION_COOKIE: &str = "signatories_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: SessionManager,
    pub flashes: FlashStore,
    pub orcid_api: Arc<OrcidApi>,
    pub settings: Arc<Settings>,
}

/// Start the HTTP server. The only fatal condition here is failure to reach
/// the persistent store; everything downstream degrades to per-request
/// errors.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = SharedStore::open(&settings.db_path)
        .with_context(|| format!("while opening store at {}", settings.db_path))?;
    let orcid_api = Arc::new(OrcidApi::new(&settings)?);

    // Bootstrap administrator from configuration. A lookup failure leaves
    // the name empty; an invalid identifier aborts startup.
    if let Some(admin) = &settings.admin_orcid {
        orcid::validate(admin)
            .map_err(|e| anyhow::anyhow!("ADMIN_ORCID rejected: {}", e))?;
        let name = orcid_api.lookup_public_name(admin).await;
        store.lock().ensure_bootstrap_admin(admin, &name)?;
    }

    let state = AppState {
        store,
        sessions: SessionManager::new(settings.session_ttl),
        flashes: FlashStore::new(),
        orcid_api,
        settings: Arc::new(settings),
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], state.settings.port));
    info!(%addr, sandbox = state.settings.sandbox, "signatories listening");

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/authorization-code-callback", get(authorize_callback))
        .route("/logout", get(logout))
        .route("/insufficient-privileges", get(insufficient_privileges))
        .route("/{slug}", get(campaign_view))
        .route("/{slug}/user", get(user_view))
        .route("/{slug}/thank-you", get(thank_you))
        .route("/{slug}/action", post(campaign_action))
        .fallback(not_found)
        .with_state(state)
}

// --- cookie and context helpers ---

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn set_session_cookie(token: &str) -> HeaderValue {
    // Secure, HttpOnly cookie scoped to path / with SameSite=Lax so the
    // provider redirect back to the callback still carries it.
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/",
        SESSION_COOKIE, token
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Lax; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

/// Resolve who is asking, fresh on every request. Role resolution is never
/// cached, so an administration change takes effect on the subject's next
/// request.
fn context(state: &AppState, headers: &HeaderMap) -> RequestContext {
    let token = parse_cookie(headers, SESSION_COOKIE);
    let identity = token.as_deref().and_then(|t| state.sessions.resolve(t));
    let policy = Policy { everyone_is_editor: state.settings.everyone_is_editor };
    let admin = match &identity {
        Some(id) => state.store.lock().get_admin(&id.orcid).unwrap_or_else(|e| {
            error!("admin lookup failed: {}", e);
            None
        }),
        None => None,
    };
    let role = resolve_role(identity.as_ref(), admin.as_ref(), &policy);
    RequestContext { token, identity, role }
}

fn flash_and_redirect(state: &AppState, ctx: &RequestContext, alert: Alert, target: &str) -> Response {
    if let Some(token) = &ctx.token {
        state.flashes.push(token, alert);
    }
    Redirect::to(target).into_response()
}

fn not_found_payload() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": "not_found", "message": "no such page or campaign"})),
    )
        .into_response()
}

fn internal_error(e: AppError) -> Response {
    error!("request failed: {}", e);
    (
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(json!({"status": "error", "code": e.code_str(), "message": e.message()})),
    )
        .into_response()
}

// --- read-only views ---

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = context(&state, &headers);
    let alerts = ctx.token.as_deref().map(|t| state.flashes.take(t)).unwrap_or_default();

    let store = state.store.lock();
    let active = match store.list_active_campaigns() {
        Ok(v) => v,
        Err(e) => return internal_error(e),
    };
    let mut data = json!({
        "role": ctx.role,
        "viewer": ctx.identity,
        "campaigns": active,
        "alerts": alerts,
    });
    if ctx.role == Role::Editor {
        if let Some(id) = &ctx.identity {
            if let Ok(own) = store.list_campaigns_owned_by(&id.orcid) {
                data["own_campaigns"] = json!(own);
            }
        }
    }
    if ctx.role == Role::Administrator {
        // The admin panel sees everything, including closed campaigns and
        // the admin/ban rosters.
        if let (Ok(all), Ok(admins), Ok(blocks)) =
            (store.list_all_campaigns(), store.list_admins(), store.list_blocks())
        {
            data["all_campaigns"] = json!(all);
            data["admins"] = json!(admins);
            data["blocked"] = json!(blocks);
        }
    }
    Json(data).into_response()
}

async fn campaign_view(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = context(&state, &headers);
    let alerts = ctx.token.as_deref().map(|t| state.flashes.take(t)).unwrap_or_default();

    let store = state.store.lock();
    let campaign = match store.get_campaign(&slug) {
        Ok(Some(c)) => c,
        Ok(None) => return not_found_payload(),
        Err(e) => return internal_error(e),
    };
    let total = store.count_total(&slug).unwrap_or(0);
    let anonymous = store.count_anonymous(&slug).unwrap_or(0);
    let visible = match store.list_visible_signatures(&slug, campaign.sort_alphabetical) {
        Ok(v) => v,
        Err(e) => return internal_error(e),
    };
    drop(store);

    let authorization_uri = state
        .orcid_api
        .login_url(&state.settings.code_callback_uri, Some(&slug));
    let editable = can_edit(ctx.role, &campaign.owner_orcid, ctx.identity.as_ref());
    Json(json!({
        "campaign": campaign,
        "total_signatures": total,
        "anonymous_signatures": anonymous,
        "visible_signatures": visible,
        "authorization_uri": authorization_uri,
        "role": ctx.role,
        "viewer": ctx.identity,
        "can_edit": editable,
        "alerts": alerts,
    }))
    .into_response()
}

async fn user_view(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = context(&state, &headers);
    let Some(identity) = ctx.identity.clone() else {
        // Visitors are sent back to the campaign landing, not given a 403.
        return Redirect::to(&format!("/{}", slug)).into_response();
    };
    let mut alerts = ctx.token.as_deref().map(|t| state.flashes.take(t)).unwrap_or_default();
    if identity.name_is_private() {
        alerts.push(Alert::danger(
            "Your ORCID user name is marked as private and will not be shown. \
             Please change the visibility of your name in your ORCID account.",
        ));
    }

    let store = state.store.lock();
    let campaign = match store.get_campaign(&slug) {
        Ok(Some(c)) => c,
        Ok(None) => return not_found_payload(),
        Err(e) => return internal_error(e),
    };
    let signature = match store.get_signature(&identity.orcid, &slug) {
        Ok(s) => s,
        Err(e) => return internal_error(e),
    };
    drop(store);

    let in_database = signature.is_some();
    let affiliation = signature
        .as_ref()
        .and_then(|s| s.affiliation.clone())
        .unwrap_or_default();
    let anonymous = signature.as_ref().map(|s| s.anonymous);
    Json(json!({
        "campaign": campaign,
        "name": identity.name,
        "orcid_id": identity.orcid,
        "affiliation": affiliation,
        "anonymous": anonymous,
        "in_database": in_database,
        "role": ctx.role,
        "alerts": alerts,
    }))
    .into_response()
}

async fn thank_you(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ctx = context(&state, &headers);
    let store = state.store.lock();
    let campaign = match store.get_campaign(&slug) {
        Ok(Some(c)) => c,
        Ok(None) => return not_found_payload(),
        Err(e) => return internal_error(e),
    };
    drop(store);

    let body = Json(json!({
        "campaign": campaign,
        "message": "Thank you for signing.",
    }));
    // Non-privileged viewers get their session cleared on acknowledgment;
    // editors and administrators stay logged in.
    if let Some(token) = &ctx.token {
        if matches!(ctx.role, Role::Visitor | Role::Signer) {
            state.sessions.end(token);
            state.flashes.clear(token);
            let mut h = HeaderMap::new();
            h.insert(header::SET_COOKIE, clear_session_cookie());
            return (h, body).into_response();
        }
    }
    body.into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.sessions.end(&token);
        state.flashes.clear(&token);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (h, Redirect::to("/")).into_response()
}

async fn insufficient_privileges() -> Response {
    // Deliberate soft denial: a page of its own rather than a bare 403.
    Json(json!({
        "status": "insufficient_privileges",
        "message": "You do not have sufficient privileges for that action.",
    }))
    .into_response()
}

async fn not_found() -> Response {
    not_found_payload()
}

// --- identity exchange callback ---

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    /// Echoed OAuth state: the campaign slug the login started from.
    state: Option<String>,
}

async fn authorize_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code else {
        return (StatusCode::BAD_REQUEST, "Fetching ORCID account details...")
            .into_response();
    };
    match state
        .orcid_api
        .exchange(&code, &state.settings.code_callback_uri)
        .await
    {
        Ok(identity) => {
            // Login is the natural pruning point: drop expired sessions and
            // the alerts still keyed to them, so neither map grows unbounded.
            for stale in state.sessions.sweep_expired() {
                state.flashes.clear(&stale);
            }
            let session = state.sessions.issue(identity);
            let mut h = HeaderMap::new();
            h.insert(header::SET_COOKIE, set_session_cookie(&session.token));
            // Land on the signer page of the campaign the login started
            // from, when that campaign still exists.
            let target = match query.state {
                Some(slug) => match state.store.lock().get_campaign(&slug) {
                    Ok(Some(_)) => format!("/{}/user", slug),
                    Ok(None) => "/".to_string(),
                    Err(e) => {
                        error!("campaign lookup failed during callback: {}", e);
                        "/".to_string()
                    }
                },
                None => "/".to_string(),
            };
            (h, Redirect::to(&target)).into_response()
        }
        Err(e) => {
            // Surfaced as a transient placeholder; no session, no retry.
            warn!("identity exchange failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                "Fetching ORCID account details... failed. Please try again.",
            )
                .into_response()
        }
    }
}

// --- mode-dispatched mutations ---

async fn campaign_action(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let ctx = context(&state, &headers);
    let field = |name: &str| form.get(name).map(|s| s.as_str()).unwrap_or("");

    match field("mode") {
        "update_info" => update_info(&state, &ctx, &slug, &form).await,
        "delete" => delete_own_signature(&state, &ctx, &slug, &form).await,
        "create_campaign" => create_campaign(&state, &ctx, &slug, &form).await,
        "edit_campaign" => edit_campaign(&state, &ctx, &slug, &form).await,
        "close_activate" => close_activate(&state, &ctx, &slug).await,
        "reset_date" => reset_date(&state, &ctx, &slug).await,
        "delete_campaign" => delete_campaign(&state, &ctx, &slug, &form).await,
        "download-ods" => download_ods(&state, &ctx, &slug).await,
        "modify_user" => modify_user(&state, &ctx, &slug, &form).await,
        "delete_ban_user" => delete_ban_user(&state, &ctx, &slug, &form).await,
        "backup_db" => backup_db(&state, &ctx).await,
        "delete_orphans" => delete_orphans(&state, &ctx, &slug, &form).await,
        other => {
            warn!(mode = other, "unknown action mode");
            not_found_payload()
        }
    }
}

async fn update_info(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    let Some(identity) = ctx.identity.clone() else {
        return Redirect::to(&format!("/{}", slug)).into_response();
    };
    if !check_action(ctx.role, Action::SignOwn, false) {
        return Redirect::to(&format!("/{}", slug)).into_response();
    }

    let campaign = {
        let store = state.store.lock();
        match store.get_campaign(slug) {
            Ok(Some(c)) => c,
            Ok(None) => return not_found_payload(),
            Err(e) => return internal_error(e),
        }
    };
    if !campaign.is_active {
        return flash_and_redirect(
            state,
            ctx,
            Alert::warning("This campaign is closed and no longer accepts signatures."),
            &format!("/{}", slug),
        );
    }

    let blocked = state.store.lock().is_blocked(&identity.orcid).unwrap_or(false);
    if blocked {
        return flash_and_redirect(
            state,
            ctx,
            Alert::danger("Your account is not allowed to sign this campaign."),
            &format!("/{}/user", slug),
        );
    }

    let affiliation = form.get("affiliation").map(|s| s.as_str()).unwrap_or("");
    let requested_anonymous = matches!(form.get("anonymous").map(|s| s.as_str()), Some("True" | "true"));
    let anonymous = requested_anonymous && campaign.allow_anonymous;
    if requested_anonymous && !campaign.allow_anonymous {
        if let Some(token) = &ctx.token {
            state.flashes.push(
                token,
                Alert::warning("This campaign does not accept anonymous signatures; yours is public."),
            );
        }
    }

    let res = state
        .store
        .lock()
        .upsert_signature(&identity, slug, affiliation, anonymous);
    match res {
        Ok(()) => Redirect::to(&format!("/{}/thank-you", slug)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn delete_own_signature(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    let Some(identity) = ctx.identity.clone() else {
        return Redirect::to(&format!("/{}", slug)).into_response();
    };
    if !check_action(ctx.role, Action::DeleteOwnSignature, false) {
        return Redirect::to(&format!("/{}", slug)).into_response();
    }
    let confirmation = form.get("confirmation").map(|s| s.as_str()).unwrap_or("");
    if !confirmation_matches(confirmation) {
        return flash_and_redirect(
            state,
            ctx,
            Alert::info("Please confirm your response with \"delete\""),
            &format!("/{}/user", slug),
        );
    }
    if let Err(e) = state.store.lock().delete_signature(&identity.orcid, slug) {
        return internal_error(e);
    }
    // Successful removal ends the session, like a logout.
    if let Some(token) = &ctx.token {
        state.sessions.end(token);
        state.flashes.clear(token);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (h, Redirect::to(&format!("/{}", slug))).into_response()
}

async fn create_campaign(
    state: &AppState,
    ctx: &RequestContext,
    current_slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    let Some(identity) = ctx.identity.clone() else {
        return Redirect::to("/insufficient-privileges").into_response();
    };
    if !check_action(ctx.role, Action::CreateCampaign, false) {
        return Redirect::to("/insufficient-privileges").into_response();
    }
    let get = |name: &str| form.get(name).cloned().unwrap_or_default();
    let new = NewCampaign {
        slug: get("slug"),
        owner_orcid: identity.orcid.clone(),
        owner_name: identity.name.clone(),
        kind: get("kind"),
        name: get("name"),
        short_description: get("short_description"),
        text: get("text"),
        sort_alphabetical: get("sort_alphabetical") == "true",
        allow_anonymous: get("allow_anonymous") == "true",
    };
    match state.store.lock().create_campaign(&new) {
        Ok(campaign) => {
            if let Some(token) = &ctx.token {
                state.flashes.push(token, Alert::success("Campaign created."));
            }
            Redirect::to(&format!("/{}", campaign.slug)).into_response()
        }
        Err(e @ (AppError::InvalidSlug { .. } | AppError::DuplicateSlug { .. })) => {
            flash_and_redirect(state, ctx, Alert::danger(e.message().to_string()), &format!("/{}", current_slug))
        }
        Err(e) => internal_error(e),
    }
}

/// Shared gate for campaign mutations: the campaign must exist and the actor
/// must be its owning Editor or an Administrator.
fn gated_campaign(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
) -> Result<crate::storage::campaigns::Campaign, Response> {
    let store = state.store.lock();
    let campaign = match store.get_campaign(slug) {
        Ok(Some(c)) => c,
        Ok(None) => return Err(not_found_payload()),
        Err(e) => return Err(internal_error(e)),
    };
    if !can_edit(ctx.role, &campaign.owner_orcid, ctx.identity.as_ref()) {
        return Err(Redirect::to("/insufficient-privileges").into_response());
    }
    Ok(campaign)
}

async fn edit_campaign(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    let campaign = match gated_campaign(state, ctx, slug) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    // Absent fields keep their current values; owner and lifecycle state are
    // not editable through this mode at all.
    let get = |name: &str, current: &str| {
        form.get(name).cloned().unwrap_or_else(|| current.to_string())
    };
    let get_flag = |name: &str, current: bool| match form.get(name).map(|s| s.as_str()) {
        Some(v) => v == "true",
        None => current,
    };
    let edit = CampaignEdit {
        kind: get("kind", &campaign.kind),
        name: get("name", &campaign.name),
        short_description: get("short_description", &campaign.short_description),
        text: get("text", &campaign.text),
        sort_alphabetical: get_flag("sort_alphabetical", campaign.sort_alphabetical),
        allow_anonymous: get_flag("allow_anonymous", campaign.allow_anonymous),
    };
    match state.store.lock().update_campaign(slug, &edit) {
        Ok(()) => flash_and_redirect(state, ctx, Alert::success("Campaign updated."), &format!("/{}", slug)),
        Err(e) => internal_error(e),
    }
}

async fn close_activate(state: &AppState, ctx: &RequestContext, slug: &str) -> Response {
    let campaign = match gated_campaign(state, ctx, slug) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.store.lock().set_campaign_active(slug, !campaign.is_active) {
        Ok(updated) => {
            let msg = if updated.is_active { "Campaign reopened." } else { "Campaign closed." };
            flash_and_redirect(state, ctx, Alert::success(msg), &format!("/{}", slug))
        }
        Err(e) => internal_error(e),
    }
}

async fn reset_date(state: &AppState, ctx: &RequestContext, slug: &str) -> Response {
    if let Err(resp) = gated_campaign(state, ctx, slug) {
        return resp;
    }
    match state.store.lock().reset_campaign_date(slug) {
        Ok(()) => flash_and_redirect(state, ctx, Alert::success("Campaign date reset."), &format!("/{}", slug)),
        Err(e) => internal_error(e),
    }
}

async fn delete_campaign(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    if let Err(resp) = gated_campaign(state, ctx, slug) {
        return resp;
    }
    let confirmation = form.get("confirmation").map(|s| s.as_str()).unwrap_or("");
    if !confirmation_matches(confirmation) {
        return flash_and_redirect(
            state,
            ctx,
            Alert::info("Please confirm your response with \"delete\""),
            &format!("/{}", slug),
        );
    }
    match state.store.lock().delete_campaign(slug) {
        Ok(signatures) => {
            info!(slug, signatures, "campaign deleted");
            flash_and_redirect(state, ctx, Alert::success("Campaign deleted."), "/")
        }
        Err(e) => internal_error(e),
    }
}

async fn download_ods(state: &AppState, ctx: &RequestContext, slug: &str) -> Response {
    let campaign = match gated_campaign(state, ctx, slug) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let visible = match state
        .store
        .lock()
        .list_visible_signatures(slug, campaign.sort_alphabetical)
    {
        Ok(v) => v,
        Err(e) => return internal_error(e),
    };
    match export::signatures_to_ods(&campaign.name, &visible, &state.settings.orcid_url) {
        Ok(bytes) => {
            let mut h = HeaderMap::new();
            h.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/vnd.oasis.opendocument.spreadsheet"),
            );
            if let Ok(value) = HeaderValue::from_str(&format!(
                "attachment; filename=\"{}.ods\"",
                slug
            )) {
                h.insert(header::CONTENT_DISPOSITION, value);
            }
            (h, bytes).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// --- administration surface ---

fn require_admin(ctx: &RequestContext) -> Result<crate::identity::Identity, Response> {
    match (&ctx.identity, ctx.role) {
        (Some(id), Role::Administrator) => Ok(id.clone()),
        _ => Err(Redirect::to("/insufficient-privileges").into_response()),
    }
}

async fn modify_user(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    let acting = match require_admin(ctx) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let back = format!("/{}", slug);
    let target = form.get("orcid").map(|s| s.as_str()).unwrap_or("");
    if let Err(e) = orcid::validate(target) {
        return flash_and_redirect(state, ctx, Alert::danger(e.message().to_string()), &back);
    }
    let role_level: i64 = match form.get("role").and_then(|s| s.parse().ok()) {
        Some(level @ 1..=3) => level,
        _ => {
            return flash_and_redirect(
                state,
                ctx,
                Alert::danger("Role must be 1 (removed), 2 (editor) or 3 (administrator)."),
                &back,
            )
        }
    };
    let target_admin = match state.store.lock().get_admin(target) {
        Ok(rec) => rec,
        Err(e) => return internal_error(e),
    };
    if let Err(e) =
        check_admin_mutation(&acting, target, target_admin.as_ref(), AdminMutation::ModifyRecord)
    {
        return flash_and_redirect(state, ctx, Alert::danger(e.message().to_string()), &back);
    }
    // Keep an already-recorded name; look one up for new records. The lookup
    // may legitimately come back empty.
    let name = match &target_admin {
        Some(rec) if !rec.name.is_empty() => rec.name.clone(),
        _ => state.orcid_api.lookup_public_name(target).await,
    };
    match state.store.lock().upsert_admin(target, &name, role_level) {
        Ok(()) => flash_and_redirect(state, ctx, Alert::success("User record updated."), &back),
        Err(e) => internal_error(e),
    }
}

async fn delete_ban_user(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    let acting = match require_admin(ctx) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let back = format!("/{}", slug);
    let target = form.get("orcid").map(|s| s.as_str()).unwrap_or("");
    if let Err(e) = orcid::validate(target) {
        return flash_and_redirect(state, ctx, Alert::danger(e.message().to_string()), &back);
    }
    let confirmation = form.get("confirmation").map(|s| s.as_str()).unwrap_or("");
    if !confirmation_matches(confirmation) {
        return flash_and_redirect(
            state,
            ctx,
            Alert::info("Please confirm your response with \"delete\""),
            &back,
        );
    }
    // A read failure here must not be folded into "no record": that would
    // skip the admin-status guard below.
    let target_admin = match state.store.lock().get_admin(target) {
        Ok(rec) => rec,
        Err(e) => return internal_error(e),
    };
    if let Err(e) = check_admin_mutation(
        &acting,
        target,
        target_admin.as_ref(),
        AdminMutation::DeleteBanIdentity,
    ) {
        return flash_and_redirect(state, ctx, Alert::danger(e.message().to_string()), &back);
    }
    let removed = match state.store.lock().delete_signatures_by_identity(target) {
        Ok(n) => n,
        Err(e) => return internal_error(e),
    };
    // A level-1 tombstone serves nothing once the identity is purged
    if target_admin.is_some() {
        if let Err(e) = state.store.lock().delete_admin(target) {
            return internal_error(e);
        }
    }
    let banned = form.get("option").map(|s| s.as_str()) == Some("ban");
    if banned {
        let name = state.orcid_api.lookup_public_name(target).await;
        if let Err(e) = state.store.lock().upsert_block(target, &name) {
            return internal_error(e);
        }
    }
    let msg = if banned {
        format!("Removed {} signature(s) and banned the account.", removed)
    } else {
        format!("Removed {} signature(s).", removed)
    };
    flash_and_redirect(state, ctx, Alert::success(msg), &back)
}

async fn backup_db(state: &AppState, ctx: &RequestContext) -> Response {
    if let Err(resp) = require_admin(ctx) {
        return resp;
    }
    let path = state.settings.db_path.clone();
    // Checkpoint and read under the store lock: the WAL still holds recent
    // commits, and a write landing mid-copy would corrupt the snapshot.
    let bytes = {
        let store = state.store.lock();
        if let Err(e) = store.checkpoint() {
            return internal_error(e);
        }
        match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => return internal_error(AppError::io(format!("reading {}: {}", path, e))),
        }
    };
    let filename = std::path::Path::new(&path)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "signatories.db".to_string());
    let mut h = HeaderMap::new();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        h.insert(header::CONTENT_DISPOSITION, value);
    }
    (h, bytes).into_response()
}

async fn delete_orphans(
    state: &AppState,
    ctx: &RequestContext,
    slug: &str,
    form: &HashMap<String, String>,
) -> Response {
    if let Err(resp) = require_admin(ctx) {
        return resp;
    }
    let back = format!("/{}", slug);
    let confirmation = form.get("confirmation").map(|s| s.as_str()).unwrap_or("");
    if !confirmation_matches(confirmation) {
        return flash_and_redirect(
            state,
            ctx,
            Alert::info("Please confirm your response with \"delete\""),
            &back,
        );
    }
    match state.store.lock().delete_orphan_signatures() {
        Ok(n) => flash_and_redirect(
            state,
            ctx,
            Alert::success(format!("Removed {} orphaned signature(s).", n)),
            &back,
        ),
        Err(e) => internal_error(e),
    }
}
