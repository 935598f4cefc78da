//! End-to-end flows over the real router: the role gates, the mode-dispatched
//! mutations, confirmation handling and the session side effects, exercised
//! with a plain HTTP client against an ephemeral listener.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use signatories::config::Settings;
use signatories::identity::{FlashStore, Identity, OrcidApi, SessionManager};
use signatories::server::{router, AppState, SESSION_COOKIE};
use signatories::storage::campaigns::NewCampaign;
use signatories::storage::{SharedStore, Store};

fn test_settings(db_path: &str) -> Settings {
    Settings {
        port: 0,
        sandbox: true,
        orcid_url: "https://sandbox.orcid.org/".to_string(),
        // Unroutable endpoints: provider calls in tests must fail fast, and
        // the paths under test never depend on them succeeding.
        token_url: "http://127.0.0.1:9/oauth/token".to_string(),
        authorize_url: "http://127.0.0.1:9/oauth/authorize".to_string(),
        public_api_url: "http://127.0.0.1:9/v3.0".to_string(),
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        code_callback_uri: "http://127.0.0.1:9/authorization-code-callback".to_string(),
        admin_orcid: None,
        session_ttl: Duration::from_secs(3600),
        everyone_is_editor: false,
        db_path: db_path.to_string(),
    }
}

struct App {
    base: String,
    state: AppState,
    client: reqwest::Client,
    // Keeps the on-disk database alive for the test
    _dir: tempfile::TempDir,
}

async fn spawn_app(mut mutate: impl FnMut(&mut Settings)) -> App {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("signatories.db");
    let mut settings = test_settings(db_path.to_str().unwrap());
    mutate(&mut settings);

    let state = AppState {
        store: SharedStore::open(&settings.db_path).unwrap(),
        sessions: SessionManager::new(settings.session_ttl),
        flashes: FlashStore::new(),
        orcid_api: Arc::new(OrcidApi::new(&settings).unwrap()),
        settings: Arc::new(settings),
    };
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    App { base: format!("http://{}", addr), state, client, _dir: dir }
}

impl App {
    fn seed_campaign(&self, slug: &str, owner: &Identity) {
        self.state
            .store
            .lock()
            .create_campaign(&NewCampaign {
                slug: slug.to_string(),
                owner_orcid: owner.orcid.clone(),
                owner_name: owner.name.clone(),
                kind: "petition".to_string(),
                name: format!("Campaign {}", slug),
                short_description: "short".to_string(),
                text: "text".to_string(),
                sort_alphabetical: false,
                allow_anonymous: true,
            })
            .unwrap();
    }

    fn login(&self, identity: &Identity) -> String {
        let session = self.state.sessions.issue(identity.clone());
        format!("{}={}", SESSION_COOKIE, session.token)
    }

    async fn post_action(
        &self,
        slug: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> reqwest::Response {
        let mut req = self.client.post(format!("{}/{}/action", self.base, slug)).form(fields);
        if let Some(c) = cookie {
            req = req.header("cookie", c);
        }
        req.send().await.unwrap()
    }

    async fn get_json(&self, path: &str, cookie: Option<&str>) -> Value {
        let mut req = self.client.get(format!("{}{}", self.base, path));
        if let Some(c) = cookie {
            req = req.header("cookie", c);
        }
        req.send().await.unwrap().json().await.unwrap()
    }
}

fn ada() -> Identity {
    Identity::new("0000-0002-1825-0097", "Ada Lovelace")
}

fn grace() -> Identity {
    Identity::new("0000-0001-5109-3700", "Grace Hopper")
}

fn location(resp: &reqwest::Response) -> &str {
    resp.headers().get("location").unwrap().to_str().unwrap()
}

#[tokio::test]
async fn visitors_are_redirected_to_the_campaign_landing_when_signing() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());

    let resp = app
        .post_action("lake", None, &[("mode", "update_info"), ("affiliation", ""), ("anonymous", "False")])
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/lake");
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 0);
}

#[tokio::test]
async fn signing_records_a_signature_and_lands_on_thank_you() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    let cookie = app.login(&grace());

    let resp = app
        .post_action(
            "lake",
            Some(&cookie),
            &[("mode", "update_info"), ("affiliation", "Navy"), ("anonymous", "False")],
        )
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/lake/thank-you");

    let view = app.get_json("/lake", None).await;
    assert_eq!(view["total_signatures"], 1);
    assert_eq!(view["anonymous_signatures"], 0);
    assert_eq!(view["visible_signatures"][0]["name"], "Grace Hopper");
    assert_eq!(view["visible_signatures"][0]["affiliation"], "Navy");
}

#[tokio::test]
async fn anonymous_signatures_are_counted_but_not_listed() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    let cookie = app.login(&grace());

    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "update_info"), ("affiliation", ""), ("anonymous", "True")],
    )
    .await;

    let view = app.get_json("/lake", None).await;
    assert_eq!(view["total_signatures"], 1);
    assert_eq!(view["anonymous_signatures"], 1);
    assert_eq!(view["visible_signatures"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn wrong_confirmation_keeps_the_signature_and_leaves_an_alert() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    let cookie = app.login(&grace());
    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "update_info"), ("affiliation", ""), ("anonymous", "False")],
    )
    .await;

    let resp = app
        .post_action("lake", Some(&cookie), &[("mode", "delete"), ("confirmation", "no")])
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/lake/user");
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 1);

    // The one-shot alert shows up on the next page view, once.
    let page = app.get_json("/lake/user", Some(&cookie)).await;
    let alerts = page["alerts"].as_array().unwrap();
    assert!(alerts.iter().any(|a| a["message"].as_str().unwrap().contains("confirm")));
    let page_again = app.get_json("/lake/user", Some(&cookie)).await;
    assert_eq!(page_again["alerts"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn confirmed_deletion_removes_the_signature_and_ends_the_session() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    let cookie = app.login(&grace());
    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "update_info"), ("affiliation", ""), ("anonymous", "False")],
    )
    .await;

    let resp = app
        .post_action("lake", Some(&cookie), &[("mode", "delete"), ("confirmation", "Delete")])
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/lake");
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 0);

    // Session is gone: the signer page now bounces to the landing
    let user_page = app
        .client
        .get(format!("{}/lake/user", app.base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(user_page.status(), 303);
    assert_eq!(location(&user_page), "/lake");
}

#[tokio::test]
async fn closed_campaigns_refuse_new_signatures() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    app.state.store.lock().set_campaign_active("lake", false).unwrap();
    let cookie = app.login(&grace());

    let resp = app
        .post_action(
            "lake",
            Some(&cookie),
            &[("mode", "update_info"), ("affiliation", ""), ("anonymous", "False")],
        )
        .await;
    assert_eq!(location(&resp), "/lake");
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 0);
}

#[tokio::test]
async fn blocked_identities_cannot_sign() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    app.state.store.lock().upsert_block(&grace().orcid, "Grace Hopper").unwrap();
    let cookie = app.login(&grace());

    let resp = app
        .post_action(
            "lake",
            Some(&cookie),
            &[("mode", "update_info"), ("affiliation", ""), ("anonymous", "False")],
        )
        .await;
    assert_eq!(location(&resp), "/lake/user");
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 0);
}

#[tokio::test]
async fn editors_only_touch_campaigns_they_own() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    {
        let mut store = app.state.store.lock();
        store.upsert_admin(&ada().orcid, "Ada Lovelace", 2).unwrap();
        store.upsert_admin(&grace().orcid, "Grace Hopper", 2).unwrap();
    }

    // Grace is an editor but not the owner: soft denial, not a 403
    let grace_cookie = app.login(&grace());
    let resp = app
        .post_action("lake", Some(&grace_cookie), &[("mode", "edit_campaign"), ("name", "Hijacked")])
        .await;
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/insufficient-privileges");
    assert_eq!(app.state.store.lock().get_campaign("lake").unwrap().unwrap().name, "Campaign lake");

    // Ada owns it: close and reopen through the lifecycle mode
    let ada_cookie = app.login(&ada());
    app.post_action("lake", Some(&ada_cookie), &[("mode", "close_activate")]).await;
    let closed = app.state.store.lock().get_campaign("lake").unwrap().unwrap();
    assert!(!closed.is_active);
    assert!(closed.closed_date.is_some());
    app.post_action("lake", Some(&ada_cookie), &[("mode", "close_activate")]).await;
    let reopened = app.state.store.lock().get_campaign("lake").unwrap().unwrap();
    assert!(reopened.is_active);
    assert!(reopened.closed_date.is_none());
}

#[tokio::test]
async fn administrators_may_edit_any_campaign() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    app.state.store.lock().upsert_admin(&grace().orcid, "Grace Hopper", 3).unwrap();

    let cookie = app.login(&grace());
    app.post_action("lake", Some(&cookie), &[("mode", "edit_campaign"), ("name", "Renamed")]).await;
    assert_eq!(app.state.store.lock().get_campaign("lake").unwrap().unwrap().name, "Renamed");
}

#[tokio::test]
async fn campaign_creation_is_role_gated_and_validates_slugs() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());

    // A plain signer may not create campaigns under the default policy
    let signer_cookie = app.login(&grace());
    let resp = app
        .post_action("lake", Some(&signer_cookie), &[("mode", "create_campaign"), ("slug", "forest")])
        .await;
    assert_eq!(location(&resp), "/insufficient-privileges");

    app.state.store.lock().upsert_admin(&grace().orcid, "Grace Hopper", 2).unwrap();
    let resp = app
        .post_action(
            "lake",
            Some(&signer_cookie),
            &[("mode", "create_campaign"), ("slug", "forest"), ("name", "Forest"), ("allow_anonymous", "true")],
        )
        .await;
    assert_eq!(location(&resp), "/forest");
    let forest = app.state.store.lock().get_campaign("forest").unwrap().unwrap();
    assert_eq!(forest.owner_orcid, grace().orcid);
    assert!(forest.allow_anonymous);

    // Duplicate and invalid slugs bounce back with an alert, nothing created
    let resp = app
        .post_action("lake", Some(&signer_cookie), &[("mode", "create_campaign"), ("slug", "forest")])
        .await;
    assert_eq!(location(&resp), "/lake");
    let resp = app
        .post_action("lake", Some(&signer_cookie), &[("mode", "create_campaign"), ("slug", "has space")])
        .await;
    assert_eq!(location(&resp), "/lake");
    assert_eq!(app.state.store.lock().list_all_campaigns().unwrap().len(), 2);
}

#[tokio::test]
async fn everyone_is_editor_policy_promotes_recordless_identities() {
    let app = spawn_app(|s| s.everyone_is_editor = true).await;
    let cookie = app.login(&grace());
    let index = app.get_json("/", Some(&cookie)).await;
    assert_eq!(index["role"], "editor");

    let strict = spawn_app(|s| s.everyone_is_editor = false).await;
    let cookie = strict.login(&grace());
    let index = strict.get_json("/", Some(&cookie)).await;
    assert_eq!(index["role"], "signer");
}

#[tokio::test]
async fn admins_cannot_modify_their_own_record() {
    let app = spawn_app(|_| {}).await;
    app.state.store.lock().upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();
    let cookie = app.login(&ada());

    for mode in ["modify_user", "delete_ban_user"] {
        let resp = app
            .post_action(
                "lake",
                Some(&cookie),
                &[("mode", mode), ("orcid", "0000-0002-1825-0097"), ("role", "1"), ("confirmation", "delete")],
            )
            .await;
        assert_eq!(resp.status(), 303, "mode {}", mode);
    }
    // Record untouched
    let rec = app.state.store.lock().get_admin(&ada().orcid).unwrap().unwrap();
    assert_eq!(rec.role_level, 3);
}

#[tokio::test]
async fn admin_forms_reject_identifiers_failing_the_checksum() {
    let app = spawn_app(|_| {}).await;
    app.state.store.lock().upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();
    let cookie = app.login(&ada());

    // One character off a valid iD: structurally fine, checksum fails
    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "modify_user"), ("orcid", "0000-0001-5109-3701"), ("role", "2")],
    )
    .await;
    assert!(app.state.store.lock().get_admin("0000-0001-5109-3701").unwrap().is_none());
}

#[tokio::test]
async fn admins_can_promote_an_existing_record() {
    let app = spawn_app(|_| {}).await;
    {
        let mut store = app.state.store.lock();
        store.upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();
        store.upsert_admin(&grace().orcid, "Grace Hopper", 2).unwrap();
    }
    let cookie = app.login(&ada());
    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "modify_user"), ("orcid", "0000-0001-5109-3700"), ("role", "3")],
    )
    .await;
    let rec = app.state.store.lock().get_admin(&grace().orcid).unwrap().unwrap();
    assert_eq!(rec.role_level, 3);
    assert_eq!(rec.name, "Grace Hopper");
}

#[tokio::test]
async fn bulk_delete_requires_removing_admin_status_first() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    {
        let mut store = app.state.store.lock();
        store.upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();
        store.upsert_admin(&grace().orcid, "Grace Hopper", 2).unwrap();
        store.upsert_signature(&grace(), "lake", "", false).unwrap();
    }
    let cookie = app.login(&ada());

    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "delete_ban_user"), ("orcid", "0000-0001-5109-3700"), ("confirmation", "delete"), ("option", "delete")],
    )
    .await;
    // Refused: the target still holds admin status
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 1);

    // Removing admin status through the admin surface itself (role 1) must
    // unblock the bulk delete; no out-of-band store surgery is available in
    // a deployment.
    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "modify_user"), ("orcid", "0000-0001-5109-3700"), ("role", "1")],
    )
    .await;
    let rec = app.state.store.lock().get_admin(&grace().orcid).unwrap().unwrap();
    assert_eq!(rec.role_level, 1);

    app.post_action(
        "lake",
        Some(&cookie),
        &[("mode", "delete_ban_user"), ("orcid", "0000-0001-5109-3700"), ("confirmation", "delete"), ("option", "delete")],
    )
    .await;
    assert_eq!(app.state.store.lock().count_total("lake").unwrap(), 0);
    // The purge also clears the leftover tombstone
    assert!(app.state.store.lock().get_admin(&grace().orcid).unwrap().is_none());
}

#[tokio::test]
async fn thank_you_ends_signer_sessions_but_not_privileged_ones() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    app.state.store.lock().upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();

    let signer_cookie = app.login(&grace());
    let resp = app
        .client
        .get(format!("{}/lake/thank-you", app.base))
        .header("cookie", &signer_cookie)
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("set-cookie").is_some());
    let follow = app
        .client
        .get(format!("{}/lake/user", app.base))
        .header("cookie", &signer_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(follow.status(), 303);

    let admin_cookie = app.login(&ada());
    app.client
        .get(format!("{}/lake/thank-you", app.base))
        .header("cookie", &admin_cookie)
        .send()
        .await
        .unwrap();
    let page = app.get_json("/lake/user", Some(&admin_cookie)).await;
    assert_eq!(page["orcid_id"], "0000-0002-1825-0097");
}

#[tokio::test]
async fn ods_download_is_owner_gated_and_spreadsheet_typed() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    {
        let mut store = app.state.store.lock();
        store.upsert_admin(&ada().orcid, "Ada Lovelace", 2).unwrap();
        store.upsert_signature(&grace(), "lake", "Navy", false).unwrap();
    }
    let cookie = app.login(&ada());

    let resp = app.post_action("lake", Some(&cookie), &[("mode", "download-ods")]).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/vnd.oasis.opendocument.spreadsheet"
    );
    let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.contains("lake.ods"));
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(&bytes[..2], b"PK");

    // And the archive really lists the visible signatory
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut content = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("content.xml").unwrap(), &mut content).unwrap();
    assert!(content.contains("Grace Hopper"));
    assert!(content.contains("https://sandbox.orcid.org/0000-0001-5109-3700"));
}

#[tokio::test]
async fn database_backup_is_admin_only_and_contains_wal_resident_commits() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    app.state.store.lock().upsert_signature(&grace(), "lake", "Navy", false).unwrap();

    let signer_cookie = app.login(&grace());
    let resp = app.post_action("lake", Some(&signer_cookie), &[("mode", "backup_db")]).await;
    assert_eq!(location(&resp), "/insufficient-privileges");

    app.state.store.lock().upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();
    let admin_cookie = app.login(&ada());
    let resp = app.post_action("lake", Some(&admin_cookie), &[("mode", "backup_db")]).await;
    assert_eq!(resp.status(), 200);
    let bytes = resp.bytes().await.unwrap();

    // Restoring the download must reproduce the rows committed through the
    // live connection. With journal_mode=WAL those sit in the -wal file
    // until checkpointed, so a raw file copy alone would come back empty.
    let restore_dir = tempfile::tempdir().unwrap();
    let restore_path = restore_dir.path().join("restored.db");
    std::fs::write(&restore_path, &bytes).unwrap();
    let restored = Store::open(restore_path.to_str().unwrap()).unwrap();
    assert!(restored.get_campaign("lake").unwrap().is_some());
    assert_eq!(restored.count_total("lake").unwrap(), 1);
    assert!(restored.get_admin(&ada().orcid).unwrap().is_some());
}

#[tokio::test]
async fn orphan_sweep_is_admin_only_and_confirmed() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());
    {
        let mut store = app.state.store.lock();
        store.upsert_admin(&ada().orcid, "Ada Lovelace", 3).unwrap();
        store.upsert_signature(&grace(), "ghost", "", false).unwrap();
    }
    let cookie = app.login(&ada());

    // Without the confirmation token nothing is swept
    app.post_action("lake", Some(&cookie), &[("mode", "delete_orphans"), ("confirmation", "yes")]).await;
    assert_eq!(app.state.store.lock().count_total("ghost").unwrap(), 1);

    app.post_action("lake", Some(&cookie), &[("mode", "delete_orphans"), ("confirmation", "delete")]).await;
    assert_eq!(app.state.store.lock().count_total("ghost").unwrap(), 0);
}

#[tokio::test]
async fn callback_without_a_code_is_a_placeholder_failure() {
    let app = spawn_app(|_| {}).await;
    let resp = app
        .client
        .get(format!("{}/authorization-code-callback", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(resp.text().await.unwrap().contains("Fetching ORCID account details"));
}

#[tokio::test]
async fn storage_failures_surface_as_errors_not_as_not_found() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());

    // Break the schema underneath the live connection; subsequent campaign
    // lookups now fail with a real storage error, which must not be
    // presented as a missing campaign.
    let saboteur = rusqlite::Connection::open(&app.state.settings.db_path).unwrap();
    saboteur.execute_batch("DROP TABLE campaigns;").unwrap();

    let resp = app.client.get(format!("{}/lake", app.base)).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");

    let cookie = app.login(&grace());
    let resp = app
        .client
        .get(format!("{}/lake/user", app.base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let resp = app.client.get(format!("{}/lake/thank-you", app.base)).send().await.unwrap();
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn unknown_campaigns_modes_and_routes_fall_through_to_not_found() {
    let app = spawn_app(|_| {}).await;
    app.seed_campaign("lake", &ada());

    let resp = app.client.get(format!("{}/no-such-campaign", app.base)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app.client.get(format!("{}/lake/no-such-page", app.base)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let cookie = app.login(&grace());
    let resp = app.post_action("lake", Some(&cookie), &[("mode", "frobnicate")]).await;
    assert_eq!(resp.status(), 404);
}
