//! Deployment settings, read once from the environment at startup.
//!
//! A `.env` file is honoured for local development (client credentials,
//! bootstrap admin). When `PUBLIC_DOMAIN` is unset the service runs against
//! the ORCID sandbox with a localhost callback, mirroring the production /
//! sandbox split of the deployed configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub sandbox: bool,
    /// Base of public ORCID profile URLs, e.g. "https://orcid.org/".
    pub orcid_url: String,
    /// OAuth token endpoint.
    pub token_url: String,
    /// OAuth authorize endpoint.
    pub authorize_url: String,
    /// Public API base for read-only record lookups.
    pub public_api_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider; the exchange must present
    /// exactly this value.
    pub code_callback_uri: String,
    /// Identifier granted Administrator (level 3) at bootstrap.
    pub admin_orcid: Option<String>,
    pub session_ttl: Duration,
    /// Policy toggle: identities without an admin record resolve to Editor.
    pub everyone_is_editor: bool,
    pub db_path: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    /// Load settings from the environment (and a `.env` file if present).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port: u16 = env_or("SIGNATORIES_PORT", "3000").parse().unwrap_or(3000);
        let public_domain = std::env::var("PUBLIC_DOMAIN").ok();
        let sandbox = public_domain.is_none();

        let (orcid_url, code_callback_uri) = match &public_domain {
            Some(domain) => (
                "https://orcid.org/".to_string(),
                format!("{}/authorization-code-callback", domain),
            ),
            None => (
                "https://sandbox.orcid.org/".to_string(),
                format!("http://127.0.0.1:{}/authorization-code-callback", port),
            ),
        };
        let token_url = format!("{}oauth/token", orcid_url);
        let authorize_url = format!("{}oauth/authorize", orcid_url);
        let public_api_url = if sandbox {
            "https://pub.sandbox.orcid.org/v3.0".to_string()
        } else {
            "https://pub.orcid.org/v3.0".to_string()
        };

        let ttl_hours: u64 = env_or("SESSION_TTL_HOURS", "2").parse().unwrap_or(2);

        Settings {
            port,
            sandbox,
            orcid_url,
            token_url,
            authorize_url,
            public_api_url,
            client_id: env_or("CLIENT_ID", ""),
            client_secret: env_or("CLIENT_SECRET", ""),
            code_callback_uri,
            admin_orcid: std::env::var("ADMIN_ORCID").ok().filter(|s| !s.is_empty()),
            session_ttl: Duration::from_secs(ttl_hours * 3600),
            everyone_is_editor: env_or("EVERYONE_IS_EDITOR", "false") == "true",
            db_path: env_or("DATABASE_PATH", "db/signatories.db"),
        }
    }
}
