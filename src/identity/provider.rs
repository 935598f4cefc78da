//! Identity provider adapter for the ORCID OAuth endpoints.
//!
//! Two boundary operations: exchanging a one-time authorization code for a
//! verified identity, and a read-only public-name lookup used when creating
//! admin or ban records. The exchange fails closed with a bounded timeout
//! and is never retried automatically; the name lookup swallows transport
//! errors and returns an empty string (an admin with an unknown name is
//! acceptable, a failed bootstrap is not).

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{AppError, AppResult};

use super::principal::Identity;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct OrcidApi {
    http: reqwest::Client,
    authorize_url: String,
    token_url: String,
    public_api_url: String,
    client_id: String,
    client_secret: String,
}

impl OrcidApi {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            authorize_url: settings.authorize_url.clone(),
            token_url: settings.token_url.clone(),
            public_api_url: settings.public_api_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        })
    }

    /// Authorization URI the browser is sent to. The optional `state` is
    /// echoed back on the callback and carries the campaign slug so the
    /// post-login landing needs no shared server-side variable.
    pub fn login_url(&self, redirect_uri: &str, state: Option<&str>) -> String {
        let mut url = format!(
            "{}?client_id={}&response_type=code&scope=/authenticate&redirect_uri={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
        );
        if let Some(s) = state {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(s));
        }
        url
    }

    /// Exchange a one-time authorization code for a verified identity.
    /// `redirect_uri` must exactly match the URI used to request the code.
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> AppResult<Identity> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let resp = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::exchange(format!("token endpoint unreachable: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AppError::exchange(format!(
                "token endpoint rejected the code: HTTP {}",
                resp.status()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::exchange(format!("malformed token response: {}", e)))?;
        let orcid = body
            .get("orcid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::exchange("token response missing orcid"))?
            .to_string();
        // The name is absent/empty when the user keeps it private; that is
        // surfaced to the user later, not treated as a failure here.
        let name = body
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        debug!(orcid = %orcid, "identity exchange succeeded");
        Ok(Identity { orcid, name })
    }

    /// Public display name for an identifier via the read-public API.
    /// Returns "" on any transport or parse failure.
    pub async fn lookup_public_name(&self, orcid: &str) -> String {
        match self.try_lookup_public_name(orcid).await {
            Ok(name) => name,
            Err(e) => {
                warn!(orcid = %orcid, "public name lookup failed: {}", e);
                String::new()
            }
        }
    }

    async fn try_lookup_public_name(&self, orcid: &str) -> anyhow::Result<String> {
        // Read-public token via client credentials
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", "/read-public"),
        ];
        let token: Value = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let access = token
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("no access_token in response"))?;

        let record: Value = self
            .http
            .get(format!("{}/{}/record", self.public_api_url, orcid))
            .bearer_auth(access)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let name = &record["person"]["name"];
        if name.is_null() {
            return Ok(String::new());
        }
        let given = name["given-names"]["value"].as_str().unwrap_or("");
        let family = name["family-name"]["value"].as_str().unwrap_or("");
        Ok(match (given.is_empty(), family.is_empty()) {
            (false, false) => format!("{} {}", given, family),
            (false, true) => given.to_string(),
            (true, false) => family.to_string(),
            (true, true) => String::new(),
        })
    }
}
