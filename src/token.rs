//! Bearer token acquisition and renewal.
//!
//! The long-lived OAuth token lives in Copilot's `hosts.json`. It is
//! exchanged at the identity endpoint for a short-lived bearer token whose
//! expiry is embedded in the token itself:
//!
//! ```text
//! tid=...;exp=1714329795;sku=yearly_subscriber;st=dotcom;chat=1;...
//! ```
//!
//! Tokens are renewed lazily, right before a request is dispatched, once
//! they are within 60 seconds of `exp`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::session::Session;

const TOKEN_REFRESH_BUFFER: i64 = 60;

const EDITOR_VERSION: &str = "vscode/1.85.1";
const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.12.2023120701";
const USER_AGENT: &str = "GitHubCopilotChat/0.12.2023120701";

#[derive(Deserialize)]
struct HostsFile {
    #[serde(rename = "github.com")]
    github_com: GithubComEntry,
}

#[derive(Deserialize)]
struct GithubComEntry {
    oauth_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Extract the `exp` attribute of a bearer token as epoch seconds.
///
/// Missing or unparsable values yield 0, which always counts as expired.
pub fn extract_expiration(token: &str) -> i64 {
    let Some(exp) = token
        .split(';')
        .find_map(|pair| pair.trim().strip_prefix("exp="))
    else {
        return 0;
    };

    match exp.parse::<i64>() {
        Ok(timestamp) => timestamp,
        Err(e) => {
            warn!(error = %e, value = %exp, "Failed to parse token expiry");
            0
        }
    }
}

/// True once `expires_at` lies a full refresh buffer in the past.
pub fn is_expired(expires_at: i64) -> bool {
    is_expired_at(expires_at, unix_now())
}

pub fn is_expired_at(expires_at: i64, now: i64) -> bool {
    expires_at.saturating_add(TOKEN_REFRESH_BUFFER) <= now
}

/// True when `expires_at` is less than a refresh buffer away, or past.
pub fn needs_refresh(expires_at: i64) -> bool {
    needs_refresh_at(expires_at, unix_now())
}

pub fn needs_refresh_at(expires_at: i64, now: i64) -> bool {
    expires_at <= now.saturating_add(TOKEN_REFRESH_BUFFER)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Obtains and renews the bearer token.
#[derive(Clone)]
pub struct TokenManager {
    client: reqwest::Client,
    token_url: String,
    credentials_path: PathBuf,
    timeout: Duration,
}

impl TokenManager {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            token_url: config.token_url.clone(),
            credentials_path: config.credentials_path.clone(),
            timeout: config.token_timeout(),
        }
    }

    /// Read the long-lived OAuth token from the credential file.
    pub async fn read_oauth_token(&self) -> Result<String> {
        let path = &self.credentials_path;
        let content = fs::read_to_string(path).await.map_err(|e| {
            ChatError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let hosts: HostsFile = serde_json::from_str(&content).map_err(|e| {
            ChatError::Config(format!("malformed {}: {}", path.display(), e))
        })?;

        let token = hosts.github_com.oauth_token;
        if token.trim().is_empty() {
            return Err(ChatError::Config(format!(
                "no oauth_token for github.com in {}",
                path.display()
            )));
        }

        Ok(token)
    }

    /// Exchange the OAuth token for a fresh bearer token.
    pub async fn fetch_token(&self) -> Result<String> {
        let oauth_token = self.read_oauth_token().await?;

        debug!(url = %self.token_url, "Requesting bearer token");
        let response = self
            .client
            .get(&self.token_url)
            .timeout(self.timeout)
            .header("authorization", format!("token {}", oauth_token))
            .header("accept", "application/json")
            .header("editor-version", EDITOR_VERSION)
            .header("editor-plugin-version", EDITOR_PLUGIN_VERSION)
            .header("user-agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Auth(format!(
                "token request failed: {} - {}",
                status, body
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Auth(format!("invalid token response: {}", e)))?;

        Ok(body.token)
    }

    /// Renew `session`'s token in place if it is expired or about to be.
    ///
    /// Returns whether a new token was fetched.
    pub async fn ensure_fresh(&self, session: &mut Session) -> Result<bool> {
        let expires_at = extract_expiration(&session.bearer_token);
        if !needs_refresh(expires_at) {
            return Ok(false);
        }

        info!(expires_at, "Renewing expired token");
        session.bearer_token = self.fetch_token().await?;
        Ok(true)
    }

    /// Replace the token regardless of its expiry.
    pub async fn force_refresh(&self, session: &mut Session) -> Result<()> {
        info!("Forcing token refresh");
        session.bearer_token = self.fetch_token().await?;
        Ok(())
    }
}
