//! Provider usage endpoint client.
//!
//! Reads the OAuth token the coding agent already stores on this machine and
//! asks the provider how much of the five-hour and seven-day allowance is
//! used. Every failure degrades to `None` so callers fall back to estimates.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{CapacityError, Result};

/// OAuth usage endpoint.
pub const USAGE_API_URL: &str = "https://api.anthropic.com/api/oauth/usage";

/// Environment variable that overrides every other token source.
pub const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

const BETA_HEADER: &str = "oauth-2025-04-20";
const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Utilization percentages reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    pub five_hour: f64,
    pub seven_day: f64,
}

/// Anything that can report provider utilization.
#[async_trait]
pub trait UsageProvider: Send + Sync {
    /// Current utilization, or `None` when it cannot be determined.
    async fn fetch_usage(&self) -> Option<Utilization>;
}

#[derive(Debug, Deserialize)]
struct UsageWindow {
    #[serde(default)]
    utilization: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    five_hour: Option<UsageWindow>,
    #[serde(default)]
    seven_day: Option<UsageWindow>,
}

impl From<UsageResponse> for Utilization {
    fn from(body: UsageResponse) -> Self {
        let pick = |w: Option<UsageWindow>| w.and_then(|w| w.utilization).unwrap_or(0.0);
        Utilization {
            five_hour: pick(body.five_hour),
            seven_day: pick(body.seven_day),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OauthEntry {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    claude_ai_oauth: Option<OauthEntry>,
}

fn access_token_from_json(raw: &str) -> Option<String> {
    serde_json::from_str::<Credentials>(raw)
        .ok()?
        .claude_ai_oauth?
        .access_token
        .filter(|t| !t.is_empty())
}

/// Token stored in a credentials file such as `~/.claude/.credentials.json`.
pub fn read_credentials_file(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    access_token_from_json(&raw)
}

fn default_credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join(".credentials.json"))
}

async fn read_keychain() -> Option<String> {
    if !cfg!(target_os = "macos") {
        return None;
    }
    let user = std::env::var("USER").unwrap_or_default();
    let output = tokio::process::Command::new("security")
        .args(["find-generic-password", "-s", KEYCHAIN_SERVICE, "-a", user.as_str(), "-w"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    access_token_from_json(String::from_utf8_lossy(&output.stdout).trim())
}

/// HTTP client for the usage endpoint with a short result cache.
pub struct UsageClient {
    http: reqwest::Client,
    url: String,
    cache_ttl: Duration,
    cache: Mutex<Option<(Instant, Utilization)>>,
    token: Mutex<Option<String>>,
    credentials_path: Option<PathBuf>,
}

impl UsageClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            url: USAGE_API_URL.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(None),
            token: Mutex::new(None),
            credentials_path: default_credentials_path(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Env var, then macOS keychain, then the credentials file.
    async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let found = match std::env::var(OAUTH_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Some(token),
            _ => match read_keychain().await {
                Some(token) => Some(token),
                None => self
                    .credentials_path
                    .as_deref()
                    .and_then(read_credentials_file),
            },
        };

        let token = found.ok_or(CapacityError::MissingToken)?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn clear_token(&self) {
        *self.token.lock().await = None;
    }

    async fn request(&self) -> Result<Utilization> {
        let mut retried = false;
        loop {
            let token = self.token().await?;
            let response = self
                .http
                .get(&self.url)
                .bearer_auth(&token)
                .header("anthropic-beta", BETA_HEADER)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && !retried {
                debug!("usage token rejected, reloading");
                self.clear_token().await;
                retried = true;
                continue;
            }
            if !status.is_success() {
                return Err(CapacityError::Status(status.as_u16()));
            }

            let body: UsageResponse = response.json().await?;
            return Ok(body.into());
        }
    }
}

impl Default for UsageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageProvider for UsageClient {
    async fn fetch_usage(&self) -> Option<Utilization> {
        if let Some((fetched_at, data)) = *self.cache.lock().await {
            if fetched_at.elapsed() < self.cache_ttl {
                trace!("usage served from cache");
                return Some(data);
            }
        }

        match self.request().await {
            Ok(data) => {
                *self.cache.lock().await = Some((Instant::now(), data));
                debug!(five_hour = data.five_hour, seven_day = data.seven_day, "usage fetched");
                Some(data)
            }
            Err(e) => {
                debug!(error = %e, "usage unavailable");
                None
            }
        }
    }
}
