//! Ingestion configuration.

use crate::apps::SubscriptionTier;
use crate::error::{IngestError, IngestResult};
use microsaasify_crypto::TokenKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OAuth client settings for the Google provider.
///
/// Passed explicitly to [`crate::oauth::GoogleOAuthClient`]; nothing reads
/// process-wide state after construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,

    /// Consent screen endpoint.
    pub auth_endpoint: String,

    /// Code exchange and refresh endpoint.
    pub token_endpoint: String,

    /// Profile endpoint used after connecting an account.
    pub userinfo_endpoint: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_endpoint: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        }
    }

    /// Reads `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and `GOOGLE_REDIRECT_URI`.
    pub fn from_env() -> IngestResult<Self> {
        Ok(Self::new(
            require_env("GOOGLE_CLIENT_ID")?,
            require_env("GOOGLE_CLIENT_SECRET")?,
            require_env("GOOGLE_REDIRECT_URI")?,
        ))
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// Reads the refresh-token encryption key from `ENCRYPTION_KEY`.
///
/// Accepts 64 hex characters or a raw 32-byte string. The value is never logged.
pub fn encryption_key_from_env() -> IngestResult<TokenKey> {
    let raw = require_env("ENCRYPTION_KEY")?;
    TokenKey::from_config_str(&raw).map_err(|e| IngestError::Config(format!("ENCRYPTION_KEY: {e}")))
}

fn require_env(name: &str) -> IngestResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IngestError::Config(format!("missing environment variable {name}"))),
    }
}

/// Snapshot lifetime per subscription tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    /// Free plan: standard sync.
    pub free_ttl_secs: u64,

    /// Maker and Pro plans: more frequent polling ("real-time sync").
    pub paid_ttl_secs: u64,
}

impl TtlPolicy {
    pub fn ttl_for(&self, tier: SubscriptionTier) -> Duration {
        match tier {
            SubscriptionTier::Free => Duration::from_secs(self.free_ttl_secs),
            SubscriptionTier::Maker | SubscriptionTier::Pro => {
                Duration::from_secs(self.paid_ttl_secs)
            }
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            free_ttl_secs: 15 * 60,
            paid_ttl_secs: 5 * 60,
        }
    }
}

/// Bounded exponential backoff for rate limits and transient failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), honoring a provider hint.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let backoff = Duration::from_millis(exp.min(self.max_delay_ms));
        let cap = Duration::from_millis(self.max_delay_ms);
        match hint {
            Some(h) => h.max(backoff).min(cap),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Configuration for the Google client and the ingestion pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL for the Sheets v4 API.
    pub sheets_api_base_url: String,

    /// Base URL for the Drive v3 API.
    pub drive_api_base_url: String,

    /// Upper bound for any single outbound call (seconds).
    pub request_timeout_secs: u64,

    /// Upper bound for one attempt at a multi-request read such as a paged
    /// tab or a Drive listing (seconds). Each request inside it is still
    /// bounded by `request_timeout_secs`.
    pub read_deadline_secs: u64,

    /// Refresh access tokens this many seconds before they expire.
    pub credential_refresh_margin_secs: i64,

    /// Rows per request when reading a whole tab.
    pub page_rows: u32,

    /// Maximum Drive listing pages followed.
    pub max_list_pages: u32,

    pub ttl: TtlPolicy,

    pub retry: RetryPolicy,
}

impl IngestConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs.max(self.request_timeout_secs))
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sheets_api_base_url: "https://sheets.googleapis.com".to_string(),
            drive_api_base_url: "https://www.googleapis.com".to_string(),
            request_timeout_secs: 20,
            read_deadline_secs: 300,
            credential_refresh_margin_secs: 60,
            page_rows: 1_000,
            max_list_pages: 10,
            ttl: TtlPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}
