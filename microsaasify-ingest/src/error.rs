//! Ingestion error types.

use crate::apps::SubscriptionTier;
use crate::types::AppId;
use std::time::Duration;
use thiserror::Error;

/// Result type for spreadsheet provider and credential operations.
pub type SheetsResult<T> = Result<T, SheetsError>;

/// Result type for pipeline and app operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors from the spreadsheet provider or the credential layer.
///
/// `Clone` so a single refresh outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetsError {
    #[error("access token expired or rejected")]
    AuthExpired,

    #[error("spreadsheet inaccessible (deleted or permission revoked): {0}")]
    PermissionRevoked(String),

    #[error("rate limited by provider{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("credential error: {0}")]
    Credential(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl SheetsError {
    /// Rate limits and network blips are retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientNetwork(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SheetsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::TransientNetwork("request timed out".to_string())
        } else if e.is_decode() {
            Self::MalformedData(format!("unexpected response body: {e}"))
        } else {
            Self::TransientNetwork(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for SheetsError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TransientNetwork(format!("ingestion task aborted: {e}"))
    }
}

impl From<microsaasify_crypto::CryptoError> for SheetsError {
    fn from(e: microsaasify_crypto::CryptoError) -> Self {
        Self::Credential(e.to_string())
    }
}

impl From<microsaasify_tables::TableError> for SheetsError {
    fn from(e: microsaasify_tables::TableError) -> Self {
        Self::MalformedData(e.to_string())
    }
}

/// Errors surfaced to page renderers and API routes.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("no data available for app {app_id}: {cause}")]
    NoData { app_id: AppId, cause: SheetsError },

    #[error("refresh failed for app {app_id}: {cause}")]
    Refresh { app_id: AppId, cause: SheetsError },

    #[error("app not found: {0}")]
    UnknownApp(String),

    #[error("app is not published: {0}")]
    Unpublished(String),

    #[error("account not found: {0}")]
    UnknownAccount(String),

    #[error("app limit reached: {tier} plan allows {limit} apps")]
    AppLimitReached { tier: SubscriptionTier, limit: u32 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Sheets(#[from] SheetsError),
}

impl IngestError {
    /// The provider-side cause, if this error came from an upstream call.
    pub fn cause(&self) -> Option<&SheetsError> {
        match self {
            Self::NoData { cause, .. } | Self::Refresh { cause, .. } => Some(cause),
            Self::Sheets(e) => Some(e),
            _ => None,
        }
    }
}
