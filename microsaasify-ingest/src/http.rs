//! Shared reqwest plumbing: client construction and status mapping.

use crate::error::{IngestError, IngestResult, SheetsError, SheetsResult};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "RATE_LIMIT_EXCEEDED",
    "RESOURCE_EXHAUSTED",
    "quotaExceeded",
];

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorValue,
}

/// Google APIs return `{"error": {...}}`; the OAuth endpoint returns `{"error": "invalid_grant"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum GoogleErrorValue {
    Detailed {
        #[serde(default)]
        message: String,
        #[serde(default)]
        status: String,
    },
    Code(String),
}

pub(crate) fn build_client(timeout: Duration) -> IngestResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))
}

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn summarize(body: &str) -> String {
    match serde_json::from_str::<GoogleErrorBody>(body) {
        Ok(GoogleErrorBody {
            error: GoogleErrorValue::Detailed { message, status },
        }) if !message.is_empty() => {
            if status.is_empty() {
                message
            } else {
                format!("{status}: {message}")
            }
        }
        Ok(GoogleErrorBody {
            error: GoogleErrorValue::Code(code),
        }) => code,
        _ => body.chars().take(200).collect(),
    }
}

/// Maps a provider response onto the error taxonomy, passing successes through.
pub(crate) async fn check_status(resp: Response, what: &str) -> SheetsResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let hint = retry_after(&resp);
    let body = resp.text().await.unwrap_or_default();
    debug!("{what} failed with {status}");

    Err(match status {
        StatusCode::UNAUTHORIZED => SheetsError::AuthExpired,
        StatusCode::TOO_MANY_REQUESTS => SheetsError::RateLimited { retry_after: hint },
        StatusCode::FORBIDDEN if RATE_LIMIT_REASONS.iter().any(|r| body.contains(r)) => {
            SheetsError::RateLimited { retry_after: hint }
        }
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            SheetsError::PermissionRevoked(format!("{what}: {}", summarize(&body)))
        }
        StatusCode::BAD_REQUEST => {
            SheetsError::MalformedData(format!("{what}: {}", summarize(&body)))
        }
        StatusCode::REQUEST_TIMEOUT => {
            SheetsError::TransientNetwork(format!("{what}: request timeout"))
        }
        s if s.is_server_error() => SheetsError::TransientNetwork(format!("{what}: {s}")),
        s => SheetsError::MalformedData(format!("{what}: unexpected status {s}")),
    })
}

/// Same as [`check_status`] for the OAuth token endpoint, where a rejected
/// grant means the stored refresh token is no longer usable.
pub(crate) async fn check_token_status(resp: Response, what: &str) -> SheetsResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        let body = resp.text().await.unwrap_or_default();
        let reason = summarize(&body);
        debug!("{what} rejected: {reason}");
        return Err(if reason.contains("invalid_grant") || status == StatusCode::UNAUTHORIZED {
            SheetsError::AuthExpired
        } else {
            SheetsError::Credential(format!("{what}: {reason}"))
        });
    }
    check_status(resp, what).await
}
