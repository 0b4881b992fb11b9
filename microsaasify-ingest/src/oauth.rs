//! OAuth capability for connecting Google accounts.
//!
//! The handshake itself (redirects, callback routing) lives with the web
//! layer. This module covers the three calls the ingestion core needs:
//! building the consent URL, exchanging the callback code, and trading a
//! refresh token for a fresh access token.

use crate::config::OAuthConfig;
use crate::error::{IngestResult, SheetsError, SheetsResult};
use crate::http::{build_client, check_status, check_token_status};
use crate::types::{AccessToken, GoogleUserInfo, OAuthTokens};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Read-only spreadsheet and Drive access plus basic profile.
pub const GOOGLE_SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Offline access so a refresh token is issued, and a consent prompt so it is
/// issued again on reconnect.
const CONSENT_PARAMS: &str = "&access_type=offline&prompt=consent";

/// Fallback lifetime when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent URL the user is redirected to.
    fn authorization_url(&self, state: Option<&str>) -> String;

    async fn exchange_code(&self, code: &str) -> SheetsResult<OAuthTokens>;

    /// Fails with `AuthExpired` when the refresh token was revoked or expired.
    async fn refresh_access_token(&self, refresh_token: &str) -> SheetsResult<AccessToken>;

    async fn user_info(&self, access_token: &AccessToken) -> SheetsResult<GoogleUserInfo>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn access(&self) -> AccessToken {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        AccessToken::new(
            self.access_token.clone(),
            Utc::now() + chrono::Duration::seconds(lifetime),
        )
    }
}

/// Google implementation of [`OAuthProvider`].
pub struct GoogleOAuthClient {
    client: Client,
    config: OAuthConfig,
}

impl GoogleOAuthClient {
    pub fn new(config: OAuthConfig, timeout: Duration) -> IngestResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            config,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthClient {
    fn authorization_url(&self, state: Option<&str>) -> String {
        let scope = GOOGLE_SCOPES.join(" ");
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}{CONSENT_PARAMS}",
            self.config.auth_endpoint,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope),
        );
        if let Some(state) = state {
            url.push_str("&state=");
            url.push_str(&urlencoding::encode(state));
        }
        url
    }

    async fn exchange_code(&self, code: &str) -> SheetsResult<OAuthTokens> {
        let resp = self
            .client
            .post(&self.config.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let body: TokenResponse = check_token_status(resp, "code exchange").await?.json().await?;
        debug!(
            "exchanged authorization code (refresh token issued: {})",
            body.refresh_token.is_some()
        );

        Ok(OAuthTokens {
            access: body.access(),
            refresh_token: body.refresh_token,
            scope: body.scope,
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> SheetsResult<AccessToken> {
        let resp = self
            .client
            .post(&self.config.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        let body: TokenResponse = check_token_status(resp, "token refresh").await?.json().await?;
        if body.access_token.is_empty() {
            return Err(SheetsError::MalformedData(
                "token refresh returned an empty access token".to_string(),
            ));
        }
        Ok(body.access())
    }

    async fn user_info(&self, access_token: &AccessToken) -> SheetsResult<GoogleUserInfo> {
        let resp = self
            .client
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(&access_token.token)
            .send()
            .await?;

        Ok(check_status(resp, "user info").await?.json().await?)
    }
}
