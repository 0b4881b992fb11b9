//! Shared types for spreadsheet ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strongly-typed app identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(pub Uuid);

impl AppId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AppId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user account that may hold a Google connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which spreadsheet, and which part of it, an app reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpreadsheetRef {
    pub spreadsheet_id: String,
    /// Tab name (`Inventory`), A1 range (`Inventory!A1:F200`), or empty for the first tab.
    #[serde(default)]
    pub range: String,
}

impl SpreadsheetRef {
    pub fn new(spreadsheet_id: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
        }
    }
}

/// Short-lived OAuth access token. Kept in memory only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Returns true if the token will expire within the given seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(secs) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens returned by an authorization-code exchange.
#[derive(Clone, Debug)]
pub struct OAuthTokens {
    pub access: AccessToken,
    /// Only present when the user granted offline access on this consent.
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Basic Google profile of the connected account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleUserInfo {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Spreadsheet-level metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMetadata {
    pub id: String,
    pub name: String,
    pub url: String,
    pub sheets: Vec<SheetTab>,
}

impl SheetMetadata {
    /// Finds a tab by title, or the first tab when `title` is `None`.
    pub fn tab(&self, title: Option<&str>) -> Option<&SheetTab> {
        match title {
            Some(t) => self.sheets.iter().find(|s| s.title == t),
            None => self.sheets.iter().min_by_key(|s| s.index),
        }
    }
}

/// One tab of a spreadsheet with its grid size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetTab {
    pub title: String,
    pub index: u32,
    pub row_count: u32,
    pub column_count: u32,
}

/// A spreadsheet the connected account can read, as listed by Drive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetFile {
    pub id: String,
    pub name: String,
    pub url: String,
}
