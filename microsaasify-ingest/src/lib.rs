//! Spreadsheet ingestion and snapshot caching for MicroSaaSify.
//!
//! Turns a connected Google spreadsheet into the typed table behind a
//! published app:
//! - Encrypted refresh-token storage with per-account access-token refresh
//! - Google Sheets and Drive client with paged whole-tab reads
//! - Per-app snapshot cache with atomic replacement and tiered TTLs
//! - Single-flight ingestion pipeline that serves stale data while refreshing
//! - App directory with subscription limits and view counting

pub mod apps;
pub mod config;
pub mod credential_manager;
pub mod error;
mod http;
pub mod oauth;
pub mod pipeline;
pub mod range;
pub mod sheets_client;
pub mod single_flight;
pub mod snapshot_cache;
pub mod types;
pub mod vault;

pub use apps::{
    App, AppDirectory, AppRepository, InMemoryAppRepository, NewApp, SubscriptionTier,
    TemplateType, UserProfile,
};
pub use config::{IngestConfig, OAuthConfig, RetryPolicy, TtlPolicy};
pub use credential_manager::CredentialManager;
pub use error::{IngestError, IngestResult, SheetsError, SheetsResult};
pub use oauth::{GoogleOAuthClient, OAuthProvider};
pub use pipeline::{AppView, IngestionPipeline, RefreshFailure, SheetPreview, SnapshotState};
pub use range::extract_spreadsheet_id;
pub use sheets_client::{GoogleSheetsClient, SheetsApi};
pub use snapshot_cache::{Snapshot, SnapshotCache};
pub use types::*;
pub use vault::{CredentialVault, FileCredentialVault, InMemoryCredentialVault};
