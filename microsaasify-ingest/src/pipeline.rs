//! Ingestion orchestrator.
//!
//! Coordinates spreadsheet client → schema inference → snapshot cache for
//! every app:
//! - Fresh snapshots are served straight from the cache
//! - Stale snapshots are served immediately while one background refresh runs
//! - Missing snapshots block on a single-flight fetch
//! - Failed refreshes leave the previous snapshot in place and are recorded
//!
//! Single provider calls are bounded by the request timeout; multi-request
//! reads are bounded per request by the HTTP client and per attempt by the
//! read deadline. Rate limits and network errors back off exponentially,
//! token acquisition included; a rejected access token is refreshed once and
//! the call retried once.
//!
//! Refreshes are keyed by app and sheet, so a sheet replaced mid-refresh
//! never hands the old sheet's data to callers of the new one.

use crate::apps::{App, AppDirectory, AppRepository, SubscriptionTier, UserProfile};
use crate::config::{IngestConfig, OAuthConfig};
use crate::credential_manager::CredentialManager;
use crate::error::{IngestError, IngestResult, SheetsError, SheetsResult};
use crate::oauth::{GoogleOAuthClient, OAuthProvider};
use crate::sheets_client::{GoogleSheetsClient, SheetsApi};
use crate::single_flight::{Flight, SingleFlight};
use crate::snapshot_cache::{Snapshot, SnapshotCache};
use crate::types::{
    AccessToken, AccountId, AppId, SheetMetadata, SpreadsheetFile, SpreadsheetRef,
};
use crate::vault::CredentialVault;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use microsaasify_crypto::TokenKey;
use microsaasify_tables::{infer, ColumnSchema, RawTable};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rows returned by [`IngestionPipeline::preview_sheet`].
const PREVIEW_ROWS: usize = 10;

/// Freshness of an app's cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    NoSnapshot,
    Fresh,
    Stale,
    Refreshing,
    /// The last refresh failed; any previous snapshot is still served.
    RefreshFailed,
}

/// The most recent failed refresh of an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub error: SheetsError,
    pub at: DateTime<Utc>,
}

/// A published app together with the data to render it.
#[derive(Debug, Clone)]
pub struct AppView {
    pub app: App,
    pub snapshot: Arc<Snapshot>,
}

/// What the app builder shows before an app is created.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPreview {
    pub metadata: SheetMetadata,
    pub headers: Vec<String>,
    pub schema: Vec<ColumnSchema>,
    pub sample_rows: Vec<Vec<String>>,
    pub row_count: usize,
}

/// One refresh per app and sheet.
type RefreshKey = (AppId, SpreadsheetRef);

struct PipelineInner {
    sheets: Arc<dyn SheetsApi>,
    credentials: Arc<CredentialManager>,
    apps: Arc<dyn AppRepository>,
    cache: Arc<SnapshotCache>,
    flights: SingleFlight<RefreshKey, Arc<Snapshot>, SheetsError>,
    last_errors: DashMap<AppId, RefreshFailure>,
    config: IngestConfig,
}

/// Handle to the ingestion pipeline. Cheap to clone.
#[derive(Clone)]
pub struct IngestionPipeline {
    inner: Arc<PipelineInner>,
}

impl IngestionPipeline {
    pub fn new(
        sheets: Arc<dyn SheetsApi>,
        credentials: Arc<CredentialManager>,
        apps: Arc<dyn AppRepository>,
        config: IngestConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                sheets,
                credentials,
                apps,
                cache: Arc::new(SnapshotCache::new()),
                flights: SingleFlight::new(),
                last_errors: DashMap::new(),
                config,
            }),
        }
    }

    /// Wires the Google OAuth and Sheets clients.
    pub fn google(
        oauth: OAuthConfig,
        key: TokenKey,
        vault: Arc<dyn CredentialVault>,
        apps: Arc<dyn AppRepository>,
        config: IngestConfig,
    ) -> IngestResult<Self> {
        let oauth: Arc<dyn OAuthProvider> =
            Arc::new(GoogleOAuthClient::new(oauth, config.request_timeout())?);
        let credentials = Arc::new(CredentialManager::new(
            oauth,
            vault,
            key,
            config.credential_refresh_margin_secs,
        ));
        let sheets: Arc<dyn SheetsApi> = Arc::new(GoogleSheetsClient::new(&config)?);
        Ok(Self::new(sheets, credentials, apps, config))
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.inner.cache
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.inner.credentials
    }

    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    /// App lifecycle operations sharing this pipeline's cache.
    pub fn directory(&self) -> AppDirectory {
        AppDirectory::new(self.inner.apps.clone(), self.inner.cache.clone())
    }

    // ── Snapshots ──

    /// Returns the app's snapshot, fetching it if none is cached.
    ///
    /// A stale snapshot is returned as-is while a background refresh runs.
    pub async fn get_snapshot_for_app(&self, app_id: AppId) -> IngestResult<Arc<Snapshot>> {
        let app = self.load_app(app_id).await?;
        self.snapshot_for(&app).await
    }

    /// Refreshes the app now, joining a refresh that is already running.
    pub async fn force_refresh(&self, app_id: AppId) -> IngestResult<Arc<Snapshot>> {
        let app = self.load_app(app_id).await?;
        let (flight, started) = self.start_refresh(&app);
        if !started {
            debug!("force refresh for app {app_id} joined running refresh");
        }
        flight.await.map_err(|cause| IngestError::Refresh { app_id, cause })
    }

    pub fn snapshot_state(&self, app_id: AppId) -> SnapshotState {
        if self.inner.flights.any_in_flight(|(id, _)| *id == app_id) {
            return SnapshotState::Refreshing;
        }
        let failed = self.inner.last_errors.contains_key(&app_id);
        match self.inner.cache.get(app_id) {
            // A failed first fetch leaves nothing to serve
            None => SnapshotState::NoSnapshot,
            Some(_) if failed => SnapshotState::RefreshFailed,
            Some(s) if s.is_stale(Utc::now()) => SnapshotState::Stale,
            Some(_) => SnapshotState::Fresh,
        }
    }

    /// The error of the last refresh, cleared by the next success.
    pub fn last_refresh_error(&self, app_id: AppId) -> Option<RefreshFailure> {
        self.inner.last_errors.get(&app_id).map(|e| e.clone())
    }

    async fn snapshot_for(&self, app: &App) -> IngestResult<Arc<Snapshot>> {
        let cached = self.inner.cache.get(app.id).filter(|s| s.source == app.sheet);
        if let Some(snapshot) = cached {
            if !snapshot.is_stale(Utc::now()) {
                return Ok(snapshot);
            }
            let (_, started) = self.start_refresh(app);
            if started {
                debug!("serving stale snapshot for app {}, refreshing in background", app.id);
            }
            return Ok(snapshot);
        }

        let (flight, _) = self.start_refresh(app);
        flight.await.map_err(|cause| IngestError::NoData { app_id: app.id, cause })
    }

    fn start_refresh(&self, app: &App) -> (Flight<Arc<Snapshot>, SheetsError>, bool) {
        let inner = self.inner.clone();
        let app = app.clone();
        let key = (app.id, app.sheet.clone());
        self.inner
            .flights
            .run(key, move || async move { inner.ingest(&app).await })
    }

    async fn load_app(&self, app_id: AppId) -> IngestResult<App> {
        self.inner
            .apps
            .app(app_id)
            .await?
            .ok_or_else(|| IngestError::UnknownApp(app_id.to_string()))
    }

    // ── Published pages ──

    /// Resolves a published app by slug and counts the view.
    ///
    /// The counter update is fire-and-forget: failures are logged and never
    /// fail the render.
    pub async fn view_app(&self, slug: &str) -> IngestResult<AppView> {
        let app = self
            .inner
            .apps
            .app_by_slug(slug)
            .await?
            .ok_or_else(|| IngestError::UnknownApp(slug.to_string()))?;
        if !app.is_published {
            return Err(IngestError::Unpublished(slug.to_string()));
        }

        let snapshot = self.snapshot_for(&app).await?;

        let repo = self.inner.apps.clone();
        let app_id = app.id;
        tokio::spawn(async move {
            if let Err(e) = repo.record_view(app_id).await {
                warn!("failed to record view for app {app_id}: {e}");
            }
        });

        Ok(AppView { app, snapshot })
    }

    // ── Builder support ──

    /// Infers column types for headers and sample rows without touching the cache.
    pub fn infer_schema_preview(
        &self,
        headers: &[String],
        sample_rows: &[Vec<String>],
    ) -> Vec<ColumnSchema> {
        infer(headers, sample_rows)
    }

    /// Reads a sheet for the app builder: metadata, inferred schema and a few rows.
    pub async fn preview_sheet(
        &self,
        account: AccountId,
        sheet: &SpreadsheetRef,
    ) -> IngestResult<SheetPreview> {
        let timeout = self.inner.config.request_timeout();
        let metadata = self
            .inner
            .with_retry(account, timeout, |token| {
                let sheets = self.inner.sheets.clone();
                let sheet = sheet.clone();
                async move { sheets.fetch_metadata(&sheet, &token).await }
            })
            .await?;
        let table = self.inner.fetch_table(account, sheet).await?;

        let schema = infer(&table.headers, &table.rows);
        let row_count = table.row_count();
        let RawTable { headers, mut rows } = table;
        rows.truncate(PREVIEW_ROWS);

        Ok(SheetPreview {
            metadata,
            headers,
            schema,
            sample_rows: rows,
            row_count,
        })
    }

    pub async fn list_spreadsheets(
        &self,
        account: AccountId,
    ) -> IngestResult<Vec<SpreadsheetFile>> {
        let deadline = self.inner.config.read_deadline();
        let files = self
            .inner
            .with_retry(account, deadline, |token| {
                let sheets = self.inner.sheets.clone();
                async move { sheets.list_spreadsheets(&token).await }
            })
            .await?;
        Ok(files)
    }

    // ── Accounts ──

    pub fn authorization_url(&self, state: Option<&str>) -> String {
        self.inner.credentials.oauth().authorization_url(state)
    }

    /// Completes the OAuth callback and records the connection on the profile.
    pub async fn connect_account(
        &self,
        account: AccountId,
        code: &str,
    ) -> IngestResult<UserProfile> {
        let mut profile = self
            .inner
            .apps
            .profile(account)
            .await?
            .ok_or_else(|| IngestError::UnknownAccount(account.to_string()))?;

        let user = self.inner.credentials.connect(account, code).await?;

        profile.google_connected = true;
        profile.google_email = Some(user.email);
        profile.google_connection_broken = false;
        self.inner.apps.save_profile(profile.clone()).await?;
        Ok(profile)
    }

    pub async fn disconnect_account(&self, account: AccountId) -> IngestResult<()> {
        self.inner.credentials.disconnect(account).await?;
        if let Some(mut profile) = self.inner.apps.profile(account).await? {
            profile.google_connected = false;
            profile.google_email = None;
            self.inner.apps.save_profile(profile).await?;
        }
        Ok(())
    }
}

impl PipelineInner {
    /// Fetches, infers and caches one app's snapshot.
    async fn ingest(&self, app: &App) -> SheetsResult<Arc<Snapshot>> {
        let tier = match self.apps.profile(app.owner).await {
            Ok(Some(p)) => p.subscription_tier,
            Ok(None) => SubscriptionTier::default(),
            Err(e) => {
                warn!("could not load profile for {}: {e}", app.owner);
                SubscriptionTier::default()
            }
        };

        let table = match self.fetch_table(app.owner, &app.sheet).await {
            Ok(table) => table,
            Err(e) => {
                warn!("refresh failed for app {}: {e}", app.id);
                if !self.still_reads(app).await {
                    return Err(e);
                }
                if matches!(e, SheetsError::PermissionRevoked(_)) {
                    if let Err(err) = self.apps.mark_connection_broken(app.owner, true).await {
                        warn!("failed to flag broken connection for {}: {err}", app.owner);
                    }
                }
                self.last_errors.insert(
                    app.id,
                    RefreshFailure {
                        error: e.clone(),
                        at: Utc::now(),
                    },
                );
                return Err(e);
            }
        };

        let fetched_at = Utc::now();
        let snapshot = Arc::new(Snapshot::build(
            app.sheet.clone(),
            table,
            self.config.ttl.ttl_for(tier),
            fetched_at,
        ));

        if !self.still_reads(app).await {
            debug!(
                "app {} no longer reads {}, discarding fetched snapshot",
                app.id, app.sheet.spreadsheet_id
            );
            return Ok(snapshot);
        }
        self.cache.put(app.id, snapshot.clone());
        self.last_errors.remove(&app.id);

        if let Err(e) = self.apps.set_last_synced(app.id, fetched_at).await {
            warn!("failed to record sync time for app {}: {e}", app.id);
        }

        info!(
            "ingested {} rows x {} columns for app {}",
            snapshot.row_count(),
            snapshot.schema.len(),
            app.id
        );
        Ok(snapshot)
    }

    /// Whether the app still exists and still points at the sheet `app` was
    /// fetched with. Repository errors count as current.
    async fn still_reads(&self, app: &App) -> bool {
        match self.apps.app(app.id).await {
            Ok(Some(current)) => current.sheet == app.sheet,
            Ok(None) => false,
            Err(e) => {
                warn!("could not reload app {}: {e}", app.id);
                true
            }
        }
    }

    async fn fetch_table(
        &self,
        account: AccountId,
        sheet: &SpreadsheetRef,
    ) -> SheetsResult<RawTable> {
        self.with_retry(account, self.config.read_deadline(), |token| {
            let sheets = self.sheets.clone();
            let sheet = sheet.clone();
            async move { sheets.fetch_range(&sheet, &token).await }
        })
        .await
    }

    /// Runs `op` with a valid access token under the retry policy.
    ///
    /// Token acquisition shares the attempt budget with `op`. Each attempt
    /// of `op` is bounded by `limit`.
    async fn with_retry<T, F, Fut>(
        &self,
        account: AccountId,
        limit: Duration,
        op: F,
    ) -> SheetsResult<T>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = SheetsResult<T>>,
    {
        let timeout = self.config.request_timeout();
        let mut token: Option<AccessToken> = None;
        let mut rejected: Option<AccessToken> = None;
        let mut attempt = 0u32;
        let mut auth_retried = false;

        loop {
            let outcome = match token.clone() {
                None => {
                    let acquired = match &rejected {
                        Some(old) => {
                            let refresh = self.credentials.refresh_rejected(account, old);
                            bounded(timeout, refresh).await
                        }
                        None => bounded(timeout, self.credentials.access_token(account)).await,
                    };
                    match acquired {
                        Ok(fresh) => {
                            rejected = None;
                            token = Some(fresh);
                            continue;
                        }
                        Err(e) => Err(e),
                    }
                }
                Some(current) => match bounded(limit, op(current)).await {
                    Err(SheetsError::AuthExpired) if !auth_retried => {
                        auth_retried = true;
                        debug!("access token rejected for {account}, refreshing once");
                        rejected = token.take();
                        continue;
                    }
                    other => other,
                },
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.retry.max_attempts => {
                    let backoff = self.config.retry.delay_for(attempt, e.retry_after())
                        + jitter(self.config.retry.base_delay_ms);
                    warn!("{e}; retrying in {backoff:?} (attempt {})", attempt + 2);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Bounds `call` by `limit`; running out is a transient network error.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = SheetsResult<T>>,
) -> SheetsResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SheetsError::TransientNetwork(format!(
            "request timed out after {}s",
            limit.as_secs()
        ))),
    }
}

fn jitter(base_delay_ms: u64) -> Duration {
    if base_delay_ms < 4 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=base_delay_ms / 4))
}
