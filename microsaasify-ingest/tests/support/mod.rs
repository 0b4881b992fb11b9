//! Shared fakes and fixtures for ingestion tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use microsaasify_crypto::generate_random_key;
use microsaasify_ingest::{
    AccessToken, AccountId, App, AppRepository, CredentialManager, GoogleUserInfo, IngestConfig,
    IngestionPipeline, InMemoryAppRepository, InMemoryCredentialVault, NewApp, OAuthProvider,
    OAuthTokens, RetryPolicy, SheetMetadata, SheetTab, SheetsApi, SheetsError, SheetsResult,
    SpreadsheetFile, SpreadsheetRef, SubscriptionTier, TemplateType, UserProfile,
};
use microsaasify_tables::RawTable;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub const STORED_REFRESH_TOKEN: &str = "refresh-token-1";

/// Builds a table from string literals; the first row is the header.
pub fn table(values: &[&[&str]]) -> RawTable {
    RawTable::from_values(
        values
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect(),
    )
}

pub fn products_table() -> RawTable {
    table(&[
        &["Name", "Price", "InStock"],
        &["Widget", "9.99", "yes"],
        &["Gadget", "1,250", "no"],
    ])
}

/// Short delays and timeouts so paused-clock tests stay readable.
pub fn fast_config() -> IngestConfig {
    IngestConfig {
        request_timeout_secs: 5,
        read_deadline_secs: 30,
        retry: RetryPolicy {
            base_delay_ms: 10,
            max_delay_ms: 100,
            ..RetryPolicy::default()
        },
        ..IngestConfig::default()
    }
}

// ── Fake Sheets ──

/// Scripted spreadsheet provider. Returns queued results in order, then the
/// fallback table. A gated fake waits for one semaphore permit per read.
pub struct FakeSheets {
    pub range_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub tokens_seen: Mutex<Vec<String>>,
    script: Mutex<VecDeque<SheetsResult<RawTable>>>,
    fallback: Mutex<Option<RawTable>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeSheets {
    pub fn new() -> Self {
        Self {
            range_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            gate: None,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn push(&self, result: SheetsResult<RawTable>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn push_err(&self, err: SheetsError, times: usize) {
        for _ in 0..times {
            self.push(Err(err.clone()));
        }
    }

    pub fn set_fallback(&self, table: RawTable) {
        *self.fallback.lock().unwrap() = Some(table);
    }

    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetsApi for FakeSheets {
    async fn fetch_metadata(
        &self,
        sheet: &SpreadsheetRef,
        _token: &AccessToken,
    ) -> SheetsResult<SheetMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SheetMetadata {
            id: sheet.spreadsheet_id.clone(),
            name: "Products".into(),
            url: format!("https://docs.google.com/spreadsheets/d/{}/edit", sheet.spreadsheet_id),
            sheets: vec![SheetTab {
                title: "Sheet1".into(),
                index: 0,
                row_count: 1000,
                column_count: 26,
            }],
        })
    }

    async fn fetch_range(
        &self,
        _sheet: &SpreadsheetRef,
        token: &AccessToken,
    ) -> SheetsResult<RawTable> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.token.clone());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| SheetsError::TransientNetwork("gate closed".into()))?
                .forget();
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| SheetsError::MalformedData("no scripted response".into())),
        }
    }

    async fn list_spreadsheets(&self, _token: &AccessToken) -> SheetsResult<Vec<SpreadsheetFile>> {
        Ok(vec![SpreadsheetFile {
            id: "sheet-1".into(),
            name: "Products".into(),
            url: "https://docs.google.com/spreadsheets/d/sheet-1/edit".into(),
        }])
    }
}

// ── Fake OAuth ──

/// Token endpoint fake. Each refresh issues `access-<n>`; queued failures
/// are returned first.
pub struct FakeOAuth {
    pub refresh_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub issue_refresh_token: AtomicBool,
    refresh_failures: Mutex<VecDeque<SheetsError>>,
}

impl FakeOAuth {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            issue_refresh_token: AtomicBool::new(true),
            refresh_failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_refreshes(&self, err: SheetsError, times: usize) {
        let mut failures = self.refresh_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(err.clone());
        }
    }
}

#[async_trait]
impl OAuthProvider for FakeOAuth {
    fn authorization_url(&self, state: Option<&str>) -> String {
        format!("https://accounts.example.test/auth?state={}", state.unwrap_or(""))
    }

    async fn exchange_code(&self, code: &str) -> SheetsResult<OAuthTokens> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if code == "bad-code" {
            return Err(SheetsError::Credential("invalid_grant".into()));
        }
        Ok(OAuthTokens {
            access: AccessToken::new("access-from-code", Utc::now() + ChronoDuration::hours(1)),
            refresh_token: self
                .issue_refresh_token
                .load(Ordering::SeqCst)
                .then(|| format!("refresh-for-{code}")),
            scope: None,
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> SheetsResult<AccessToken> {
        if let Some(err) = self.refresh_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(SheetsError::AuthExpired);
        }
        assert!(refresh_token.starts_with("refresh-"), "decrypted refresh token expected");
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessToken::new(format!("access-{n}"), Utc::now() + ChronoDuration::hours(1)))
    }

    async fn user_info(&self, _access_token: &AccessToken) -> SheetsResult<GoogleUserInfo> {
        Ok(GoogleUserInfo {
            id: "g-1".into(),
            email: "owner@example.com".into(),
            verified_email: true,
            name: Some("Owner".into()),
            picture: None,
        })
    }
}

// ── Harness ──

/// Routes pipeline logs to the test writer; set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub pipeline: IngestionPipeline,
    pub sheets: Arc<FakeSheets>,
    pub oauth: Arc<FakeOAuth>,
    pub repo: Arc<InMemoryAppRepository>,
    pub vault: Arc<InMemoryCredentialVault>,
    pub owner: AccountId,
}

/// Pro-tier owner with a stored refresh token.
pub async fn harness(sheets: FakeSheets, config: IngestConfig) -> Harness {
    init_tracing();
    let sheets = Arc::new(sheets);
    let oauth = Arc::new(FakeOAuth::new());
    let repo = Arc::new(InMemoryAppRepository::new());
    let vault = Arc::new(InMemoryCredentialVault::new());

    let credentials = Arc::new(CredentialManager::new(
        oauth.clone(),
        vault.clone(),
        generate_random_key(),
        config.credential_refresh_margin_secs,
    ));
    let pipeline =
        IngestionPipeline::new(sheets.clone(), credentials.clone(), repo.clone(), config);

    let owner = AccountId::new();
    repo.save_profile(UserProfile::new(owner, SubscriptionTier::Pro))
        .await
        .unwrap();
    credentials
        .store_refresh_token(owner, STORED_REFRESH_TOKEN)
        .await
        .unwrap();

    Harness {
        pipeline,
        sheets,
        oauth,
        repo,
        vault,
        owner,
    }
}

pub fn new_app(name: &str) -> NewApp {
    NewApp {
        name: name.into(),
        description: None,
        template_type: TemplateType::Catalog,
        sheet: SpreadsheetRef::new("sheet-1", "Sheet1"),
        sheet_name: Some("Products".into()),
    }
}

/// Creates and publishes an app owned by the harness owner.
pub async fn published_app(h: &Harness, name: &str) -> App {
    let directory = h.pipeline.directory();
    let app = directory.create_app(h.owner, new_app(name)).await.unwrap();
    directory.set_published(app.id, true).await.unwrap()
}
