//! Pipeline wired to the real Google client over a mock HTTP server.
//!
//! Paged tab reads issue several requests per attempt; each request is
//! bounded on its own, so a tab whose total read time exceeds the request
//! timeout still loads.

mod support;

use microsaasify_crypto::generate_random_key;
use microsaasify_ingest::{
    AccountId, AppRepository, CredentialManager, GoogleSheetsClient, IngestConfig,
    IngestionPipeline, InMemoryAppRepository, InMemoryCredentialVault, SheetsError,
    SpreadsheetRef, SubscriptionTier, UserProfile,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{init_tracing, FakeOAuth, STORED_REFRESH_TOKEN};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

const RESPONSE_DELAY: Duration = Duration::from_millis(600);

async fn pipeline_for(server: &MockServer, config: IngestConfig) -> (IngestionPipeline, AccountId) {
    init_tracing();
    let config = IngestConfig {
        sheets_api_base_url: server.uri(),
        drive_api_base_url: server.uri(),
        ..config
    };
    let credentials = Arc::new(CredentialManager::new(
        Arc::new(FakeOAuth::new()),
        Arc::new(InMemoryCredentialVault::new()),
        generate_random_key(),
        config.credential_refresh_margin_secs,
    ));
    let repo = Arc::new(InMemoryAppRepository::new());
    let sheets = Arc::new(GoogleSheetsClient::new(&config).unwrap());

    let owner = AccountId::new();
    repo.save_profile(UserProfile::new(owner, SubscriptionTier::Maker))
        .await
        .unwrap();
    credentials
        .store_refresh_token(owner, STORED_REFRESH_TOKEN)
        .await
        .unwrap();

    (IngestionPipeline::new(sheets, credentials, repo, config), owner)
}

/// Four-row tab read one row per page, every response delayed.
async fn mount_slow_tab(server: &MockServer, page_reads: impl Into<Times>) {
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "spreadsheetId": "abc",
                    "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/abc/edit",
                    "properties": { "title": "Products" },
                    "sheets": [{
                        "properties": {
                            "title": "Sheet1",
                            "index": 0,
                            "gridProperties": { "rowCount": 4, "columnCount": 2 }
                        }
                    }]
                }))
                .set_delay(RESPONSE_DELAY),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/abc/values/.+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "majorDimension": "ROWS", "values": [["Name", "Price"]] }))
                .set_delay(RESPONSE_DELAY),
        )
        .expect(page_reads)
        .mount(server)
        .await;
}

fn one_row_pages() -> IngestConfig {
    IngestConfig {
        request_timeout_secs: 1,
        page_rows: 1,
        ..IngestConfig::default()
    }
}

// ── Paged Reads ──

#[tokio::test]
async fn paged_preview_outlasts_single_request_timeout() {
    let server = MockServer::start().await;
    mount_slow_tab(&server, 4).await;
    let (pipeline, owner) = pipeline_for(&server, one_row_pages()).await;

    let preview = pipeline
        .preview_sheet(owner, &SpreadsheetRef::new("abc", ""))
        .await
        .unwrap();

    assert_eq!(preview.metadata.name, "Products");
    assert_eq!(preview.headers, vec!["Name", "Price"]);
    assert_eq!(preview.row_count, 3);
}

#[tokio::test]
async fn read_deadline_bounds_the_whole_paged_attempt() {
    let server = MockServer::start().await;
    mount_slow_tab(&server, 0..=4).await;
    let mut config = one_row_pages();
    config.read_deadline_secs = 1;
    config.retry.max_attempts = 1;
    let (pipeline, owner) = pipeline_for(&server, config).await;

    let err = pipeline
        .preview_sheet(owner, &SpreadsheetRef::new("abc", ""))
        .await
        .unwrap_err();
    assert!(matches!(err.cause(), Some(SheetsError::TransientNetwork(_))));
}
