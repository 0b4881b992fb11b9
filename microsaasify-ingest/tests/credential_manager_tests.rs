//! Access-token lifecycle: caching, encrypted storage and coalesced refresh.

mod support;

use microsaasify_crypto::{decrypt_token, generate_random_key, TokenKey};
use microsaasify_ingest::{
    AccountId, CredentialManager, CredentialVault, InMemoryCredentialVault, SheetsError,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::{FakeOAuth, STORED_REFRESH_TOKEN};

struct Setup {
    manager: Arc<CredentialManager>,
    oauth: Arc<FakeOAuth>,
    vault: Arc<InMemoryCredentialVault>,
    key: TokenKey,
    account: AccountId,
}

async fn setup(margin_secs: i64) -> Setup {
    let oauth = Arc::new(FakeOAuth::new());
    let vault = Arc::new(InMemoryCredentialVault::new());
    let key = generate_random_key();
    let manager = Arc::new(CredentialManager::new(
        oauth.clone(),
        vault.clone(),
        key.clone(),
        margin_secs,
    ));
    let account = AccountId::new();
    manager
        .store_refresh_token(account, STORED_REFRESH_TOKEN)
        .await
        .unwrap();
    Setup {
        manager,
        oauth,
        vault,
        key,
        account,
    }
}

// ── Storage ──

#[tokio::test]
async fn refresh_token_is_stored_encrypted() {
    let s = setup(60).await;
    let stored = s.vault.load(s.account).await.unwrap().unwrap();

    assert!(!stored.contains(STORED_REFRESH_TOKEN));
    let (nonce, _) = stored.split_once(':').unwrap();
    assert_eq!(nonce.len(), 24);
    assert_eq!(decrypt_token(&s.key, &stored).unwrap(), STORED_REFRESH_TOKEN);
}

#[tokio::test]
async fn wrong_key_is_a_credential_error() {
    let s = setup(60).await;
    let other = CredentialManager::new(s.oauth.clone(), s.vault.clone(), generate_random_key(), 60);

    let err = other.access_token(s.account).await.unwrap_err();
    assert!(matches!(err, SheetsError::Credential(_)));
    assert_eq!(s.oauth.refresh_calls(), 0);
}

#[tokio::test]
async fn unknown_account_has_no_refresh_token() {
    let s = setup(60).await;
    let err = s.manager.access_token(AccountId::new()).await.unwrap_err();
    assert!(matches!(err, SheetsError::Credential(_)));
}

// ── Caching ──

#[tokio::test]
async fn access_token_is_cached() {
    let s = setup(60).await;
    assert!(!s.manager.has_valid_token(s.account).await);

    let first = s.manager.access_token(s.account).await.unwrap();
    let second = s.manager.access_token(s.account).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(s.oauth.refresh_calls(), 1);
    assert!(s.manager.has_valid_token(s.account).await);
}

#[tokio::test]
async fn token_inside_margin_is_refreshed() {
    // Fake tokens live one hour, so a two-hour margin always refreshes
    let s = setup(7200).await;
    let first = s.manager.access_token(s.account).await.unwrap();
    let second = s.manager.access_token(s.account).await.unwrap();
    assert_ne!(first.token, second.token);
    assert_eq!(s.oauth.refresh_calls(), 2);
}

#[tokio::test]
async fn invalidate_forces_next_refresh() {
    let s = setup(60).await;
    s.manager.access_token(s.account).await.unwrap();
    s.manager.invalidate(s.account).await;
    assert!(!s.manager.has_valid_token(s.account).await);

    s.manager.access_token(s.account).await.unwrap();
    assert_eq!(s.oauth.refresh_calls(), 2);
}

// ── Coalesced Refresh ──

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_requests_share_one_exchange() {
    let s = setup(60).await;
    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = s.manager.clone();
        let account = s.account;
        handles.push(tokio::spawn(async move { manager.access_token(account).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().token, "access-1");
    }
    assert_eq!(s.oauth.refresh_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rejections_share_one_exchange() {
    let s = setup(60).await;
    let rejected = s.manager.access_token(s.account).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = s.manager.clone();
        let account = s.account;
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            manager.refresh_rejected(account, &rejected).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().token, "access-2");
    }
    assert_eq!(s.oauth.refresh_calls(), 2);
}

#[tokio::test]
async fn revoked_grant_is_auth_expired() {
    let s = setup(60).await;
    s.oauth.fail_refresh.store(true, Ordering::SeqCst);
    let err = s.manager.refresh(s.account).await.unwrap_err();
    assert_eq!(err, SheetsError::AuthExpired);
}

// ── Connect / Disconnect ──

#[tokio::test]
async fn connect_stores_new_grant() {
    let s = setup(60).await;
    let profile = s.manager.connect(s.account, "code-9").await.unwrap();
    assert_eq!(profile.email, "owner@example.com");

    let stored = s.vault.load(s.account).await.unwrap().unwrap();
    assert_eq!(decrypt_token(&s.key, &stored).unwrap(), "refresh-for-code-9");

    // The exchanged access token is cached
    assert_eq!(s.manager.access_token(s.account).await.unwrap().token, "access-from-code");
    assert_eq!(s.oauth.refresh_calls(), 0);
}

#[tokio::test]
async fn connect_without_refresh_token_keeps_previous_grant() {
    let s = setup(60).await;
    s.oauth.issue_refresh_token.store(false, Ordering::SeqCst);
    s.manager.connect(s.account, "code-9").await.unwrap();

    let stored = s.vault.load(s.account).await.unwrap().unwrap();
    assert_eq!(decrypt_token(&s.key, &stored).unwrap(), STORED_REFRESH_TOKEN);
}

#[tokio::test]
async fn connect_without_any_grant_fails() {
    let s = setup(60).await;
    s.oauth.issue_refresh_token.store(false, Ordering::SeqCst);
    let fresh = AccountId::new();
    assert!(s.manager.connect(fresh, "code-9").await.is_err());
    assert!(!s.manager.is_connected(fresh).await.unwrap());
}

#[tokio::test]
async fn disconnect_removes_grant() {
    let s = setup(60).await;
    s.manager.access_token(s.account).await.unwrap();

    assert!(s.manager.disconnect(s.account).await.unwrap());
    assert!(!s.manager.is_connected(s.account).await.unwrap());
    assert!(!s.manager.has_valid_token(s.account).await);
    assert!(!s.manager.disconnect(s.account).await.unwrap());
}
