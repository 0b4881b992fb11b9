//! Per-account access-token lifecycle.
//!
//! Refresh tokens live encrypted in a [`CredentialVault`]. Access tokens are
//! cached in memory per account and refreshed before expiry. Concurrent
//! callers that find the same token stale or rejected share one exchange:
//! each account has a refresh lock and a generation counter that is bumped on
//! every successful exchange, so a waiter that acquires the lock after
//! someone else refreshed picks up the new token instead of exchanging again.

use crate::error::{IngestResult, SheetsError, SheetsResult};
use crate::oauth::OAuthProvider;
use crate::types::{AccessToken, AccountId, GoogleUserInfo};
use crate::vault::CredentialVault;
use dashmap::DashMap;
use microsaasify_crypto::{decrypt_token, encrypt_token, TokenKey};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Default)]
struct TokenState {
    access: Option<AccessToken>,
    generation: u64,
}

#[derive(Default)]
struct AccountSlot {
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
}

/// Decrypts stored refresh tokens and hands out valid access tokens.
pub struct CredentialManager {
    oauth: Arc<dyn OAuthProvider>,
    vault: Arc<dyn CredentialVault>,
    key: TokenKey,
    accounts: DashMap<AccountId, Arc<AccountSlot>>,
    refresh_margin_secs: i64,
}

impl CredentialManager {
    pub fn new(
        oauth: Arc<dyn OAuthProvider>,
        vault: Arc<dyn CredentialVault>,
        key: TokenKey,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            oauth,
            vault,
            key,
            accounts: DashMap::new(),
            refresh_margin_secs,
        }
    }

    pub fn oauth(&self) -> &Arc<dyn OAuthProvider> {
        &self.oauth
    }

    fn slot(&self, account: AccountId) -> Arc<AccountSlot> {
        self.accounts.entry(account).or_default().clone()
    }

    /// Completes an OAuth callback: exchanges the code, stores the encrypted
    /// refresh token and returns the connected Google profile.
    pub async fn connect(&self, account: AccountId, code: &str) -> IngestResult<GoogleUserInfo> {
        let tokens = self.oauth.exchange_code(code).await?;

        match tokens.refresh_token {
            Some(refresh_token) => self.store_refresh_token(account, &refresh_token).await?,
            None => {
                // Re-consent without offline access keeps the previous grant.
                if self.vault.load(account).await?.is_none() {
                    return Err(SheetsError::Credential(
                        "provider did not issue a refresh token".to_string(),
                    )
                    .into());
                }
                debug!("no new refresh token for account {account}, keeping stored grant");
            }
        }

        let slot = self.slot(account);
        {
            let mut state = slot.state.write().await;
            state.access = Some(tokens.access.clone());
            state.generation += 1;
        }

        let profile = self.oauth.user_info(&tokens.access).await?;
        info!("connected Google account for {account}");
        Ok(profile)
    }

    /// Encrypts and stores a refresh token, dropping any cached access token.
    pub async fn store_refresh_token(
        &self,
        account: AccountId,
        refresh_token: &str,
    ) -> IngestResult<()> {
        let encrypted = encrypt_token(&self.key, refresh_token).map_err(SheetsError::from)?;
        self.vault.store(account, encrypted).await?;
        self.invalidate(account).await;
        Ok(())
    }

    /// Gets a valid access token, refreshing if it expires within the margin.
    pub async fn access_token(&self, account: AccountId) -> SheetsResult<AccessToken> {
        let slot = self.slot(account);

        // Fast path: cached token still comfortably valid
        let observed = {
            let state = slot.state.read().await;
            if let Some(ref t) = state.access {
                if !t.expires_within_secs(self.refresh_margin_secs) {
                    return Ok(t.clone());
                }
                debug!(
                    "access token for {account} expiring within {}s, refreshing",
                    self.refresh_margin_secs
                );
            }
            state.generation
        };

        self.refresh_from(account, &slot, observed).await
    }

    /// Forces a refresh unless another caller refreshed concurrently.
    pub async fn refresh(&self, account: AccountId) -> SheetsResult<AccessToken> {
        let slot = self.slot(account);
        let observed = slot.state.read().await.generation;
        self.refresh_from(account, &slot, observed).await
    }

    /// Called after the provider rejected `rejected`. Returns the current
    /// token if it was already replaced, otherwise performs one exchange.
    pub async fn refresh_rejected(
        &self,
        account: AccountId,
        rejected: &AccessToken,
    ) -> SheetsResult<AccessToken> {
        let slot = self.slot(account);
        let observed = {
            let state = slot.state.read().await;
            if let Some(ref t) = state.access {
                if t.token != rejected.token && !t.expires_within_secs(self.refresh_margin_secs) {
                    return Ok(t.clone());
                }
            }
            state.generation
        };
        self.refresh_from(account, &slot, observed).await
    }

    async fn refresh_from(
        &self,
        account: AccountId,
        slot: &AccountSlot,
        observed_generation: u64,
    ) -> SheetsResult<AccessToken> {
        let _guard = slot.refresh_lock.lock().await;

        {
            let state = slot.state.read().await;
            if state.generation != observed_generation {
                if let Some(ref t) = state.access {
                    if !t.expires_within_secs(self.refresh_margin_secs) {
                        debug!("access token for {account} already refreshed by another task");
                        return Ok(t.clone());
                    }
                }
            }
        }

        let stored = self
            .vault
            .load(account)
            .await
            .map_err(|e| SheetsError::Credential(e.to_string()))?
            .ok_or_else(|| {
                SheetsError::Credential(format!("no refresh token stored for account {account}"))
            })?;
        let refresh_token = decrypt_token(&self.key, &stored)?;

        let token = self
            .oauth
            .refresh_access_token(&refresh_token)
            .await
            .map_err(|e| {
                warn!("access token refresh failed for {account}: {e}");
                e
            })?;

        debug!("refreshed access token for {account}, expires at {}", token.expires_at);

        let mut state = slot.state.write().await;
        state.access = Some(token.clone());
        state.generation += 1;

        Ok(token)
    }

    /// Drops the cached access token (the stored refresh token stays).
    pub async fn invalidate(&self, account: AccountId) {
        if let Some(slot) = self.accounts.get(&account).map(|s| s.clone()) {
            slot.state.write().await.access = None;
        }
    }

    /// Forgets the account entirely. Returns true if a refresh token was stored.
    pub async fn disconnect(&self, account: AccountId) -> IngestResult<bool> {
        self.accounts.remove(&account);
        let removed = self.vault.remove(account).await?;
        if removed {
            info!("disconnected Google account for {account}");
        }
        Ok(removed)
    }

    /// Returns true if a cached access token is present and valid.
    pub async fn has_valid_token(&self, account: AccountId) -> bool {
        let Some(slot) = self.accounts.get(&account).map(|s| s.clone()) else {
            return false;
        };
        let state = slot.state.read().await;
        state
            .access
            .as_ref()
            .is_some_and(|t| !t.expires_within_secs(self.refresh_margin_secs))
    }

    /// Returns true if an encrypted refresh token is stored for the account.
    pub async fn is_connected(&self, account: AccountId) -> IngestResult<bool> {
        Ok(self.vault.load(account).await?.is_some())
    }
}

