//! Storage for encrypted refresh tokens.
//!
//! Vaults only ever see ciphertext in the `hex(nonce):hex(ct)` wire form;
//! encryption and decryption happen in the credential manager.

use crate::error::{IngestError, IngestResult};
use crate::types::AccountId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait CredentialVault: Send + Sync {
    /// Stores or replaces the encrypted refresh token for an account.
    async fn store(&self, account: AccountId, encrypted: String) -> IngestResult<()>;

    async fn load(&self, account: AccountId) -> IngestResult<Option<String>>;

    /// Returns true if a token was removed.
    async fn remove(&self, account: AccountId) -> IngestResult<bool>;
}

/// Process-local vault, used in tests and single-node development.
#[derive(Clone, Default)]
pub struct InMemoryCredentialVault {
    tokens: Arc<RwLock<HashMap<AccountId, String>>>,
}

impl InMemoryCredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialVault for InMemoryCredentialVault {
    async fn store(&self, account: AccountId, encrypted: String) -> IngestResult<()> {
        self.tokens.write().await.insert(account, encrypted);
        Ok(())
    }

    async fn load(&self, account: AccountId) -> IngestResult<Option<String>> {
        Ok(self.tokens.read().await.get(&account).cloned())
    }

    async fn remove(&self, account: AccountId) -> IngestResult<bool> {
        Ok(self.tokens.write().await.remove(&account).is_some())
    }
}

/// JSON-file vault. Each write replaces the file through a temp file and rename.
pub struct FileCredentialVault {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileCredentialVault {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> IngestResult<HashMap<AccountId, String>> {
        if !tokio::fs::try_exists(&self.path).await.map_err(storage)? {
            return Ok(HashMap::new());
        }
        let bytes = tokio::fs::read(&self.path).await.map_err(storage)?;
        if bytes.is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            IngestError::Storage(format!("corrupt credential vault {}: {e}", self.path.display()))
        })
    }

    async fn write_map(&self, map: &HashMap<AccountId, String>) -> IngestResult<()> {
        let bytes =
            serde_json::to_vec_pretty(map).map_err(|e| IngestError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(storage)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(storage)?;
        Ok(())
    }
}

fn storage(e: std::io::Error) -> IngestError {
    IngestError::Storage(e.to_string())
}

#[async_trait]
impl CredentialVault for FileCredentialVault {
    async fn store(&self, account: AccountId, encrypted: String) -> IngestResult<()> {
        let _g = self.guard.lock().await;
        let mut map = self.read_map().await?;
        map.insert(account, encrypted);
        self.write_map(&map).await
    }

    async fn load(&self, account: AccountId) -> IngestResult<Option<String>> {
        let _g = self.guard.lock().await;
        let mut map = self.read_map().await?;
        Ok(map.remove(&account))
    }

    async fn remove(&self, account: AccountId) -> IngestResult<bool> {
        let _g = self.guard.lock().await;
        let mut map = self.read_map().await?;
        let existed = map.remove(&account).is_some();
        if existed {
            self.write_map(&map).await?;
        }
        Ok(existed)
    }
}
