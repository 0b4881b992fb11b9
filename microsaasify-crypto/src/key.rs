//! Symmetric key handling.

use crate::error::{CryptoError, CryptoResult};
use chacha20poly1305::aead::{KeyInit, OsRng};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Per-install key used to seal refresh tokens.
///
/// Wiped from memory on drop. `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenKey {
    bytes: [u8; KEY_SIZE],
}

impl TokenKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Parses the key as it appears in deployment configuration.
    ///
    /// Accepts either 64 hex characters or a raw 32-byte UTF-8 string.
    pub fn from_config_str(value: &str) -> CryptoResult<Self> {
        let value = value.trim();
        if value.len() == KEY_SIZE * 2 {
            if let Ok(decoded) = hex::decode(value) {
                return Self::from_slice(&decoded);
            }
        }
        Self::from_slice(value.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub(crate) fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.bytes))
    }
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenKey(<redacted>)")
    }
}

/// Generates a fresh random key from the OS RNG.
pub fn generate_random_key() -> TokenKey {
    let key = ChaCha20Poly1305::generate_key(&mut OsRng);
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(key.as_slice());
    TokenKey { bytes }
}
