//! ChaCha20-Poly1305 sealing of refresh tokens.

use crate::error::{CryptoError, CryptoResult};
use crate::key::TokenKey;
use chacha20poly1305::aead::{Aead, AeadCore, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use serde::{Deserialize, Serialize};

/// Nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Ciphertext plus the nonce it was sealed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the Poly1305 tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Encodes as `hex(nonce):hex(ciphertext)`.
    pub fn to_wire(&self) -> String {
        format!("{}:{}", hex::encode(self.nonce), hex::encode(&self.ciphertext))
    }

    /// Parses the `hex(nonce):hex(ciphertext)` storage format.
    pub fn from_wire(value: &str) -> CryptoResult<Self> {
        let (nonce_hex, ct_hex) = value
            .split_once(':')
            .ok_or_else(|| CryptoError::InvalidFormat("missing ':' separator".to_string()))?;

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|e| CryptoError::InvalidFormat(format!("nonce is not hex: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidFormat(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            )));
        }

        let ciphertext = hex::decode(ct_hex)
            .map_err(|e| CryptoError::InvalidFormat(format!("ciphertext is not hex: {e}")))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::InvalidFormat(format!(
                "ciphertext shorter than the {TAG_SIZE}-byte tag"
            )));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&nonce_bytes);
        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypts bytes under `key` with a fresh random nonce.
pub fn encrypt(key: &TokenKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(nonce.as_slice());
    Ok(EncryptedData {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts and authenticates `data` under `key`.
pub fn decrypt(key: &TokenKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    key.cipher()
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}

/// Seals a refresh token into its storage string.
pub fn encrypt_token(key: &TokenKey, token: &str) -> CryptoResult<String> {
    Ok(encrypt(key, token.as_bytes())?.to_wire())
}

/// Opens a refresh token from its storage string.
pub fn decrypt_token(key: &TokenKey, stored: &str) -> CryptoResult<String> {
    let data = EncryptedData::from_wire(stored)?;
    let plaintext = decrypt(key, &data)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Decryption(format!("token is not valid UTF-8: {e}")))
}
