//! Encryption at rest for OAuth refresh tokens.
//!
//! Refresh tokens are long-lived Google credentials, so they are never
//! persisted in plaintext. Each token is sealed with:
//! - ChaCha20-Poly1305 for authenticated encryption
//! - A random 96-bit nonce per encryption
//! - A per-install 256-bit key supplied by deployment configuration
//!
//! The stored form is `hex(nonce) + ":" + hex(ciphertext)`, where the
//! ciphertext carries the Poly1305 tag. Decrypting with the wrong key or a
//! corrupted nonce fails with [`CryptoError::Decryption`]; it never yields
//! garbage plaintext.

mod cipher;
mod error;
mod key;

pub use cipher::{
    decrypt, decrypt_token, encrypt, encrypt_token, EncryptedData, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{generate_random_key, TokenKey, KEY_SIZE};
