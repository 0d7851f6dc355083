//! Field-level encryption for sensitive columns.
//!
//! The key is derived once per service instance with Argon2 from the configured secret and a
//! fixed salt; ciphertexts are ChaCha20-Poly1305 with a 12-byte nonce stored beside them as hex.

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::errors::ServiceError;

/// Length of the per-value initialization vector (nonce) in bytes.
pub const IV_LEN: usize = 12;

const KEY_DERIVATION_SALT: &[u8] = b"arena-api/field-encryption/v1";

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("malformed hex in {0}")]
    Hex(&'static str),
    #[error("initialization vector must be {IV_LEN} bytes, got {0}")]
    IvLength(usize),
    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

impl From<EncryptionError> for ServiceError {
    fn from(err: EncryptionError) -> Self {
        ServiceError::EncryptionError(err.to_string())
    }
}

/// Ciphertext and the IV it was produced with, both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub ciphertext: String,
    pub iv: String,
}

#[derive(Clone)]
pub struct EncryptionService {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    pub fn new(secret: &str) -> Result<Self, EncryptionError> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), KEY_DERIVATION_SALT, &mut key)
            .map_err(|e| EncryptionError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    /// Encrypts with a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField, EncryptionError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, iv)
    }

    /// Encrypts with a caller-supplied IV. Reusing an IV under the same key leaks plaintext
    /// relationships; prefer [`EncryptionService::encrypt`].
    pub fn encrypt_with_iv(
        &self,
        plaintext: &str,
        iv: [u8; IV_LEN],
    ) -> Result<EncryptedField, EncryptionError> {
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| EncryptionError::Encrypt)?;

        Ok(EncryptedField {
            ciphertext: hex::encode(ciphertext),
            iv: hex::encode(iv),
        })
    }

    pub fn decrypt(&self, ciphertext_hex: &str, iv_hex: &str) -> Result<String, EncryptionError> {
        let iv = hex::decode(iv_hex).map_err(|_| EncryptionError::Hex("iv"))?;
        if iv.len() != IV_LEN {
            return Err(EncryptionError::IvLength(iv.len()));
        }
        let ciphertext =
            hex::decode(ciphertext_hex).map_err(|_| EncryptionError::Hex("ciphertext"))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| EncryptionError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::Utf8)
    }
}
