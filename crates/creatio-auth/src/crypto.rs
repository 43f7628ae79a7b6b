//! AES-256-GCM encryption for the credential store.
//!
//! The whole store is encrypted as one blob with a fresh random nonce per
//! write; the 12-byte nonce is prepended to the ciphertext. The master key
//! is 32 bytes, supplied base64-encoded through `SESSIONS_ENCRYPTION_KEY`
//! or injected directly by the embedding application.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, ErrorKind, Result};
use crate::store::CredentialMap;
use crate::ENCRYPTION_KEY_ENV;

/// Size of the encryption key in bytes (256 bits).
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM).
const NONCE_SIZE: usize = 12;

/// Symmetric cipher for the credential store file.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Create a cipher from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(Error::new(ErrorKind::Encryption(format!(
                "encryption key must be {} bytes, got {}",
                KEY_SIZE,
                key.len()
            ))));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::new(ErrorKind::Encryption(format!("invalid key: {e}"))))?;

        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64.decode(key_base64.trim()).map_err(|e| {
            Error::with_source(
                ErrorKind::Encryption("encryption key is not valid base64".to_string()),
                e,
            )
        })?;
        Self::new(&key_bytes)
    }

    /// Load the cipher from the `SESSIONS_ENCRYPTION_KEY` environment
    /// variable. Returns `Ok(None)` when the variable is unset, so callers
    /// can run without persistence.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(ENCRYPTION_KEY_ENV) {
            Ok(value) => Self::from_base64(&value).map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(Error::with_source(
                ErrorKind::EnvVar(format!("{ENCRYPTION_KEY_ENV} is not valid unicode")),
                e,
            )),
        }
    }

    /// Serialize and encrypt a credential map. Output is the nonce followed
    /// by the ciphertext.
    pub fn encrypt(&self, data: &CredentialMap) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(data)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| Error::new(ErrorKind::Encryption(format!("encryption failed: {e}"))))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Decrypt and deserialize a credential map produced by [`encrypt`].
    ///
    /// Fails on truncated input, wrong key, or tampered ciphertext.
    ///
    /// [`encrypt`]: SecretCipher::encrypt
    pub fn decrypt(&self, blob: &[u8]) -> Result<CredentialMap> {
        if blob.len() < NONCE_SIZE {
            return Err(Error::new(ErrorKind::Decryption(
                "ciphertext is too short".to_string(),
            )));
        }

        let (nonce_bytes, payload) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, payload).map_err(|e| {
            Error::new(ErrorKind::Decryption(format!(
                "decryption failed (wrong key or corrupted data): {e}"
            )))
        })?;

        serde_json::from_slice(&plaintext).map_err(|e| {
            Error::with_source(
                ErrorKind::Decryption("decrypted store is not valid JSON".to_string()),
                e,
            )
        })
    }
}
