//! Encrypted multi-tenant credential store.
//!
//! One file holds credentials for many (base URL, principal) pairs:
//! session cookies for username principals, OAuth tokens for client-id
//! principals. Reads fail open (missing file, missing key, or corruption
//! behave like "never authenticated"); writes fail closed and are atomic.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::SecretCipher;
use crate::error::{Error, ErrorKind, Result};

/// The full persisted store: payloads keyed by base URL, then by principal.
pub type CredentialMap = BTreeMap<String, BTreeMap<String, CredentialPayload>>;

/// One identity's cached credential.
///
/// The store treats this opaquely; only the authentication manager
/// interprets it. `OAuth` is tried first during deserialization because a
/// token object always carries `access_token`, which a cookie map never
/// does.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialPayload {
    /// OAuth token plus optional metadata.
    OAuth(OAuthToken),
    /// Session cookies, keyed by cookie name.
    Session(BTreeMap<String, String>),
}

impl std::fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialPayload::OAuth(token) => f.debug_tuple("OAuth").field(token).finish(),
            CredentialPayload::Session(cookies) => {
                let redacted: Vec<&str> = cookies.keys().map(String::as_str).collect();
                f.debug_tuple("Session").field(&redacted).finish()
            }
        }
    }
}

/// Token response payload from the identity service.
///
/// The access token is redacted in Debug output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Lifetime in seconds, as reported by the identity service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Scopes granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Normalize a base URL for use as a store key: trailing slashes are not
/// significant.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// File-backed encrypted credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    cipher: Option<SecretCipher>,
}

impl CredentialStore {
    /// Create a store backed by the given file and cipher.
    ///
    /// With no cipher, reads behave like an empty store and writes fail;
    /// this keeps a key-less process usable for live (non-cached) logins.
    pub fn new(path: impl AsRef<Path>, cipher: Option<SecretCipher>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cipher,
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the store has a cipher and can persist credentials.
    pub fn can_persist(&self) -> bool {
        self.cipher.is_some()
    }

    /// Read and decrypt the whole store.
    ///
    /// A missing file, missing cipher, or decryption failure yields an
    /// empty map: the caller just falls back to a live login.
    pub fn read_all(&self) -> CredentialMap {
        let Some(ref cipher) = self.cipher else {
            debug!("No encryption key configured; treating credential store as empty");
            return CredentialMap::new();
        };

        let blob = match std::fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CredentialMap::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read credential store");
                return CredentialMap::new();
            }
        };

        match cipher.decrypt(&blob) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to decrypt credential store; treating as empty");
                CredentialMap::new()
            }
        }
    }

    /// Encrypt and atomically overwrite the whole store.
    ///
    /// The blob is written to a temp file in the same directory and then
    /// renamed over the target, so a failed write leaves any previous file
    /// untouched.
    pub fn write_all(&self, store: &CredentialMap) -> Result<()> {
        let Some(ref cipher) = self.cipher else {
            return Err(Error::new(ErrorKind::Encryption(format!(
                "no encryption key configured; set {}",
                crate::ENCRYPTION_KEY_ENV
            ))));
        };

        let blob = cipher.encrypt(store)?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new_in("."),
        }
        .map_err(|e| Error::with_source(ErrorKind::StoreWrite(e.to_string()), e))?;

        tmp.write_all(&blob)
            .map_err(|e| Error::with_source(ErrorKind::StoreWrite(e.to_string()), e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::with_source(ErrorKind::StoreWrite(e.to_string()), e.error))?;

        debug!(path = %self.path.display(), "Credential store updated");
        Ok(())
    }

    /// Look up the payload for one (base URL, principal) pair.
    pub fn load(&self, base_url: &str, principal: &str) -> Option<CredentialPayload> {
        self.read_all()
            .get(&normalize_base_url(base_url))?
            .get(principal)
            .cloned()
    }

    /// Insert or replace one (base URL, principal) entry, preserving every
    /// other entry in the file.
    pub fn store(
        &self,
        base_url: &str,
        principal: &str,
        payload: CredentialPayload,
    ) -> Result<()> {
        let mut map = self.read_all();
        map.entry(normalize_base_url(base_url))
            .or_default()
            .insert(principal.to_string(), payload);
        self.write_all(&map)
    }
}
