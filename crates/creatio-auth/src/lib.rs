//! # creatio-auth
//!
//! Credential lifecycle primitives for the Creatio OData API client.
//!
//! ## Security
//!
//! - Sensitive data (passwords, secrets, tokens, cookies) are redacted in
//!   Debug output
//! - Credentials are persisted only in encrypted form (AES-256-GCM)
//! - Error messages avoid including credential values
//!
//! ## Components
//!
//! - [`SecretCipher`] - symmetric encryption of the credential store file
//! - [`CredentialStore`] - multi-tenant (base URL x principal) encrypted
//!   cache that fails open on reads and closed on writes
//! - [`ResolvedCredentials`] - explicit, then environment, then remembered
//!   resolution of session or OAuth credentials

mod credentials;
mod crypto;
mod error;
mod store;

pub use credentials::{
    CredentialSource, EnvCredentials, ResolvedCredentials, CLIENT_ID_ENV, CLIENT_SECRET_ENV,
    PASSWORD_ENV, USERNAME_ENV,
};
pub use crypto::SecretCipher;
pub use error::{Error, ErrorKind, Result};
pub use store::{normalize_base_url, CredentialMap, CredentialPayload, CredentialStore, OAuthToken};

/// Environment variable holding the base64-encoded 32-byte store key.
pub const ENCRYPTION_KEY_ENV: &str = "SESSIONS_ENCRYPTION_KEY";

/// Default file name for the encrypted credential store.
pub const DEFAULT_SESSIONS_FILE: &str = ".creatio_sessions.bin";
