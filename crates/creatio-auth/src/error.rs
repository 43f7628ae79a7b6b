//! Credential-layer errors.
//!
//! Messages never embed credential material; they name the field or the
//! failure, not the value.

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A credential-layer failure: what went wrong ([`ErrorKind`]) plus the
/// underlying error when one exists.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The underlying error, when one exists.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Classification of a credential-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Nothing usable resolved from any credential source.
    #[error("No credentials provided for authentication")]
    MissingCredentials,

    /// A complete session pair and a complete OAuth pair at once.
    #[error("Cannot use both OAuth credentials and username/password for authentication")]
    ConflictingCredentials,

    /// A credential field was present but unusable, for example half a
    /// pair.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The remote service rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The store could not be encrypted (missing or malformed key).
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The store blob could not be decrypted: wrong key, truncation, or
    /// tampering.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The store file could not be replaced on disk.
    #[error("Failed to write credential store: {0}")]
    StoreWrite(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(String),

    /// Filesystem failure outside the atomic-write path.
    #[error("IO error: {0}")]
    Io(String),

    /// A required environment variable was malformed.
    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

impl Error {
    /// An error with no underlying cause.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// An error wrapping its underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_comes_from_the_kind() {
        assert_eq!(
            ErrorKind::MissingCredentials.to_string(),
            "No credentials provided for authentication"
        );
        assert_eq!(
            ErrorKind::Decryption("ciphertext is too short".to_string()).to_string(),
            "Decryption error: ciphertext is too short"
        );
    }

    #[test]
    fn conversions_keep_the_source() {
        let err: Error = serde_json::from_str::<u32>("[").unwrap_err().into();
        assert!(matches!(err.kind, ErrorKind::Json(_)));
        assert!(err.source.is_some());

        let err: Error = std::io::Error::other("disk full").into();
        assert!(matches!(err.kind, ErrorKind::Io(_)));
    }

    #[test]
    fn invalid_credentials_message_names_the_field_not_the_value() {
        let err = Error::new(ErrorKind::InvalidCredentials(
            "username provided without a password".to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "Invalid credentials: username provided without a password"
        );
    }
}
