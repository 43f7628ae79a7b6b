//! Error types for creatio-odata.
//!
//! Lower-layer errors from `creatio-client` and `creatio-auth` are folded
//! into this type so callers only match on one `ErrorKind`.

/// Result type alias for creatio-odata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for creatio-odata operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Returns the HTTP status code if this is an HTTP error.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Http { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The service answered with a non-success status.
    #[error("HTTP error: {status} {message}")]
    Http { status: u16, message: String },

    /// The remote service rejected the credentials, or re-authentication
    /// was required but impossible.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No usable credentials resolved from any source.
    #[error("No credentials provided for authentication")]
    MissingCredentials,

    /// Both session and OAuth credentials fully specified.
    #[error("Cannot use both OAuth credentials and username/password for authentication")]
    ConflictingCredentials,

    /// A credential field was present but unusable.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Transport-level failure (timeout, connection, TLS, bad URL).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credential store failure that is not fail-open (encryption,
    /// persisting).
    #[error("Credential store error: {0}")]
    Store(String),

    /// The service answered with a body the operation cannot use.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// A caller-supplied argument was unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dashboard configuration could not be translated for export.
    #[error("Dashboard export error: {0}")]
    Dashboard(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<creatio_client::Error> for Error {
    fn from(err: creatio_client::Error) -> Self {
        let kind = match &err.kind {
            creatio_client::ErrorKind::Http { status, message } => ErrorKind::Http {
                status: *status,
                message: message.clone(),
            },
            creatio_client::ErrorKind::Json(msg) => ErrorKind::Json(msg.clone()),
            other => ErrorKind::Transport(other.to_string()),
        };
        Error {
            kind,
            source: Some(Box::new(err)),
        }
    }
}

impl From<creatio_auth::Error> for Error {
    fn from(err: creatio_auth::Error) -> Self {
        let kind = match &err.kind {
            creatio_auth::ErrorKind::MissingCredentials => ErrorKind::MissingCredentials,
            creatio_auth::ErrorKind::ConflictingCredentials => ErrorKind::ConflictingCredentials,
            creatio_auth::ErrorKind::InvalidCredentials(msg) => {
                ErrorKind::InvalidCredentials(msg.clone())
            }
            creatio_auth::ErrorKind::Authentication(msg) => {
                ErrorKind::Authentication(msg.clone())
            }
            creatio_auth::ErrorKind::Json(msg) => ErrorKind::Json(msg.clone()),
            creatio_auth::ErrorKind::Io(msg) => ErrorKind::Io(msg.clone()),
            other => ErrorKind::Store(other.to_string()),
        };
        Error {
            kind,
            source: Some(Box::new(err)),
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
    fn test_client_error_conversion() {
        let client_err = creatio_client::Error::new(creatio_client::ErrorKind::Http {
            status: 404,
            message: "Not Found".to_string(),
        });
        let err: Error = client_err.into();
        assert_eq!(err.status(), Some(404));
        assert!(err.source.is_some());

        let client_err = creatio_client::Error::new(creatio_client::ErrorKind::Timeout);
        let err: Error = client_err.into();
        assert!(matches!(err.kind, ErrorKind::Transport(_)));
    }

    #[test]
    fn test_auth_error_conversion() {
        let auth_err = creatio_auth::Error::new(creatio_auth::ErrorKind::MissingCredentials);
        let err: Error = auth_err.into();
        assert!(matches!(err.kind, ErrorKind::MissingCredentials));

        let auth_err =
            creatio_auth::Error::new(creatio_auth::ErrorKind::ConflictingCredentials);
        let err: Error = auth_err.into();
        assert!(matches!(err.kind, ErrorKind::ConflictingCredentials));

        let auth_err = creatio_auth::Error::new(creatio_auth::ErrorKind::Encryption(
            "no key".to_string(),
        ));
        let err: Error = auth_err.into();
        assert!(matches!(err.kind, ErrorKind::Store(_)));
    }

    #[test]
    fn test_status_accessor() {
        let err = Error::new(ErrorKind::Http {
            status: 401,
            message: "Unauthorized".to_string(),
        });
        assert_eq!(err.status(), Some(401));

        let err = Error::new(ErrorKind::MissingCredentials);
        assert_eq!(err.status(), None);
    }
}
