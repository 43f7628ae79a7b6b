//! Transport-level errors.

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A transport failure: what went wrong ([`ErrorKind`]) plus the
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

/// Classification of a transport failure.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {status} {message}")]
    Http { status: u16, message: String },

    /// The request deadline elapsed.
    #[error("Request timeout")]
    Timeout,

    /// The connection could not be established or broke mid-request.
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(String),

    /// Form body serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The request URL did not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport could not be constructed from its configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything reqwest reports that fits none of the above.
    #[error("{0}")]
    Other(String),
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

    /// Whether the carried HTTP status signals an expired or
    /// unauthenticated session (401/403).
    pub fn is_session_expired(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// The HTTP status code, for [`ErrorKind::Http`] errors.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::Http { status, .. } => Some(status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connection(err.to_string())
        } else {
            match err.status() {
                Some(status) => ErrorKind::Http {
                    status: status.as_u16(),
                    message: err.to_string(),
                },
                None => ErrorKind::Other(err.to_string()),
            }
        };
        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Error::with_source(ErrorKind::Serialization(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::InvalidUrl(err.to_string()), err)
    }
}
