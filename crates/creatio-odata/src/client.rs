//! The Creatio OData API client and its request executor.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use creatio_auth::{
    CredentialPayload, CredentialStore, ResolvedCredentials, SecretCipher, DEFAULT_SESSIONS_FILE,
};
use creatio_client::{ClientConfig, HttpTransport, RequestBody, RequestBuilder, RequestMethod, Response};

use crate::error::{Error, ErrorKind, Result};

/// Login endpoint for forms-based session authentication. Requests to it
/// are never retried and its cookies are handled by the login flow itself.
pub(crate) const LOGIN_ENDPOINT: &str = "ServiceModel/AuthService.svc/Login";

/// Cheap collection-count endpoint used to validate cached sessions.
pub(crate) const PROBE_ENDPOINT: &str = "0/odata/Account/$count";

/// Client for the Creatio OData API.
///
/// One instance talks to one Creatio environment with one active identity
/// at a time. All mutating operations take `&mut self`; an instance is
/// owned by a single logical caller and carries no internal locking.
///
/// # Example
///
/// ```rust,ignore
/// use creatio_odata::{AuthOptions, CreatioClient, QueryOptions};
///
/// let mut client = CreatioClient::builder("https://myorg.creatio.com").build()?;
/// client
///     .authenticate(AuthOptions::new().username("supervisor").password("secret"))
///     .await?;
///
/// let response = client
///     .get_collection_data("Contact", QueryOptions::new().top(5).select("Id,Name"))
///     .await?;
/// ```
pub struct CreatioClient {
    base_url: String,
    debug: bool,
    api_calls: u64,
    pub(crate) cookies: BTreeMap<String, String>,
    pub(crate) oauth_token: Option<String>,
    pub(crate) credentials: Option<ResolvedCredentials>,
    pub(crate) identity_service_url: Option<String>,
    pub(crate) transport: HttpTransport,
    pub(crate) store: CredentialStore,
}

impl std::fmt::Debug for CreatioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatioClient")
            .field("base_url", &self.base_url)
            .field("debug", &self.debug)
            .field("api_calls", &self.api_calls)
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "[REDACTED]"))
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl CreatioClient {
    /// Start building a client for the given environment URL.
    pub fn builder(base_url: impl Into<String>) -> CreatioClientBuilder {
        CreatioClientBuilder::new(base_url)
    }

    /// Create a client with default settings. The encryption key is read
    /// from the environment and the store file lives in the working
    /// directory.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    /// The normalized environment URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of completed logical HTTP operations since construction.
    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    /// Whether verbose per-request logging is enabled.
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Execute one logical API operation against the environment.
    ///
    /// Auth headers are chosen by the active mode (bearer token vs session
    /// cookies). A 401/403 answer triggers exactly one silent
    /// re-authentication with the remembered credentials followed by one
    /// replay; the second failure propagates. The call counter increments
    /// once however many wire exchanges happened.
    pub async fn request(
        &mut self,
        method: RequestMethod,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let response = self.dispatch(method, endpoint, &options, true).await?;
        self.api_calls += 1;
        Ok(response)
    }

    pub(crate) async fn dispatch(
        &mut self,
        method: RequestMethod,
        endpoint: &str,
        options: &RequestOptions,
        allow_retry: bool,
    ) -> Result<Response> {
        let response = self.send_once(method, endpoint, options).await?;

        let status = response.status();
        if is_session_expired_status(status) && allow_retry && endpoint != LOGIN_ENDPOINT {
            warn!(status, %endpoint, "Session rejected; re-authenticating and replaying once");
            self.refresh_credentials().await?;
            let retry = self.send_once(method, endpoint, options).await?;
            return self.accept(endpoint, retry).await;
        }

        self.accept(endpoint, response).await
    }

    /// Turn a wire response into the operation result: non-success becomes
    /// an error carrying the body, success merges and persists any cookies
    /// the server set.
    async fn accept(&mut self, endpoint: &str, response: Response) -> Result<Response> {
        if !response.is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::new(ErrorKind::Http { status, message }));
        }

        let new_cookies = response.set_cookies();
        if !new_cookies.is_empty() && endpoint != LOGIN_ENDPOINT && self.oauth_token.is_none() {
            self.cookies.extend(new_cookies);
            self.persist_session_cookies();
            debug!("New cookies stored in the session");
        }

        Ok(response)
    }

    /// One wire exchange, auth headers applied last so they win over any
    /// caller-supplied header of the same name.
    pub(crate) async fn send_once(
        &mut self,
        method: RequestMethod,
        endpoint: &str,
        options: &RequestOptions,
    ) -> Result<Response> {
        let url = self.endpoint_url(endpoint);
        let mut request = RequestBuilder::new(method, url);

        if let Some(body) = &options.body {
            request = match body.clone() {
                RequestBody::Json(value) => request.json_value(value),
                RequestBody::Text(text) => request.text(text),
                RequestBody::Bytes(bytes) => request.bytes(bytes),
                RequestBody::Form(form) => request.form(form),
            };
        }
        for (name, value) in &options.headers {
            request = request.header(name.clone(), value.clone());
        }
        request = request.queries(options.query.iter().cloned());
        request = self.apply_auth_headers(request, endpoint);

        self.transport.execute(request).await.map_err(Into::into)
    }

    /// Build the per-mode auth headers.
    ///
    /// OAuth mode sends a bearer token. Session mode sends the cookie jar
    /// plus `ForceUseSession` and mirrors the `BPMCSRF` cookie into a
    /// header, which is how Creatio expects its CSRF check to be satisfied.
    /// `$metadata` documents are not JSON, so the Accept header is skipped
    /// for those.
    pub(crate) fn apply_auth_headers(
        &self,
        mut request: RequestBuilder,
        endpoint: &str,
    ) -> RequestBuilder {
        if let Some(token) = &self.oauth_token {
            request = request.bearer_auth(token.clone());
        } else {
            request = request.header("ForceUseSession", "true");
            if let Some(csrf) = self.cookies.get("BPMCSRF") {
                request = request.header("BPMCSRF", csrf.clone());
            }
            if !self.cookies.is_empty() {
                let jar = self
                    .cookies
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                request = request.header("Cookie", jar);
            }
        }

        if !endpoint.contains("$metadata") {
            request = request.header("Accept", "application/json; odata=verbose");
        }

        request
    }

    pub(crate) fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Persist the current cookie jar for the active session principal.
    /// Store failures degrade to a warning; the in-memory session keeps
    /// working.
    pub(crate) fn persist_session_cookies(&mut self) {
        let Some(ResolvedCredentials::Session { username, .. }) = &self.credentials else {
            return;
        };
        let username = username.clone();
        self.persist_cookies_for(&username);
    }

    /// Persist the cookie jar under an explicit principal. The login flow
    /// uses this before the credentials are remembered on the instance.
    pub(crate) fn persist_cookies_for(&mut self, username: &str) {
        let payload = CredentialPayload::Session(self.cookies.clone());
        if let Err(e) = self.store.store(&self.base_url, username, payload) {
            warn!(error = %e, "Failed to persist session cookies");
        }
    }

    pub(crate) fn bump_api_calls(&mut self) {
        self.api_calls += 1;
    }

    /// Re-authenticate with the remembered credentials, bypassing the
    /// cache. Used by the retry path; does not touch the call counter.
    async fn refresh_credentials(&mut self) -> Result<()> {
        let Some(credentials) = self.credentials.clone() else {
            return Err(Error::new(ErrorKind::Authentication(
                "session rejected and no credentials are available to re-authenticate".to_string(),
            )));
        };
        let identity_service_url = self.identity_service_url.clone();
        // The login flow dispatches through this executor again; boxing
        // keeps the future type finite.
        Box::pin(self.authenticate_resolved(credentials, identity_service_url, false, false))
            .await
    }
}

pub(crate) fn is_session_expired_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Per-request options for [`CreatioClient::request`]: extra headers,
/// query parameters, and an optional body.
#[derive(Debug, Default)]
pub struct RequestOptions {
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<RequestBody>,
}

impl RequestOptions {
    /// Create empty request options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add several query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a JSON body.
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Set a raw JSON body.
    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Set a binary body.
    pub fn bytes(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }
}

/// Builder for [`CreatioClient`].
pub struct CreatioClientBuilder {
    base_url: String,
    debug: bool,
    sessions_file: Option<PathBuf>,
    encryption_key: Option<Vec<u8>>,
    config: Option<ClientConfig>,
}

impl std::fmt::Debug for CreatioClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatioClientBuilder")
            .field("base_url", &self.base_url)
            .field("debug", &self.debug)
            .field("sessions_file", &self.sessions_file)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl CreatioClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            debug: false,
            sessions_file: None,
            encryption_key: None,
            config: None,
        }
    }

    /// Enable verbose per-request logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Path of the encrypted credential store file. Defaults to
    /// `.creatio_sessions.bin` in the working directory.
    pub fn sessions_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sessions_file = Some(path.into());
        self
    }

    /// Raw 32-byte store encryption key. When not set, the key is read
    /// from the `SESSIONS_ENCRYPTION_KEY` environment variable; with
    /// neither, the store is read-only-empty and never written.
    pub fn encryption_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// HTTP transport configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the client. Fails when the base URL does not parse or the
    /// encryption key is malformed.
    pub fn build(self) -> Result<CreatioClient> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::with_source(
                ErrorKind::InvalidInput(format!("invalid base URL {:?}", self.base_url)),
                e,
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::new(ErrorKind::InvalidInput(format!(
                "base URL must be http(s), got {:?}",
                parsed.scheme()
            ))));
        }
        let base_url = creatio_auth::normalize_base_url(&self.base_url);

        let cipher = match self.encryption_key {
            Some(key) => Some(SecretCipher::new(&key)?),
            None => SecretCipher::from_env()?,
        };
        let store = CredentialStore::new(
            self.sessions_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSIONS_FILE)),
            cipher,
        );

        let mut config = self.config.unwrap_or_default();
        if self.debug {
            config.enable_tracing = true;
        }
        let transport = HttpTransport::new(config)?;

        debug!(%base_url, "Creatio client initialized");

        Ok(CreatioClient {
            base_url,
            debug: self.debug,
            api_calls: 0,
            cookies: BTreeMap::new(),
            oauth_token: None,
            credentials: None,
            identity_service_url: None,
            transport,
            store,
        })
    }
}
