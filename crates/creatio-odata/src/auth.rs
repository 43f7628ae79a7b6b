//! Session and OAuth authentication flows.
//!
//! Both tracks consult the encrypted credential store before talking to
//! the network. Cached cookies are validated with a cheap count probe
//! (Creatio answers probes from a dead session with a redirect to the
//! login page); cached OAuth tokens are trusted until a request fails.

use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use creatio_auth::{CredentialPayload, EnvCredentials, OAuthToken, ResolvedCredentials};
use creatio_client::{RequestBuilder, RequestMethod};

use crate::client::{CreatioClient, RequestOptions, LOGIN_ENDPOINT, PROBE_ENDPOINT};
use crate::error::{Error, ErrorKind, Result};

/// Options for [`CreatioClient::authenticate`].
///
/// Credential fields left unset fall back to the `CREATIO_*` environment
/// variables and then to credentials remembered from a previous
/// `authenticate` call on the same instance.
#[derive(Clone)]
pub struct AuthOptions {
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) client_secret: Option<String>,
    pub(crate) identity_service_url: Option<String>,
    pub(crate) cache: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            client_id: None,
            client_secret: None,
            identity_service_url: None,
            cache: true,
        }
    }
}

impl std::fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOptions")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("identity_service_url", &self.identity_service_url)
            .field("cache", &self.cache)
            .finish()
    }
}

impl AuthOptions {
    /// Create default options (cache enabled, everything resolved from the
    /// environment or remembered state).
    pub fn new() -> Self {
        Self::default()
    }

    /// Username for session authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Password for session authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Client id for OAuth client-credentials authentication.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Client secret for OAuth client-credentials authentication.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Identity service base URL. Defaults to the environment URL with the
    /// `-is` subdomain suffix.
    pub fn identity_service_url(mut self, url: impl Into<String>) -> Self {
        self.identity_service_url = Some(url.into());
        self
    }

    /// Whether to consult the credential store before a live login.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

impl CreatioClient {
    /// Authenticate against the environment.
    ///
    /// Credential checks happen before any network traffic: a fully
    /// specified session pair and OAuth pair at once is
    /// [`ErrorKind::ConflictingCredentials`], nothing usable is
    /// [`ErrorKind::MissingCredentials`].
    #[instrument(skip(self, options), fields(base_url = %self.base_url()))]
    pub async fn authenticate(&mut self, options: AuthOptions) -> Result<()> {
        let resolved = self.resolve_credentials(&options)?;
        self.authenticate_resolved(
            resolved,
            options.identity_service_url,
            options.cache,
            true,
        )
        .await
    }

    fn resolve_credentials(&self, options: &AuthOptions) -> Result<ResolvedCredentials> {
        // Each field falls back to the environment and then to what a
        // previous authenticate() left behind.
        ResolvedCredentials::resolve_with_remembered(
            options.username.as_deref(),
            options.password.as_deref(),
            options.client_id.as_deref(),
            options.client_secret.as_deref(),
            &EnvCredentials::capture(),
            self.credentials.as_ref(),
        )
        .map_err(Into::into)
    }

    pub(crate) async fn authenticate_resolved(
        &mut self,
        credentials: ResolvedCredentials,
        identity_service_url: Option<String>,
        cache: bool,
        count_calls: bool,
    ) -> Result<()> {
        if identity_service_url.is_some() {
            self.identity_service_url = identity_service_url;
        }

        match &credentials {
            ResolvedCredentials::Session {
                username, password, ..
            } => {
                let (username, password) = (username.clone(), password.clone());
                self.session_authentication(&username, &password, cache, count_calls)
                    .await?;
            }
            ResolvedCredentials::OAuth {
                client_id,
                client_secret,
                ..
            } => {
                let (client_id, client_secret) = (client_id.clone(), client_secret.clone());
                self.oauth_authentication(&client_id, &client_secret, cache, count_calls)
                    .await?;
            }
        }

        self.credentials = Some(credentials);
        Ok(())
    }

    /// Forms-based login. With caching, stored cookies are installed and
    /// probed first; a clean probe means zero calls to the login endpoint.
    async fn session_authentication(
        &mut self,
        username: &str,
        password: &str,
        cache: bool,
        count_calls: bool,
    ) -> Result<()> {
        self.oauth_token = None;

        if cache {
            if let Some(CredentialPayload::Session(cookies)) =
                self.store.load(self.base_url(), username)
            {
                self.cookies = cookies;
                match self.probe_session(count_calls).await {
                    Ok(true) => {
                        debug!(%username, "Cached session cookies are valid");
                        return Ok(());
                    }
                    Ok(false) => info!("Cached session rejected; performing live login"),
                    Err(e) => warn!(error = %e, "Session probe failed; performing live login"),
                }
            }
        }

        self.cookies.clear();

        if password.is_empty() {
            return Err(Error::new(ErrorKind::InvalidCredentials(
                "password must not be empty for a live login".to_string(),
            )));
        }

        let body = json!({"UserName": username, "UserPassword": password});
        let options = RequestOptions::new().json_value(body);
        let response = self
            .dispatch(RequestMethod::Post, LOGIN_ENDPOINT, &options, false)
            .await?;
        if count_calls {
            self.bump_api_calls();
        }

        let new_cookies = response.set_cookies();
        let payload: serde_json::Value = response.json().await?;

        // Creatio reports bad credentials inside a 200 body.
        if let Some(exception) = payload.get("Exception").filter(|v| !v.is_null()) {
            let message = exception
                .get("Message")
                .and_then(|m| m.as_str())
                .unwrap_or("login rejected")
                .to_string();
            return Err(Error::new(ErrorKind::Authentication(message)));
        }

        self.cookies.extend(new_cookies);
        self.persist_cookies_for(username);
        info!(%username, "Session authentication succeeded");
        Ok(())
    }

    /// Validate the installed cookie jar with a cheap count request. Valid
    /// means a success status that was not redirected to the login page.
    async fn probe_session(&mut self, count_calls: bool) -> Result<bool> {
        let request = self.apply_auth_headers(
            RequestBuilder::new(RequestMethod::Get, self.endpoint_url(PROBE_ENDPOINT)),
            PROBE_ENDPOINT,
        );
        let response = self.transport.execute(request).await?;
        if count_calls {
            self.bump_api_calls();
        }
        Ok(response.is_success() && !response.was_redirected())
    }

    /// Client-credentials grant against the identity service. A cached
    /// token is installed without validation; the request executor deals
    /// with a dead token by re-authenticating once.
    async fn oauth_authentication(
        &mut self,
        client_id: &str,
        client_secret: &str,
        cache: bool,
        count_calls: bool,
    ) -> Result<()> {
        self.cookies.clear();

        if cache {
            if let Some(CredentialPayload::OAuth(token)) =
                self.store.load(self.base_url(), client_id)
            {
                debug!(%client_id, "Using cached OAuth token");
                self.oauth_token = Some(token.access_token);
                return Ok(());
            }
        }

        let token_url = match &self.identity_service_url {
            Some(url) => format!("{}/connect/token", url.trim_end_matches('/')),
            None => format!(
                "{}/connect/token",
                derive_identity_service_url(self.base_url())
            ),
        };

        let mut form = HashMap::new();
        form.insert("grant_type".to_string(), "client_credentials".to_string());
        form.insert("client_id".to_string(), client_id.to_string());
        form.insert("client_secret".to_string(), client_secret.to_string());

        let request = RequestBuilder::new(RequestMethod::Post, token_url).form(form);
        let response = self.transport.execute(request).await?;
        if count_calls {
            self.bump_api_calls();
        }

        if !response.is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::new(ErrorKind::Authentication(format!(
                "token endpoint returned {status}: {message}"
            ))));
        }

        let payload: serde_json::Value = response.json().await?;
        let has_token = payload
            .get("access_token")
            .and_then(|t| t.as_str())
            .is_some_and(|t| !t.is_empty());
        if !has_token {
            return Err(Error::new(ErrorKind::Authentication(
                "token response did not contain an access_token".to_string(),
            )));
        }

        let token: OAuthToken = serde_json::from_value(payload)?;
        self.oauth_token = Some(token.access_token.clone());

        if let Err(e) = self
            .store
            .store(self.base_url(), client_id, CredentialPayload::OAuth(token))
        {
            warn!(error = %e, "Failed to persist OAuth token");
        }
        info!(%client_id, "OAuth authentication succeeded");
        Ok(())
    }
}

/// Derive the identity service URL for a cloud environment: the tenant
/// subdomain gets an `-is` suffix.
pub(crate) fn derive_identity_service_url(base_url: &str) -> String {
    base_url.replace(".creatio.com", "-is.creatio.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_service_url_derivation() {
        assert_eq!(
            derive_identity_service_url("https://myorg.creatio.com"),
            "https://myorg-is.creatio.com"
        );
        // Self-hosted URLs pass through untouched; callers override
        // explicitly for those.
        assert_eq!(
            derive_identity_service_url("https://crm.example.org"),
            "https://crm.example.org"
        );
    }

    #[test]
    fn auth_options_debug_redacts_secrets() {
        let options = AuthOptions::new()
            .username("alice")
            .password("hunter2")
            .client_secret("sssh");
        let debug = format!("{options:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sssh"));
    }

    #[test]
    fn auth_options_default_enables_cache() {
        assert!(AuthOptions::new().cache);
        assert!(!AuthOptions::new().cache(false).cache);
    }
}
