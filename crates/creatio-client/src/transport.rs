//! Single-shot HTTP transport built on reqwest.

use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::request::{RequestBody, RequestBuilder};
use crate::response::Response;

/// HTTP transport for the Creatio OData API.
///
/// Executes exactly one attempt per request; the caller owns any replay
/// policy. Redirects are followed (up to reqwest's default limit) and the
/// wrapped [`Response`] records whether that happened.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        Ok(Self { inner, config })
    }

    /// Create a new transport with default configuration.
    pub fn default_transport() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a request once and wrap the response.
    ///
    /// Non-2xx statuses are returned as `Ok(Response)`; callers decide
    /// whether a given status is an error for their operation.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let requested_url = url::Url::parse(&request.url)?;

        let mut req = self.inner.request(request.method.to_reqwest(), &request.url);

        if let Some(ref token) = request.bearer_token {
            req = req.bearer_auth(token);
        }

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if !request.query_params.is_empty() {
            req = req.query(&request.query_params);
        }

        if let Some(ref body) = request.body {
            req = match body {
                RequestBody::Json(value) => req.json(value),
                RequestBody::Text(text) => req.body(text.clone()),
                RequestBody::Bytes(bytes) => req.body(bytes.clone()),
                // Content-Type was set by the builder's body setter.
                RequestBody::Form(data) => req.body(serde_urlencoded::to_string(data)?),
            };
        }

        if self.config.enable_tracing {
            debug!(method = %request.method, url = %request.url, "Sending request");
        }

        let response = req.send().await?;

        if self.config.enable_tracing {
            let status = response.status().as_u16();
            if response.status().is_success() {
                debug!(status, "Response received");
            } else {
                info!(status, "Non-success response");
            }
        }

        Ok(Response::new(response, requested_url))
    }
}
