//! HTTP request description, decoupled from reqwest until execution.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl RequestMethod {
    fn as_str(self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
        }
    }

    /// Convert to the reqwest method.
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body content. Each variant implies a Content-Type, set when
/// the body is attached.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
    Form(HashMap<String, String>),
}

impl RequestBody {
    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Text(_) => "text/plain",
            RequestBody::Bytes(_) => "application/octet-stream",
            RequestBody::Form(_) => "application/x-www-form-urlencoded",
        }
    }
}

/// One request, accumulated before a single execution by the transport.
///
/// Headers are a map, so setting the same name twice keeps the last
/// value; query parameters repeat in order.
#[derive(Debug)]
pub struct RequestBuilder {
    pub(crate) method: RequestMethod,
    pub(crate) url: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) query_params: Vec<(String, String)>,
    pub(crate) body: Option<RequestBody>,
    pub(crate) bearer_token: Option<String>,
}

impl RequestBuilder {
    /// Start a request for the given method and URL.
    pub fn new(method: RequestMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            query_params: Vec::new(),
            body: None,
            bearer_token: None,
        }
    }

    /// Authenticate with a bearer token.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Append several query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    fn with_body(mut self, body: RequestBody) -> Self {
        self.headers
            .insert("Content-Type".to_string(), body.content_type().to_string());
        self.body = Some(body);
        self
    }

    /// Attach a serialized JSON body.
    pub fn json<T: Serialize>(self, body: &T) -> Result<Self> {
        Ok(self.with_body(RequestBody::Json(serde_json::to_value(body)?)))
    }

    /// Attach a raw JSON body.
    pub fn json_value(self, body: serde_json::Value) -> Self {
        self.with_body(RequestBody::Json(body))
    }

    /// Attach a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Self {
        self.with_body(RequestBody::Text(body.into()))
    }

    /// Attach a binary body (file uploads).
    pub fn bytes(self, body: impl Into<Bytes>) -> Self {
        self.with_body(RequestBody::Bytes(body.into()))
    }

    /// Attach a url-encoded form body (the OAuth token endpoint).
    pub fn form(self, data: HashMap<String, String>) -> Self {
        self.with_body(RequestBody::Form(data))
    }

    /// The target URL of this request.
    pub fn url(&self) -> &str {
        &self.url
    }
}
