//! HTTP response handling with cookie extraction and redirect detection.

use serde::de::DeserializeOwned;

use crate::error::Result;

/// Wrapper around an HTTP response.
///
/// Remembers the URL the request was issued against so callers can tell
/// whether the transport followed a redirect (Creatio answers probe
/// requests with a redirect to the login page when the session is stale).
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
    requested_url: url::Url,
}

impl Response {
    /// Create a new Response from a reqwest::Response.
    pub(crate) fn new(inner: reqwest::Response, requested_url: url::Url) -> Self {
        Self {
            inner,
            requested_url,
        }
    }

    /// Get the HTTP status code.
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        self.inner.status().is_success()
    }

    /// Returns true if the final URL differs from the requested URL,
    /// i.e. at least one redirect was followed.
    pub fn was_redirected(&self) -> bool {
        let final_url = self.inner.url();
        final_url.path() != self.requested_url.path()
            || final_url.host_str() != self.requested_url.host_str()
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get the Content-Disposition header.
    pub fn content_disposition(&self) -> Option<&str> {
        self.header("content-disposition")
    }

    /// Cookies set by this response, as (name, value) pairs parsed from
    /// every `Set-Cookie` header.
    pub fn set_cookies(&self) -> Vec<(String, String)> {
        self.inner
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect()
    }

    /// Get the response body as text.
    pub async fn text(self) -> Result<String> {
        self.inner.text().await.map_err(Into::into)
    }

    /// Get the response body as bytes.
    pub async fn bytes(self) -> Result<bytes::Bytes> {
        self.inner.bytes().await.map_err(Into::into)
    }

    /// Deserialize the response body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        self.inner.json().await.map_err(Into::into)
    }
}

/// Parse the `name=value` prefix of one Set-Cookie header.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("BPMCSRF=abc123; path=/; HttpOnly"),
            Some(("BPMCSRF".to_string(), "abc123".to_string()))
        );
        assert_eq!(
            parse_set_cookie(".ASPXAUTH=tok=en; Secure"),
            Some((".ASPXAUTH".to_string(), "tok=en".to_string()))
        );
        assert_eq!(parse_set_cookie("no-equals-sign"), None);
        assert_eq!(parse_set_cookie("=orphan-value"), None);
    }

    #[tokio::test]
    async fn test_set_cookies_and_redirect_flag() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                // append keeps both Set-Cookie headers; insert would
                // replace the first.
                ResponseTemplate::new(200)
                    .append_header("Set-Cookie", "BPMCSRF=csrf-token; path=/")
                    .append_header("Set-Cookie", ".ASPXAUTH=auth-cookie; HttpOnly"),
            )
            .mount(&server)
            .await;

        let transport = crate::HttpTransport::new(crate::ClientConfig::default()).unwrap();
        let response = transport
            .execute(crate::RequestBuilder::new(
                crate::RequestMethod::Get,
                format!("{}/data", server.uri()),
            ))
            .await
            .unwrap();

        assert!(!response.was_redirected());
        let cookies = response.set_cookies();
        assert!(cookies.contains(&("BPMCSRF".to_string(), "csrf-token".to_string())));
        assert!(cookies.contains(&(".ASPXAUTH".to_string(), "auth-cookie".to_string())));
    }

    #[tokio::test]
    async fn test_redirect_is_detected() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/Login/NuiLogin.aspx"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Login/NuiLogin.aspx"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = crate::HttpTransport::new(crate::ClientConfig::default()).unwrap();
        let response = transport
            .execute(crate::RequestBuilder::new(
                crate::RequestMethod::Get,
                format!("{}/protected", server.uri()),
            ))
            .await
            .unwrap();

        assert!(response.is_success());
        assert!(response.was_redirected());
    }
}
