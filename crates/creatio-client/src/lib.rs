//! # creatio-client
//!
//! Core HTTP client infrastructure for the Creatio OData API.
//!
//! This crate provides the foundational HTTP transport with:
//! - Request building (headers, query parameters, JSON/form/binary bodies)
//! - Response handling with Set-Cookie extraction and redirect detection
//! - Connection pooling and timeouts
//! - Request/response tracing
//!
//! The transport executes exactly one attempt per request. The
//! re-authenticate-and-replay policy for expired sessions lives in
//! `creatio-odata`, which owns the authentication state and sits on top
//! of this crate.

mod config;
mod error;
mod request;
mod response;
mod transport;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, ErrorKind, Result};
pub use request::{RequestBody, RequestBuilder, RequestMethod};
pub use response::Response;
pub use transport::HttpTransport;

/// User-Agent value sent with every request.
pub const USER_AGENT: &str = concat!("creatio-api/", env!("CARGO_PKG_VERSION"));
