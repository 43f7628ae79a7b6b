//! # creatio-odata
//!
//! Client for the Creatio OData API with dual-mode authentication.
//!
//! ## Features
//!
//! - **Session authentication** - forms login with encrypted multi-tenant
//!   cookie caching and probe-based validation
//! - **OAuth authentication** - client-credentials grant against the
//!   identity service, token cached per (environment, client id)
//! - **Retry-once executor** - a 401/403 triggers exactly one silent
//!   re-authentication and one replay
//! - **Collections** - CRUD on OData collections with `$`-parameter
//!   query shaping
//! - **Files** - attachment download and chunk-header upload with
//!   cleanup on failure
//! - **Dashboards** - widget export to Excel through the report service
//!
//! ## Example
//!
//! ```rust,ignore
//! use creatio_odata::{AuthOptions, CreatioClient, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), creatio_odata::Error> {
//!     let mut client = CreatioClient::builder("https://myorg.creatio.com").build()?;
//!
//!     client
//!         .authenticate(AuthOptions::new().username("supervisor").password("secret"))
//!         .await?;
//!
//!     let cases = client
//!         .get_collection_data("Case", QueryOptions::new().top(10).select("Id,Number"))
//!         .await?
//!         .json::<serde_json::Value>()
//!         .await?;
//!     println!("{cases}");
//!
//!     Ok(())
//! }
//! ```

mod auth;
mod client;
mod collections;
mod dashboards;
mod error;
mod files;

pub use auth::AuthOptions;
pub use client::{CreatioClient, CreatioClientBuilder, RequestOptions};
pub use collections::QueryOptions;
pub use error::{Error, ErrorKind, Result};

// Re-exported for callers building raw requests.
pub use creatio_client::{ClientConfig, RequestMethod, Response};
