//! # creatio-api
//!
//! A Creatio OData API client library for Rust.
//!
//! This library provides session and OAuth authentication with an
//! encrypted multi-tenant credential cache, a retry-once request
//! executor, and typed helpers for collections, files, and dashboard
//! export.
//!
//! ## Security
//!
//! - Passwords, tokens, and cookie values are redacted in Debug output
//!   and kept out of error messages
//! - Instrumented spans skip credential parameters
//! - Credentials are persisted only in encrypted form (AES-256-GCM)
//!
//! ## Crates
//!
//! - **creatio-client** - HTTP transport: request building, response
//!   handling, redirect and cookie inspection
//! - **creatio-auth** - Credentials: encrypted multi-tenant store,
//!   session vs OAuth resolution
//! - **creatio-odata** - The client proper: authentication flows, request
//!   executor, collections, files, dashboards
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use creatio_api::{AuthOptions, CreatioClient, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = CreatioClient::builder("https://myorg.creatio.com").build()?;
//!
//!     // Credentials fall back to CREATIO_USERNAME / CREATIO_PASSWORD
//!     client.authenticate(AuthOptions::new()).await?;
//!
//!     let contacts: serde_json::Value = client
//!         .get_collection_data("Contact", QueryOptions::new().top(10).select("Id,Name"))
//!         .await?
//!         .json()
//!         .await?;
//!     println!("{contacts}");
//!
//!     Ok(())
//! }
//! ```

// Re-export all crates for convenient access
pub use creatio_auth as auth;
pub use creatio_client as client;
pub use creatio_odata as odata;

// Re-export commonly used types at the top level
pub use creatio_auth::{CredentialStore, ResolvedCredentials, SecretCipher};
pub use creatio_client::{ClientConfig, HttpTransport, RequestMethod, Response};
pub use creatio_odata::{AuthOptions, CreatioClient, QueryOptions, RequestOptions};
