//! HTTP plumbing shared by the linkgate gateway, SDK and CLI: a streaming upstream
//! fetch plus small JSON helpers, optionally routed through a proxy.
//!
//! ```rust,no_run
//! use linkgate_net::{Config, HttpClient};
//!
//! #[tokio::main]
//! async fn main() -> linkgate_net::Result<()> {
//!     let client = HttpClient::new(Config::default().with_timeout(10))?;
//!
//!     let upstream = client.fetch("https://example.com/file.zip").await?;
//!     println!("content-type: {:?}", upstream.content_type);
//!     let body = upstream.collect().await?;
//!     println!("{} bytes", body.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http_client;
pub mod upstream;

pub use config::{Config, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
pub use error::{NetError, Result};
pub use http_client::HttpClient;
pub use upstream::{ByteStream, Upstream};
pub use reqwest::Response;
