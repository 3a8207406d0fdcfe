//! Delivery-link gateway: issues expiring, use-limited download links, streams their targets,
//! records who redeemed them and answers license checks for bound accounts.
//!
//! State lives in one checksummed JSON file per namespace (`tokens`, `bindings`, `logs`)
//! under the configured data directory.

pub mod access_log;
pub mod bindings;
pub mod config;
pub mod error;
pub mod identity;
pub mod links;
pub mod server;
pub mod store;
pub mod sweeper;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use server::{router, run, GatewayState};
