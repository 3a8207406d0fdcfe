pub mod client;
pub mod error;
pub mod licenses;
pub mod links;
pub mod locator;
pub mod logs;
pub mod wire;

pub use client::GatewayClient;
pub use error::{Result, SdkError};
pub use locator::Locator;
pub use logs::LogEntry;
