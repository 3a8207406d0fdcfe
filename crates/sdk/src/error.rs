use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Network error: {0}")]
    Network(#[from] linkgate_net::NetError),

    #[error("Gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
}
