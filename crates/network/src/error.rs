use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetError>;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Upstream responded with status {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetError::Timeout
        } else if e.is_connect() {
            NetError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            NetError::Status(status.as_u16())
        } else {
            NetError::Http(e.to_string())
        }
    }
}
