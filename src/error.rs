use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Invalid stream host: {0}")]
    InvalidHost(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Stream disconnected: {0}")]
    Disconnected(String),

    #[error("Not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, Error>;
