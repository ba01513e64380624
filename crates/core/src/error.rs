use thiserror::Error;

pub type WinbackResult<T> = Result<T, WinbackError>;

#[derive(Error, Debug)]
pub enum WinbackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("User source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Result recorder error: {0}")]
    Recorder(String),

    #[error("Invalid discount slab table: {0}")]
    InvalidSlabs(String),

    #[error("Invalid coupon pool: {0}")]
    InvalidCoupons(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for WinbackError {
    fn from(err: config::ConfigError) -> Self {
        WinbackError::Config(err.to_string())
    }
}
