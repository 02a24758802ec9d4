use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaultlineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A stream payload that does not split into exactly the expected number of fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed exception record: expected {expected} fields, got {actual}")]
pub struct DecodeError {
    pub expected: usize,
    pub actual: usize,
}

/// The summary store could not be reached or rejected the operation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}
