//! Error types for nagare.

use thiserror::Error;

/// nagare error type.
///
/// Handler failures are not represented here: they are caught and logged by
/// the dispatcher and never leave it.
#[derive(Error, Debug)]
pub enum NagareError {
    /// The log store or checkpoint store could not be reached.
    /// Fatal to the listener; supervision is expected to restart the process.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    /// A value could not be encoded into a stream payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store answered with a shape we do not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file, sink files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading or writing configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for nagare operations.
pub type NagareResult<T> = Result<T, NagareError>;
