//! Error types for meshcast-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// An event clock with counter 0 arrived on the wire (counters are
    /// strictly positive)
    #[error("event clock counter must be strictly positive")]
    ZeroCounter,
}
