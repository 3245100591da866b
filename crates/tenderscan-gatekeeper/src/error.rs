//! Gatekeeper error types

use thiserror::Error;

/// Result type alias for gatekeeper operations
pub type Result<T> = std::result::Result<T, GatekeeperError>;

/// Errors that can occur during gatekeeper operations.
///
/// Schema violations and failed P0 checks are not errors; they are reported
/// in the [`ValidationReport`](crate::ValidationReport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatekeeperError {
    /// The assembled record could not be turned into JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for GatekeeperError {
    fn from(err: serde_json::Error) -> Self {
        GatekeeperError::Serialization(err.to_string())
    }
}
