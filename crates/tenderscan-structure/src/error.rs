//! Error types for structure detection

use thiserror::Error;

/// Result type alias for structure detection
pub type Result<T> = std::result::Result<T, StructureError>;

/// Degenerate input that cannot produce a structural index
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StructureError {
    /// Nothing but whitespace
    #[error("Document text is empty")]
    EmptyText,

    /// Input exceeds the configured size limit
    #[error("Document text is {len} bytes, limit is {max}")]
    TextTooLarge {
        /// Actual length
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Detected elements do not nest cleanly
    #[error("Inconsistent structure: {0}")]
    Inconsistent(String),
}
