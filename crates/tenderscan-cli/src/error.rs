//! Error types for the CLI application.

use tenderscan_extractor::{ChunkingError, PipelineError};
use tenderscan_llm::LlmError;
use tenderscan_structure::StructureError;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Structure detection failed
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// Chunking failed
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// Pipeline aborted
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Recorded responses could not be loaded
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The document failed validation
    #[error("Document {document_id} rejected: {failed} P0 check(s) failed")]
    Rejected {
        /// Rejected document
        document_id: String,
        /// Failed P0 checks
        failed: usize,
    },
}
