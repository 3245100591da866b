//! Error types for chunking, extraction and the pipeline

use tenderscan_gatekeeper::GatekeeperError;
use tenderscan_structure::StructureError;
use thiserror::Error;

/// Errors raised while extracting one chunk
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Provider call exceeded its deadline
    #[error("Extraction timed out after {ms} ms")]
    Timeout {
        /// Deadline in milliseconds
        ms: u64,
    },

    /// Response could not be decoded, even after repair
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Decoded JSON is not an extraction fragment
    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    Join(String),
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

/// Chunking post-condition violations and unchunkable input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    /// Character sums disagree with the source
    #[error(
        "Character count mismatch: source has {expected} chars, chunks rebuild {actual} \
         ({declared_overlap} declared overlap)"
    )]
    CharacterCountMismatch {
        /// Source characters
        expected: usize,
        /// Chunk characters minus declared overlap
        actual: usize,
        /// Declared overlap characters
        declared_overlap: usize,
    },

    /// Owned segments leave a hole or cover a range twice
    #[error("Owned segments do not tile the source at byte {offset}")]
    CoverageGap {
        /// First offset where tiling breaks
        offset: usize,
    },

    /// Chunk text or counts disagree with its segments
    #[error("Chunk {chunk_id} does not match its segments")]
    SegmentMismatch {
        /// Offending chunk
        chunk_id: String,
    },

    /// An element that may not be split is larger than a chunk
    #[error("{element} has {chars} chars, more than the {max_chars} char limit")]
    AtomicElementTooLarge {
        /// Description of the element
        element: String,
        /// Its size
        chars: usize,
        /// Chunk limit
        max_chars: usize,
    },

    /// `max_chars` of zero
    #[error("max_chars must be greater than 0")]
    InvalidMaxChars,

    /// `max_rows` of zero
    #[error("max_rows must be greater than 0")]
    InvalidMaxRows,
}

/// Document-level failures that abort a pipeline run before extraction
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Structure detection rejected the input
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// Chunking failed or violated its post-condition
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// The assembled record could not be validated
    #[error(transparent)]
    Validation(#[from] GatekeeperError),

    /// Invalid pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, ExtractorError>;
