//! Provenance: where an assembled value came from

use crate::chunk::ChunkId;
use crate::span::Span;
use serde::{Deserialize, Serialize};

/// A single provenance entry tracking the source of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Chunk the value was extracted from
    pub source_chunk_id: ChunkId,

    /// Absolute source range of the value, when it could be located
    #[serde(default)]
    pub source_span: Option<Span>,
}

impl Provenance {
    /// Provenance naming only the chunk
    pub fn new(source_chunk_id: ChunkId) -> Self {
        Self {
            source_chunk_id,
            source_span: None,
        }
    }

    /// Attach a located source range
    pub fn with_span(mut self, span: Span) -> Self {
        self.source_span = Some(span);
        self
    }
}
