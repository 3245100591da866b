//! Conflicts between chunks. Conflicts are output data, not errors.

use crate::chunk::ChunkId;
use crate::extraction::Section;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How urgently a conflict needs a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Prices and dates
    Critical,
    /// Contact and administrative fields
    Warning,
    /// Everything else
    Info,
}

/// Shape of the disagreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// One normalized value contains the other
    PartialMatch,
    /// Unrelated values
    DifferentValues,
}

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictValue {
    /// Value as extracted
    pub value: Value,
    /// Chunk that reported it
    pub source_chunk_id: ChunkId,
    /// Located source range, when found
    #[serde(default)]
    pub source_span: Option<Span>,
}

/// Two or more chunks disagreeing on the same field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Field path, e.g. `unit_prices[bread].unit_price`
    pub field_path: String,
    /// Section the field belongs to
    pub section: Section,
    /// Every reported value, one entry per chunk and distinct value
    pub values: Vec<ConflictValue>,
    /// Urgency
    pub severity: Severity,
    /// Shape of the disagreement
    pub kind: ConflictKind,
}

impl Conflict {
    /// Chunks involved in this conflict
    pub fn chunk_ids(&self) -> Vec<&ChunkId> {
        let mut ids: Vec<&ChunkId> = self.values.iter().map(|v| &v.source_chunk_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
