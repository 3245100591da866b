//! Tenderscan Domain Layer
//!
//! This crate contains the data model shared by every stage of the tender
//! analysis pipeline, plus the small pure helpers that more than one stage
//! relies on.
//!
//! ## Key Concepts
//!
//! - **Structural Index**: headings, tables, list items, footnotes and
//!   references detected in a document, stored as an arena with
//!   index-based parent/child links
//! - **Chunk**: a bounded, possibly discontiguous span of the source text;
//!   all chunks together reconstruct the source exactly
//! - **Extraction Result**: the decoded JSON fragment for one chunk
//! - **Conflict**: a disagreement between chunks, preserved as output data
//! - **Assembled Document**: the merged record where every leaf carries
//!   provenance
//!
//! ## Architecture
//!
//! - Pure data and pure functions only
//! - No I/O and no async
//! - Trait definitions for external collaborators (`LlmProvider`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembled;
pub mod chunk;
pub mod conflict;
pub mod document;
pub mod extraction;
pub mod normalize;
pub mod provenance;
pub mod span;
pub mod structure;
pub mod traits;

// Re-exports for convenience
pub use assembled::{
    AssembledDocument, AssembledFootnote, AssembledRow, AssembledTable, AssemblyMetadata, Leaf,
    ReferenceRecord, SourcedRecord, SourcedValue,
};
pub use chunk::{Chunk, ChunkId, ChunkKind, ChunkSegment, PartOf};
pub use conflict::{Conflict, ConflictKind, ConflictValue, Severity};
pub use document::{Document, DocumentId};
pub use extraction::{scalar_entries, ExtractionOutcome, ExtractionResult, Mention, Section};
pub use provenance::Provenance;
pub use span::Span;
pub use structure::{
    ElementId, ElementKind, ElementType, Footnote, Heading, HeadingStyle, ListItem, MarkerClass,
    MarkerLink, Reference, ReferenceFamily, ReferenceTarget, Resolution, StructuralElement,
    StructuralIndex, Table, TableFormat, TableRow,
};
pub use traits::{Completion, LlmProvider, TokenUsage};
