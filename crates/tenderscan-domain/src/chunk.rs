//! Chunks: bounded text segments sent to the extractor

use crate::span::Span;
use crate::structure::ElementId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk identifier, stable for a given chunking of a document (`c0003`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Identifier for the chunk at `index`
    pub fn from_index(index: usize) -> Self {
        Self(format!("c{:04}", index))
    }

    /// Wrap an arbitrary identifier
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One source range making up part of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSegment {
    /// Source range
    pub span: Span,
    /// Repeats text owned by another chunk (a table header, a sheet banner)
    #[serde(default)]
    pub overlap: bool,
}

impl ChunkSegment {
    /// Segment owned by this chunk
    pub fn owned(span: Span) -> Self {
        Self {
            span,
            overlap: false,
        }
    }

    /// Segment repeated from elsewhere and declared as overlap
    pub fn repeated(span: Span) -> Self {
        Self {
            span,
            overlap: true,
        }
    }
}

/// Marks a chunk as holding one fragment of a larger element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartOf {
    /// Element being fragmented, when it comes from the structural index
    pub element: Option<ElementId>,
    /// Group label shared by all fragments (`table:e4`, `sheet:Prices`)
    pub label: String,
    /// 1-based fragment number
    pub part: usize,
    /// Number of fragments
    pub total: usize,
}

/// Dominant content of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Prose, lists, headings
    Text,
    /// Holds at least one whole table
    Table,
    /// Holds a fragment of a split table
    TableFragment,
    /// Prose mixed with tables
    Mixed,
    /// Rows of a spreadsheet sheet
    Sheet,
}

/// A bounded text segment.
///
/// `text` is the concatenation of the segment texts in order. The character
/// accounting invariant is `char_count - overlap_chars` summed over all
/// chunks equals the source character count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier
    pub id: ChunkId,
    /// Position in the chunk sequence
    pub index: usize,
    /// Chunk text
    pub text: String,
    /// Source ranges in text order
    pub segments: Vec<ChunkSegment>,
    /// Declared character count of `text`
    pub char_count: usize,
    /// Characters in overlap segments
    pub overlap_chars: usize,
    /// Elements this chunk holds only part of
    #[serde(default)]
    pub part_of: Vec<PartOf>,
    /// Dominant content
    pub kind: ChunkKind,
    /// Nearest heading at the chunk start
    pub heading_context: Option<String>,
    /// Rough token estimate for budgeting
    pub token_estimate: usize,
}

/// Characters per model token used for estimates
pub const CHARS_PER_TOKEN: f64 = 1.5;

impl Chunk {
    /// Build a chunk from segments over `source`.
    ///
    /// Returns `None` when a segment does not fit the source text.
    pub fn from_segments(
        index: usize,
        source: &str,
        segments: Vec<ChunkSegment>,
        kind: ChunkKind,
    ) -> Option<Self> {
        let mut text = String::new();
        let mut overlap_chars = 0;
        for segment in &segments {
            let piece = segment.span.slice(source)?;
            if segment.overlap {
                overlap_chars += piece.chars().count();
            }
            text.push_str(piece);
        }
        let char_count = text.chars().count();
        Some(Self {
            id: ChunkId::from_index(index),
            index,
            token_estimate: (char_count as f64 / CHARS_PER_TOKEN).ceil() as usize,
            text,
            segments,
            char_count,
            overlap_chars,
            part_of: Vec::new(),
            kind,
            heading_context: None,
        })
    }

    /// Smallest source range covering the owned segments
    pub fn span(&self) -> Span {
        let owned = self.segments.iter().filter(|s| !s.overlap);
        let start = owned.clone().map(|s| s.span.start).min().unwrap_or(0);
        let end = owned.map(|s| s.span.end).max().unwrap_or(start);
        Span::new(start, end)
    }

    /// Owned segments only
    pub fn owned_segments(&self) -> impl Iterator<Item = &Span> {
        self.segments.iter().filter(|s| !s.overlap).map(|s| &s.span)
    }

    /// Characters this chunk contributes to the source total
    pub fn owned_chars(&self) -> usize {
        self.char_count.saturating_sub(self.overlap_chars)
    }

    /// Map a byte offset in `text` back to a source offset
    pub fn source_offset(&self, text_offset: usize) -> Option<usize> {
        let mut consumed = 0;
        for segment in &self.segments {
            let len = segment.span.len();
            if text_offset < consumed + len {
                return Some(segment.span.start + (text_offset - consumed));
            }
            consumed += len;
        }
        None
    }

    /// Fragment tag for `element`, if this chunk holds part of it
    pub fn part_of_element(&self, element: ElementId) -> Option<&PartOf> {
        self.part_of.iter().find(|p| p.element == Some(element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_segments_counts_overlap() {
        let source = "HEAD\nrow1\nrow2\n";
        let chunk = Chunk::from_segments(
            1,
            source,
            vec![
                ChunkSegment::repeated(Span::new(0, 5)),
                ChunkSegment::owned(Span::new(10, 15)),
            ],
            ChunkKind::TableFragment,
        )
        .unwrap();
        assert_eq!(chunk.text, "HEAD\nrow2\n");
        assert_eq!(chunk.char_count, 10);
        assert_eq!(chunk.overlap_chars, 5);
        assert_eq!(chunk.owned_chars(), 5);
        assert_eq!(chunk.span(), Span::new(10, 15));
        assert_eq!(chunk.id.as_str(), "c0001");
    }

    #[test]
    fn test_source_offset_maps_through_segments() {
        let source = "HEAD\nrow1\nrow2\n";
        let chunk = Chunk::from_segments(
            0,
            source,
            vec![
                ChunkSegment::repeated(Span::new(0, 5)),
                ChunkSegment::owned(Span::new(10, 15)),
            ],
            ChunkKind::TableFragment,
        )
        .unwrap();
        assert_eq!(chunk.source_offset(0), Some(0));
        assert_eq!(chunk.source_offset(6), Some(11));
        assert_eq!(chunk.source_offset(10), None);
    }

    #[test]
    fn test_from_segments_rejects_bad_span() {
        assert!(Chunk::from_segments(
            0,
            "short",
            vec![ChunkSegment::owned(Span::new(0, 50))],
            ChunkKind::Text
        )
        .is_none());
    }
}
