//! Text chunking for extraction
//!
//! Every chunker here produces chunks whose owned segments tile the source
//! exactly. The only repeated text is declared overlap (a table header or a
//! sheet banner at the head of a continuation chunk), and
//! [`validate_character_count`] runs as a post-condition of every chunking
//! call.
//!
//! Structure-aware chunking packs the source greedily. When the budget runs
//! out it cuts at the best boundary in the upper half of the current chunk,
//! preferring (in order) the start of a heading, a paragraph break, the end
//! of a table, and any line end. Tables and their trailing footnote
//! definitions are never cut unless they alone exceed the budget, and no
//! cut falls between a heading line and the first `heading_min_body_chars`
//! characters of its body.

pub use crate::error::ChunkingError;

use serde::{Deserialize, Serialize};
use tenderscan_domain::{
    Chunk, ChunkId, ChunkKind, ChunkSegment, ElementId, ElementKind, PartOf, Span,
    StructuralIndex, Table,
};
use tracing::{debug, info};

/// Result type for chunking operations
pub type Result<T> = std::result::Result<T, ChunkingError>;

/// Default chunk size: 6000 tokens at 1.5 characters per token
pub const DEFAULT_MAX_CHARS: usize = 9_000;

/// Default data rows per spreadsheet chunk
pub const DEFAULT_MAX_ROWS: usize = 200;

/// Default body characters kept with each heading line
pub const DEFAULT_HEADING_MIN_BODY_CHARS: usize = 200;

/// Chunking limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOptions {
    /// Maximum characters per chunk, declared overlap included
    pub max_chars: usize,
    /// Maximum data rows per spreadsheet chunk
    pub max_rows: usize,
    /// Body characters that must share a chunk with their heading line
    pub heading_min_body_chars: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_rows: DEFAULT_MAX_ROWS,
            heading_min_body_chars: DEFAULT_HEADING_MIN_BODY_CHARS,
        }
    }
}

impl ChunkOptions {
    /// Options with a chunk size and default glue and row limits
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            ..Self::default()
        }
    }

    /// Set the heading glue length
    pub fn with_heading_min_body_chars(mut self, chars: usize) -> Self {
        self.heading_min_body_chars = chars;
        self
    }

    /// Set the spreadsheet row limit
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows;
        self
    }
}

/// One spreadsheet tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    /// Tab name
    pub name: String,
    /// Column names
    pub header: Vec<String>,
    /// Data rows
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// Input shapes accepted by [`chunk`]
#[derive(Debug, Clone, Copy)]
pub enum ChunkInput<'a> {
    /// Plain text without structural information
    Text(&'a str),
    /// Text with its structural index
    Structured {
        /// Source text
        text: &'a str,
        /// Index detected from `text`
        index: &'a StructuralIndex,
    },
    /// Spreadsheet tabs
    Sheets(&'a [Sheet]),
}

/// Chunks together with the text their spans point into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedText {
    /// Source of truth for the spans; the rendered text for sheets
    pub text: String,
    /// Chunks in order
    pub chunks: Vec<Chunk>,
}

/// Outcome of the character accounting post-condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterCountReport {
    /// Characters in the source
    pub original_chars: usize,
    /// Sum of chunk character counts
    pub chunk_chars: usize,
    /// Sum of declared overlap
    pub declared_overlap: usize,
    /// Number of chunks
    pub chunk_count: usize,
}

// ==================== helpers ====================

/// Byte offset `n` characters after `from`, capped at the end of `text`
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| from + i)
}

fn char_len(text: &str, span: Span) -> usize {
    span.slice(text).map_or(0, |s| s.chars().count())
}

/// Line spans including their newline; they tile `text`
fn line_spans(text: &str) -> Vec<Span> {
    let mut out = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        out.push(Span::new(offset, offset + raw.len()));
        offset += raw.len();
    }
    out
}

fn is_blank(text: &str, span: Span) -> bool {
    span.slice(text).is_none_or(|s| s.trim().is_empty())
}

// ==================== planning ====================

/// Preference of a cut point; later variants win
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    LineEnd,
    AfterTable,
    ParagraphBreak,
    BeforeHeading,
}

/// A table with its caption and trailing footnote definitions
#[derive(Debug, Clone)]
struct TableAtom {
    id: ElementId,
    span: Span,
    rows_end: usize,
    header: Option<Span>,
    data_start: usize,
    row_cuts: Vec<usize>,
}

impl TableAtom {
    fn build(
        text: &str,
        index: &StructuralIndex,
        lines: &[Span],
        id: ElementId,
        element_span: Span,
        table: &Table,
        not_before: usize,
    ) -> Self {
        let first_line = lines
            .iter()
            .position(|l| l.start == element_span.start)
            .unwrap_or(0);
        let caption_start = table
            .caption
            .as_ref()
            .and_then(|_| {
                lines[first_line.saturating_sub(2)..first_line]
                    .iter()
                    .rev()
                    .find(|l| !is_blank(text, **l))
            })
            .map_or(element_span.start, |l| l.start);
        let start = caption_start.max(not_before).min(element_span.start);

        let mut end = element_span.end;
        let mut note_ends = Vec::new();
        let mut notes: Vec<Span> = index.footnotes().map(|(e, _)| e.span).collect();
        notes.sort();
        for note in notes {
            if note.start == end {
                end = note.end;
                note_ends.push(end);
            }
        }

        let header_pos = table.rows.iter().position(|r| !r.separator);
        let header = header_pos.map(|h| {
            let last = match table.rows.get(h + 1) {
                Some(next) if next.separator => next,
                _ => &table.rows[h],
            };
            Span::new(table.rows[h].span.start, last.span.end)
        });
        let data_start = header.map_or(element_span.start, |h| h.end);

        let mut row_cuts: Vec<usize> = table
            .data_rows()
            .map(|(_, row)| row.span.end)
            .filter(|cut| *cut > data_start && *cut < end)
            .collect();
        if element_span.end < end && !row_cuts.contains(&element_span.end) {
            row_cuts.push(element_span.end);
        }
        // Footnote definitions may be split from one another
        row_cuts.extend(note_ends.into_iter().filter(|cut| *cut < end));

        Self {
            id,
            span: Span::new(start, end),
            rows_end: element_span.end,
            header,
            data_start,
            row_cuts,
        }
    }

    fn interior(&self, offset: usize) -> bool {
        self.span.start < offset && offset < self.span.end
    }
}

/// One planned chunk before it is materialized
#[derive(Debug, Clone, Copy)]
struct Piece {
    overlap: Option<Span>,
    owned: Span,
}

/// A heading line plus the body that must stay in its chunk
#[derive(Debug, Clone)]
struct GlueZone {
    span: Span,
    heading: String,
}

impl GlueZone {
    fn holds(&self, offset: usize) -> bool {
        self.span.start < offset && offset < self.span.end
    }
}

struct Planner<'a> {
    text: &'a str,
    max_chars: usize,
    cuts: Vec<(usize, Rank)>,
    row_cuts: Vec<usize>,
    tables: Vec<TableAtom>,
    zones: Vec<GlueZone>,
}

impl<'a> Planner<'a> {
    /// Line-end cut points only
    fn naive(text: &'a str, max_chars: usize) -> Self {
        let cuts = line_spans(text)
            .into_iter()
            .filter(|l| l.end < text.len())
            .map(|l| {
                let rank = if is_blank(text, l) {
                    Rank::ParagraphBreak
                } else {
                    Rank::LineEnd
                };
                (l.end, rank)
            })
            .collect();
        Self {
            text,
            max_chars,
            cuts,
            row_cuts: Vec::new(),
            tables: Vec::new(),
            zones: Vec::new(),
        }
    }

    fn structured(
        text: &'a str,
        index: &StructuralIndex,
        max_chars: usize,
        heading_min_body_chars: usize,
    ) -> Self {
        let lines = line_spans(text);

        let mut tables: Vec<TableAtom> = Vec::new();
        for (element, table) in index.tables() {
            let not_before = tables.last().map_or(0, |t| t.span.end);
            tables.push(TableAtom::build(
                text,
                index,
                &lines,
                element.id,
                element.span,
                table,
                not_before,
            ));
        }

        let zones: Vec<GlueZone> = index
            .headings()
            .map(|(element, heading)| {
                let body_end = advance_chars(text, heading.line.end, heading_min_body_chars);
                GlueZone {
                    span: Span::new(heading.line.start, body_end.min(element.span.end)),
                    heading: heading.display_text(),
                }
            })
            .collect();
        let glued = |offset: usize| zones.iter().any(|z| z.holds(offset));

        let cuts = lines
            .iter()
            .filter(|l| l.end < text.len())
            .filter(|l| !glued(l.end) && !tables.iter().any(|t| t.interior(l.end)))
            .map(|l| {
                let mut rank = Rank::LineEnd;
                if tables.iter().any(|t| t.span.end == l.end) {
                    rank = rank.max(Rank::AfterTable);
                }
                if is_blank(text, *l) {
                    rank = rank.max(Rank::ParagraphBreak);
                }
                if index.headings().any(|(_, h)| h.line.start == l.end) {
                    rank = rank.max(Rank::BeforeHeading);
                }
                (l.end, rank)
            })
            .collect();

        let mut row_cuts: Vec<usize> = tables
            .iter()
            .flat_map(|t| t.row_cuts.iter().copied())
            .filter(|cut| !glued(*cut))
            .collect();
        row_cuts.sort_unstable();

        Self {
            text,
            max_chars,
            cuts,
            row_cuts,
            tables,
            zones,
        }
    }

    /// Header repeated at the head of a chunk starting inside a split table
    fn header_overlap(&self, start: usize) -> Option<(ElementId, Span)> {
        self.tables.iter().find_map(|t| {
            let inside = t.span.start < start && t.data_start <= start && start < t.rows_end;
            match t.header {
                Some(header) if inside => Some((t.id, header)),
                _ => None,
            }
        })
    }

    fn plan(&self) -> Result<Vec<Piece>> {
        let len = self.text.len();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < len {
            let overlap = self.header_overlap(start);
            let overlap_chars = overlap.map_or(0, |(_, h)| char_len(self.text, h));
            let budget = self.max_chars.saturating_sub(overlap_chars);
            if budget == 0 {
                let id = overlap.map(|(id, _)| id.to_string()).unwrap_or_default();
                return Err(ChunkingError::AtomicElementTooLarge {
                    element: format!("header of table {}", id),
                    chars: overlap_chars,
                    max_chars: self.max_chars,
                });
            }

            let limit = advance_chars(self.text, start, budget);
            let end = if limit >= len {
                len
            } else {
                self.pick_cut(start, limit, budget)?
            };
            pieces.push(Piece {
                overlap: overlap.map(|(_, h)| h),
                owned: Span::new(start, end),
            });
            start = end;
        }
        Ok(pieces)
    }

    fn pick_cut(&self, start: usize, limit: usize, budget: usize) -> Result<usize> {
        let half = advance_chars(self.text, start, budget / 2);
        let in_range: Vec<(usize, Rank)> = self
            .cuts
            .iter()
            .copied()
            .filter(|(offset, _)| *offset > start && *offset <= limit)
            .collect();

        // A heading may start a short chunk; other cuts must reach the half mark
        if let Some((offset, _)) = in_range
            .iter()
            .filter(|(offset, rank)| *offset >= half || *rank == Rank::BeforeHeading)
            .max_by_key(|(offset, rank)| (*rank, *offset))
        {
            return Ok(*offset);
        }
        if let Some((offset, _)) = in_range.last() {
            return Ok(*offset);
        }
        if let Some(offset) = self
            .row_cuts
            .iter()
            .rev()
            .find(|cut| **cut > start && **cut <= limit)
        {
            return Ok(*offset);
        }
        if let Some(table) = self.tables.iter().find(|t| t.interior(limit)) {
            let row = line_spans(self.text)
                .into_iter()
                .find(|l| l.contains_pos(limit))
                .unwrap_or(Span::new(start, limit));
            return Err(ChunkingError::AtomicElementTooLarge {
                element: format!("row of table {}", table.id),
                chars: char_len(self.text, row),
                max_chars: self.max_chars,
            });
        }

        // Oversized line: last whitespace in the window, else a hard cut,
        // never inside a heading's glue zone
        let glue_at = |offset: usize| self.zones.iter().find(|z| z.holds(offset));
        let window = &self.text[start..limit];
        let whitespace = window
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, c)| start + i + c.len_utf8())
            .rfind(|cut| *cut > start && glue_at(*cut).is_none());
        match (whitespace, glue_at(limit)) {
            (Some(cut), _) => Ok(cut),
            (None, None) => Ok(limit),
            (None, Some(zone)) => Err(ChunkingError::AtomicElementTooLarge {
                element: format!("heading {}", zone.heading),
                chars: char_len(self.text, zone.span),
                max_chars: self.max_chars,
            }),
        }
    }
}

// ==================== materializing ====================

fn build_chunks(text: &str, pieces: &[Piece]) -> Result<Vec<Chunk>> {
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let mut segments = Vec::with_capacity(2);
            if let Some(header) = piece.overlap {
                segments.push(ChunkSegment::repeated(header));
            }
            segments.push(ChunkSegment::owned(piece.owned));
            Chunk::from_segments(i, text, segments, ChunkKind::Text).ok_or_else(|| {
                ChunkingError::SegmentMismatch {
                    chunk_id: ChunkId::from_index(i).to_string(),
                }
            })
        })
        .collect()
}

/// Tag every chunk holding part of a table, list item or footnote
fn tag_parts(chunks: &mut [Chunk], index: &StructuralIndex) {
    for element in index.elements() {
        let label = match &element.kind {
            ElementKind::Table(t) => t
                .caption
                .clone()
                .unwrap_or_else(|| format!("table {}", element.id)),
            ElementKind::ListItem(item) => format!("list item {}", item.index),
            ElementKind::Footnote(note) => format!("footnote {}", note.marker),
            _ => continue,
        };
        let touching: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.owned_segments().any(|s| s.intersects(&element.span)))
            .map(|(i, _)| i)
            .collect();
        if touching.len() < 2 {
            continue;
        }
        let total = touching.len();
        for (part, i) in touching.into_iter().enumerate() {
            chunks[i].part_of.push(PartOf {
                element: Some(element.id),
                label: label.clone(),
                part: part + 1,
                total,
            });
        }
    }
}

fn classify(text: &str, chunk: &Chunk, tables: &[TableAtom]) -> ChunkKind {
    if chunk.overlap_chars > 0 || tables.iter().any(|t| chunk.part_of_element(t.id).is_some()) {
        return ChunkKind::TableFragment;
    }
    let owned: Vec<Span> = chunk.owned_segments().copied().collect();
    let holds_table = tables
        .iter()
        .any(|t| owned.iter().any(|s| s.contains(&t.span)));
    if !holds_table {
        return ChunkKind::Text;
    }
    let prose_outside = owned.iter().any(|s| {
        line_spans(text)
            .into_iter()
            .filter(|l| s.contains(l))
            .any(|l| !is_blank(text, l) && !tables.iter().any(|t| t.span.contains(&l)))
    });
    if prose_outside {
        ChunkKind::Mixed
    } else {
        ChunkKind::Table
    }
}

// ==================== public API ====================

/// Fixed-size chunking with no structural awareness.
///
/// Cuts at line ends where possible and at whitespace otherwise. Used when
/// no structural index is available.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<Chunk>> {
    if max_chars == 0 {
        return Err(ChunkingError::InvalidMaxChars);
    }
    let pieces = Planner::naive(text, max_chars).plan()?;
    let chunks = build_chunks(text, &pieces)?;
    validate_character_count(text, &chunks)?;
    debug!("Split {} chars into {} chunks", text.len(), chunks.len());
    Ok(chunks)
}

/// Structure-aware chunking with the default heading glue
pub fn chunk_text_with_structure(
    text: &str,
    index: &StructuralIndex,
    max_chars: usize,
) -> Result<Vec<Chunk>> {
    chunk_structured(text, index, &ChunkOptions::new(max_chars))
}

/// Structure-aware chunking.
///
/// # Errors
///
/// `InvalidMaxChars` for a zero budget, `AtomicElementTooLarge` when a
/// single table row or a repeated table header does not fit a chunk, and
/// any violation of the character accounting post-condition.
pub fn chunk_structured(
    text: &str,
    index: &StructuralIndex,
    options: &ChunkOptions,
) -> Result<Vec<Chunk>> {
    if options.max_chars == 0 {
        return Err(ChunkingError::InvalidMaxChars);
    }
    let planner = Planner::structured(
        text,
        index,
        options.max_chars,
        options.heading_min_body_chars,
    );
    let pieces = planner.plan()?;
    let mut chunks = build_chunks(text, &pieces)?;
    tag_parts(&mut chunks, index);

    for chunk in &mut chunks {
        chunk.kind = classify(text, chunk, &planner.tables);
        chunk.heading_context = index
            .find_nearest_heading(chunk.span().start)
            .and_then(|e| e.as_heading())
            .map(|h| h.display_text());
    }

    let report = validate_character_count(text, &chunks)?;
    info!(
        chunks = report.chunk_count,
        chars = report.original_chars,
        overlap = report.declared_overlap,
        split_elements = chunks.iter().map(|c| c.part_of.len()).sum::<usize>(),
        "Chunked document"
    );
    Ok(chunks)
}

fn sheet_line(cells: &[String]) -> String {
    let cells: Vec<String> = cells
        .iter()
        .map(|c| c.replace(['\r', '\n'], " "))
        .collect();
    format!("{}\n", cells.join(","))
}

/// Row-bounded chunking of spreadsheet tabs.
///
/// Each sheet renders as a `## Sheet: <name>` banner, a header line and
/// comma-joined rows. Continuation chunks repeat the banner and header as
/// declared overlap. The rendered text is returned with the chunks and is
/// what their spans point into.
pub fn chunk_excel(sheets: &[Sheet], max_rows: usize) -> Result<ChunkedText> {
    if max_rows == 0 {
        return Err(ChunkingError::InvalidMaxRows);
    }

    let mut text = String::new();
    let mut layouts = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let banner_start = text.len();
        text.push_str(&format!("## Sheet: {}\n", sheet.name.replace(['\r', '\n'], " ")));
        text.push_str(&sheet_line(&sheet.header));
        let preamble = Span::new(banner_start, text.len());
        let mut rows = Vec::with_capacity(sheet.rows.len());
        for row in &sheet.rows {
            let start = text.len();
            text.push_str(&sheet_line(row));
            rows.push(Span::new(start, text.len()));
        }
        layouts.push((sheet, preamble, rows));
    }

    let mut chunks = Vec::new();
    for (sheet, preamble, rows) in &layouts {
        let groups: Vec<&[Span]> = if rows.is_empty() {
            vec![&rows[..]]
        } else {
            rows.chunks(max_rows).collect()
        };
        let total = groups.len();
        for (part, group) in groups.iter().enumerate() {
            let end = group.last().map_or(preamble.end, |r| r.end);
            let segments = if part == 0 {
                vec![ChunkSegment::owned(Span::new(preamble.start, end))]
            } else {
                vec![
                    ChunkSegment::repeated(*preamble),
                    ChunkSegment::owned(Span::new(group[0].start, end)),
                ]
            };
            let index = chunks.len();
            let mut chunk = Chunk::from_segments(index, &text, segments, ChunkKind::Sheet)
                .ok_or_else(|| ChunkingError::SegmentMismatch {
                    chunk_id: ChunkId::from_index(index).to_string(),
                })?;
            chunk.heading_context = Some(format!("Sheet: {}", sheet.name));
            if total > 1 {
                chunk.part_of.push(PartOf {
                    element: None,
                    label: format!("sheet {}", sheet.name),
                    part: part + 1,
                    total,
                });
            }
            chunks.push(chunk);
        }
    }

    validate_character_count(&text, &chunks)?;
    debug!("Rendered {} sheets into {} chunks", sheets.len(), chunks.len());
    Ok(ChunkedText { text, chunks })
}

/// Chunk any supported input shape
pub fn chunk(input: ChunkInput<'_>, options: &ChunkOptions) -> Result<ChunkedText> {
    match input {
        ChunkInput::Text(text) => Ok(ChunkedText {
            text: text.to_string(),
            chunks: chunk_text(text, options.max_chars)?,
        }),
        ChunkInput::Structured { text, index } => Ok(ChunkedText {
            text: text.to_string(),
            chunks: chunk_structured(text, index, options)?,
        }),
        ChunkInput::Sheets(sheets) => chunk_excel(sheets, options.max_rows),
    }
}

/// Check that `chunks` rebuild `original` exactly.
///
/// Each chunk's text must equal its segments, the character sums minus
/// declared overlap must equal the source, and the owned segments must
/// tile the source with no gap and no duplication.
pub fn validate_character_count(original: &str, chunks: &[Chunk]) -> Result<CharacterCountReport> {
    for chunk in chunks {
        let mismatch = || ChunkingError::SegmentMismatch {
            chunk_id: chunk.id.to_string(),
        };
        let mut rebuilt = String::with_capacity(chunk.text.len());
        let mut overlap = 0;
        for segment in &chunk.segments {
            let piece = segment.span.slice(original).ok_or_else(mismatch)?;
            if segment.overlap {
                overlap += piece.chars().count();
            }
            rebuilt.push_str(piece);
        }
        if rebuilt != chunk.text
            || rebuilt.chars().count() != chunk.char_count
            || overlap != chunk.overlap_chars
        {
            return Err(mismatch());
        }
    }

    let original_chars = original.chars().count();
    let chunk_chars: usize = chunks.iter().map(|c| c.char_count).sum();
    let declared_overlap: usize = chunks.iter().map(|c| c.overlap_chars).sum();
    let actual = chunk_chars.saturating_sub(declared_overlap);
    if actual != original_chars {
        return Err(ChunkingError::CharacterCountMismatch {
            expected: original_chars,
            actual,
            declared_overlap,
        });
    }

    let mut owned: Vec<Span> = chunks
        .iter()
        .flat_map(|c| c.owned_segments().copied())
        .filter(|s| !s.is_empty())
        .collect();
    owned.sort();
    let mut cursor = 0;
    for span in owned {
        if span.start != cursor {
            return Err(ChunkingError::CoverageGap {
                offset: cursor.min(span.start),
            });
        }
        cursor = span.end;
    }
    if cursor != original.len() {
        return Err(ChunkingError::CoverageGap { offset: cursor });
    }

    Ok(CharacterCountReport {
        original_chars,
        chunk_chars,
        declared_overlap,
        chunk_count: chunks.len(),
    })
}
