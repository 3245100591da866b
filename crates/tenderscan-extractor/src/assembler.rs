//! Assembly of per-chunk fragments into one document record.
//!
//! Every assembled entry carries provenance naming the chunk it came from
//! and, when the value can be found in that chunk's source segments, the
//! absolute source range. Conflicts are copied through unchanged; records
//! taking part in one list the conflicting field paths.

use crate::conflict::{
    compared_fields, record_fields, record_key, record_path, scalar_path, section_items,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tenderscan_domain::normalize::{comparison_key, fold_text, MatchKind, SourceMatcher};
use tenderscan_domain::{
    scalar_entries, AssembledDocument, AssembledFootnote, AssembledRow, AssembledTable,
    AssemblyMetadata, Chunk, ChunkId, Conflict, DocumentId, ElementId, ExtractionResult, Mention,
    Provenance, ReferenceRecord, ReferenceTarget, Section, SourcedRecord, SourcedValue, Span,
    StructuralElement, StructuralIndex, Table,
};
use tenderscan_gatekeeper::create_text_hash;
use tracing::{debug, info, warn};

/// A successful fragment with the chunk it came from
struct Fragment<'a> {
    chunk_id: &'a ChunkId,
    chunk: Option<&'a Chunk>,
    value: &'a Value,
}

/// A table reported by one fragment, before grouping
struct TablePiece {
    chunk_id: ChunkId,
    caption: Option<String>,
    header: Vec<String>,
    rows: Vec<AssembledRow>,
    footnotes: Vec<(String, String)>,
}

/// Merges extraction results into an [`AssembledDocument`]
pub struct Assembler<'a> {
    document_id: DocumentId,
    source: &'a str,
    chunks: &'a [Chunk],
    index: &'a StructuralIndex,
}

impl<'a> Assembler<'a> {
    /// Create an assembler for one chunked document
    pub fn new(
        document_id: DocumentId,
        source: &'a str,
        chunks: &'a [Chunk],
        index: &'a StructuralIndex,
    ) -> Self {
        Self {
            document_id,
            source,
            chunks,
            index,
        }
    }

    /// Merge `results` into one record and attach every conflict unchanged
    pub fn assemble_results(
        &self,
        results: &[ExtractionResult],
        conflicts: &[Conflict],
    ) -> AssembledDocument {
        let mut fragments: Vec<Fragment<'_>> = results
            .iter()
            .filter_map(|r| {
                r.fragment().map(|value| Fragment {
                    chunk_id: &r.chunk_id,
                    chunk: self.chunks.iter().find(|c| c.id == r.chunk_id),
                    value,
                })
            })
            .collect();
        fragments.sort_by_key(|f| f.chunk.map_or(usize::MAX, |c| c.index));

        for fragment in &fragments {
            if fragment.chunk.is_none() {
                warn!("Fragment names unknown chunk {}", fragment.chunk_id);
            }
        }

        let conflict_paths: BTreeSet<&str> =
            conflicts.iter().map(|c| c.field_path.as_str()).collect();

        let mut doc = AssembledDocument::empty(self.document_id.clone());
        doc.requirements = self.records(&fragments, Section::Requirements, &conflict_paths);
        doc.unit_prices = self.records(&fragments, Section::UnitPrices, &conflict_paths);
        doc.deadlines = self.records(&fragments, Section::Deadlines, &conflict_paths);
        doc.tables = self.tables(&fragments);
        doc.contact = self.scalars(&fragments, Section::Contact, &conflict_paths);
        doc.administrative = self.scalars(&fragments, Section::Administrative, &conflict_paths);
        doc.conflicts = conflicts.to_vec();
        doc.references = self.references();
        doc.unresolved_references = doc
            .references
            .iter()
            .filter(|r| matches!(r.target, ReferenceTarget::Unresolved))
            .cloned()
            .collect();
        doc.metadata = AssemblyMetadata {
            source_chunks: self.chunks.len(),
            successful_chunks: fragments.len(),
            failed_chunks: results
                .iter()
                .filter(|r| r.is_failed())
                .map(|r| r.chunk_id.clone())
                .collect(),
            repaired_chunks: results
                .iter()
                .filter(|r| r.is_recovered())
                .map(|r| r.chunk_id.clone())
                .collect(),
            content_hash: content_hash(&doc),
        };

        info!(
            document = %self.document_id,
            chunks = doc.metadata.source_chunks,
            failed = doc.metadata.failed_chunks.len(),
            conflicts = doc.conflicts.len(),
            tables = doc.section_len(Section::Tables),
            "Assembled document"
        );
        doc
    }

    // ==================== provenance ====================

    /// Provenance for `chunk_id`, with the span of `needle` when found in
    /// the chunk's owned segments (then any segment)
    fn provenance(&self, fragment: &Fragment<'_>, needle: Option<&str>) -> Provenance {
        let provenance = Provenance::new(fragment.chunk_id.clone());
        let located = fragment
            .chunk
            .zip(needle)
            .and_then(|(chunk, needle)| self.locate(chunk, needle));
        match located {
            Some(span) => provenance.with_span(span),
            None => provenance,
        }
    }

    fn locate(&self, chunk: &Chunk, needle: &str) -> Option<Span> {
        let needle = needle.trim();
        if needle.is_empty() {
            return None;
        }
        let owned = chunk.segments.iter().filter(|s| !s.overlap);
        let repeated = chunk.segments.iter().filter(|s| s.overlap);
        owned.chain(repeated).find_map(|segment| {
            let text = segment.span.slice(self.source)?;
            text.find(needle).map(|at| {
                let start = segment.span.start + at;
                Span::new(start, start + needle.len())
            })
        })
    }

    /// Chunk whose owned segments hold `pos`
    fn owner_of(&self, pos: usize) -> Option<&Chunk> {
        self.chunks
            .iter()
            .find(|c| c.owned_segments().any(|s| s.contains_pos(pos)))
    }

    // ==================== records ====================

    fn records(
        &self,
        fragments: &[Fragment<'_>],
        section: Section,
        conflict_paths: &BTreeSet<&str>,
    ) -> Option<Vec<SourcedRecord>> {
        if section_state(fragments, section) == Mention::NotMentioned {
            return None;
        }

        let mut records: Vec<SourcedRecord> = Vec::new();
        let mut by_content: BTreeMap<String, usize> = BTreeMap::new();

        for fragment in fragments {
            for item in section_items(fragment.value, section) {
                if Mention::of_section(Some(item)) != Mention::HasData {
                    continue;
                }
                let Some(fields) = record_fields(section, item) else {
                    continue;
                };
                let provenance = self.provenance(fragment, anchor_text(section, &fields).as_deref());
                let content = content_key(&fields);

                if let Some(&at) = by_content.get(&content) {
                    let record = &mut records[at];
                    if !record.provenance.contains(&provenance) {
                        record.provenance.push(provenance);
                    }
                    continue;
                }

                let conflicts = match record_key(section, &fields) {
                    Some(key) => compared_fields(section)
                        .iter()
                        .map(|field| record_path(section, &key, field))
                        .filter(|path| conflict_paths.contains(path.as_str()))
                        .collect(),
                    None => Vec::new(),
                };
                by_content.insert(content, records.len());
                records.push(SourcedRecord {
                    fields: fields.into_iter().collect(),
                    provenance: vec![provenance],
                    conflicts,
                });
            }
        }

        debug!("{}: {} records", section, records.len());
        Some(records)
    }

    // ==================== scalars ====================

    fn scalars(
        &self,
        fragments: &[Fragment<'_>],
        section: Section,
        conflict_paths: &BTreeSet<&str>,
    ) -> Option<BTreeMap<String, Vec<SourcedValue>>> {
        if section_state(fragments, section) == Mention::NotMentioned {
            return None;
        }

        let mut map: BTreeMap<String, Vec<SourcedValue>> = BTreeMap::new();
        for fragment in fragments {
            let entries = fragment
                .value
                .get(section.key())
                .map(scalar_entries)
                .unwrap_or_default();
            for (field, value) in entries {
                if Mention::of_section(Some(value)) == Mention::NotMentioned {
                    continue;
                }
                let provenance = self.provenance(fragment, value_text(value).as_deref());
                let identity = comparison_key(value).unwrap_or_else(|| value.to_string());
                let values = map.entry(field.clone()).or_default();

                let existing = values.iter_mut().find(|v| {
                    comparison_key(&v.value).unwrap_or_else(|| v.value.to_string()) == identity
                });
                match existing {
                    Some(sourced) => {
                        if !sourced.provenance.contains(&provenance) {
                            sourced.provenance.push(provenance);
                        }
                    }
                    None => {
                        let path = scalar_path(section, &field);
                        values.push(SourcedValue {
                            value: value.clone(),
                            provenance: vec![provenance],
                            conflict: conflict_paths.contains(path.as_str()).then_some(path),
                        });
                    }
                }
            }
        }
        Some(map)
    }

    // ==================== tables ====================

    fn tables(&self, fragments: &[Fragment<'_>]) -> Option<Vec<AssembledTable>> {
        if section_state(fragments, Section::Tables) == Mention::NotMentioned {
            return None;
        }

        let mut bound: BTreeMap<ElementId, Vec<TablePiece>> = BTreeMap::new();
        let mut loose: Vec<(usize, AssembledTable)> = Vec::new();

        for fragment in fragments {
            let candidates: Vec<(&StructuralElement, &Table)> = match fragment.chunk {
                Some(chunk) => self
                    .index
                    .tables()
                    .filter(|(e, _)| chunk.owned_segments().any(|s| s.intersects(&e.span)))
                    .collect(),
                None => Vec::new(),
            };
            let mut taken: BTreeSet<ElementId> = BTreeSet::new();

            for item in section_items(fragment.value, Section::Tables) {
                if Mention::of_section(Some(item)) != Mention::HasData {
                    continue;
                }
                let piece = self.table_piece(fragment, item);
                match bind_table(&piece, &candidates, &taken) {
                    Some(element) => {
                        taken.insert(element);
                        bound.entry(element).or_default().push(piece);
                    }
                    None => {
                        let order = fragment
                            .chunk
                            .map_or(self.source.len(), |c| c.span().start);
                        loose.push((order, self.loose_table(fragment, piece)));
                    }
                }
            }
        }

        let mut tables: Vec<(usize, AssembledTable)> = bound
            .into_iter()
            .filter_map(|(element, pieces)| {
                let (el, table) = self.index.get(element).and_then(|e| Some((e, e.as_table()?)))?;
                Some((el.span.start, self.merge_table(el, table, pieces)))
            })
            .collect();
        tables.extend(loose);
        tables.sort_by_key(|(order, _)| *order);
        Some(tables.into_iter().map(|(_, t)| t).collect())
    }

    fn table_piece(&self, fragment: &Fragment<'_>, item: &Value) -> TablePiece {
        let text = |v: Option<&Value>| v.and_then(value_text).filter(|s| !s.trim().is_empty());
        let cells = |v: &Value| -> Vec<String> {
            match v {
                Value::Array(cells) => cells.iter().map(|c| value_text(c).unwrap_or_default()).collect(),
                Value::Object(map) => map.values().map(|c| value_text(c).unwrap_or_default()).collect(),
                other => vec![value_text(other).unwrap_or_default()],
            }
        };

        let Value::Object(map) = item else {
            return TablePiece {
                chunk_id: fragment.chunk_id.clone(),
                caption: text(Some(item)),
                header: Vec::new(),
                rows: Vec::new(),
                footnotes: Vec::new(),
            };
        };

        let rows = match map.get("rows") {
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| {
                    let cells = cells(row);
                    let span = self.row_span(fragment.chunk, &cells);
                    let provenance = Provenance::new(fragment.chunk_id.clone());
                    AssembledRow {
                        cells,
                        footnotes: Vec::new(),
                        provenance: vec![match span {
                            Some(span) => provenance.with_span(span),
                            None => provenance,
                        }],
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        let footnotes = match map.get("footnotes") {
            Some(Value::Array(notes)) => notes
                .iter()
                .filter_map(|note| {
                    let marker = text(note.get("marker"))?;
                    Some((marker, text(note.get("text")).unwrap_or_default()))
                })
                .collect(),
            _ => Vec::new(),
        };

        TablePiece {
            chunk_id: fragment.chunk_id.clone(),
            caption: text(map.get("caption")),
            header: map.get("header").map(cells).unwrap_or_default(),
            rows,
            footnotes,
        }
    }

    /// Span of the source table row reproduced by `cells` inside `chunk`
    fn row_span(&self, chunk: Option<&Chunk>, cells: &[String]) -> Option<Span> {
        let chunk = chunk?;
        let target = AssembledRow {
            cells: cells.to_vec(),
            footnotes: Vec::new(),
            provenance: Vec::new(),
        };
        self.index
            .tables()
            .flat_map(|(_, t)| t.rows.iter())
            .filter(|r| !r.separator)
            .filter(|r| chunk.owned_segments().any(|s| s.contains(&r.span)))
            .find(|r| target.matches(&r.cells))
            .map(|r| r.span)
    }

    fn loose_table(&self, fragment: &Fragment<'_>, piece: TablePiece) -> AssembledTable {
        let provenance = vec![Provenance::new(fragment.chunk_id.clone())];
        let footnotes = piece
            .footnotes
            .into_iter()
            .map(|(marker, text)| AssembledFootnote {
                rows: rows_with_marker(&piece.rows, &marker),
                marker,
                text,
                provenance: provenance.clone(),
            })
            .collect();
        AssembledTable {
            element: None,
            caption: piece.caption,
            header: piece.header,
            rows: piece.rows,
            footnotes,
            fragments: vec![fragment.chunk_id.clone()],
            provenance,
        }
    }

    /// Recombine the fragments of one structural table
    fn merge_table(
        &self,
        element: &StructuralElement,
        table: &Table,
        pieces: Vec<TablePiece>,
    ) -> AssembledTable {
        let index_header: Vec<String> = table.header().map(|r| r.cells.clone()).unwrap_or_default();
        let header_key = folded_cells(&index_header);

        let mut caption = None;
        let mut header = Vec::new();
        let mut rows: Vec<AssembledRow> = Vec::new();
        let mut model_notes: Vec<(String, String, ChunkId)> = Vec::new();

        for piece in pieces {
            if caption.is_none() {
                caption = piece.caption;
            }
            if header.is_empty() && !piece.header.is_empty() {
                header = piece.header.clone();
            }
            let piece_header = folded_cells(&piece.header);
            for row in piece.rows {
                let key = folded_cells(&row.cells);
                let repeats_header = key.iter().all(String::is_empty)
                    || key == header_key
                    || (!piece_header.is_empty() && key == piece_header)
                    || is_rule(&row.cells);
                if !repeats_header {
                    rows.push(row);
                }
            }
            for (marker, text) in piece.footnotes {
                model_notes.push((marker, text, piece.chunk_id.clone()));
            }
        }
        if caption.is_none() {
            caption = table.caption.clone();
        }
        if header.is_empty() {
            header = index_header;
        }

        let fragments: Vec<ChunkId> = self
            .chunks
            .iter()
            .filter(|c| c.owned_segments().any(|s| s.intersects(&element.span)))
            .map(|c| c.id.clone())
            .collect();
        let provenance: Vec<Provenance> = fragments
            .iter()
            .map(|id| Provenance::new(id.clone()).with_span(element.span))
            .collect();

        let mut footnotes = self.linked_footnotes(element.id, table, &mut rows);
        for (marker, text, chunk_id) in model_notes {
            if footnotes.iter().any(|f| f.marker == marker) {
                continue;
            }
            footnotes.push(AssembledFootnote {
                rows: rows_with_marker(&rows, &marker),
                marker,
                text,
                provenance: vec![Provenance::new(chunk_id)],
            });
        }

        debug!(
            "Table {} assembled from {} fragments, {} rows",
            element.id,
            fragments.len(),
            rows.len()
        );
        AssembledTable {
            element: Some(element.id),
            caption,
            header,
            rows,
            footnotes,
            fragments,
            provenance,
        }
    }

    /// Footnotes whose markers the structural index found in `table`
    fn linked_footnotes(
        &self,
        table_id: ElementId,
        table: &Table,
        rows: &mut [AssembledRow],
    ) -> Vec<AssembledFootnote> {
        let header_row = table.rows.iter().position(|r| !r.separator);
        let mut out: Vec<AssembledFootnote> = Vec::new();

        for (definition, footnote) in self.index.footnotes() {
            for link in &footnote.links {
                let (Some(linked), Some(row_index)) = (link.table, link.row) else {
                    continue;
                };
                if linked != table_id {
                    continue;
                }

                let at = match out.iter().position(|f| f.marker == footnote.marker) {
                    Some(at) => at,
                    None => {
                        let provenance = match self.owner_of(definition.span.start) {
                            Some(chunk) => vec![Provenance::new(chunk.id.clone()).with_span(definition.span)],
                            None => Vec::new(),
                        };
                        out.push(AssembledFootnote {
                            marker: footnote.marker.clone(),
                            text: footnote.body.clone(),
                            rows: Vec::new(),
                            provenance,
                        });
                        out.len() - 1
                    }
                };

                if header_row == Some(row_index) {
                    continue;
                }
                let Some(source_row) = table.rows.get(row_index) else {
                    continue;
                };
                let Some(pos) = rows.iter().position(|r| r.matches(&source_row.cells)) else {
                    warn!(
                        "Row {} of {} carrying {} was not extracted",
                        row_index, table_id, footnote.marker
                    );
                    continue;
                };
                if !rows[pos].footnotes.contains(&footnote.marker) {
                    rows[pos].footnotes.push(footnote.marker.clone());
                }
                if !out[at].rows.contains(&pos) {
                    out[at].rows.push(pos);
                }
            }
        }
        out
    }

    // ==================== references ====================

    fn references(&self) -> Vec<ReferenceRecord> {
        self.index
            .references()
            .map(|(element, reference)| {
                let target_heading = match reference.target {
                    ReferenceTarget::Resolved { heading, .. } => self
                        .index
                        .get(heading)
                        .and_then(|e| e.as_heading())
                        .map(|h| h.display_text()),
                    ReferenceTarget::Unresolved => None,
                };
                let provenance = self
                    .owner_of(element.span.start)
                    .map(|chunk| vec![Provenance::new(chunk.id.clone()).with_span(element.span)])
                    .unwrap_or_default();
                ReferenceRecord {
                    element: element.id,
                    mention: reference.mention.clone(),
                    label: reference.label.clone(),
                    family: reference.family,
                    target: reference.target.clone(),
                    target_heading,
                    provenance,
                }
            })
            .collect()
    }
}

// ==================== helpers ====================

fn section_state(fragments: &[Fragment<'_>], section: Section) -> Mention {
    fragments
        .iter()
        .map(|f| Mention::of_section(f.value.get(section.key())))
        .fold(Mention::NotMentioned, Mention::merge)
}

/// Text rendering of a scalar; `None` for null and containers
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Value locating a record in its chunk
fn anchor_text(section: Section, fields: &serde_json::Map<String, Value>) -> Option<String> {
    let anchor = match section {
        Section::UnitPrices => "item",
        Section::Deadlines => "date",
        _ => "text",
    };
    fields
        .get(anchor)
        .and_then(value_text)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            fields
                .values()
                .filter_map(|v| v.as_str())
                .find(|s| !s.trim().is_empty())
                .map(str::to_string)
        })
}

/// Normalized content of a record; equal keys mean the same record
fn content_key(fields: &serde_json::Map<String, Value>) -> String {
    let normalized: BTreeMap<&str, String> = fields
        .iter()
        .filter_map(|(k, v)| comparison_key(v).map(|n| (k.as_str(), n)))
        .collect();
    serde_json::to_string(&normalized).unwrap_or_default()
}

fn folded_cells(cells: &[String]) -> Vec<String> {
    cells.iter().map(|c| fold_text(c)).collect()
}

/// Markdown rule row such as `|---|---|`
fn is_rule(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn rows_with_marker(rows: &[AssembledRow], marker: &str) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, r)| r.footnotes.iter().any(|m| m == marker) || r.cells.iter().any(|c| c.contains(marker)))
        .map(|(i, _)| i)
        .collect()
}

/// Pick the structural table a reported table belongs to: by caption, then
/// by header, then the first candidate not yet taken by this fragment
fn bind_table(
    piece: &TablePiece,
    candidates: &[(&StructuralElement, &Table)],
    taken: &BTreeSet<ElementId>,
) -> Option<ElementId> {
    let free = || candidates.iter().filter(|(e, _)| !taken.contains(&e.id));

    if let Some(caption) = piece.caption.as_deref().map(fold_text) {
        let by_caption = free().find(|(_, t)| {
            t.caption
                .as_deref()
                .is_some_and(|c| fold_text(c) == caption)
        });
        if let Some((e, _)) = by_caption {
            return Some(e.id);
        }
    }
    if !piece.header.is_empty() {
        let wanted = folded_cells(&piece.header);
        let by_header = free().find(|(_, t)| {
            t.header()
                .is_some_and(|h| folded_cells(&h.cells) == wanted)
        });
        if let Some((e, _)) = by_header {
            return Some(e.id);
        }
    }
    if piece.rows.is_empty() && piece.header.is_empty() {
        return None;
    }
    free().next().map(|(e, _)| e.id)
}

fn content_hash(doc: &AssembledDocument) -> String {
    let sections = json!({
        "requirements": doc.requirements,
        "unit_prices": doc.unit_prices,
        "deadlines": doc.deadlines,
        "tables": doc.tables,
        "contact": doc.contact,
        "administrative": doc.administrative,
    });
    create_text_hash(&sections.to_string())
}

/// A leaf of the record that could not be traced to the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntracedValue {
    /// JSON-style path of the leaf
    pub path: String,
    /// Leaf text
    pub value: String,
}

/// Outcome of [`validate_no_new_information`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoNewInformationReport {
    /// Every leaf was traced
    pub passed: bool,
    /// Leaves checked
    pub checked_values: usize,
    /// Traced leaves per match kind
    pub matched_by: BTreeMap<String, usize>,
    /// Leaves not found in the source
    pub untraced: Vec<UntracedValue>,
}

/// Check that every leaf of `assembled` occurs in `source`, verbatim or
/// after case, whitespace, number or date normalization
pub fn validate_no_new_information(
    assembled: &AssembledDocument,
    source: &str,
) -> NoNewInformationReport {
    let matcher = SourceMatcher::new(source);
    let leaves = assembled.leaves();
    let mut matched_by: BTreeMap<String, usize> = BTreeMap::new();
    let mut untraced = Vec::new();

    for leaf in &leaves {
        match matcher.find(&leaf.text) {
            Some(kind) => {
                let name = match kind {
                    MatchKind::Verbatim => "verbatim",
                    MatchKind::Folded => "folded",
                    MatchKind::Number => "number",
                    MatchKind::Date => "date",
                };
                *matched_by.entry(name.to_string()).or_insert(0) += 1;
            }
            None => untraced.push(UntracedValue {
                path: leaf.path.clone(),
                value: leaf.text.clone(),
            }),
        }
    }

    for value in &untraced {
        warn!(path = %value.path, value = %value.value, "Value not found in source");
    }

    NoNewInformationReport {
        passed: untraced.is_empty(),
        checked_values: leaves.len(),
        matched_by,
        untraced,
    }
}
