//! The assembled document record

use crate::chunk::ChunkId;
use crate::conflict::Conflict;
use crate::document::DocumentId;
use crate::extraction::Section;
use crate::provenance::Provenance;
use crate::span::Span;
use crate::structure::{ElementId, ReferenceFamily, ReferenceTarget};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A list-section record with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedRecord {
    /// Extracted fields
    pub fields: BTreeMap<String, Value>,
    /// Every chunk that reported this record
    pub provenance: Vec<Provenance>,
    /// Field paths of conflicts involving this record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

/// A scalar value with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedValue {
    /// Extracted value; `""` and `0` are kept as stated
    pub value: Value,
    /// Every chunk that reported this value
    pub provenance: Vec<Provenance>,
    /// Field path of the conflict this value takes part in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<String>,
}

/// Footnote attached to an assembled table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledFootnote {
    /// Marker as written
    pub marker: String,
    /// Definition text
    pub text: String,
    /// Assembled row indices carrying the marker
    pub rows: Vec<usize>,
    /// Source of the definition
    pub provenance: Vec<Provenance>,
}

/// Row of an assembled table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledRow {
    /// Cell texts
    pub cells: Vec<String>,
    /// Footnote markers bound to this row
    #[serde(default)]
    pub footnotes: Vec<String>,
    /// Chunk the row came from
    pub provenance: Vec<Provenance>,
}

impl AssembledRow {
    /// True when this row reproduces a source row: the first non-blank
    /// cells agree after folding, footnote markers ignored
    pub fn matches(&self, cells: &[String]) -> bool {
        fn first(cells: &[String]) -> Option<String> {
            cells
                .iter()
                .map(|c| crate::normalize::fold_text(&strip_markers(c)))
                .find(|c| !c.is_empty())
        }
        match (first(&self.cells), first(cells)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

fn strip_markers(cell: &str) -> String {
    let mut out = cell.to_string();
    for marker in ["(***)", "(**)", "(*)"] {
        out = out.replace(marker, "");
    }
    out.trim_end_matches(|c: char| "¹²³⁴⁵⁶⁷⁸⁹⁰*".contains(c))
        .to_string()
}

/// One logical table, recombined from its fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledTable {
    /// Structural table this was bound to
    pub element: Option<ElementId>,
    /// Caption
    pub caption: Option<String>,
    /// Header cells
    pub header: Vec<String>,
    /// Data rows in source order
    pub rows: Vec<AssembledRow>,
    /// Footnotes attached to the table
    pub footnotes: Vec<AssembledFootnote>,
    /// Chunks that contributed fragments, in part order
    pub fragments: Vec<ChunkId>,
    /// Union of fragment provenance
    pub provenance: Vec<Provenance>,
}

/// A detected cross-reference carried into the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Reference element
    pub element: ElementId,
    /// Mention text
    pub mention: String,
    /// Label referred to
    pub label: String,
    /// Heading family named
    pub family: ReferenceFamily,
    /// Resolution
    pub target: ReferenceTarget,
    /// Display text of the target heading
    pub target_heading: Option<String>,
    /// Where the mention sits
    pub provenance: Vec<Provenance>,
}

/// Bookkeeping about the assembly run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Chunks submitted
    pub source_chunks: usize,
    /// Chunks with a decoded fragment
    pub successful_chunks: usize,
    /// Chunks that failed permanently
    pub failed_chunks: Vec<ChunkId>,
    /// Chunks decoded only after truncation repair
    pub repaired_chunks: Vec<ChunkId>,
    /// SHA-256 of the assembled sections
    pub content_hash: String,
}

/// Document-level record.
///
/// A section is `None` when no fragment mentioned it and `Some` of an empty
/// collection when fragments stated it explicitly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledDocument {
    /// Document this record describes
    pub document_id: DocumentId,
    /// Technical and contractual requirements
    pub requirements: Option<Vec<SourcedRecord>>,
    /// Unit-price line items
    pub unit_prices: Option<Vec<SourcedRecord>>,
    /// Deadlines
    pub deadlines: Option<Vec<SourcedRecord>>,
    /// Tables with footnotes
    pub tables: Option<Vec<AssembledTable>>,
    /// Contact fields
    pub contact: Option<BTreeMap<String, Vec<SourcedValue>>>,
    /// Administrative fields
    pub administrative: Option<BTreeMap<String, Vec<SourcedValue>>>,
    /// Every detected conflict, unchanged
    pub conflicts: Vec<Conflict>,
    /// Every detected cross-reference
    pub references: Vec<ReferenceRecord>,
    /// References without a target
    pub unresolved_references: Vec<ReferenceRecord>,
    /// Assembly bookkeeping
    pub metadata: AssemblyMetadata,
}

/// One scalar leaf of the assembled record
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf<'a> {
    /// JSON-style path
    pub path: String,
    /// Text rendering of the value
    pub text: String,
    /// Value is a number or a numeric string
    pub numeric: bool,
    /// Provenance governing this leaf
    pub provenance: &'a [Provenance],
}

impl AssembledDocument {
    /// Empty record for a document
    pub fn empty(document_id: DocumentId) -> Self {
        Self {
            document_id,
            requirements: None,
            unit_prices: None,
            deadlines: None,
            tables: None,
            contact: None,
            administrative: None,
            conflicts: Vec::new(),
            references: Vec::new(),
            unresolved_references: Vec::new(),
            metadata: AssemblyMetadata::default(),
        }
    }

    /// Record list of a list section
    pub fn records(&self, section: Section) -> Option<&Vec<SourcedRecord>> {
        match section {
            Section::Requirements => self.requirements.as_ref(),
            Section::UnitPrices => self.unit_prices.as_ref(),
            Section::Deadlines => self.deadlines.as_ref(),
            _ => None,
        }
    }

    /// Scalar map of a map section
    pub fn scalars(&self, section: Section) -> Option<&BTreeMap<String, Vec<SourcedValue>>> {
        match section {
            Section::Contact => self.contact.as_ref(),
            Section::Administrative => self.administrative.as_ref(),
            _ => None,
        }
    }

    /// True when the section is present (possibly empty)
    pub fn has_section(&self, section: Section) -> bool {
        match section {
            Section::Tables => self.tables.is_some(),
            Section::Contact | Section::Administrative => self.scalars(section).is_some(),
            _ => self.records(section).is_some(),
        }
    }

    /// Number of entries in a section, 0 when absent
    pub fn section_len(&self, section: Section) -> usize {
        match section {
            Section::Tables => self.tables.as_ref().map_or(0, Vec::len),
            Section::Contact | Section::Administrative => {
                self.scalars(section).map_or(0, BTreeMap::len)
            }
            _ => self.records(section).map_or(0, Vec::len),
        }
    }

    /// Every provenance entry in the record
    pub fn all_provenance(&self) -> Vec<&Provenance> {
        let mut out = Vec::new();
        for section in [Section::Requirements, Section::UnitPrices, Section::Deadlines] {
            for record in self.records(section).into_iter().flatten() {
                out.extend(record.provenance.iter());
            }
        }
        for section in [Section::Contact, Section::Administrative] {
            for values in self.scalars(section).into_iter().flat_map(|m| m.values()) {
                out.extend(values.iter().flat_map(|v| v.provenance.iter()));
            }
        }
        for table in self.tables.iter().flatten() {
            out.extend(table.provenance.iter());
            out.extend(table.rows.iter().flat_map(|r| r.provenance.iter()));
            out.extend(table.footnotes.iter().flat_map(|f| f.provenance.iter()));
        }
        out
    }

    /// Located spans of every provenance entry
    pub fn provenance_spans(&self) -> Vec<Span> {
        self.all_provenance()
            .into_iter()
            .filter_map(|p| p.source_span)
            .collect()
    }

    /// Every scalar value extracted from the source, with its provenance.
    ///
    /// Metadata, conflicts and provenance are bookkeeping and are not leaves.
    pub fn leaves(&self) -> Vec<Leaf<'_>> {
        let mut out = Vec::new();
        for section in [Section::Requirements, Section::UnitPrices, Section::Deadlines] {
            for (i, record) in self.records(section).into_iter().flatten().enumerate() {
                for (key, value) in &record.fields {
                    let path = format!("{}[{}].{}", section.key(), i, key);
                    push_value_leaves(&mut out, path, value, &record.provenance);
                }
            }
        }
        for section in [Section::Contact, Section::Administrative] {
            for (key, values) in self.scalars(section).into_iter().flatten() {
                for (i, v) in values.iter().enumerate() {
                    let path = format!("{}.{}[{}]", section.key(), key, i);
                    push_value_leaves(&mut out, path, &v.value, &v.provenance);
                }
            }
        }
        for (t, table) in self.tables.iter().flatten().enumerate() {
            if let Some(caption) = &table.caption {
                push_text_leaf(&mut out, format!("tables[{}].caption", t), caption, &table.provenance);
            }
            for (c, cell) in table.header.iter().enumerate() {
                push_text_leaf(&mut out, format!("tables[{}].header[{}]", t, c), cell, &table.provenance);
            }
            for (r, row) in table.rows.iter().enumerate() {
                for (c, cell) in row.cells.iter().enumerate() {
                    let path = format!("tables[{}].rows[{}][{}]", t, r, c);
                    push_text_leaf(&mut out, path, cell, &row.provenance);
                }
            }
            for (f, note) in table.footnotes.iter().enumerate() {
                let path = format!("tables[{}].footnotes[{}].text", t, f);
                push_text_leaf(&mut out, path, &note.text, &note.provenance);
            }
        }
        for (i, reference) in self.references.iter().enumerate() {
            let path = format!("references[{}].mention", i);
            push_text_leaf(&mut out, path, &reference.mention, &reference.provenance);
        }
        out
    }
}

fn push_text_leaf<'a>(out: &mut Vec<Leaf<'a>>, path: String, text: &str, provenance: &'a [Provenance]) {
    if text.trim().is_empty() {
        return;
    }
    out.push(Leaf {
        path,
        numeric: crate::normalize::canonical_number(text).is_some(),
        text: text.to_string(),
        provenance,
    });
}

fn push_value_leaves<'a>(
    out: &mut Vec<Leaf<'a>>,
    path: String,
    value: &Value,
    provenance: &'a [Provenance],
) {
    match value {
        Value::String(s) => push_text_leaf(out, path, s, provenance),
        Value::Number(n) => out.push(Leaf {
            path,
            text: n.to_string(),
            numeric: true,
            provenance,
        }),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                push_value_leaves(out, format!("{}[{}]", path, i), item, provenance);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                push_value_leaves(out, format!("{}.{}", path, key), item, provenance);
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}
