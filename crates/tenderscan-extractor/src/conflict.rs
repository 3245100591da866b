//! Cross-chunk conflict detection.
//!
//! Records are matched across chunks by a semantic key (the item of a unit
//! price, the kind of a deadline, the text of a requirement, the field name
//! of a scalar) and their compared fields are normalized before comparison.
//! Conflicts are reported, never resolved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tenderscan_domain::normalize::comparison_key;
use tenderscan_domain::{
    scalar_entries, ChunkId, Conflict, ConflictKind, ConflictValue, ExtractionResult, Section,
    Severity,
};
use tracing::info;

/// Sections holding lists of records
pub(crate) const RECORD_SECTIONS: [Section; 3] =
    [Section::Requirements, Section::UnitPrices, Section::Deadlines];

/// Sections holding maps of scalars
pub(crate) const SCALAR_SECTIONS: [Section; 2] = [Section::Contact, Section::Administrative];

/// Field naming a record within its section
pub(crate) fn key_field(section: Section) -> &'static str {
    match section {
        Section::UnitPrices => "item",
        Section::Deadlines => "kind",
        _ => "text",
    }
}

/// Fields compared between records sharing a key
pub(crate) fn compared_fields(section: Section) -> &'static [&'static str] {
    match section {
        Section::UnitPrices => &["unit_price", "quantity", "unit", "currency"],
        Section::Deadlines => &["date", "time"],
        Section::Requirements => &["mandatory"],
        _ => &[],
    }
}

fn wrap_field(section: Section) -> &'static str {
    match section {
        Section::Deadlines => "description",
        other => key_field(other),
    }
}

/// Fields of one list item; bare scalars and arrays are wrapped under the
/// section's natural field
pub(crate) fn record_fields(section: Section, item: &Value) -> Option<Map<String, Value>> {
    match item {
        Value::Object(map) => Some(map.clone()),
        Value::Null => None,
        scalar => {
            let mut map = Map::new();
            map.insert(wrap_field(section).to_string(), scalar.clone());
            Some(map)
        }
    }
}

/// Normalized semantic key of a record
pub(crate) fn record_key(section: Section, fields: &Map<String, Value>) -> Option<String> {
    fields.get(key_field(section)).and_then(comparison_key)
}

/// Field path of a record field, as used in conflicts
pub(crate) fn record_path(section: Section, key: &str, field: &str) -> String {
    format!("{}[{}].{}", section.key(), key, field)
}

/// Field path of a scalar field, as used in conflicts
pub(crate) fn scalar_path(section: Section, field: &str) -> String {
    format!("{}.{}", section.key(), field)
}

/// List items of a record section in one fragment
pub(crate) fn section_items(fragment: &Value, section: Section) -> Vec<&Value> {
    match fragment.get(section.key()) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

fn severity_of(section: Section) -> Severity {
    match section {
        Section::UnitPrices | Section::Deadlines => Severity::Critical,
        Section::Contact | Section::Administrative => Severity::Warning,
        _ => Severity::Info,
    }
}

fn kind_of(normalized: &[&str]) -> ConflictKind {
    let contained = normalized.iter().enumerate().all(|(i, a)| {
        normalized[i + 1..]
            .iter()
            .all(|b| a.contains(b) || b.contains(a))
    });
    if contained {
        ConflictKind::PartialMatch
    } else {
        ConflictKind::DifferentValues
    }
}

#[derive(Default)]
struct Observations {
    by_path: BTreeMap<(String, Section), Vec<(String, ConflictValue)>>,
}

impl Observations {
    fn observe(&mut self, section: Section, path: String, chunk_id: &ChunkId, value: &Value) {
        let Some(normalized) = comparison_key(value) else {
            return;
        };
        let seen = self.by_path.entry((path, section)).or_default();
        if seen
            .iter()
            .any(|(n, v)| *n == normalized && v.source_chunk_id == *chunk_id)
        {
            return;
        }
        seen.push((
            normalized,
            ConflictValue {
                value: value.clone(),
                source_chunk_id: chunk_id.clone(),
                source_span: None,
            },
        ));
    }
}

/// Detect conflicts between the fragments of successful chunks.
///
/// A field conflicts when at least two chunks report it and the reported
/// values differ after normalization. `null` and blank values never take
/// part. Output is ordered by field path.
pub fn detect_conflicts(results: &[ExtractionResult]) -> Vec<Conflict> {
    let mut observations = Observations::default();

    for result in results {
        let Some(fragment) = result.fragment() else {
            continue;
        };
        for section in RECORD_SECTIONS {
            for item in section_items(fragment, section) {
                let Some(fields) = record_fields(section, item) else {
                    continue;
                };
                let Some(key) = record_key(section, &fields) else {
                    continue;
                };
                for field in compared_fields(section) {
                    if let Some(value) = fields.get(*field) {
                        let path = record_path(section, &key, field);
                        observations.observe(section, path, &result.chunk_id, value);
                    }
                }
            }
        }
        for section in SCALAR_SECTIONS {
            let entries = fragment
                .get(section.key())
                .map(scalar_entries)
                .unwrap_or_default();
            for (field, value) in entries {
                let path = scalar_path(section, &field);
                observations.observe(section, path, &result.chunk_id, value);
            }
        }
    }

    let mut conflicts = Vec::new();
    for ((field_path, section), seen) in observations.by_path {
        let mut distinct: Vec<&str> = seen.iter().map(|(n, _)| n.as_str()).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let mut chunks: Vec<&ChunkId> = seen.iter().map(|(_, v)| &v.source_chunk_id).collect();
        chunks.sort();
        chunks.dedup();
        if distinct.len() < 2 || chunks.len() < 2 {
            continue;
        }
        let kind = kind_of(&distinct);
        conflicts.push(Conflict {
            field_path,
            section,
            severity: severity_of(section),
            kind,
            values: seen.into_iter().map(|(_, v)| v).collect(),
        });
    }

    if !conflicts.is_empty() {
        info!(
            "Detected {} conflicts ({} critical)",
            conflicts.len(),
            conflicts
                .iter()
                .filter(|c| c.severity == Severity::Critical)
                .count()
        );
    }
    conflicts
}

/// Summary of detected conflicts for review
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictReport {
    /// All conflicts
    pub total_conflicts: usize,
    /// Conflicts on prices and deadlines
    pub critical_conflicts: usize,
    /// Counts per section key
    pub by_section: BTreeMap<String, usize>,
    /// Counts per conflict kind
    pub by_kind: BTreeMap<String, usize>,
    /// Conflicts needing a human; none are resolved automatically
    pub needs_review_count: usize,
}

/// Summarize conflicts by section and kind
pub fn generate_conflict_report(conflicts: &[Conflict]) -> ConflictReport {
    let mut report = ConflictReport {
        total_conflicts: conflicts.len(),
        needs_review_count: conflicts.len(),
        ..ConflictReport::default()
    };
    for conflict in conflicts {
        if conflict.severity == Severity::Critical {
            report.critical_conflicts += 1;
        }
        *report
            .by_section
            .entry(conflict.section.key().to_string())
            .or_insert(0) += 1;
        let kind = match conflict.kind {
            ConflictKind::PartialMatch => "partial_match",
            ConflictKind::DifferentValues => "different_values",
        };
        *report.by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }
    report
}
