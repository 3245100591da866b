//! P0 controls: the hard acceptance gate.
//!
//! Every check is a total function returning pass/fail plus an explanation.
//! Malformed input (spans outside the source, unknown chunk ids, records
//! that do not serialize) fails the check concerned; nothing panics. A
//! single failing check blocks acceptance of the whole document.

use crate::config::GatekeeperConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tenderscan_domain::normalize::SourceMatcher;
use tenderscan_domain::{
    scalar_entries, AssembledDocument, AssembledTable, Chunk, ChunkId, Conflict, ElementId,
    ExtractionOutcome, ExtractionResult, Mention, PartOf, Provenance, Section, Span,
    StructuralIndex,
};
use tracing::warn;

static DEFAULT_CONFIG: LazyLock<GatekeeperConfig> = LazyLock::new(GatekeeperConfig::default);

/// Explanations list at most this many problems; details carry all of them
const EXPLAINED_PROBLEMS: usize = 5;

/// Outcome of one P0 check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P0CheckResult {
    /// `P0-01` .. `P0-10`
    pub code: String,
    /// Short name
    pub name: String,
    /// Check passed
    pub passed: bool,
    /// What was verified, or what went wrong
    pub explanation: String,
    /// Check-specific figures
    pub details: Value,
}

impl P0CheckResult {
    fn from_problems(
        code: &str,
        name: &str,
        problems: Vec<String>,
        passed_note: String,
        mut details: Value,
    ) -> Self {
        let passed = problems.is_empty();
        let explanation = if passed {
            passed_note
        } else {
            let shown = &problems[..problems.len().min(EXPLAINED_PROBLEMS)];
            let more = problems.len() - shown.len();
            let mut text = format!("{} problem(s): {}", problems.len(), shown.join("; "));
            if more > 0 {
                text.push_str(&format!("; and {} more", more));
            }
            text
        };
        details["problems"] = json!(problems);
        Self {
            code: code.to_string(),
            name: name.to_string(),
            passed,
            explanation,
            details,
        }
    }
}

/// A failed check, as listed in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P0Violation {
    /// Check code
    pub code: String,
    /// Check name
    pub name: String,
    /// Failure explanation
    pub explanation: String,
}

/// Result of the full battery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P0Summary {
    /// Every check passed
    pub all_passed: bool,
    /// Checks run
    pub total_checks: usize,
    /// Checks passed
    pub passed_count: usize,
    /// Every check result in code order
    pub checks: Vec<P0CheckResult>,
    /// Failed checks
    pub violations: Vec<P0Violation>,
}

/// Everything the battery inspects for one document
#[derive(Debug, Clone, Copy)]
pub struct P0Context<'a> {
    /// Source text
    pub source: &'a str,
    /// Structural index of the source
    pub index: &'a StructuralIndex,
    /// Chunks sent to extraction
    pub chunks: &'a [Chunk],
    /// Per-chunk extraction results
    pub results: &'a [ExtractionResult],
    /// Conflicts found before assembly
    pub detected_conflicts: &'a [Conflict],
    /// Assembled record
    pub assembled: &'a AssembledDocument,
    /// Thresholds
    pub config: &'a GatekeeperConfig,
}

impl<'a> P0Context<'a> {
    /// Context with the default configuration
    pub fn new(
        source: &'a str,
        index: &'a StructuralIndex,
        chunks: &'a [Chunk],
        results: &'a [ExtractionResult],
        detected_conflicts: &'a [Conflict],
        assembled: &'a AssembledDocument,
    ) -> Self {
        Self {
            source,
            index,
            chunks,
            results,
            detected_conflicts,
            assembled,
            config: &DEFAULT_CONFIG,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: &'a GatekeeperConfig) -> Self {
        self.config = config;
        self
    }
}

/// Hex SHA-256 of `text`
pub fn create_text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn touches(chunk: &Chunk, span: &Span) -> bool {
    chunk.owned_segments().any(|s| s.intersects(span))
}

fn bound_tables(
    assembled: &AssembledDocument,
    element: ElementId,
) -> Vec<&AssembledTable> {
    assembled
        .tables
        .iter()
        .flatten()
        .filter(|t| t.element == Some(element))
        .collect()
}

/// True when the owned segments of `chunk` cover `range` without a gap
fn covers(chunk: &Chunk, range: Span) -> bool {
    let mut owned: Vec<&Span> = chunk.owned_segments().collect();
    owned.sort();
    let mut reached = range.start;
    for span in owned {
        if span.start <= reached && span.end > reached {
            reached = span.end;
        }
    }
    reached >= range.end
}

/// Byte offset `n` characters after `from`, capped at the end of `text`
fn advance_chars(text: &str, from: usize, n: usize) -> Option<usize> {
    let rest = text.get(from..)?;
    Some(
        rest.char_indices()
            .nth(n)
            .map_or(text.len(), |(i, _)| from + i),
    )
}

// ==================== P0-01 ====================

/// P0-01: a table touching several chunks carries consistent `PartOf` tags
/// in each of them and is assembled as one logical table listing every
/// fragment.
pub fn check_table_integrity(
    index: &StructuralIndex,
    chunks: &[Chunk],
    assembled: Option<&AssembledDocument>,
) -> P0CheckResult {
    let mut problems = Vec::new();
    let mut split_tables = 0;

    for (element, _) in index.tables() {
        let touching: Vec<&Chunk> = chunks.iter().filter(|c| touches(c, &element.span)).collect();

        if touching.len() > 1 {
            split_tables += 1;
            let tags: Vec<&PartOf> = touching
                .iter()
                .filter_map(|c| c.part_of_element(element.id))
                .collect();
            if tags.len() != touching.len() {
                problems.push(format!(
                    "{} spans {} chunks but only {} carry a continuation tag",
                    element.id,
                    touching.len(),
                    tags.len()
                ));
            } else {
                let parts: BTreeSet<usize> = tags.iter().map(|t| t.part).collect();
                let expected: BTreeSet<usize> = (1..=touching.len()).collect();
                if tags.iter().any(|t| t.total != touching.len()) || parts != expected {
                    problems.push(format!("{} fragments are numbered inconsistently", element.id));
                }
            }
        }

        if let Some(doc) = assembled {
            match bound_tables(doc, element.id).as_slice() {
                [] => {}
                [table] => {
                    if touching.len() > 1 {
                        for chunk in &touching {
                            if !table.fragments.contains(&chunk.id) {
                                problems.push(format!(
                                    "{} is missing its fragment from {}",
                                    element.id, chunk.id
                                ));
                            }
                        }
                    }
                }
                several => problems.push(format!(
                    "{} was assembled as {} separate tables",
                    element.id,
                    several.len()
                )),
            }
        }
    }

    P0CheckResult::from_problems(
        "P0-01",
        "table integrity",
        problems,
        format!("{} split table(s) carry consistent continuation links", split_tables),
        json!({
            "total_tables": index.tables().count(),
            "split_tables": split_tables,
        }),
    )
}

// ==================== P0-02 ====================

/// P0-02: every footnote marker found in a table row is present on the
/// matching assembled row, and the definition text is attached.
pub fn check_table_footnote_connection(
    index: &StructuralIndex,
    assembled: &AssembledDocument,
) -> P0CheckResult {
    let mut problems = Vec::new();
    let mut checked = 0;

    for (_, footnote) in index.footnotes() {
        for link in &footnote.links {
            let (Some(table_id), Some(row_index)) = (link.table, link.row) else {
                continue;
            };
            checked += 1;

            let Some(source_table) = index.get(table_id).and_then(|e| e.as_table()) else {
                problems.push(format!("marker {} points at missing table {}", footnote.marker, table_id));
                continue;
            };
            let Some(source_row) = source_table.rows.get(row_index) else {
                problems.push(format!(
                    "marker {} points at missing row {} of {}",
                    footnote.marker, row_index, table_id
                ));
                continue;
            };
            let tables = bound_tables(assembled, table_id);
            let Some(table) = tables.first() else {
                problems.push(format!(
                    "{} holding marker {} was not assembled",
                    table_id, footnote.marker
                ));
                continue;
            };

            let in_header = source_table.rows.iter().position(|r| !r.separator) == Some(row_index);
            let row_position = if in_header {
                None
            } else {
                match table.rows.iter().position(|r| r.matches(&source_row.cells)) {
                    Some(pos) => Some(pos),
                    None => {
                        problems.push(format!(
                            "row {} of {} with marker {} is missing",
                            row_index, table_id, footnote.marker
                        ));
                        continue;
                    }
                }
            };

            if let Some(pos) = row_position {
                if !table.rows[pos].footnotes.contains(&footnote.marker) {
                    problems.push(format!(
                        "marker {} lost from row {} of {}",
                        footnote.marker, row_index, table_id
                    ));
                }
            }

            let attached = table.footnotes.iter().any(|f| {
                f.marker == footnote.marker
                    && !f.text.trim().is_empty()
                    && row_position.is_none_or(|pos| f.rows.contains(&pos))
            });
            if !attached {
                problems.push(format!(
                    "definition of {} is not attached to {}",
                    footnote.marker, table_id
                ));
            }
        }
    }

    P0CheckResult::from_problems(
        "P0-02",
        "table-footnote connection",
        problems,
        format!("{} table footnote link(s) preserved", checked),
        json!({ "checked_links": checked }),
    )
}

// ==================== P0-03 ====================

/// P0-03: the chunk holding a heading line also holds its body up to
/// `min(min_body_chars, section end)`.
pub fn check_heading_content_unity(
    source: &str,
    index: &StructuralIndex,
    chunks: &[Chunk],
    min_body_chars: usize,
) -> P0CheckResult {
    let mut problems = Vec::new();

    for (element, heading) in index.headings() {
        let label = heading.display_text();
        let Some(chunk) = chunks
            .iter()
            .find(|c| c.owned_segments().any(|s| s.contains_pos(heading.line.start)))
        else {
            problems.push(format!("heading `{}` is in no chunk", label));
            continue;
        };
        let Some(body_end) = advance_chars(source, heading.line.end, min_body_chars) else {
            problems.push(format!("heading `{}` lies outside the source", label));
            continue;
        };
        let required = Span::new(heading.line.start, body_end.min(element.span.end));
        if !covers(chunk, required) {
            problems.push(format!(
                "heading `{}` is separated from its body in {} (needs {})",
                label, chunk.id, required
            ));
        }
    }

    P0CheckResult::from_problems(
        "P0-03",
        "heading-content unity",
        problems,
        format!("{} heading(s) share a chunk with their body", index.headings().count()),
        json!({
            "total_headings": index.headings().count(),
            "min_body_chars": min_body_chars,
        }),
    )
}

// ==================== P0-04 ====================

/// P0-04: every numeric leaf of the record occurs in the source after
/// number normalization.
pub fn check_numeric_value_integrity(assembled: &AssembledDocument, source: &str) -> P0CheckResult {
    let matcher = SourceMatcher::new(source);
    let mut problems = Vec::new();
    let mut checked = 0;

    for leaf in assembled.leaves().into_iter().filter(|l| l.numeric) {
        checked += 1;
        if matcher.find(&leaf.text).is_none() {
            problems.push(format!("{} = {} not in source", leaf.path, leaf.text));
        }
    }

    P0CheckResult::from_problems(
        "P0-04",
        "numeric value integrity",
        problems,
        format!("{} numeric value(s) found in the source", checked),
        json!({ "checked_values": checked }),
    )
}

// ==================== P0-05 ====================

/// P0-05: the owned segments of all chunks rebuild the source exactly.
pub fn check_character_loss(source: &str, chunks: &[Chunk]) -> P0CheckResult {
    let mut problems = Vec::new();
    let mut owned: Vec<&Span> = chunks.iter().flat_map(|c| c.owned_segments()).collect();
    owned.sort();

    let mut rebuilt = String::with_capacity(source.len());
    for span in owned {
        match span.slice(source) {
            Some(piece) => rebuilt.push_str(piece),
            None => problems.push(format!("segment {} does not fit the source", span)),
        }
    }

    let original_chars = source.chars().count();
    let rebuilt_chars = rebuilt.chars().count();
    let declared_chars: usize = chunks.iter().map(Chunk::owned_chars).sum();
    let original_hash = create_text_hash(source);
    let rebuilt_hash = create_text_hash(&rebuilt);

    if rebuilt_chars != original_chars {
        problems.push(format!(
            "rebuilt {} characters, source has {}",
            rebuilt_chars, original_chars
        ));
    }
    if declared_chars != original_chars {
        problems.push(format!(
            "chunks declare {} characters, source has {}",
            declared_chars, original_chars
        ));
    }
    if rebuilt_hash != original_hash {
        problems.push("rebuilt text differs from the source".to_string());
    }

    P0CheckResult::from_problems(
        "P0-05",
        "character loss",
        problems,
        format!("{} characters rebuilt without loss", original_chars),
        json!({
            "original_chars": original_chars,
            "rebuilt_chars": rebuilt_chars,
            "declared_chars": declared_chars,
            "original_hash": original_hash,
            "rebuilt_hash": rebuilt_hash,
        }),
    )
}

// ==================== P0-06 ====================

/// P0-06: the record round-trips through JSON, every chunk produced a JSON
/// object, and repaired fragments are rejected unless `accept_repaired`.
pub fn ensure_valid_json(
    assembled: &AssembledDocument,
    results: &[ExtractionResult],
    accept_repaired: bool,
) -> P0CheckResult {
    let mut problems = Vec::new();

    let round_trip = serde_json::to_string(assembled)
        .and_then(|text| serde_json::from_str::<Value>(&text));
    if let Err(err) = round_trip {
        problems.push(format!("record does not round-trip: {}", err));
    }

    let mut repaired = 0;
    for result in results {
        match &result.outcome {
            ExtractionOutcome::Failed { reason } => {
                problems.push(format!("{} produced no JSON: {}", result.chunk_id, reason));
            }
            ExtractionOutcome::Parsed { fragment, .. } if !fragment.is_object() => {
                problems.push(format!("{} returned a non-object fragment", result.chunk_id));
            }
            ExtractionOutcome::Parsed {
                recovered: true,
                dropped_suffix,
                ..
            } => {
                repaired += 1;
                if !accept_repaired {
                    problems.push(format!(
                        "{} was repaired, {} characters dropped",
                        result.chunk_id,
                        dropped_suffix.chars().count()
                    ));
                }
            }
            ExtractionOutcome::Parsed { .. } => {}
        }
    }

    P0CheckResult::from_problems(
        "P0-06",
        "valid JSON",
        problems,
        format!("{} fragment(s) decoded", results.len()),
        json!({
            "fragments": results.len(),
            "repaired": repaired,
            "accept_repaired": accept_repaired,
        }),
    )
}

// ==================== P0-07 ====================

fn assembled_state(assembled: &AssembledDocument, section: Section) -> Mention {
    if !assembled.has_section(section) {
        return Mention::NotMentioned;
    }
    match assembled.scalars(section) {
        Some(map) => map
            .values()
            .flatten()
            .map(|v| Mention::of_section(Some(&v.value)).merge(Mention::ExplicitlyEmpty))
            .fold(Mention::ExplicitlyEmpty, Mention::merge),
        None if assembled.section_len(section) == 0 => Mention::ExplicitlyEmpty,
        None => Mention::HasData,
    }
}

/// P0-07: "not mentioned", "explicitly empty" and "has data" survive
/// assembly unchanged, per section and per scalar field.
pub fn check_null_vs_empty(
    results: &[ExtractionResult],
    assembled: &AssembledDocument,
) -> P0CheckResult {
    let mut problems = Vec::new();
    let mut states = BTreeMap::new();
    let parsed: Vec<&ExtractionResult> = results.iter().filter(|r| !r.is_failed()).collect();

    for section in Section::ALL {
        let expected = parsed
            .iter()
            .map(|r| Mention::of_section(r.section(section)))
            .fold(Mention::NotMentioned, Mention::merge);
        let actual = assembled_state(assembled, section);
        if expected != actual {
            problems.push(format!(
                "{}: fragments say {:?}, record says {:?}",
                section, expected, actual
            ));
        }
        states.insert(section.key(), json!({ "fragments": expected, "record": actual }));

        if !section.is_scalar_map() {
            continue;
        }
        let mut fields: BTreeMap<String, Mention> = BTreeMap::new();
        for result in &parsed {
            for (key, value) in result.section(section).map(scalar_entries).unwrap_or_default() {
                let state = fields.entry(key).or_insert(Mention::NotMentioned);
                *state = state.merge(Mention::of_section(Some(value)));
            }
        }
        let scalars = assembled.scalars(section);
        for (key, expected) in &fields {
            let actual = scalars
                .and_then(|m| m.get(key))
                .map(|values| {
                    values
                        .iter()
                        .map(|v| Mention::of_section(Some(&v.value)).merge(Mention::ExplicitlyEmpty))
                        .fold(Mention::ExplicitlyEmpty, Mention::merge)
                })
                .unwrap_or(Mention::NotMentioned);
            if *expected != actual {
                problems.push(format!(
                    "{}.{}: fragments say {:?}, record says {:?}",
                    section, key, expected, actual
                ));
            }
        }
        for key in scalars.into_iter().flat_map(|m| m.keys()) {
            if !fields.contains_key(key) {
                problems.push(format!("{}.{} appears in no fragment", section, key));
            }
        }
    }

    P0CheckResult::from_problems(
        "P0-07",
        "null vs empty",
        problems,
        "section states match the fragments".to_string(),
        json!({ "states": states }),
    )
}

// ==================== P0-08 ====================

/// P0-08: every leaf of the record is traceable to the source, verbatim or
/// through case, whitespace, number or date normalization.
pub fn check_no_new_information(assembled: &AssembledDocument, source: &str) -> P0CheckResult {
    let matcher = SourceMatcher::new(source);
    let leaves = assembled.leaves();
    let problems: Vec<String> = leaves
        .iter()
        .filter(|leaf| matcher.find(&leaf.text).is_none())
        .map(|leaf| format!("{} = {:?} not in source", leaf.path, leaf.text))
        .collect();

    P0CheckResult::from_problems(
        "P0-08",
        "no new information",
        problems,
        format!("{} value(s) traced to the source", leaves.len()),
        json!({ "checked_values": leaves.len() }),
    )
}

// ==================== P0-09 ====================

/// P0-09: every detected conflict appears in the record unchanged.
pub fn check_conflict_preservation(
    detected: &[Conflict],
    assembled: &AssembledDocument,
) -> P0CheckResult {
    let mut problems = Vec::new();
    for conflict in detected {
        if assembled.conflicts.contains(conflict) {
            continue;
        }
        if assembled
            .conflicts
            .iter()
            .any(|c| c.field_path == conflict.field_path)
        {
            problems.push(format!("conflict on {} was altered", conflict.field_path));
        } else {
            problems.push(format!("conflict on {} is missing", conflict.field_path));
        }
    }

    P0CheckResult::from_problems(
        "P0-09",
        "conflict preservation",
        problems,
        format!("{} conflict(s) preserved", detected.len()),
        json!({
            "detected_conflicts": detected.len(),
            "preserved_conflicts": assembled.conflicts.len(),
        }),
    )
}

// ==================== P0-10 ====================

struct Tracer<'a> {
    known: BTreeSet<&'a ChunkId>,
    source_len: usize,
    checked: usize,
    problems: Vec<String>,
}

impl Tracer<'_> {
    fn trace(&mut self, path: String, provenance: &[Provenance]) {
        self.checked += 1;
        if provenance.is_empty() {
            self.problems.push(format!("{} has no provenance", path));
        }
        for entry in provenance {
            if !self.known.contains(&entry.source_chunk_id) {
                self.problems
                    .push(format!("{} names unknown chunk {}", path, entry.source_chunk_id));
            }
            if let Some(span) = entry.source_span {
                if span.end > self.source_len {
                    self.problems
                        .push(format!("{} points past the source at {}", path, span));
                }
            }
        }
    }
}

/// P0-10: every record, value, table, row, footnote and reference names at
/// least one existing chunk.
pub fn check_source_traceability(
    assembled: &AssembledDocument,
    chunks: &[Chunk],
    source_len: usize,
) -> P0CheckResult {
    let mut tracer = Tracer {
        known: chunks.iter().map(|c| &c.id).collect(),
        source_len,
        checked: 0,
        problems: Vec::new(),
    };

    for section in [Section::Requirements, Section::UnitPrices, Section::Deadlines] {
        for (i, record) in assembled.records(section).into_iter().flatten().enumerate() {
            tracer.trace(format!("{}[{}]", section.key(), i), &record.provenance);
        }
    }
    for section in [Section::Contact, Section::Administrative] {
        for (key, values) in assembled.scalars(section).into_iter().flatten() {
            for (i, value) in values.iter().enumerate() {
                tracer.trace(format!("{}.{}[{}]", section.key(), key, i), &value.provenance);
            }
        }
    }
    for (t, table) in assembled.tables.iter().flatten().enumerate() {
        tracer.trace(format!("tables[{}]", t), &table.provenance);
        for (r, row) in table.rows.iter().enumerate() {
            tracer.trace(format!("tables[{}].rows[{}]", t, r), &row.provenance);
        }
        for (f, note) in table.footnotes.iter().enumerate() {
            tracer.trace(format!("tables[{}].footnotes[{}]", t, f), &note.provenance);
        }
    }
    for (i, reference) in assembled.references.iter().enumerate() {
        tracer.trace(format!("references[{}]", i), &reference.provenance);
    }

    let checked = tracer.checked;
    P0CheckResult::from_problems(
        "P0-10",
        "source traceability",
        tracer.problems,
        format!("{} entries carry provenance", checked),
        json!({ "checked_entries": checked }),
    )
}

// ==================== battery ====================

/// Run the full battery in code order
pub fn run_all_p0_checks(ctx: &P0Context<'_>) -> P0Summary {
    let checks = vec![
        check_table_integrity(ctx.index, ctx.chunks, Some(ctx.assembled)),
        check_table_footnote_connection(ctx.index, ctx.assembled),
        check_heading_content_unity(
            ctx.source,
            ctx.index,
            ctx.chunks,
            ctx.config.heading_min_body_chars,
        ),
        check_numeric_value_integrity(ctx.assembled, ctx.source),
        check_character_loss(ctx.source, ctx.chunks),
        ensure_valid_json(ctx.assembled, ctx.results, ctx.config.accept_repaired_json),
        check_null_vs_empty(ctx.results, ctx.assembled),
        check_no_new_information(ctx.assembled, ctx.source),
        check_conflict_preservation(ctx.detected_conflicts, ctx.assembled),
        check_source_traceability(ctx.assembled, ctx.chunks, ctx.source.len()),
    ];

    let violations: Vec<P0Violation> = checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| P0Violation {
            code: c.code.clone(),
            name: c.name.clone(),
            explanation: c.explanation.clone(),
        })
        .collect();

    for violation in &violations {
        warn!(
            code = %violation.code,
            explanation = %violation.explanation,
            "P0 check failed"
        );
    }

    P0Summary {
        all_passed: violations.is_empty(),
        total_checks: checks.len(),
        passed_count: checks.len() - violations.len(),
        checks,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscan_domain::{ChunkKind, ChunkSegment, ConflictKind, ConflictValue, DocumentId, Severity};

    fn chunk(index: usize, source: &str, spans: &[(usize, usize)]) -> Chunk {
        let segments = spans
            .iter()
            .map(|(s, e)| ChunkSegment::owned(Span::new(*s, *e)))
            .collect();
        Chunk::from_segments(index, source, segments, ChunkKind::Text).unwrap()
    }

    #[test]
    fn test_text_hash_is_sha256() {
        assert_eq!(
            create_text_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(create_text_hash("abc").len(), 64);
    }

    #[test]
    fn test_character_loss_passes_on_exact_tiling() {
        let source = "Line one.\nLine two.\n";
        let chunks = vec![chunk(0, source, &[(0, 10)]), chunk(1, source, &[(10, 20)])];
        let result = check_character_loss(source, &chunks);
        assert!(result.passed, "{}", result.explanation);
        assert_eq!(result.code, "P0-05");
    }

    #[test]
    fn test_character_loss_detects_gap_and_duplication() {
        let source = "Line one.\nLine two.\n";
        let lost = vec![chunk(0, source, &[(0, 10)]), chunk(1, source, &[(11, 20)])];
        assert!(!check_character_loss(source, &lost).passed);

        let doubled = vec![chunk(0, source, &[(0, 12)]), chunk(1, source, &[(10, 20)])];
        assert!(!check_character_loss(source, &doubled).passed);
    }

    #[test]
    fn test_character_loss_ignores_declared_overlap() {
        let source = "HEAD\nrow1\nrow2\n";
        let second = Chunk::from_segments(
            1,
            source,
            vec![
                ChunkSegment::repeated(Span::new(0, 5)),
                ChunkSegment::owned(Span::new(10, 15)),
            ],
            ChunkKind::TableFragment,
        )
        .unwrap();
        let chunks = vec![chunk(0, source, &[(0, 10)]), second];
        assert!(check_character_loss(source, &chunks).passed);
    }

    #[test]
    fn test_character_loss_reports_out_of_range_segment() {
        let source = "short";
        let mut bad = chunk(0, source, &[(0, 5)]);
        bad.segments.push(ChunkSegment::owned(Span::new(5, 50)));
        let result = check_character_loss(source, &[bad]);
        assert!(!result.passed);
        assert!(result.explanation.contains("does not fit"));
    }

    #[test]
    fn test_conflict_preservation() {
        let conflict = Conflict {
            field_path: "unit_prices[bread].unit_price".into(),
            section: Section::UnitPrices,
            values: vec![
                ConflictValue {
                    value: json!("12,50"),
                    source_chunk_id: ChunkId::from_index(0),
                    source_span: None,
                },
                ConflictValue {
                    value: json!("13,00"),
                    source_chunk_id: ChunkId::from_index(1),
                    source_span: None,
                },
            ],
            severity: Severity::Critical,
            kind: ConflictKind::DifferentValues,
        };
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        let detected = vec![conflict.clone()];

        let missing = check_conflict_preservation(&detected, &doc);
        assert!(!missing.passed);
        assert!(missing.explanation.contains("missing"));

        let mut altered = conflict.clone();
        altered.values.pop();
        doc.conflicts = vec![altered];
        assert!(check_conflict_preservation(&detected, &doc)
            .explanation
            .contains("altered"));

        doc.conflicts = vec![conflict];
        assert!(check_conflict_preservation(&detected, &doc).passed);
    }

    #[test]
    fn test_valid_json_rejects_failures_and_repairs() {
        let doc = AssembledDocument::empty(DocumentId::from_string("d"));
        let clean = vec![ExtractionResult::parsed(ChunkId::from_index(0), json!({}))];
        assert!(ensure_valid_json(&doc, &clean, false).passed);

        let repaired = vec![ExtractionResult {
            chunk_id: ChunkId::from_index(0),
            outcome: ExtractionOutcome::Parsed {
                fragment: json!({"deadlines": []}),
                recovered: true,
                dropped_suffix: "{\"da".into(),
            },
            attempts: 1,
        }];
        assert!(!ensure_valid_json(&doc, &repaired, false).passed);
        assert!(ensure_valid_json(&doc, &repaired, true).passed);

        let failed = vec![ExtractionResult::failed(ChunkId::from_index(0), "timeout", 3)];
        assert!(!ensure_valid_json(&doc, &failed, true).passed);

        let not_object = vec![ExtractionResult::parsed(ChunkId::from_index(0), json!([1]))];
        assert!(!ensure_valid_json(&doc, &not_object, true).passed);
    }

    #[test]
    fn test_null_vs_empty_distinguishes_states() {
        let results = vec![
            ExtractionResult::parsed(ChunkId::from_index(0), json!({"deadlines": []})),
            ExtractionResult::parsed(ChunkId::from_index(1), json!({"contact": {"phone": ""}})),
        ];
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        doc.deadlines = Some(vec![]);
        doc.contact = Some(
            [(
                "phone".to_string(),
                vec![tenderscan_domain::SourcedValue {
                    value: json!(""),
                    provenance: vec![Provenance::new(ChunkId::from_index(1))],
                    conflict: None,
                }],
            )]
            .into_iter()
            .collect(),
        );
        let result = check_null_vs_empty(&results, &doc);
        assert!(result.passed, "{}", result.explanation);

        // "explicitly empty" collapsed into "not mentioned"
        doc.deadlines = None;
        assert!(!check_null_vs_empty(&results, &doc).passed);

        // "not mentioned" turned into "explicitly empty"
        doc.deadlines = Some(vec![]);
        doc.requirements = Some(vec![]);
        assert!(!check_null_vs_empty(&results, &doc).passed);
    }

    #[test]
    fn test_no_new_information_flags_fabrication() {
        let source = "Bread is delivered daily at 12,50 TL per kg.";
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        doc.unit_prices = Some(vec![tenderscan_domain::SourcedRecord {
            fields: [
                ("item".to_string(), json!("bread")),
                ("unit_price".to_string(), json!(12.5)),
            ]
            .into_iter()
            .collect(),
            provenance: vec![Provenance::new(ChunkId::from_index(0))],
            conflicts: vec![],
        }]);
        assert!(check_no_new_information(&doc, source).passed);
        assert!(check_numeric_value_integrity(&doc, source).passed);

        if let Some(records) = doc.unit_prices.as_mut() {
            records[0].fields.insert("unit_price".into(), json!(14));
            records[0].fields.insert("supplier".into(), json!("Acme Foods"));
        }
        let result = check_no_new_information(&doc, source);
        assert!(!result.passed);
        assert_eq!(result.details["problems"].as_array().unwrap().len(), 2);
        assert!(!check_numeric_value_integrity(&doc, source).passed);
    }

    #[test]
    fn test_source_traceability() {
        let source = "Bread 12,50";
        let chunks = vec![chunk(0, source, &[(0, 11)])];
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        doc.unit_prices = Some(vec![tenderscan_domain::SourcedRecord {
            fields: BTreeMap::new(),
            provenance: vec![Provenance::new(ChunkId::from_index(0)).with_span(Span::new(0, 5))],
            conflicts: vec![],
        }]);
        assert!(check_source_traceability(&doc, &chunks, source.len()).passed);

        if let Some(records) = doc.unit_prices.as_mut() {
            records.push(tenderscan_domain::SourcedRecord {
                fields: BTreeMap::new(),
                provenance: vec![Provenance::new(ChunkId::from_index(7))],
                conflicts: vec![],
            });
            records.push(tenderscan_domain::SourcedRecord {
                fields: BTreeMap::new(),
                provenance: vec![],
                conflicts: vec![],
            });
        }
        let result = check_source_traceability(&doc, &chunks, source.len());
        assert!(!result.passed);
        assert!(result.explanation.starts_with("2 problem(s)"));
    }

    #[test]
    fn test_explanation_is_capped() {
        let problems: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        let result = P0CheckResult::from_problems("P0-99", "demo", problems, String::new(), json!({}));
        assert!(result.explanation.ends_with("and 3 more"));
        assert_eq!(result.details["problems"].as_array().unwrap().len(), 8);
    }
}
