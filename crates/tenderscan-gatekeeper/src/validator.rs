//! Validation of the assembled record

use crate::config::GatekeeperConfig;
use crate::error::Result;
use crate::p0::{run_all_p0_checks, P0Context, P0Summary};
use crate::schema::{OutputSchema, SchemaReport, SchemaViolation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tenderscan_domain::normalize::fold_text;
use tenderscan_domain::{
    AssembledDocument, ElementId, ElementKind, ElementType, Mention, Section, Severity,
    StructuralIndex,
};
use tracing::{info, warn};

const CRITICAL_SECTIONS: [Section; 2] = [Section::UnitPrices, Section::Deadlines];
const IMPORTANT_SECTIONS: [Section; 2] = [Section::Requirements, Section::Tables];
const OPTIONAL_SECTIONS: [Section; 2] = [Section::Contact, Section::Administrative];

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn ratio(found: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        found as f64 / total as f64
    }
}

/// Coverage of one element type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindCoverage {
    /// Elements detected in the source
    pub detected: usize,
    /// Elements represented in the record
    pub represented: usize,
    /// `represented / detected`, 1.0 when nothing was detected
    pub ratio: f64,
}

/// Weighted presence of the output sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionCoverage {
    /// 0.5 critical + 0.35 important + 0.15 optional, two decimals
    pub score: f64,
    /// Every critical section holds data
    pub critical_complete: bool,
    /// Sections holding data
    pub found: Vec<Section>,
    /// Sections absent or empty
    pub missing: Vec<Section>,
    /// `found/total` per tier
    pub summary: BTreeMap<String, String>,
}

/// Structural completeness of the assembled record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    /// `represented / detected`, two decimals; 1.0 for documents without structure
    pub score: f64,
    /// Elements detected
    pub detected: usize,
    /// Elements represented
    pub represented: usize,
    /// Coverage per element type
    pub by_type: BTreeMap<ElementType, KindCoverage>,
    /// Elements with no trace in the record
    pub missing: Vec<ElementId>,
    /// Output section coverage
    pub sections: SectionCoverage,
}

/// Category of a data quality issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Record confidence below threshold
    LowConfidence,
    /// Record without a located source span
    MissingSpan,
    /// Unresolved conflict
    Conflict,
    /// Chunk that produced no fragment
    FailedChunk,
}

/// One data quality finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Category
    pub kind: IssueKind,
    /// Path or chunk the issue concerns
    pub path: String,
    /// Urgency
    pub severity: Severity,
    /// Human-readable detail
    pub message: String,
}

/// Data quality score with its issues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// 1.0 minus penalties, clamped at 0, two decimals
    pub score: f64,
    /// Every issue found
    pub issues: Vec<QualityIssue>,
    /// Issue counts per severity
    pub by_severity: BTreeMap<Severity, usize>,
}

/// Outcome of the fail-fast pre-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickValidation {
    /// Pre-check passed
    pub valid: bool,
    /// `OK` or the first failure
    pub reason: String,
}

impl QuickValidation {
    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Full validation outcome for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Schema conformance
    pub schema: SchemaReport,
    /// Structural completeness
    pub completeness: CompletenessReport,
    /// Data quality
    pub data_quality: DataQualityReport,
    /// Fail-fast pre-check
    pub quick: QuickValidation,
    /// P0 battery
    pub p0: P0Summary,
    /// Schema valid, quick check passed and every P0 check passed
    pub accepted: bool,
}

/// The Gatekeeper validates assembled records before acceptance
#[derive(Debug, Clone, Default)]
pub struct Gatekeeper {
    config: GatekeeperConfig,
}

impl Gatekeeper {
    /// Create a new Gatekeeper with the given configuration
    pub fn new(config: GatekeeperConfig) -> Self {
        Self { config }
    }

    /// Create a Gatekeeper with default configuration
    pub fn default_config() -> Self {
        Self::new(GatekeeperConfig::default())
    }

    /// Active configuration
    pub fn config(&self) -> &GatekeeperConfig {
        &self.config
    }

    /// Run every validation stage.
    ///
    /// The P0 battery runs with this gatekeeper's configuration regardless
    /// of the configuration carried by `ctx`.
    ///
    /// # Errors
    ///
    /// Only when the record cannot be serialized. Validation failures are
    /// data in the returned report.
    pub fn validate(&self, ctx: &P0Context<'_>) -> Result<ValidationReport> {
        let value = serde_json::to_value(ctx.assembled)?;

        // 1. Fail-fast pre-check
        let quick = self.quick_validate(&value);

        // 2. Schema conformance
        let schema = OutputSchema::assembled_document().validate(&value);

        // 3. Report metrics
        let completeness = calculate_completeness(ctx.assembled, ctx.index);
        let data_quality = self.check_data_quality(ctx.assembled);

        // 4. Hard gate
        let p0 = run_all_p0_checks(&P0Context {
            config: &self.config,
            ..*ctx
        });

        let accepted = schema.valid && quick.valid && p0.all_passed;
        if accepted {
            info!(
                document_id = %ctx.assembled.document_id,
                completeness = completeness.score,
                quality = data_quality.score,
                "Document accepted"
            );
        } else {
            warn!(
                document_id = %ctx.assembled.document_id,
                schema_valid = schema.valid,
                quick_valid = quick.valid,
                p0_failed = p0.violations.len(),
                "Document rejected"
            );
        }

        Ok(ValidationReport {
            schema,
            completeness,
            data_quality,
            quick,
            p0,
            accepted,
        })
    }

    /// Validate the serialized record against `schema`
    pub fn validate_schema(
        &self,
        assembled: &AssembledDocument,
        schema: &OutputSchema,
    ) -> SchemaReport {
        validate_schema(assembled, schema)
    }

    /// Structural completeness of `assembled` against `index`
    pub fn calculate_completeness(
        &self,
        assembled: &AssembledDocument,
        index: &StructuralIndex,
    ) -> CompletenessReport {
        calculate_completeness(assembled, index)
    }

    /// Data quality with the configured confidence threshold
    pub fn check_data_quality(&self, assembled: &AssembledDocument) -> DataQualityReport {
        data_quality(assembled, self.config.low_confidence_threshold)
    }

    /// Fail-fast pre-check with the configured required keys
    pub fn quick_validate(&self, value: &Value) -> QuickValidation {
        quick_check(value, &self.config.required_top_level_keys)
    }
}

/// Validate the serialized record against `schema`.
///
/// A record that cannot be serialized is reported as a violation at `$`.
pub fn validate_schema(assembled: &AssembledDocument, schema: &OutputSchema) -> SchemaReport {
    match serde_json::to_value(assembled) {
        Ok(value) => schema.validate(&value),
        Err(err) => SchemaReport::from_violations(vec![SchemaViolation {
            path: "$".to_string(),
            message: format!("record does not serialize: {}", err),
        }]),
    }
}

/// Share of detected structural elements represented in the record
pub fn calculate_completeness(
    assembled: &AssembledDocument,
    index: &StructuralIndex,
) -> CompletenessReport {
    let spans = assembled.provenance_spans();
    let leaves: Vec<String> = assembled
        .leaves()
        .iter()
        .map(|leaf| fold_text(&leaf.text))
        .collect();
    let quoted = |needle: &str| {
        let needle = fold_text(needle);
        !needle.is_empty() && leaves.iter().any(|leaf| leaf.contains(&needle))
    };
    let tables = assembled.tables.as_deref().unwrap_or_default();

    let mut by_type: BTreeMap<ElementType, KindCoverage> = ElementType::ALL
        .iter()
        .map(|ty| {
            (
                *ty,
                KindCoverage {
                    detected: 0,
                    represented: 0,
                    ratio: 1.0,
                },
            )
        })
        .collect();
    let mut missing = Vec::new();

    for element in index.elements() {
        let represented = match &element.kind {
            ElementKind::Table(_) => tables.iter().any(|t| t.element == Some(element.id)),
            ElementKind::Heading(heading) => {
                let label = if heading.title.is_empty() {
                    heading.display_text()
                } else {
                    heading.title.clone()
                };
                spans.iter().any(|s| element.span.contains(s)) || quoted(&label)
            }
            ElementKind::ListItem(item) => {
                spans.iter().any(|s| s.intersects(&item.own)) || quoted(&item.text)
            }
            ElementKind::Footnote(footnote) => {
                let marker_kept = footnote.links.iter().any(|link| {
                    tables
                        .iter()
                        .filter(|t| t.element.is_some() && t.element == link.table)
                        .flat_map(|t| t.rows.iter())
                        .any(|row| row.footnotes.contains(&footnote.marker))
                });
                marker_kept || quoted(&footnote.body)
            }
            ElementKind::Reference(_) => {
                assembled.references.iter().any(|r| r.element == element.id)
            }
        };

        if let Some(coverage) = by_type.get_mut(&element.element_type()) {
            coverage.detected += 1;
            if represented {
                coverage.represented += 1;
            }
        }
        if !represented {
            missing.push(element.id);
        }
    }

    for coverage in by_type.values_mut() {
        coverage.ratio = round2(ratio(coverage.represented, coverage.detected));
    }
    let detected = index.len();
    let represented = detected - missing.len();

    CompletenessReport {
        score: round2(ratio(represented, detected)),
        detected,
        represented,
        by_type,
        missing,
        sections: section_coverage(assembled),
    }
}

fn section_coverage(assembled: &AssembledDocument) -> SectionCoverage {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    let mut summary = BTreeMap::new();
    let mut score = 0.0;

    for (tier, sections, weight) in [
        ("critical", &CRITICAL_SECTIONS, 0.5),
        ("important", &IMPORTANT_SECTIONS, 0.35),
        ("optional", &OPTIONAL_SECTIONS, 0.15),
    ] {
        let mut tier_found = 0;
        for section in sections {
            if assembled.section_len(*section) > 0 {
                tier_found += 1;
                found.push(*section);
            } else {
                missing.push(*section);
            }
        }
        score += ratio(tier_found, sections.len()) * weight;
        summary.insert(tier.to_string(), format!("{}/{}", tier_found, sections.len()));
    }

    SectionCoverage {
        score: round2(score),
        critical_complete: CRITICAL_SECTIONS.iter().all(|s| found.contains(s)),
        found,
        missing,
        summary,
    }
}

/// Data quality with the default confidence threshold
pub fn check_data_quality(assembled: &AssembledDocument) -> DataQualityReport {
    data_quality(assembled, GatekeeperConfig::default().low_confidence_threshold)
}

fn data_quality(assembled: &AssembledDocument, threshold: f64) -> DataQualityReport {
    let mut issues = Vec::new();
    let mut score: f64 = 1.0;

    // 1. Low-confidence and unlocated records
    for section in [Section::Requirements, Section::UnitPrices, Section::Deadlines] {
        for (i, record) in assembled.records(section).into_iter().flatten().enumerate() {
            let path = format!("{}[{}]", section.key(), i);
            let confidence = record.fields.get("confidence").and_then(Value::as_f64);
            if let Some(confidence) = confidence.filter(|c| *c < threshold) {
                issues.push(QualityIssue {
                    kind: IssueKind::LowConfidence,
                    path: path.clone(),
                    severity: Severity::Warning,
                    message: format!("confidence {} below {}", confidence, threshold),
                });
                score -= 0.02;
            }
            if record.provenance.iter().all(|p| p.source_span.is_none()) {
                issues.push(QualityIssue {
                    kind: IssueKind::MissingSpan,
                    path,
                    severity: Severity::Info,
                    message: "no source span located".to_string(),
                });
                score -= 0.01;
            }
        }
    }

    // 2. Preserved conflicts
    for conflict in &assembled.conflicts {
        issues.push(QualityIssue {
            kind: IssueKind::Conflict,
            path: conflict.field_path.clone(),
            severity: conflict.severity,
            message: format!("{} conflicting values", conflict.values.len()),
        });
        score -= 0.05;
    }

    // 3. Failed chunks
    for chunk_id in &assembled.metadata.failed_chunks {
        issues.push(QualityIssue {
            kind: IssueKind::FailedChunk,
            path: chunk_id.to_string(),
            severity: Severity::Critical,
            message: "chunk produced no fragment".to_string(),
        });
        score -= 0.1;
    }

    let mut by_severity = BTreeMap::new();
    for issue in &issues {
        *by_severity.entry(issue.severity).or_insert(0) += 1;
    }

    DataQualityReport {
        score: round2(score.max(0.0)),
        issues,
        by_severity,
    }
}

/// Fail-fast pre-check with the default required keys
pub fn quick_validate(value: &Value) -> QuickValidation {
    quick_check(value, &GatekeeperConfig::default().required_top_level_keys)
}

fn quick_check(value: &Value, required: &[String]) -> QuickValidation {
    let Some(object) = value.as_object() else {
        return QuickValidation::fail("result is not a JSON object");
    };
    if let Some(key) = required.iter().find(|k| !object.contains_key(k.as_str())) {
        return QuickValidation::fail(format!("missing top-level key `{}`", key));
    }
    let populated = Section::ALL
        .iter()
        .any(|s| Mention::of_section(object.get(s.key())) == Mention::HasData);
    if !populated {
        return QuickValidation::fail("no extraction section holds data");
    }
    QuickValidation {
        valid: true,
        reason: "OK".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenderscan_domain::{
        AssembledTable, ChunkId, Conflict, ConflictKind, ConflictValue, DocumentId, Provenance,
        SourcedRecord, Span,
    };

    fn record(fields: Value, span: Option<Span>) -> SourcedRecord {
        let mut provenance = Provenance::new(ChunkId::from_index(0));
        provenance.source_span = span;
        SourcedRecord {
            fields: fields
                .as_object()
                .map(|m| m.clone().into_iter().collect())
                .unwrap_or_default(),
            provenance: vec![provenance],
            conflicts: vec![],
        }
    }

    #[test]
    fn test_data_quality_penalties() {
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        doc.unit_prices = Some(vec![
            record(json!({"item": "Bread", "confidence": 0.4}), None),
            record(json!({"item": "Milk"}), Some(Span::new(0, 4))),
        ]);
        doc.conflicts.push(Conflict {
            field_path: "unit_prices[milk].unit_price".into(),
            section: Section::UnitPrices,
            values: vec![
                ConflictValue {
                    value: json!("9,00"),
                    source_chunk_id: ChunkId::from_index(0),
                    source_span: None,
                },
                ConflictValue {
                    value: json!("9,50"),
                    source_chunk_id: ChunkId::from_index(1),
                    source_span: None,
                },
            ],
            severity: Severity::Critical,
            kind: ConflictKind::DifferentValues,
        });
        doc.metadata.failed_chunks.push(ChunkId::from_index(2));

        let report = check_data_quality(&doc);
        // 1.0 - 0.02 - 0.01 - 0.05 - 0.1
        assert_eq!(report.score, 0.82);
        assert_eq!(report.issues.len(), 4);
        assert_eq!(report.by_severity[&Severity::Critical], 2);
    }

    #[test]
    fn test_data_quality_clamps_at_zero() {
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        doc.metadata.failed_chunks = (0..15).map(ChunkId::from_index).collect();
        assert_eq!(check_data_quality(&doc).score, 0.0);
    }

    #[test]
    fn test_quick_validate() {
        assert!(!quick_validate(&json!([1, 2])).valid);

        let missing = quick_validate(&json!({"document_id": "d", "conflicts": []}));
        assert!(!missing.valid);
        assert!(missing.reason.contains("metadata"));

        let empty = json!({"document_id": "d", "conflicts": [], "metadata": {}, "deadlines": []});
        assert!(!quick_validate(&empty).valid);

        let populated = json!({
            "document_id": "d", "conflicts": [], "metadata": {},
            "deadlines": [{"fields": {"date": "2025-03-15"}}]
        });
        let result = quick_validate(&populated);
        assert!(result.valid);
        assert_eq!(result.reason, "OK");
    }

    #[test]
    fn test_section_coverage_weights() {
        let mut doc = AssembledDocument::empty(DocumentId::from_string("d"));
        doc.unit_prices = Some(vec![record(json!({"item": "Bread"}), None)]);
        doc.deadlines = Some(vec![record(json!({"date": "2025-03-15"}), None)]);
        doc.tables = Some(vec![AssembledTable {
            element: None,
            caption: None,
            header: vec![],
            rows: vec![],
            footnotes: vec![],
            fragments: vec![],
            provenance: vec![],
        }]);
        doc.contact = Some(
            [(
                "phone".to_string(),
                vec![tenderscan_domain::SourcedValue {
                    value: json!("555"),
                    provenance: vec![],
                    conflict: None,
                }],
            )]
            .into_iter()
            .collect(),
        );
        let coverage = section_coverage(&doc);
        // 0.5 + 0.35 / 2 + 0.15 / 2
        assert_eq!(coverage.score, 0.75);
        assert!(coverage.critical_complete);
        assert_eq!(coverage.summary["important"], "1/2");
        assert!(coverage.found.contains(&Section::Contact));
        assert!(!coverage.missing.contains(&Section::Contact));
        assert!(coverage.missing.contains(&Section::Administrative));
    }

    #[test]
    fn test_validate_schema_free_function() {
        let doc = AssembledDocument::empty(DocumentId::from_string("d"));
        assert!(validate_schema(&doc, &OutputSchema::assembled_document()).valid);
        let strict_string = OutputSchema::String;
        let report = validate_schema(&doc, &strict_string);
        assert_eq!(report.violations[0].path, "$");
    }
}
