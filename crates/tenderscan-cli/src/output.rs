//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use serde_json::json;
use tenderscan_domain::{Chunk, ElementKind, Section, StructuralIndex};
use tenderscan_extractor::chunking::CharacterCountReport;
use tenderscan_extractor::parser::ParsedJson;
use tenderscan_extractor::PipelineOutcome;
use tenderscan_monitor::MonitorReport;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Longest cell excerpt shown in tables
const EXCERPT_CHARS: usize = 48;

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format a structural index.
    pub fn format_structure(&self, index: &StructuralIndex) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(index)?);
        }
        if index.is_empty() {
            return Ok(self.colorize("No structure detected.", "yellow"));
        }

        let mut builder = Builder::default();
        builder.push_record(["ID", "Type", "Span", "Parent", "Detail"]);
        for element in index.elements() {
            let parent = element.parent.map(|p| p.to_string()).unwrap_or_default();
            builder.push_record([
                element.id.to_string(),
                element.element_type().as_str().to_string(),
                element.span.to_string(),
                parent,
                excerpt(&describe(&element.kind)),
            ]);
        }

        let mut out = self.table(builder);
        out.push('\n');
        let counts: Vec<String> = index
            .counts()
            .iter()
            .map(|(ty, n)| format!("{} {}", n, ty.as_str()))
            .collect();
        out.push_str(&self.info(&format!(
            "{} element(s) over {} chars: {}",
            index.len(),
            index.char_count(),
            counts.join(", ")
        )));
        Ok(out)
    }

    /// Format chunks with their character accounting.
    pub fn format_chunks(&self, chunks: &[Chunk], report: &CharacterCountReport) -> Result<String> {
        if self.format == OutputFormat::Json {
            let value = json!({ "chunks": chunks, "character_count": report });
            return Ok(serde_json::to_string_pretty(&value)?);
        }

        let mut builder = Builder::default();
        builder.push_record(["ID", "Kind", "Span", "Chars", "Overlap", "Part of", "Heading"]);
        for chunk in chunks {
            let part_of: Vec<String> = chunk
                .part_of
                .iter()
                .map(|p| format!("{} {}/{}", p.label, p.part, p.total))
                .collect();
            builder.push_record([
                chunk.id.to_string(),
                format!("{:?}", chunk.kind),
                chunk.span().to_string(),
                chunk.char_count.to_string(),
                chunk.overlap_chars.to_string(),
                excerpt(&part_of.join("; ")),
                excerpt(chunk.heading_context.as_deref().unwrap_or("")),
            ]);
        }

        let mut out = self.table(builder);
        out.push('\n');
        out.push_str(&self.success(&format!(
            "{} chunk(s): {} chars - {} overlap = {} source chars",
            report.chunk_count,
            report.chunk_chars,
            report.declared_overlap,
            report.original_chars
        )));
        Ok(out)
    }

    /// Format a decoded model response.
    pub fn format_repair(&self, parsed: &ParsedJson) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(parsed)?);
        }

        let mut out = serde_json::to_string_pretty(&parsed.value)?;
        out.push('\n');
        if parsed.cleanups.is_empty() {
            out.push_str(&self.success("Parsed without cleanup"));
        } else {
            let cleanups: Vec<String> = parsed
                .cleanups
                .iter()
                .map(|c| json!(c).as_str().unwrap_or_default().to_string())
                .collect();
            out.push_str(&self.info(&format!("Cleanups: {}", cleanups.join(", "))));
        }
        if parsed.recovered {
            out.push('\n');
            out.push_str(&self.warning(&format!(
                "Recovered from truncated output; dropped {:?}",
                parsed.dropped_suffix
            )));
        }
        Ok(out)
    }

    /// Format a pipeline outcome with its monitor report.
    pub fn format_outcome(&self, outcome: &PipelineOutcome, report: &MonitorReport) -> Result<String> {
        if self.format == OutputFormat::Json {
            let value = json!({
                "accepted": outcome.accepted,
                "assembled": outcome.assembled,
                "conflict_report": outcome.conflict_report,
                "no_new_information": outcome.no_new_information,
                "validation": outcome.validation,
                "monitor": report,
            });
            return Ok(serde_json::to_string_pretty(&value)?);
        }

        let assembled = &outcome.assembled;
        let mut sections = Builder::default();
        sections.push_record(["Section", "Entries"]);
        for section in Section::ALL {
            let entries = if assembled.has_section(section) {
                assembled.section_len(section).to_string()
            } else {
                "-".to_string()
            };
            sections.push_record([section.key().to_string(), entries]);
        }
        sections.push_record(["references".to_string(), assembled.references.len().to_string()]);
        sections.push_record([
            "unresolved_references".to_string(),
            assembled.unresolved_references.len().to_string(),
        ]);

        let mut checks = Builder::default();
        checks.push_record(["Code", "Check", "Result", "Explanation"]);
        for check in &outcome.validation.p0.checks {
            let result = if check.passed {
                self.colorize("pass", "green")
            } else {
                self.colorize("FAIL", "red")
            };
            checks.push_record([
                check.code.clone(),
                check.name.clone(),
                result,
                excerpt(&check.explanation),
            ]);
        }

        let mut stages = Builder::default();
        stages.push_record(["Stage", "ms", "%"]);
        for stage in &report.stages {
            stages.push_record([
                stage.name.clone(),
                format!("{:.1}", stage.duration_ms),
                format!("{:.1}", stage.percentage),
            ]);
        }

        let mut out = String::new();
        out.push_str(&self.table(sections));
        out.push('\n');
        out.push_str(&self.table(checks));
        out.push('\n');
        out.push_str(&self.table(stages));
        out.push('\n');

        let metadata = &assembled.metadata;
        out.push_str(&self.info(&format!(
            "{} chunk(s): {} succeeded, {} failed, {} repaired; {} conflict(s), {} critical",
            metadata.source_chunks,
            metadata.successful_chunks,
            metadata.failed_chunks.len(),
            metadata.repaired_chunks.len(),
            outcome.conflict_report.total_conflicts,
            outcome.conflict_report.critical_conflicts
        )));
        out.push('\n');
        out.push_str(&self.info(&format!(
            "Completeness {:.0}%, success rate {}%, {:.1} chunks/s",
            outcome.validation.completeness.score * 100.0,
            report.performance_summary.success_rate,
            report.performance_summary.chunks_per_second
        )));
        if !outcome.no_new_information.passed {
            out.push('\n');
            out.push_str(&self.warning(&format!(
                "{} value(s) not found in the source",
                outcome.no_new_information.untraced.len()
            )));
        }
        out.push('\n');
        if outcome.accepted {
            out.push_str(&self.success(&format!("Document {} accepted", assembled.document_id)));
        } else {
            out.push_str(&self.error(&format!(
                "Document {} rejected: {} P0 check(s) failed",
                assembled.document_id,
                outcome.validation.p0.violations.len()
            )));
        }
        Ok(out)
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

fn describe(kind: &ElementKind) -> String {
    match kind {
        ElementKind::Heading(h) => h.display_text(),
        ElementKind::Table(t) => {
            let caption = t.caption.as_deref().unwrap_or("(no caption)");
            format!("{} [{} rows x {} cols]", caption, t.rows.len(), t.column_count)
        }
        ElementKind::ListItem(l) => format!("{} {}", l.index, l.text),
        ElementKind::Footnote(f) => format!("{} {}", f.marker, f.body),
        ElementKind::Reference(r) => {
            let state = if r.is_resolved() { "resolved" } else { "unresolved" };
            format!("{} ({})", r.mention, state)
        }
    }
}

/// Single-line excerpt for table cells
fn excerpt(text: &str) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= EXCERPT_CHARS {
        return line;
    }
    let cut: String = line.chars().take(EXCERPT_CHARS - 3).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscan_extractor::chunking::{chunk_text, validate_character_count};
    use tenderscan_extractor::parser::safe_json_parse;
    use tenderscan_structure::detect_structure;

    const TENDER: &str = "\
ARTICLE 1 - Supplies
The contractor delivers bread as specified in Article 1.

Table 1: Prices
| Item | Unit | Price |
|------|------|-------|
| Bread | kg | 12,50 |
";

    #[test]
    fn test_structure_table() {
        let index = detect_structure(TENDER).unwrap();
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_structure(&index).unwrap();
        assert!(output.contains("heading"));
        assert!(output.contains("Table 1: Prices"));
        assert!(output.contains("element(s)"));
    }

    #[test]
    fn test_structure_json() {
        let index = detect_structure(TENDER).unwrap();
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter.format_structure(&index).unwrap();
        let parsed: StructuralIndex = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_chunks_table_reports_accounting() {
        let chunks = chunk_text(TENDER, 60).unwrap();
        let report = validate_character_count(TENDER, &chunks).unwrap();
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_chunks(&chunks, &report).unwrap();
        assert!(output.contains("c0000"));
        assert!(output.contains(&format!("{} source chars", TENDER.chars().count())));
    }

    #[test]
    fn test_repair_output_flags_truncation() {
        let parsed = safe_json_parse(r#"{"requirements": [{"text": "Deliver daily"}, {"text": "Del"#).unwrap();
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_repair(&parsed).unwrap();
        assert!(output.contains("Deliver daily"));
        assert!(output.contains("repaired_truncation"));
        assert!(output.contains("Recovered from truncated output"));
    }

    #[test]
    fn test_no_color() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        assert_eq!(formatter.success("Done"), "✓ Done");
        assert_eq!(formatter.warning("Careful"), "⚠ Careful");
    }

    #[test]
    fn test_excerpt_shortens_long_text() {
        let long = "word ".repeat(40);
        let short = excerpt(&long);
        assert_eq!(short.chars().count(), EXCERPT_CHARS);
        assert!(short.ends_with("..."));
        assert_eq!(excerpt("a\n b"), "a b");
    }
}
