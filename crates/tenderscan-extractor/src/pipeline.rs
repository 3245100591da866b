//! End-to-end processing of one document.
//!
//! Stages run in a fixed order, each bracketed on the monitor:
//!
//! 1. `structure`: detect the structural index
//! 2. `chunking`: split the text along it
//! 3. `extraction`: fan out to the provider and wait for every chunk
//! 4. `conflicts`: compare fragments across chunks
//! 5. `assembly`: merge fragments and trace leaves to the source
//! 6. `validation`: schema, completeness, quality and the P0 battery
//!
//! Structure and chunking failures abort the run. Everything later is
//! data: a rejected document still comes back with its record and report.

use crate::assembler::{validate_no_new_information, Assembler, NoNewInformationReport};
use crate::chunking::{chunk_structured, ChunkOptions};
use crate::config::PipelineConfig;
use crate::conflict::{detect_conflicts, generate_conflict_report, ConflictReport};
use crate::error::PipelineError;
use crate::extractor::Extractor;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;
use std::sync::Arc;
use tenderscan_domain::traits::LlmProvider;
use tenderscan_domain::{
    AssembledDocument, Chunk, Conflict, Document, ExtractionResult, StructuralIndex,
};
use tenderscan_gatekeeper::{Gatekeeper, P0Context, ValidationReport};
use tenderscan_monitor::MonitorHandle;
use tenderscan_structure::detect_structure_with_limit;
use tracing::{error, info};

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Structural index of the source
    pub index: StructuralIndex,
    /// Chunks sent to the provider
    pub chunks: Vec<Chunk>,
    /// One result per chunk, ordered by chunk index
    pub results: Vec<ExtractionResult>,
    /// Cross-chunk disagreements
    pub conflicts: Vec<Conflict>,
    /// Conflict summary
    pub conflict_report: ConflictReport,
    /// Assembled record
    pub assembled: AssembledDocument,
    /// Leaf tracing against the source
    pub no_new_information: NoNewInformationReport,
    /// Validation and P0 outcome
    pub validation: ValidationReport,
    /// The record passed every gate
    pub accepted: bool,
}

/// Runs documents through every stage with one provider
pub struct Pipeline<L>
where
    L: LlmProvider,
{
    extractor: Extractor<L>,
    gatekeeper: Gatekeeper,
}

impl<L> Pipeline<L>
where
    L: LlmProvider + Send + Sync + 'static,
    L::Error: Display,
{
    /// Create a pipeline
    pub fn new(llm_provider: L, config: PipelineConfig) -> Self {
        Self::with_shared(Arc::new(llm_provider), config)
    }

    /// Create a pipeline over a provider shared with the caller
    pub fn with_shared(llm_provider: Arc<L>, config: PipelineConfig) -> Self {
        let gatekeeper = Gatekeeper::new(config.gatekeeper.clone());
        Self {
            extractor: Extractor::with_shared(llm_provider, config),
            gatekeeper,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        self.extractor.config()
    }

    /// Process one document.
    ///
    /// # Errors
    ///
    /// Invalid configuration, structure detection and chunking failures
    /// and an unserializable record abort the run. Each is recorded on
    /// `monitor` before it is returned.
    pub async fn process(
        &self,
        document: &Document,
        monitor: &MonitorHandle,
    ) -> Result<PipelineOutcome, PipelineError> {
        let config = self.config();
        let text = document.text.as_str();
        info!(document = %document.id, chars = text.chars().count(), "Processing document");

        if let Err(reason) = config.validate() {
            let e = PipelineError::Config(reason);
            monitor.record_error("config", &e);
            return Err(e);
        }

        // 1. Structure
        monitor.start_stage("structure");
        let index = match detect_structure_with_limit(text, config.max_text_length) {
            Ok(index) => index,
            Err(e) => return Err(fail(monitor, "structure", e.into())),
        };
        monitor.end_stage(json!({
            "elements": index.elements().len(),
            "headings": index.headings().count(),
            "tables": index.tables().count(),
            "references": index.references().count(),
        }));

        // 2. Chunking
        monitor.start_stage("chunking");
        let options = ChunkOptions {
            max_chars: config.max_chunk_chars,
            max_rows: config.max_sheet_rows,
            heading_min_body_chars: config.heading_min_body_chars,
        };
        let chunks = match chunk_structured(text, &index, &options) {
            Ok(chunks) => chunks,
            Err(e) => return Err(fail(monitor, "chunking", e.into())),
        };
        monitor.end_stage(json!({
            "chunks": chunks.len(),
            "split_chunks": chunks.iter().filter(|c| !c.part_of.is_empty()).count(),
        }));

        // 3. Extraction (barrier: every chunk has a final outcome)
        monitor.start_stage("extraction");
        let results = self
            .extractor
            .extract_all(&chunks, &document.id, monitor)
            .await;
        let failed = results.iter().filter(|r| r.is_failed()).count();
        monitor.end_stage(json!({
            "succeeded": results.len() - failed,
            "failed": failed,
            "repaired": results.iter().filter(|r| r.is_recovered()).count(),
        }));

        // 4. Conflicts
        monitor.start_stage("conflicts");
        let conflicts = detect_conflicts(&results);
        let conflict_report = generate_conflict_report(&conflicts);
        monitor.end_stage(json!({
            "conflicts": conflict_report.total_conflicts,
            "critical": conflict_report.critical_conflicts,
        }));

        // 5. Assembly
        monitor.start_stage("assembly");
        let assembled = Assembler::new(document.id.clone(), text, &chunks, &index)
            .assemble_results(&results, &conflicts);
        let no_new_information = validate_no_new_information(&assembled, text);
        monitor.end_stage(json!({
            "checked_values": no_new_information.checked_values,
            "untraced_values": no_new_information.untraced.len(),
        }));

        // 6. Validation
        monitor.start_stage("validation");
        let ctx = P0Context::new(text, &index, &chunks, &results, &conflicts, &assembled)
            .with_config(self.gatekeeper.config());
        let validation = match self.gatekeeper.validate(&ctx) {
            Ok(report) => report,
            Err(e) => return Err(fail(monitor, "validation", e.into())),
        };
        for violation in &validation.p0.violations {
            monitor.record_error(
                "validation",
                &format!("{} {}: {}", violation.code, violation.name, violation.explanation),
            );
        }
        monitor.end_stage(json!({
            "accepted": validation.accepted,
            "schema_valid": validation.schema.valid,
            "p0_passed": validation.p0.passed_count,
            "p0_total": validation.p0.total_checks,
            "completeness": validation.completeness.score,
        }));

        let accepted = validation.accepted;
        info!(
            document = %document.id,
            accepted,
            chunks = chunks.len(),
            failed,
            conflicts = conflicts.len(),
            "Document processed"
        );

        Ok(PipelineOutcome {
            index,
            chunks,
            results,
            conflicts,
            conflict_report,
            assembled,
            no_new_information,
            validation,
            accepted,
        })
    }
}

/// Record a fatal stage error, close the stage and hand the error back
fn fail(monitor: &MonitorHandle, stage: &str, e: PipelineError) -> PipelineError {
    error!(stage, error = %e, "Pipeline aborted");
    monitor.record_error(stage, &e);
    monitor.end_stage(json!({ "error": e.to_string() }));
    e
}
