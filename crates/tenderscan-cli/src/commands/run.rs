//! Run command implementation.

use crate::cli::RunArgs;
use crate::commands::read_input;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use std::fs;
use std::path::Path;
use tenderscan_domain::{Document, DocumentId};
use tenderscan_extractor::{Pipeline, PipelineConfig};
use tenderscan_llm::ReplayProvider;
use tenderscan_monitor::MonitorHandle;
use tracing::info;

/// Execute the run command.
///
/// A rejected document still prints its record and report before the
/// command fails with [`CliError::Rejected`].
pub async fn execute_run(args: RunArgs, config: &PipelineConfig, formatter: &Formatter) -> Result<()> {
    let text = read_input(&args.file)?;
    let provider = ReplayProvider::from_json(&read_input(&args.responses)?)?;
    info!(responses = provider.len(), "Loaded recorded responses");

    let document_id = match args.document_id {
        Some(id) => id,
        None => default_document_id(&args.file)?,
    };
    let document = Document::with_id(DocumentId::from_string(document_id.clone()), text);
    let monitor = MonitorHandle::for_document(&document_id);

    let pipeline = Pipeline::new(provider, config.clone());
    let outcome = pipeline.process(&document, &monitor).await?;
    let report = monitor.generate_report();

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    println!("{}", formatter.format_outcome(&outcome, &report)?);

    if outcome.accepted {
        Ok(())
    } else {
        Err(CliError::Rejected {
            document_id,
            failed: outcome.validation.p0.violations.len(),
        })
    }
}

fn default_document_id(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::InvalidInput(format!(
                "cannot derive a document id from {}; pass --document-id",
                path.display()
            ))
        })
}
