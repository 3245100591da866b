//! Tenderscan Extractor
//!
//! Turns a tender document into a validated, source-traced JSON record.
//!
//! # Overview
//!
//! The extractor crate owns everything between the structural index and
//! the acceptance gate: chunking along structure, per-chunk extraction
//! through a language model, cross-chunk conflict detection, and assembly
//! with provenance. [`Pipeline`] runs the whole chain for one document.
//!
//! # Architecture
//!
//! ```text
//! Text → Structure → Chunker → Extractor (fan-out) → Conflicts → Assembler → Gatekeeper
//! ```
//!
//! # Key Features
//!
//! - **Zero-loss chunking**: owned segments tile the source exactly
//! - **Structure-aware splits**: tables repeat their header, headings keep their body
//! - **Truncation repair**: model output cut mid-JSON is recovered and flagged
//! - **Conflicts, not choices**: disagreeing chunks are reported, never resolved
//! - **Provenance**: every assembled value names its chunk and source range
//!
//! # Example Usage
//!
//! ```no_run
//! use tenderscan_domain::{Document, DocumentId};
//! use tenderscan_extractor::{Pipeline, PipelineConfig};
//! use tenderscan_llm::MockProvider;
//! use tenderscan_monitor::MonitorHandle;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = MockProvider::new(r#"{"unit_prices": [{"item": "Bread", "unit_price": "12,50"}]}"#);
//! let pipeline = Pipeline::new(llm, PipelineConfig::default());
//!
//! let document = Document::with_id(
//!     DocumentId::from_string("tender-2025-014"),
//!     "ARTICLE 1 - Prices\nBread is delivered at 12,50 per kg.\n",
//! );
//! let monitor = MonitorHandle::for_document("tender-2025-014");
//! let outcome = pipeline.process(&document, &monitor).await?;
//!
//! println!("Accepted: {}", outcome.accepted);
//! println!("Conflicts: {}", outcome.conflicts.len());
//! println!("{}", monitor.generate_report().performance_summary.success_rate);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod assembler;
pub mod chunking;
mod config;
mod conflict;
mod error;
mod extractor;
pub mod parser;
mod pipeline;
mod prompt;

#[cfg(test)]
mod tests;

pub use assembler::{validate_no_new_information, Assembler, NoNewInformationReport, UntracedValue};
pub use config::PipelineConfig;
pub use conflict::{detect_conflicts, generate_conflict_report, ConflictReport};
pub use error::{ChunkingError, ExtractorError, PipelineError, Result};
pub use extractor::Extractor;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use prompt::PromptBuilder;
